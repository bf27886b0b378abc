use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::rbac::{DbModulePermission, ModulePermission};

/// The addressable resource areas of the permission catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Cars,
    Equipment,
    GenericTables,
}

impl Module {
    pub const ALL: [Module; 3] = [Module::Cars, Module::Equipment, Module::GenericTables];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Cars => "cars",
            Module::Equipment => "equipment",
            Module::GenericTables => "generic_tables",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "cars" => Ok(Module::Cars),
            "equipment" => Ok(Module::Equipment),
            "generic_tables" => Ok(Module::GenericTables),
            other => Err(AppError::bad_request(format!("unknown module: {other}"))),
        }
    }
}

/// CRUD permission types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    Create,
    Read,
    Update,
    Delete,
}

impl PermissionType {
    pub const ALL: [PermissionType; 4] = [
        PermissionType::Create,
        PermissionType::Read,
        PermissionType::Update,
        PermissionType::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Create => "create",
            PermissionType::Read => "read",
            PermissionType::Update => "update",
            PermissionType::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "create" => Ok(PermissionType::Create),
            "read" => Ok(PermissionType::Read),
            "update" => Ok(PermissionType::Update),
            "delete" => Ok(PermissionType::Delete),
            other => Err(AppError::bad_request(format!("unknown permission type: {other}"))),
        }
    }
}

/// Get-or-create one catalog entry. Concurrent callers may race on the
/// (module_name, permission_type) unique constraint; INSERT OR IGNORE
/// followed by a lookup makes the create idempotent instead of
/// propagating the integrity error.
pub async fn get_or_create_module_permission(
    pool: &SqlitePool,
    module: Module,
    permission: PermissionType,
) -> AppResult<ModulePermission> {
    sqlx::query(
        "INSERT OR IGNORE INTO module_permissions (id, module_name, permission_type, description, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(module.as_str())
    .bind(permission.as_str())
    .bind(format!("{} permission for the {} module", permission.as_str(), module.as_str()))
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, DbModulePermission>(
        "SELECT id, module_name, permission_type, description, created_at \
         FROM module_permissions WHERE module_name = ? AND permission_type = ?",
    )
    .bind(module.as_str())
    .bind(permission.as_str())
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Populate the full catalog: the Cartesian product of modules and
/// permission types. Idempotent; inserts missing rows only, never
/// deletes or renames existing ones.
pub async fn ensure_default_catalog(pool: &SqlitePool) -> AppResult<Vec<ModulePermission>> {
    let mut entries = Vec::with_capacity(Module::ALL.len() * PermissionType::ALL.len());

    for module in Module::ALL {
        for permission in PermissionType::ALL {
            entries.push(get_or_create_module_permission(pool, module, permission).await?);
        }
    }

    Ok(entries)
}
