use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{Module, PermissionType};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::utils::parse_uuid;

// =============================================================================
// USER PROFILE
// =============================================================================

/// Profile-declared user type. Distinct from the effective role only in
/// that a role can also be reached through the legacy fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    SuperAdmin,
    Admin,
    Normal,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::SuperAdmin => "super_admin",
            UserType::Admin => "admin",
            UserType::Normal => "normal",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "super_admin" => Ok(UserType::SuperAdmin),
            "admin" => Ok(UserType::Admin),
            "normal" => Ok(UserType::Normal),
            other => Err(AppError::bad_request(format!("unknown user type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_type: UserType,
    pub is_active: bool,
    /// Who provisioned this profile. Weak reference, audit only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    /// Free-form auxiliary payload; never consulted for access decisions.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub permissions_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for UserProfile {
    fn entity_type() -> &'static str { "user_profile" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUserProfile {
    pub id: String,
    pub user_id: String,
    pub user_type: String,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub permissions_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbUserProfile> for UserProfile {
    type Error = AppError;

    fn try_from(db: DbUserProfile) -> Result<Self, Self::Error> {
        Ok(UserProfile {
            id: parse_uuid(&db.id, "user_profile")?,
            user_id: parse_uuid(&db.user_id, "user")?,
            user_type: UserType::parse(&db.user_type)?,
            is_active: db.is_active,
            created_by: match db.created_by {
                Some(ref id) => Some(parse_uuid(id, "user")?),
                None => None,
            },
            permissions_json: serde_json::from_str(&db.permissions_json)
                .unwrap_or(serde_json::Value::Object(Default::default())),
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileUpsertRequest {
    pub user_type: UserType,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// PERMISSION CATALOG ENTRY
// =============================================================================

/// One addressable capability: a (module, permission type) pair. Catalog
/// entry only, not a grant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModulePermission {
    pub id: Uuid,
    pub module_name: Module,
    pub permission_type: PermissionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbModulePermission {
    pub id: String,
    pub module_name: String,
    pub permission_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbModulePermission> for ModulePermission {
    type Error = AppError;

    fn try_from(db: DbModulePermission) -> Result<Self, Self::Error> {
        Ok(ModulePermission {
            id: parse_uuid(&db.id, "module_permission")?,
            module_name: Module::parse(&db.module_name)?,
            permission_type: PermissionType::parse(&db.permission_type)?,
            description: db.description,
            created_at: db.created_at,
        })
    }
}

// =============================================================================
// USER PERMISSION GRANT
// =============================================================================

/// The grant record. `granted = false` is a materialized revocation,
/// distinguishable from "no row" in audit history; both deny.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPermission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub module_permission_id: Uuid,
    pub module_name: Module,
    pub permission_type: PermissionType,
    pub granted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for UserPermission {
    fn entity_type() -> &'static str { "user_permission" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUserPermission {
    pub id: String,
    pub user_id: String,
    pub module_permission_id: String,
    pub module_name: String,
    pub permission_type: String,
    pub granted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbUserPermission> for UserPermission {
    type Error = AppError;

    fn try_from(db: DbUserPermission) -> Result<Self, Self::Error> {
        Ok(UserPermission {
            id: parse_uuid(&db.id, "user_permission")?,
            user_id: parse_uuid(&db.user_id, "user")?,
            module_permission_id: parse_uuid(&db.module_permission_id, "module_permission")?,
            module_name: Module::parse(&db.module_name)?,
            permission_type: PermissionType::parse(&db.permission_type)?,
            granted: db.granted,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

// =============================================================================
// REQUEST / RESPONSE SHAPES
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantRequest {
    pub module_name: Module,
    pub permission_type: PermissionType,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignModulePermissionsRequest {
    /// The complete desired set for the module; everything outside it is
    /// explicitly revoked.
    pub permission_types: Vec<PermissionType>,
}

/// Effective permission summary: module -> granted types, as a typed map
/// rather than a dynamically keyed dictionary.
#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub role: crate::authz::Role,
    pub role_source: crate::authz::RoleSource,
    #[schema(value_type = Object)]
    pub permissions: BTreeMap<Module, Vec<PermissionType>>,
}
