use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, EventBus};
use crate::models::rbac::{DbUserPermission, UserPermission};

use super::catalog::{get_or_create_module_permission, Module, PermissionType};
use super::identity::load_identity;
use super::role::{resolve_role, RoleResolution};

const GRANT_SQL: &str = r#"
SELECT up.id, up.user_id, up.module_permission_id, mp.module_name,
       mp.permission_type, up.granted, up.created_at, up.updated_at
FROM user_permissions up
JOIN module_permissions mp ON mp.id = up.module_permission_id
WHERE up.user_id = ? AND mp.module_name = ? AND mp.permission_type = ?
"#;

/// The single authorization decision point.
///
/// Evaluation order for `has_permission`:
/// 1. super_admin role -> allow
/// 2. admin role (profile or legacy fallback) -> allow
/// 3. explicit grant row for (user, module, permission) -> its `granted`
/// 4. no row -> deny
#[derive(Clone)]
pub struct PermissionEvaluator {
    pool: SqlitePool,
    event_bus: EventBus,
}

impl PermissionEvaluator {
    pub fn new(pool: SqlitePool, event_bus: EventBus) -> Self {
        Self { pool, event_bus }
    }

    /// Resolve the caller's effective role. Unknown or soft-deleted
    /// accounts surface as NotFound; guards translate that to a deny.
    pub async fn resolve_role(&self, user_id: Uuid) -> AppResult<RoleResolution> {
        let identity = load_identity(&self.pool, user_id).await?;
        Ok(resolve_role(&identity))
    }

    /// Pure read; no side effects. Absent rows deny, database failures
    /// propagate instead of masquerading as denials.
    pub async fn has_permission(
        &self,
        user_id: Uuid,
        module: Module,
        permission: PermissionType,
    ) -> AppResult<bool> {
        let resolution = match self.resolve_role(user_id).await {
            Ok(res) => res,
            // Fail closed for accounts that no longer exist.
            Err(AppError::NotFound(_)) => {
                tracing::debug!(%user_id, "permission denied: unknown account");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        if resolution.is_super_admin() {
            tracing::debug!(%user_id, module = module.as_str(), permission = permission.as_str(), "super_admin bypass");
            return Ok(true);
        }

        if resolution.is_admin_user() {
            tracing::debug!(%user_id, module = module.as_str(), permission = permission.as_str(), "admin bypass");
            return Ok(true);
        }

        let granted: Option<bool> = sqlx::query_scalar(
            "SELECT up.granted FROM user_permissions up \
             JOIN module_permissions mp ON mp.id = up.module_permission_id \
             WHERE up.user_id = ? AND mp.module_name = ? AND mp.permission_type = ?",
        )
        .bind(user_id.to_string())
        .bind(module.as_str())
        .bind(permission.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let allowed = granted.unwrap_or(false);
        tracing::debug!(
            %user_id,
            module = module.as_str(),
            permission = permission.as_str(),
            allowed,
            "explicit grant lookup"
        );
        Ok(allowed)
    }

    /// Guard helper: deny becomes a Forbidden error for route handlers.
    pub async fn require_permission(
        &self,
        user_id: Uuid,
        module: Module,
        permission: PermissionType,
    ) -> AppResult<()> {
        if self.has_permission(user_id, module, permission).await? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "missing {} permission on {}",
                permission.as_str(),
                module.as_str()
            )))
        }
    }

    pub async fn require_admin(&self, user_id: Uuid) -> AppResult<RoleResolution> {
        let resolution = self.resolve_role(user_id).await?;
        if resolution.is_admin_user() {
            Ok(resolution)
        } else {
            Err(AppError::forbidden("administrator privileges required"))
        }
    }

    pub async fn require_super_admin(&self, user_id: Uuid) -> AppResult<RoleResolution> {
        let resolution = self.resolve_role(user_id).await?;
        if resolution.is_super_admin() {
            Ok(resolution)
        } else {
            Err(AppError::forbidden("super administrator privileges required"))
        }
    }

    /// Grant one permission. Get-or-creates the catalog entry, upserts
    /// the grant row with `granted = true`, and audits the change.
    /// Idempotent under repeated identical calls.
    pub async fn grant(
        &self,
        user_id: Uuid,
        module: Module,
        permission: PermissionType,
        granted_by: Option<Uuid>,
    ) -> AppResult<UserPermission> {
        let catalog_entry = get_or_create_module_permission(&self.pool, module, permission).await?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO user_permissions (id, user_id, module_permission_id, granted, created_at, updated_at) \
             VALUES (?, ?, ?, 1, ?, ?) \
             ON CONFLICT(user_id, module_permission_id) \
             DO UPDATE SET granted = 1, updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(catalog_entry.id.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let grant = self
            .fetch_grant(user_id, module, permission)
            .await?
            .ok_or_else(|| AppError::internal("grant row missing after upsert"))?;

        log_activity(&self.event_bus, "permission_change", granted_by, &grant);

        Ok(grant)
    }

    /// Revoke one permission. A permission that was never granted is a
    /// no-op returning None: plain revoke does not materialize
    /// explicit-false rows (unlike `assign_module_permissions`).
    pub async fn revoke(
        &self,
        user_id: Uuid,
        module: Module,
        permission: PermissionType,
        revoked_by: Option<Uuid>,
    ) -> AppResult<Option<UserPermission>> {
        let existing = self.fetch_grant(user_id, module, permission).await?;
        let Some(existing) = existing else {
            return Ok(None);
        };

        sqlx::query("UPDATE user_permissions SET granted = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(existing.id.to_string())
            .execute(&self.pool)
            .await?;

        let revoked = self
            .fetch_grant(user_id, module, permission)
            .await?
            .ok_or_else(|| AppError::internal("grant row missing after revoke"))?;

        log_activity(&self.event_bus, "permission_change", revoked_by, &revoked);

        Ok(Some(revoked))
    }

    /// Declarative replace-all for one module: after this call the
    /// user's rows cover every permission type in the catalog, granted
    /// exactly when the type is in `permission_types`. Runs in a single
    /// transaction so a mid-operation failure leaves no partial state.
    pub async fn assign_module_permissions(
        &self,
        user_id: Uuid,
        module: Module,
        permission_types: &BTreeSet<PermissionType>,
        assigned_by: Option<Uuid>,
    ) -> AppResult<Vec<UserPermission>> {
        // Catalog entries are created outside the transaction; they are
        // append-only and idempotent, so a later rollback leaving them
        // behind is harmless.
        let mut catalog = Vec::with_capacity(PermissionType::ALL.len());
        for permission in PermissionType::ALL {
            catalog.push(get_or_create_module_permission(&self.pool, module, permission).await?);
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for entry in &catalog {
            let granted = permission_types.contains(&entry.permission_type);
            sqlx::query(
                "INSERT INTO user_permissions (id, user_id, module_permission_id, granted, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(user_id, module_permission_id) \
                 DO UPDATE SET granted = excluded.granted, updated_at = excluded.updated_at",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(user_id.to_string())
            .bind(entry.id.to_string())
            .bind(granted)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let mut rows = Vec::with_capacity(catalog.len());
        for entry in &catalog {
            let grant = self
                .fetch_grant(user_id, module, entry.permission_type)
                .await?
                .ok_or_else(|| AppError::internal("grant row missing after assignment"))?;
            // Audit after commit so rolled-back state is never logged.
            log_activity(&self.event_bus, "permission_change", assigned_by, &grant);
            rows.push(grant);
        }

        Ok(rows)
    }

    /// All grant rows for one user, granted or revoked, for admin display.
    pub async fn list_grants(&self, user_id: Uuid) -> AppResult<Vec<UserPermission>> {
        let rows = sqlx::query_as::<_, DbUserPermission>(
            "SELECT up.id, up.user_id, up.module_permission_id, mp.module_name, \
                    mp.permission_type, up.granted, up.created_at, up.updated_at \
             FROM user_permissions up \
             JOIN module_permissions mp ON mp.id = up.module_permission_id \
             WHERE up.user_id = ? \
             ORDER BY mp.module_name, mp.permission_type",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Effective permissions per module. Elevated roles get the full
    /// catalog; normal users get their granted rows only.
    pub async fn permissions_summary(
        &self,
        user_id: Uuid,
    ) -> AppResult<BTreeMap<Module, Vec<PermissionType>>> {
        let resolution = self.resolve_role(user_id).await?;

        if resolution.is_admin_user() {
            return Ok(Module::ALL
                .into_iter()
                .map(|module| (module, PermissionType::ALL.to_vec()))
                .collect());
        }

        let mut summary: BTreeMap<Module, Vec<PermissionType>> = BTreeMap::new();
        for grant in self.list_grants(user_id).await? {
            if grant.granted {
                summary.entry(grant.module_name).or_default().push(grant.permission_type);
            }
        }

        Ok(summary)
    }

    async fn fetch_grant(
        &self,
        user_id: Uuid,
        module: Module,
        permission: PermissionType,
    ) -> AppResult<Option<UserPermission>> {
        let row = sqlx::query_as::<_, DbUserPermission>(GRANT_SQL)
            .bind(user_id.to_string())
            .bind(module.as_str())
            .bind(permission.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }
}
