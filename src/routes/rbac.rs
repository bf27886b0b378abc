//! Permission administration endpoints. Everything here is gated on the
//! caller holding the admin (or super_admin) role; role escalation to
//! super_admin is additionally restricted to super_admins.

use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Module, Role, RoleSource};
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::rbac::{
    AssignModulePermissionsRequest, DbUserProfile, EffectivePermissions, GrantRequest,
    ProfileUpsertRequest, UserPermission, UserProfile, UserType,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub role_source: RoleSource,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeResponse {
    /// None when there was no grant row to revoke.
    pub revoked: Option<UserPermission>,
}

#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/role",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "Target user")),
    responses((status = 200, description = "Resolved role", body = RoleResponse)),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<RoleResponse>> {
    state.authz.require_admin(auth.user_id).await?;
    let resolution = state.authz.resolve_role(user_id).await?;
    Ok(Json(RoleResponse {
        user_id,
        role: resolution.role,
        role_source: resolution.source,
    }))
}

#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/permissions",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "Target user")),
    responses((status = 200, description = "All grant rows, granted or revoked", body = [UserPermission])),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<UserPermission>>> {
    state.authz.require_admin(auth.user_id).await?;
    let grants = state.authz.list_grants(user_id).await?;
    Ok(Json(grants))
}

#[utoipa::path(
    post,
    path = "/rbac/users/{user_id}/permissions/grant",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = GrantRequest,
    responses((status = 200, description = "Grant recorded", body = UserPermission)),
    security(("bearerAuth" = []))
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<GrantRequest>,
) -> AppResult<Json<UserPermission>> {
    state.authz.require_admin(auth.user_id).await?;
    let grant = state
        .authz
        .grant(user_id, payload.module_name, payload.permission_type, Some(auth.user_id))
        .await?;
    Ok(Json(grant))
}

#[utoipa::path(
    post,
    path = "/rbac/users/{user_id}/permissions/revoke",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = GrantRequest,
    responses((status = 200, description = "Revocation result; revoking a never-granted permission is a no-op", body = RevokeResponse)),
    security(("bearerAuth" = []))
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<GrantRequest>,
) -> AppResult<Json<RevokeResponse>> {
    state.authz.require_admin(auth.user_id).await?;
    let revoked = state
        .authz
        .revoke(user_id, payload.module_name, payload.permission_type, Some(auth.user_id))
        .await?;
    Ok(Json(RevokeResponse { revoked }))
}

#[utoipa::path(
    put,
    path = "/rbac/users/{user_id}/modules/{module}/permissions",
    tag = "RBAC",
    params(
        ("user_id" = Uuid, Path, description = "Target user"),
        ("module" = Module, Path, description = "Module whose permission set is replaced")
    ),
    request_body = AssignModulePermissionsRequest,
    responses((status = 200, description = "The complete resulting row set for the module", body = [UserPermission])),
    security(("bearerAuth" = []))
)]
pub async fn assign_module_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, module)): Path<(Uuid, Module)>,
    Json(payload): Json<AssignModulePermissionsRequest>,
) -> AppResult<Json<Vec<UserPermission>>> {
    state.authz.require_admin(auth.user_id).await?;

    let desired: BTreeSet<_> = payload.permission_types.into_iter().collect();
    let rows = state
        .authz
        .assign_module_permissions(user_id, module, &desired, Some(auth.user_id))
        .await?;

    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/effective-permissions",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "Target user")),
    responses((status = 200, description = "Effective permissions per module", body = EffectivePermissions)),
    security(("bearerAuth" = []))
)]
pub async fn effective_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<EffectivePermissions>> {
    state.authz.require_admin(auth.user_id).await?;

    let resolution = state.authz.resolve_role(user_id).await?;
    let permissions = state.authz.permissions_summary(user_id).await?;

    Ok(Json(EffectivePermissions {
        user_id,
        role: resolution.role,
        role_source: resolution.source,
        permissions,
    }))
}

#[utoipa::path(
    put,
    path = "/rbac/users/{user_id}/profile",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = ProfileUpsertRequest,
    responses(
        (status = 200, description = "Profile created or updated", body = UserProfile),
        (status = 403, description = "Escalating to super_admin requires a super_admin caller")
    ),
    security(("bearerAuth" = []))
)]
pub async fn upsert_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ProfileUpsertRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    state.authz.require_admin(auth.user_id).await?;

    // Only a super_admin may mint another super_admin.
    if payload.user_type == UserType::SuperAdmin {
        state.authz.require_super_admin(auth.user_id).await?;
    }

    // The target must be a live account.
    super::auth::fetch_user_by_id(&state.pool, user_id).await?;

    let existing: Option<DbUserProfile> = sqlx::query_as(
        "SELECT id, user_id, user_type, is_active, created_by, permissions_json, created_at, updated_at \
         FROM user_profiles WHERE user_id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(&state.pool)
    .await?;

    let now = Utc::now();
    let is_new = existing.is_none();

    sqlx::query(
        "INSERT INTO user_profiles (id, user_id, user_type, is_active, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
             user_type = excluded.user_type, \
             is_active = excluded.is_active, \
             updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(payload.user_type.as_str())
    .bind(payload.is_active)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let profile: UserProfile = sqlx::query_as::<_, DbUserProfile>(
        "SELECT id, user_id, user_type, is_active, created_by, permissions_json, created_at, updated_at \
         FROM user_profiles WHERE user_id = ?",
    )
    .bind(user_id.to_string())
    .fetch_one(&state.pool)
    .await?
    .try_into()?;

    let action = if is_new { "created" } else { "updated" };
    log_activity(&state.event_bus, action, Some(auth.user_id), &profile);

    Ok((StatusCode::OK, Json(profile)))
}
