use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::rbac::UserType;

use super::LEGACY_ADMIN_GROUP;

/// The profile attributes role resolution reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileState {
    pub user_type: UserType,
    pub is_active: bool,
}

/// Everything role resolution needs about one account, loaded fresh on
/// each authorization check.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    /// Legacy superuser flag (pre-RBAC elevation signal).
    pub is_superuser: bool,
    /// Legacy "Admin" group membership.
    pub in_admin_group: bool,
    pub profile: Option<ProfileState>,
}

pub async fn load_identity(pool: &SqlitePool, user_id: Uuid) -> AppResult<Identity> {
    let user: Option<(String, bool)> = sqlx::query_as(
        "SELECT username, is_superuser FROM users WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    let (username, is_superuser) =
        user.ok_or_else(|| AppError::not_found("user not found"))?;

    let in_admin_group: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM user_groups WHERE user_id = ? AND group_name = ?)",
    )
    .bind(user_id.to_string())
    .bind(LEGACY_ADMIN_GROUP)
    .fetch_one(pool)
    .await?;

    let profile: Option<(String, bool)> = sqlx::query_as(
        "SELECT user_type, is_active FROM user_profiles WHERE user_id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    let profile = match profile {
        Some((user_type, is_active)) => Some(ProfileState {
            user_type: UserType::parse(&user_type)?,
            is_active,
        }),
        None => None,
    };

    Ok(Identity {
        user_id,
        username,
        is_superuser,
        in_admin_group,
        profile,
    })
}
