use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::rbac::UserType;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User};
use crate::utils::{hash_password, utc_now, verify_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: User,
    pub role: crate::authz::Role,
    pub role_source: crate::authz::RoleSource,
    #[schema(value_type = Object)]
    pub permissions: std::collections::BTreeMap<crate::authz::Module, Vec<crate::authz::PermissionType>>,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 409, description = "Username or email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_username_available(&state.pool, &payload.username).await?;
    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    // Account plus its profile in one unit; a registered user always
    // starts with an active 'normal' profile.
    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, is_superuser, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO user_profiles (id, user_id, user_type, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(UserType::Normal.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id)?;

    log_activity_with_context(
        &state.event_bus,
        "registered",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let context = RequestContext::from_headers(&headers);

    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, is_superuser, created_at, updated_at, deleted_at \
         FROM users WHERE username = ? AND deleted_at IS NULL",
    )
    .bind(&payload.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let user: User = db_user.clone().try_into()?;
    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;

    record_login(&state.pool, user.id, &context, password_ok).await;

    if !password_ok {
        log_activity_with_context(
            &state.event_bus,
            "login_failed",
            Some(user.id),
            &user,
            None,
            Some(context),
        );
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(user.id)?;

    log_activity_with_context(
        &state.event_bus,
        "login",
        Some(user.id),
        &user,
        None,
        Some(context),
    );

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user with role and permissions", body = MeResponse)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MeResponse>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    let user: User = db_user.try_into()?;

    let resolution = state.authz.resolve_role(auth.user_id).await?;
    let permissions = state.authz.permissions_summary(auth.user_id).await?;

    Ok(Json(MeResponse {
        user,
        role: resolution.role,
        role_source: resolution.source,
        permissions,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged")),
    security(("bearerAuth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
) -> AppResult<Json<MessageResponse>> {
    // Stamp the most recent open login row; best effort.
    let result = sqlx::query(
        "UPDATE login_log SET logout_time = ? \
         WHERE id = (SELECT id FROM login_log WHERE user_id = ? AND logout_time IS NULL \
                     ORDER BY login_time DESC LIMIT 1)",
    )
    .bind(Utc::now())
    .bind(auth.user_id.to_string())
    .execute(&state.pool)
    .await;

    if let Err(e) = result {
        tracing::error!("failed to stamp logout time: {e}");
    }

    if let Ok(db_user) = fetch_user_by_id(&state.pool, auth.user_id).await {
        if let Ok(user) = User::try_from(db_user) {
            log_activity_with_context(
                &state.event_bus,
                "logout",
                Some(auth.user_id),
                &user,
                None,
                Some(RequestContext::from_headers(&headers)),
            );
        }
    }

    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

async fn record_login(pool: &SqlitePool, user_id: Uuid, context: &RequestContext, success: bool) {
    // Login history is best-effort; a full audit table must not lock
    // people out.
    let result = sqlx::query(
        "INSERT INTO login_log (id, user_id, login_time, ip_address, user_agent, success) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(Utc::now())
    .bind(context.ip.as_deref())
    .bind(context.user_agent.as_deref())
    .bind(success)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!("failed to record login attempt: {e}");
    }
}

async fn ensure_username_available(pool: &SqlitePool, username: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE username = ? AND deleted_at IS NULL")
        .bind(username)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("username already in use"));
    }

    Ok(())
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

pub async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    let user = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, is_superuser, created_at, updated_at, deleted_at \
         FROM users WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    user.ok_or_else(|| AppError::not_found("user not found"))
}
