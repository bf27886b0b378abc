//! Sector / Department / Division management. Reads require the read
//! permission on generic tables; writes the corresponding write
//! permission. The "غير محدد" fallback rows reject edits and deletes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Module, PermissionType};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::hierarchy::{ensure_not_protected, fetch_department, fetch_division, fetch_sector};
use crate::jwt::AuthUser;
use crate::models::hierarchy::{
    DbDepartment, DbDivision, DbSector, Department, DepartmentCreateRequest, Division,
    DivisionCreateRequest, Sector, SectorCreateRequest,
};

#[utoipa::path(
    get,
    path = "/hierarchy/sectors",
    tag = "Hierarchy",
    responses((status = 200, description = "All sectors", body = [Sector])),
    security(("bearerAuth" = []))
)]
pub async fn list_sectors(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Sector>>> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Read)
        .await?;

    let rows = sqlx::query_as::<_, DbSector>(
        "SELECT id, name, is_dummy, created_at, updated_at FROM sectors ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    let sectors: Vec<Sector> = rows.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?;
    Ok(Json(sectors))
}

#[utoipa::path(
    post,
    path = "/hierarchy/sectors",
    tag = "Hierarchy",
    request_body = SectorCreateRequest,
    responses(
        (status = 201, description = "Sector created", body = Sector),
        (status = 409, description = "Name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_sector(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SectorCreateRequest>,
) -> AppResult<(StatusCode, Json<Sector>)> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Create)
        .await?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("sector name must not be empty"));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query("INSERT INTO sectors (id, name, is_dummy, created_at, updated_at) VALUES (?, ?, 0, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&state.pool)
        .await
        .map_err(|e| {
            if AppError::is_unique_violation(&e) {
                AppError::conflict(format!("a sector named '{name}' already exists"))
            } else {
                e.into()
            }
        })?;

    let sector = fetch_sector(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::internal("sector missing after insert"))?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &sector);

    Ok((StatusCode::CREATED, Json(sector)))
}

#[utoipa::path(
    delete,
    path = "/hierarchy/sectors/{id}",
    tag = "Hierarchy",
    params(("id" = Uuid, Path, description = "Sector id")),
    responses(
        (status = 204, description = "Sector deleted"),
        (status = 403, description = "Protected fallback row")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_sector(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Delete)
        .await?;

    let sector = fetch_sector(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("sector not found"))?;

    ensure_not_protected(sector.is_dummy, "sector")?;

    sqlx::query("DELETE FROM sectors WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &sector);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/hierarchy/departments",
    tag = "Hierarchy",
    responses((status = 200, description = "All departments", body = [Department])),
    security(("bearerAuth" = []))
)]
pub async fn list_departments(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Department>>> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Read)
        .await?;

    let rows = sqlx::query_as::<_, DbDepartment>(
        "SELECT id, name, sector_id, is_dummy, created_at, updated_at FROM departments ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    let departments: Vec<Department> =
        rows.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?;
    Ok(Json(departments))
}

#[utoipa::path(
    post,
    path = "/hierarchy/departments",
    tag = "Hierarchy",
    request_body = DepartmentCreateRequest,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 409, description = "Name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_department(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<DepartmentCreateRequest>,
) -> AppResult<(StatusCode, Json<Department>)> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Create)
        .await?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("department name must not be empty"));
    }

    // The parent must exist before the child is inserted.
    fetch_sector(&state.pool, payload.sector_id)
        .await?
        .ok_or_else(|| AppError::bad_request("selected sector does not exist"))?;

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO departments (id, name, sector_id, is_dummy, created_at, updated_at) \
         VALUES (?, ?, ?, 0, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(payload.sector_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|e| {
        if AppError::is_unique_violation(&e) {
            AppError::conflict(format!("a department named '{name}' already exists"))
        } else {
            e.into()
        }
    })?;

    let department = fetch_department(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::internal("department missing after insert"))?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &department);

    Ok((StatusCode::CREATED, Json(department)))
}

#[utoipa::path(
    delete,
    path = "/hierarchy/departments/{id}",
    tag = "Hierarchy",
    params(("id" = Uuid, Path, description = "Department id")),
    responses(
        (status = 204, description = "Department deleted"),
        (status = 403, description = "Protected fallback row")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_department(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Delete)
        .await?;

    let department = fetch_department(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("department not found"))?;

    ensure_not_protected(department.is_dummy, "department")?;

    sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &department);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/hierarchy/divisions",
    tag = "Hierarchy",
    responses((status = 200, description = "All divisions", body = [Division])),
    security(("bearerAuth" = []))
)]
pub async fn list_divisions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Division>>> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Read)
        .await?;

    let rows = sqlx::query_as::<_, DbDivision>(
        "SELECT id, name, department_id, is_dummy, created_at, updated_at FROM divisions ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    let divisions: Vec<Division> =
        rows.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?;
    Ok(Json(divisions))
}

#[utoipa::path(
    post,
    path = "/hierarchy/divisions",
    tag = "Hierarchy",
    request_body = DivisionCreateRequest,
    responses(
        (status = 201, description = "Division created", body = Division),
        (status = 409, description = "Name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_division(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<DivisionCreateRequest>,
) -> AppResult<(StatusCode, Json<Division>)> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Create)
        .await?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("division name must not be empty"));
    }

    fetch_department(&state.pool, payload.department_id)
        .await?
        .ok_or_else(|| AppError::bad_request("selected department does not exist"))?;

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO divisions (id, name, department_id, is_dummy, created_at, updated_at) \
         VALUES (?, ?, ?, 0, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(payload.department_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|e| {
        if AppError::is_unique_violation(&e) {
            AppError::conflict(format!("a division named '{name}' already exists"))
        } else {
            e.into()
        }
    })?;

    let division = fetch_division(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::internal("division missing after insert"))?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &division);

    Ok((StatusCode::CREATED, Json(division)))
}

#[utoipa::path(
    delete,
    path = "/hierarchy/divisions/{id}",
    tag = "Hierarchy",
    params(("id" = Uuid, Path, description = "Division id")),
    responses(
        (status = 204, description = "Division deleted"),
        (status = 403, description = "Protected fallback row")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_division(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .authz
        .require_permission(auth.user_id, Module::GenericTables, PermissionType::Delete)
        .await?;

    let division = fetch_division(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("division not found"))?;

    ensure_not_protected(division.is_dummy, "division")?;

    sqlx::query("DELETE FROM divisions WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &division);

    Ok(StatusCode::NO_CONTENT)
}
