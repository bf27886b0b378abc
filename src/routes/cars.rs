//! Fleet vehicle CRUD. Every handler goes through the permission
//! evaluator for the `cars` module, and every save passes the hierarchy
//! consistency check before touching the table.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Module, PermissionType};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_activity_with_context};
use crate::hierarchy::{validate_hierarchy_consistency, HierarchySelection};
use crate::jwt::AuthUser;
use crate::models::car::{Car, CarCreateRequest, CarUpdateRequest, DbCar};

const DEFAULT_STATUS: &str = "operational";

const SELECT_CAR: &str = "SELECT id, fleet_no, plate_no, status, sector_id, department_id, division_id, \
                          created_at, updated_at FROM cars";

#[utoipa::path(
    get,
    path = "/cars",
    tag = "Cars",
    responses((status = 200, description = "All cars", body = [Car])),
    security(("bearerAuth" = []))
)]
pub async fn list_cars(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Car>>> {
    state
        .authz
        .require_permission(auth.user_id, Module::Cars, PermissionType::Read)
        .await?;

    let rows = sqlx::query_as::<_, DbCar>(&format!("{SELECT_CAR} ORDER BY fleet_no"))
        .fetch_all(&state.pool)
        .await?;

    let cars: Vec<Car> = rows.into_iter().map(TryInto::try_into).collect::<Result<_, _>>()?;
    Ok(Json(cars))
}

#[utoipa::path(
    get,
    path = "/cars/{id}",
    tag = "Cars",
    params(("id" = Uuid, Path, description = "Car id")),
    responses((status = 200, description = "One car", body = Car)),
    security(("bearerAuth" = []))
)]
pub async fn get_car(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Car>> {
    state
        .authz
        .require_permission(auth.user_id, Module::Cars, PermissionType::Read)
        .await?;

    let car = fetch_car(&state.pool, id).await?;
    Ok(Json(car))
}

#[utoipa::path(
    post,
    path = "/cars",
    tag = "Cars",
    request_body = CarCreateRequest,
    responses(
        (status = 201, description = "Car created", body = Car),
        (status = 409, description = "Fleet or plate number already in use"),
        (status = 422, description = "Hierarchy selection inconsistent")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_car(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: axum::http::HeaderMap,
    Json(payload): Json<CarCreateRequest>,
) -> AppResult<(StatusCode, Json<Car>)> {
    state
        .authz
        .require_permission(auth.user_id, Module::Cars, PermissionType::Create)
        .await?;

    let resolved = validate_hierarchy_consistency(
        &state.pool,
        true,
        HierarchySelection {
            sector_id: payload.sector_id,
            department_id: payload.department_id,
            division_id: payload.division_id,
        },
    )
    .await?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let status = payload.status.as_deref().unwrap_or(DEFAULT_STATUS);

    sqlx::query(
        "INSERT INTO cars (id, fleet_no, plate_no, status, sector_id, department_id, division_id, \
                           created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&payload.fleet_no)
    .bind(&payload.plate_no)
    .bind(status)
    .bind(resolved.sector_id.map(|v| v.to_string()))
    .bind(resolved.department_id.map(|v| v.to_string()))
    .bind(resolved.division_id.map(|v| v.to_string()))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|e| {
        if AppError::is_unique_violation(&e) {
            AppError::conflict("fleet number or plate number already in use")
        } else {
            e.into()
        }
    })?;

    let car = fetch_car(&state.pool, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &car,
        None,
        Some(crate::events::RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(car)))
}

#[utoipa::path(
    put,
    path = "/cars/{id}",
    tag = "Cars",
    params(("id" = Uuid, Path, description = "Car id")),
    request_body = CarUpdateRequest,
    responses(
        (status = 200, description = "Car updated", body = Car),
        (status = 422, description = "Hierarchy selection inconsistent")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_car(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CarUpdateRequest>,
) -> AppResult<Json<Car>> {
    state
        .authz
        .require_permission(auth.user_id, Module::Cars, PermissionType::Update)
        .await?;

    let existing = fetch_car(&state.pool, id).await?;

    // Hierarchy fields not present in the request keep their stored
    // values; the combined selection is what gets validated.
    let resolved = validate_hierarchy_consistency(
        &state.pool,
        false,
        HierarchySelection {
            sector_id: payload.sector_id.or(existing.sector_id),
            department_id: payload.department_id.or(existing.department_id),
            division_id: payload.division_id.or(existing.division_id),
        },
    )
    .await?;

    let fleet_no = payload.fleet_no.unwrap_or_else(|| existing.fleet_no.clone());
    let plate_no = payload.plate_no.unwrap_or_else(|| existing.plate_no.clone());
    let status = payload.status.unwrap_or_else(|| existing.status.clone());

    sqlx::query(
        "UPDATE cars SET fleet_no = ?, plate_no = ?, status = ?, sector_id = ?, department_id = ?, \
                         division_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&fleet_no)
    .bind(&plate_no)
    .bind(&status)
    .bind(resolved.sector_id.map(|v| v.to_string()))
    .bind(resolved.department_id.map(|v| v.to_string()))
    .bind(resolved.division_id.map(|v| v.to_string()))
    .bind(Utc::now())
    .bind(id.to_string())
    .execute(&state.pool)
    .await
    .map_err(|e| {
        if AppError::is_unique_violation(&e) {
            AppError::conflict("fleet number or plate number already in use")
        } else {
            e.into()
        }
    })?;

    let updated = fetch_car(&state.pool, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &updated,
        Some(&existing),
        None,
    );

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/cars/{id}",
    tag = "Cars",
    params(("id" = Uuid, Path, description = "Car id")),
    responses((status = 204, description = "Car deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_car(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .authz
        .require_permission(auth.user_id, Module::Cars, PermissionType::Delete)
        .await?;

    let car = fetch_car(&state.pool, id).await?;

    sqlx::query("DELETE FROM cars WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &car);

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_car(pool: &SqlitePool, id: Uuid) -> AppResult<Car> {
    let row = sqlx::query_as::<_, DbCar>(&format!("{SELECT_CAR} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(db) => db.try_into(),
        None => Err(AppError::not_found("car not found")),
    }
}
