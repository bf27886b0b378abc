use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::PermissionEvaluator;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, cars, health, hierarchy, rbac};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
    pub authz: PermissionEvaluator,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        let authz = PermissionEvaluator::new(pool.clone(), event_bus.clone());
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
            authz,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;

    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let rbac_routes = Router::new()
        .route("/users/:user_id/role", get(rbac::get_role))
        .route("/users/:user_id/permissions", get(rbac::list_permissions))
        .route("/users/:user_id/permissions/grant", post(rbac::grant_permission))
        .route("/users/:user_id/permissions/revoke", post(rbac::revoke_permission))
        .route(
            "/users/:user_id/modules/:module/permissions",
            put(rbac::assign_module_permissions),
        )
        .route(
            "/users/:user_id/effective-permissions",
            get(rbac::effective_permissions),
        )
        .route("/users/:user_id/profile", put(rbac::upsert_profile));

    let hierarchy_routes = Router::new()
        .route("/sectors", get(hierarchy::list_sectors))
        .route("/sectors", post(hierarchy::create_sector))
        .route("/sectors/:id", delete(hierarchy::delete_sector))
        .route("/departments", get(hierarchy::list_departments))
        .route("/departments", post(hierarchy::create_department))
        .route("/departments/:id", delete(hierarchy::delete_department))
        .route("/divisions", get(hierarchy::list_divisions))
        .route("/divisions", post(hierarchy::create_division))
        .route("/divisions/:id", delete(hierarchy::delete_division));

    let car_routes = Router::new()
        .route("/", get(cars::list_cars))
        .route("/", post(cars::create_car))
        .route("/:id", get(cars::get_car))
        .route("/:id", put(cars::update_car))
        .route("/:id", delete(cars::delete_car));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/rbac", rbac_routes)
        .nest("/hierarchy", hierarchy_routes)
        .nest("/cars", car_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
