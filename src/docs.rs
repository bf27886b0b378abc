use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::rbac::get_role,
        routes::rbac::list_permissions,
        routes::rbac::grant_permission,
        routes::rbac::revoke_permission,
        routes::rbac::assign_module_permissions,
        routes::rbac::effective_permissions,
        routes::rbac::upsert_profile,
        routes::hierarchy::list_sectors,
        routes::hierarchy::create_sector,
        routes::hierarchy::delete_sector,
        routes::hierarchy::list_departments,
        routes::hierarchy::create_department,
        routes::hierarchy::delete_department,
        routes::hierarchy::list_divisions,
        routes::hierarchy::create_division,
        routes::hierarchy::delete_division,
        routes::cars::list_cars,
        routes::cars::get_car,
        routes::cars::create_car,
        routes::cars::update_car,
        routes::cars::delete_car,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::auth::MessageResponse,
            routes::auth::MeResponse,
            routes::rbac::RoleResponse,
            routes::rbac::RevokeResponse,
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::rbac::UserType,
            models::rbac::UserProfile,
            models::rbac::ProfileUpsertRequest,
            models::rbac::ModulePermission,
            models::rbac::UserPermission,
            models::rbac::GrantRequest,
            models::rbac::AssignModulePermissionsRequest,
            models::rbac::EffectivePermissions,
            models::hierarchy::Sector,
            models::hierarchy::SectorCreateRequest,
            models::hierarchy::Department,
            models::hierarchy::DepartmentCreateRequest,
            models::hierarchy::Division,
            models::hierarchy::DivisionCreateRequest,
            models::car::Car,
            models::car::CarCreateRequest,
            models::car::CarUpdateRequest,
            crate::authz::Module,
            crate::authz::PermissionType,
            crate::authz::Role,
            crate::authz::RoleSource,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and database checks"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "RBAC", description = "Role and permission administration"),
        (name = "Hierarchy", description = "Sector / Department / Division management"),
        (name = "Cars", description = "Fleet vehicle management")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}
