mod common;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use uuid::Uuid;

use fleet_access::authz::ensure_default_catalog;
use fleet_access::create_app;
use fleet_access::hierarchy::ensure_dummy_chain;
use fleet_access::models::rbac::UserType;

use common::{set_profile, setup_pool};

use tower::util::ServiceExt; // for `oneshot`

async fn send(app: &Router, req: Request<Body>) -> Result<(StatusCode, Value)> {
    let resp: Response = app.clone().oneshot(req).await?;
    let status = resp.status();
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes)?
    };
    Ok((status, value))
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    Ok(builder.body(body)?)
}

async fn register(app: &Router, username: &str) -> Result<(String, Uuid)> {
    let (status, value) = send(
        app,
        json_request(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "password123"
            })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {value}");

    let token = value
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string();
    let user_id = value
        .get("user")
        .and_then(|u| u.get("id"))
        .and_then(|v| v.as_str())
        .context("missing user id")?
        .parse()?;
    Ok((token, user_id))
}

#[tokio::test]
async fn full_authorization_flow() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    ensure_default_catalog(&pool).await?;
    let chain = ensure_dummy_chain(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    // A freshly registered user starts as a plain normal account.
    let (normal_token, normal_id) = register(&app, "fleet_clerk").await?;
    let (admin_token, admin_id) = register(&app, "fleet_admin").await?;
    set_profile(&pool, admin_id, UserType::Admin, true).await?;

    // -- normal user has no car access yet
    let (status, _) = send(&app, json_request("GET", "/cars", Some(&normal_token), None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // -- non-admin cannot administer permissions
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/rbac/users/{normal_id}/permissions/grant"),
            Some(&normal_token),
            Some(json!({"module_name": "cars", "permission_type": "read"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // -- admin assigns cars read+create wholesale
    let (status, rows) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rbac/users/{normal_id}/modules/cars/permissions"),
            Some(&admin_token),
            Some(json!({"permission_types": ["create", "read"]})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "assignment failed: {rows}");
    assert_eq!(rows.as_array().map(Vec::len), Some(4));

    // -- now the clerk can create a car, filed under the fallback division
    let (status, car) = send(
        &app,
        json_request(
            "POST",
            "/cars",
            Some(&normal_token),
            Some(json!({
                "fleet_no": "FL-1042",
                "plate_no": "7213 ABC",
                "division_id": chain.division.id
            })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "car create failed: {car}");
    let car_id = car.get("id").and_then(|v| v.as_str()).context("missing car id")?.to_string();

    // Parents were inferred from the division.
    assert_eq!(
        car.get("department_id").and_then(|v| v.as_str()),
        Some(chain.department.id.to_string().as_str())
    );
    assert_eq!(
        car.get("sector_id").and_then(|v| v.as_str()),
        Some(chain.sector.id.to_string().as_str())
    );

    // -- but deleting is outside the granted set
    let (status, _) = send(
        &app,
        json_request("DELETE", &format!("/cars/{car_id}"), Some(&normal_token), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // -- a new car without a division is a validation failure
    let (status, err) = send(
        &app,
        json_request(
            "POST",
            "/cars",
            Some(&normal_token),
            Some(json!({"fleet_no": "FL-2000", "plate_no": "1111 XYZ"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(
        err.pointer("/fields/division").is_some(),
        "validation response should name the division field: {err}"
    );

    // -- /auth/me reflects the grants
    let (status, me) = send(&app, json_request("GET", "/auth/me", Some(&normal_token), None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me.pointer("/role").and_then(|v| v.as_str()), Some("normal"));
    assert_eq!(me.pointer("/role_source").and_then(|v| v.as_str()), Some("profile"));
    let cars = me.pointer("/permissions/cars").and_then(|v| v.as_array()).context("cars permissions")?;
    assert_eq!(cars.len(), 2);

    // -- admin sees the full catalog for themselves
    let (status, me) = send(&app, json_request("GET", "/auth/me", Some(&admin_token), None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me.pointer("/role").and_then(|v| v.as_str()), Some("admin"));

    Ok(())
}

#[tokio::test]
async fn hierarchy_endpoints_guard_protected_rows() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    ensure_default_catalog(&pool).await?;
    let chain = ensure_dummy_chain(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    let (admin_token, admin_id) = register(&app, "org_admin").await?;
    set_profile(&pool, admin_id, UserType::Admin, true).await?;

    // -- create and delete a regular sector
    let (status, sector) = send(
        &app,
        json_request(
            "POST",
            "/hierarchy/sectors",
            Some(&admin_token),
            Some(json!({"name": "قطاع الخدمات"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "sector create failed: {sector}");
    let sector_id = sector.get("id").and_then(|v| v.as_str()).context("sector id")?.to_string();

    // Duplicate names are rejected.
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/hierarchy/sectors",
            Some(&admin_token),
            Some(json!({"name": "قطاع الخدمات"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        json_request("DELETE", &format!("/hierarchy/sectors/{sector_id}"), Some(&admin_token), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // -- the fallback rows cannot be deleted, even by an admin
    for uri in [
        format!("/hierarchy/sectors/{}", chain.sector.id),
        format!("/hierarchy/departments/{}", chain.department.id),
        format!("/hierarchy/divisions/{}", chain.division.id),
    ] {
        let (status, err) = send(&app, json_request("DELETE", &uri, Some(&admin_token), None)?).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "dummy row delete must 403: {uri}");
        assert_eq!(
            err.get("error").and_then(|v| v.as_str()),
            Some("protected_record"),
            "protection must be distinguishable from a permission denial: {err}"
        );
    }

    Ok(())
}

#[tokio::test]
async fn profile_escalation_requires_super_admin() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    ensure_default_catalog(&pool).await?;
    ensure_dummy_chain(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    let (_target_token, target_id) = register(&app, "promotee").await?;
    let (admin_token, admin_id) = register(&app, "mere_admin").await?;
    set_profile(&pool, admin_id, UserType::Admin, true).await?;

    // Admin may hand out admin...
    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rbac/users/{target_id}/profile"),
            Some(&admin_token),
            Some(json!({"user_type": "admin"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // ...but not super_admin.
    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rbac/users/{target_id}/profile"),
            Some(&admin_token),
            Some(json!({"user_type": "super_admin"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A super_admin caller can.
    set_profile(&pool, admin_id, UserType::SuperAdmin, true).await?;
    let (status, profile) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rbac/users/{target_id}/profile"),
            Some(&admin_token),
            Some(json!({"user_type": "super_admin"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile.get("user_type").and_then(|v| v.as_str()), Some("super_admin"));

    Ok(())
}

#[tokio::test]
async fn permission_changes_are_audited() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    ensure_default_catalog(&pool).await?;
    ensure_dummy_chain(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    let (_normal_token, normal_id) = register(&app, "audited").await?;
    let (admin_token, admin_id) = register(&app, "auditor").await?;
    set_profile(&pool, admin_id, UserType::Admin, true).await?;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/rbac/users/{normal_id}/permissions/grant"),
            Some(&admin_token),
            Some(json!({"module_name": "cars", "permission_type": "read"})),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // The listener projects events asynchronously; poll for the row.
    let mut logged = false;
    for _ in 0..25 {
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM action_log \
             WHERE action_type = 'permission_change' AND actor_id = ? AND object_id = ?",
        )
        .bind(admin_id.to_string())
        .bind(normal_id.to_string())
        .fetch_one(&pool)
        .await?;

        if count > 0 {
            logged = true;
            break;
        }
    }

    assert!(logged, "permission change should land in the action log");

    // Rows carry the tamper-evidence hash.
    let hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM action_log ORDER BY occurred_at DESC LIMIT 1")
            .fetch_optional(&pool)
            .await?;
    assert!(hash.map(|h| !h.is_empty()).unwrap_or(false));

    Ok(())
}
