mod common;

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use fleet_access::errors::AppError;
use fleet_access::hierarchy::{
    ensure_dummy_chain, ensure_not_protected, validate_hierarchy_consistency, HierarchySelection,
    DUMMY_NAME,
};

use common::setup_pool;

async fn insert_sector(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query("INSERT INTO sectors (id, name, is_dummy, created_at, updated_at) VALUES (?, ?, 0, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(id)
}

async fn insert_department(pool: &SqlitePool, name: &str, sector_id: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO departments (id, name, sector_id, is_dummy, created_at, updated_at) \
         VALUES (?, ?, ?, 0, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(sector_id.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn insert_division(pool: &SqlitePool, name: &str, department_id: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO divisions (id, name, department_id, is_dummy, created_at, updated_at) \
         VALUES (?, ?, ?, 0, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(department_id.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

fn validation_fields(err: AppError) -> fleet_access::errors::FieldErrors {
    match err {
        AppError::Validation(fields) => fields,
        other => panic!("expected validation error, got: {other}"),
    }
}

#[tokio::test]
async fn dummy_chain_is_created_once_per_level() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;

    let first = ensure_dummy_chain(&pool).await?;
    let second = ensure_dummy_chain(&pool).await?;

    // Idempotent: both calls yield the same rows.
    assert_eq!(first.sector.id, second.sector.id);
    assert_eq!(first.department.id, second.department.id);
    assert_eq!(first.division.id, second.division.id);

    // Chain links hold: dummy division under dummy department under
    // dummy sector.
    assert_eq!(second.department.sector_id, second.sector.id);
    assert_eq!(second.division.department_id, second.department.id);
    assert!(second.sector.is_dummy);
    assert!(second.department.is_dummy);
    assert!(second.division.is_dummy);
    assert_eq!(second.sector.name, DUMMY_NAME);

    let sectors: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM sectors WHERE name = ?")
        .bind(DUMMY_NAME)
        .fetch_one(&pool)
        .await?;
    assert_eq!(sectors, 1);

    Ok(())
}

#[tokio::test]
async fn dummy_chain_repairs_drifted_links() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;

    let chain = ensure_dummy_chain(&pool).await?;

    // Point the dummy department at some other sector and clear its flag.
    let other = insert_sector(&pool, "قطاع آخر").await?;
    sqlx::query("UPDATE departments SET sector_id = ?, is_dummy = 0 WHERE id = ?")
        .bind(other.to_string())
        .bind(chain.department.id.to_string())
        .execute(&pool)
        .await?;

    let repaired = ensure_dummy_chain(&pool).await?;
    assert_eq!(repaired.department.id, chain.department.id, "repair keeps the same row");
    assert_eq!(repaired.department.sector_id, chain.sector.id);
    assert!(repaired.department.is_dummy);

    Ok(())
}

#[tokio::test]
async fn new_record_requires_a_division() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    ensure_dummy_chain(&pool).await?;

    let err = validate_hierarchy_consistency(&pool, true, HierarchySelection::default())
        .await
        .expect_err("new record without a division must fail");

    let fields = validation_fields(err);
    assert!(fields.contains("division"));

    // Existing records tolerate the all-null legacy state.
    let resolved = validate_hierarchy_consistency(&pool, false, HierarchySelection::default()).await?;
    assert_eq!(resolved.division_id, None);

    Ok(())
}

#[tokio::test]
async fn mismatched_division_is_reported_on_the_division_field() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;

    let sector = insert_sector(&pool, "قطاع الخدمات").await?;
    let department_a = insert_department(&pool, "إدارة النقل", sector).await?;
    let department_b = insert_department(&pool, "إدارة الصيانة", sector).await?;
    let division = insert_division(&pool, "شعبة الحركة", department_a).await?;

    let err = validate_hierarchy_consistency(
        &pool,
        true,
        HierarchySelection {
            sector_id: Some(sector),
            department_id: Some(department_b),
            division_id: Some(division),
        },
    )
    .await
    .expect_err("division under another department must fail");

    let fields = validation_fields(err);
    assert!(fields.contains("division"));

    Ok(())
}

#[tokio::test]
async fn mismatched_department_is_reported_on_the_department_field() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;

    let sector_a = insert_sector(&pool, "قطاع أ").await?;
    let sector_b = insert_sector(&pool, "قطاع ب").await?;
    let department = insert_department(&pool, "إدارة تابعة لقطاع أ", sector_a).await?;
    let division = insert_division(&pool, "شعبة", department).await?;

    let err = validate_hierarchy_consistency(
        &pool,
        true,
        HierarchySelection {
            sector_id: Some(sector_b),
            department_id: Some(department),
            division_id: Some(division),
        },
    )
    .await
    .expect_err("department under another sector must fail");

    let fields = validation_fields(err);
    assert!(fields.contains("department"));
    assert!(!fields.contains("division"));

    Ok(())
}

#[tokio::test]
async fn dummy_division_is_compatible_with_any_department() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;

    let chain = ensure_dummy_chain(&pool).await?;
    let sector = insert_sector(&pool, "قطاع حقيقي").await?;
    let department = insert_department(&pool, "إدارة حقيقية", sector).await?;

    // The dummy division nominally lives under the dummy department, yet
    // pairing it with a real department is allowed.
    let resolved = validate_hierarchy_consistency(
        &pool,
        true,
        HierarchySelection {
            sector_id: Some(sector),
            department_id: Some(department),
            division_id: Some(chain.division.id),
        },
    )
    .await?;

    assert_eq!(resolved.division_id, Some(chain.division.id));
    assert_eq!(resolved.department_id, Some(department));
    assert_eq!(resolved.sector_id, Some(sector));

    // A fully dummy tail under a real sector is also fine.
    let resolved = validate_hierarchy_consistency(
        &pool,
        true,
        HierarchySelection {
            sector_id: Some(sector),
            department_id: Some(chain.department.id),
            division_id: Some(chain.division.id),
        },
    )
    .await?;
    assert_eq!(resolved.sector_id, Some(sector));

    Ok(())
}

#[tokio::test]
async fn missing_parents_are_inferred_from_the_division() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;

    let sector = insert_sector(&pool, "قطاع الاستدلال").await?;
    let department = insert_department(&pool, "إدارة الاستدلال", sector).await?;
    let division = insert_division(&pool, "شعبة الاستدلال", department).await?;

    let resolved = validate_hierarchy_consistency(
        &pool,
        true,
        HierarchySelection {
            sector_id: None,
            department_id: None,
            division_id: Some(division),
        },
    )
    .await?;

    assert_eq!(resolved.division_id, Some(division));
    assert_eq!(resolved.department_id, Some(department));
    assert_eq!(resolved.sector_id, Some(sector));

    Ok(())
}

#[tokio::test]
async fn all_violations_are_accumulated() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    ensure_dummy_chain(&pool).await?;

    // Nonexistent ids at two levels plus the missing division on a new
    // record: every field shows up in one response.
    let err = validate_hierarchy_consistency(
        &pool,
        true,
        HierarchySelection {
            sector_id: Some(Uuid::new_v4()),
            department_id: Some(Uuid::new_v4()),
            division_id: None,
        },
    )
    .await
    .expect_err("must fail on several fields at once");

    let fields = validation_fields(err);
    assert!(fields.contains("sector"));
    assert!(fields.contains("department"));
    assert!(fields.contains("division"));

    Ok(())
}

#[tokio::test]
async fn protected_rows_reject_modification() {
    assert!(ensure_not_protected(false, "sector").is_ok());

    let err = ensure_not_protected(true, "sector").expect_err("dummy row must be protected");
    match err {
        AppError::ProtectedRecord(message) => assert!(message.contains(DUMMY_NAME)),
        other => panic!("expected protected record error, got: {other}"),
    }
}
