mod common;

use std::collections::BTreeSet;

use anyhow::Result;

use fleet_access::authz::{Module, PermissionType};
use fleet_access::models::rbac::UserType;

use common::{create_user, evaluator, set_profile, setup_pool};

#[tokio::test]
async fn assignment_materializes_full_row_set() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let authz = evaluator(&pool);

    let user = create_user(&pool, "assignee", false).await?;
    set_profile(&pool, user, UserType::Normal, true).await?;

    let desired: BTreeSet<_> = [PermissionType::Create, PermissionType::Read].into_iter().collect();
    let rows = authz
        .assign_module_permissions(user, Module::Cars, &desired, None)
        .await?;

    // One row per catalog permission type, granted or explicitly not.
    assert_eq!(rows.len(), PermissionType::ALL.len());
    for row in &rows {
        assert_eq!(row.module_name, Module::Cars);
        assert_eq!(row.granted, desired.contains(&row.permission_type));
    }

    assert!(authz.has_permission(user, Module::Cars, PermissionType::Create).await?);
    assert!(authz.has_permission(user, Module::Cars, PermissionType::Read).await?);
    assert!(!authz.has_permission(user, Module::Cars, PermissionType::Update).await?);
    assert!(!authz.has_permission(user, Module::Cars, PermissionType::Delete).await?);

    Ok(())
}

#[tokio::test]
async fn reassignment_replaces_previous_set() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let authz = evaluator(&pool);

    let user = create_user(&pool, "reassignee", false).await?;
    set_profile(&pool, user, UserType::Normal, true).await?;

    let first: BTreeSet<_> = [PermissionType::Create, PermissionType::Update, PermissionType::Delete]
        .into_iter()
        .collect();
    authz.assign_module_permissions(user, Module::Equipment, &first, None).await?;

    // The new set is authoritative; everything outside it is revoked,
    // not merged with the old grants.
    let second: BTreeSet<_> = [PermissionType::Read].into_iter().collect();
    let rows = authz
        .assign_module_permissions(user, Module::Equipment, &second, None)
        .await?;

    assert_eq!(rows.len(), PermissionType::ALL.len());
    assert!(authz.has_permission(user, Module::Equipment, PermissionType::Read).await?);
    assert!(!authz.has_permission(user, Module::Equipment, PermissionType::Create).await?);
    assert!(!authz.has_permission(user, Module::Equipment, PermissionType::Update).await?);
    assert!(!authz.has_permission(user, Module::Equipment, PermissionType::Delete).await?);

    // Still exactly four rows for the module, no duplicates.
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM user_permissions up \
         JOIN module_permissions mp ON mp.id = up.module_permission_id \
         WHERE up.user_id = ? AND mp.module_name = 'equipment'",
    )
    .bind(user.to_string())
    .fetch_one(&pool)
    .await?;
    assert_eq!(count, 4);

    Ok(())
}

#[tokio::test]
async fn empty_assignment_revokes_everything() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let authz = evaluator(&pool);

    let user = create_user(&pool, "stripped", false).await?;
    set_profile(&pool, user, UserType::Normal, true).await?;

    authz.grant(user, Module::GenericTables, PermissionType::Read, None).await?;

    let rows = authz
        .assign_module_permissions(user, Module::GenericTables, &BTreeSet::new(), None)
        .await?;

    assert!(rows.iter().all(|row| !row.granted));
    assert!(
        !authz
            .has_permission(user, Module::GenericTables, PermissionType::Read)
            .await?
    );

    Ok(())
}

#[tokio::test]
async fn assignment_is_scoped_to_one_module() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let authz = evaluator(&pool);

    let user = create_user(&pool, "scoped", false).await?;
    set_profile(&pool, user, UserType::Normal, true).await?;

    authz.grant(user, Module::Cars, PermissionType::Read, None).await?;

    let desired: BTreeSet<_> = [PermissionType::Delete].into_iter().collect();
    authz.assign_module_permissions(user, Module::Equipment, &desired, None).await?;

    // The cars grant is untouched by the equipment assignment.
    assert!(authz.has_permission(user, Module::Cars, PermissionType::Read).await?);
    assert!(authz.has_permission(user, Module::Equipment, PermissionType::Delete).await?);

    Ok(())
}
