//! Organizational hierarchy: Sector -> Department -> Division.
//!
//! Each level carries one protected "غير محدد" (unspecified) dummy row.
//! The dummy node is a first-class fallback state: it is compatible with
//! any parent regardless of its nominal link, so a record can stay
//! uncategorized at any level independently. The dummy rows are created
//! by `ensure_dummy_chain` and may never be edited or deleted.
//!
//! Cross-level consistency checks for record saves live here, in one
//! place, rather than being re-implemented per form.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult, FieldErrors};
use crate::models::hierarchy::{DbDepartment, DbDivision, DbSector, Department, Division, Sector};

/// Canonical name of the unspecified fallback node at every level.
pub const DUMMY_NAME: &str = "غير محدد";

#[derive(Debug, Clone)]
pub struct DummyChain {
    pub sector: Sector,
    pub department: Department,
    pub division: Division,
}

/// Idempotently get-or-create the dummy chain, top-down: dummy Sector,
/// dummy Department under it, dummy Division under that. Existing dummy
/// rows whose parent link has drifted are corrected in place so foreign
/// keys already pointing at them stay valid. Runs in one transaction.
pub async fn ensure_dummy_chain(pool: &SqlitePool) -> AppResult<DummyChain> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT OR IGNORE INTO sectors (id, name, is_dummy, created_at, updated_at) VALUES (?, ?, 1, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(DUMMY_NAME)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let sector = sqlx::query_as::<_, DbSector>(
        "SELECT id, name, is_dummy, created_at, updated_at FROM sectors WHERE name = ?",
    )
    .bind(DUMMY_NAME)
    .fetch_one(&mut *tx)
    .await?;

    if !sector.is_dummy {
        sqlx::query("UPDATE sectors SET is_dummy = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(&sector.id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        "INSERT OR IGNORE INTO departments (id, name, sector_id, is_dummy, created_at, updated_at) \
         VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(DUMMY_NAME)
    .bind(&sector.id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let department = sqlx::query_as::<_, DbDepartment>(
        "SELECT id, name, sector_id, is_dummy, created_at, updated_at FROM departments WHERE name = ?",
    )
    .bind(DUMMY_NAME)
    .fetch_one(&mut *tx)
    .await?;

    if !department.is_dummy || department.sector_id != sector.id {
        sqlx::query("UPDATE departments SET sector_id = ?, is_dummy = 1, updated_at = ? WHERE id = ?")
            .bind(&sector.id)
            .bind(now)
            .bind(&department.id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        "INSERT OR IGNORE INTO divisions (id, name, department_id, is_dummy, created_at, updated_at) \
         VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(DUMMY_NAME)
    .bind(&department.id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let division = sqlx::query_as::<_, DbDivision>(
        "SELECT id, name, department_id, is_dummy, created_at, updated_at FROM divisions WHERE name = ?",
    )
    .bind(DUMMY_NAME)
    .fetch_one(&mut *tx)
    .await?;

    if !division.is_dummy || division.department_id != department.id {
        sqlx::query("UPDATE divisions SET department_id = ?, is_dummy = 1, updated_at = ? WHERE id = ?")
            .bind(&department.id)
            .bind(now)
            .bind(&division.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    // Re-read outside the transaction so the returned chain reflects the
    // corrected links.
    let sector: Sector = sqlx::query_as::<_, DbSector>(
        "SELECT id, name, is_dummy, created_at, updated_at FROM sectors WHERE name = ?",
    )
    .bind(DUMMY_NAME)
    .fetch_one(pool)
    .await?
    .try_into()?;

    let department: Department = sqlx::query_as::<_, DbDepartment>(
        "SELECT id, name, sector_id, is_dummy, created_at, updated_at FROM departments WHERE name = ?",
    )
    .bind(DUMMY_NAME)
    .fetch_one(pool)
    .await?
    .try_into()?;

    let division: Division = sqlx::query_as::<_, DbDivision>(
        "SELECT id, name, department_id, is_dummy, created_at, updated_at FROM divisions WHERE name = ?",
    )
    .bind(DUMMY_NAME)
    .fetch_one(pool)
    .await?
    .try_into()?;

    Ok(DummyChain {
        sector,
        department,
        division,
    })
}

/// Hierarchy fields as selected on a record save.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchySelection {
    pub sector_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub division_id: Option<Uuid>,
}

/// The selection after validation, with missing parents inferred from
/// their children (a Division selected without a Department fills the
/// Department in from the Division's parent, and so on upward).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedHierarchy {
    pub sector_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub division_id: Option<Uuid>,
}

/// Validate cross-level consistency for a record save.
///
/// Rules:
/// - a new record must name a Division; existing records may keep
///   all-null hierarchy fields (legacy tolerance, intentional)
/// - adjacent levels must agree (division.department == department,
///   department.sector == sector) unless the child is the dummy node,
///   which is compatible with any parent
/// - a child supplied without its parent infers the parent from its own
///   link instead of leaving it null
///
/// Violations are accumulated per field and reported together, never
/// first-error-only.
pub async fn validate_hierarchy_consistency(
    pool: &SqlitePool,
    is_new_record: bool,
    selection: HierarchySelection,
) -> AppResult<ResolvedHierarchy> {
    let mut errors = FieldErrors::new();

    let division = match selection.division_id {
        Some(id) => match fetch_division(pool, id).await? {
            Some(division) => Some(division),
            None => {
                errors.push("division", "selected division does not exist");
                None
            }
        },
        None => None,
    };

    let department = match selection.department_id {
        Some(id) => match fetch_department(pool, id).await? {
            Some(department) => Some(department),
            None => {
                errors.push("department", "selected department does not exist");
                None
            }
        },
        None => None,
    };

    let sector = match selection.sector_id {
        Some(id) => match fetch_sector(pool, id).await? {
            Some(sector) => Some(sector),
            None => {
                errors.push("sector", "selected sector does not exist");
                None
            }
        },
        None => None,
    };

    if is_new_record && selection.division_id.is_none() {
        errors.push("division", "a division is required for new records");
    }

    // Division vs Department: the dummy division reconciles with any
    // department, everything else must match its declared parent.
    let department = match (&division, department) {
        (Some(division), Some(department)) => {
            if !division.is_dummy && division.department_id != department.id {
                errors.push("division", "division does not belong to the selected department");
            }
            Some(department)
        }
        (Some(division), None) => {
            // Infer the department from the division.
            match fetch_department(pool, division.department_id).await? {
                Some(parent) => Some(parent),
                None => {
                    errors.push("division", "division references a missing department");
                    None
                }
            }
        }
        (None, department) => department,
    };

    // Department vs Sector, one level up, same rule.
    let sector = match (&department, sector) {
        (Some(department), Some(sector)) => {
            if !department.is_dummy && department.sector_id != sector.id {
                errors.push("department", "department does not belong to the selected sector");
            }
            Some(sector)
        }
        (Some(department), None) => match fetch_sector(pool, department.sector_id).await? {
            Some(parent) => Some(parent),
            None => {
                errors.push("department", "department references a missing sector");
                None
            }
        },
        (None, sector) => sector,
    };

    errors.into_result()?;

    Ok(ResolvedHierarchy {
        sector_id: sector.map(|s| s.id),
        department_id: department.map(|d| d.id),
        division_id: division.map(|d| d.id),
    })
}

/// Guard for edit/delete of protected default rows. Policy rejection,
/// distinct from a validation failure.
pub fn ensure_not_protected(is_dummy: bool, what: &str) -> AppResult<()> {
    if is_dummy {
        Err(AppError::protected_record(format!(
            "the default '{DUMMY_NAME}' {what} cannot be modified or deleted"
        )))
    } else {
        Ok(())
    }
}

pub async fn fetch_sector(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Sector>> {
    let row = sqlx::query_as::<_, DbSector>(
        "SELECT id, name, is_dummy, created_at, updated_at FROM sectors WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(TryInto::try_into).transpose()
}

pub async fn fetch_department(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Department>> {
    let row = sqlx::query_as::<_, DbDepartment>(
        "SELECT id, name, sector_id, is_dummy, created_at, updated_at FROM departments WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(TryInto::try_into).transpose()
}

pub async fn fetch_division(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Division>> {
    let row = sqlx::query_as::<_, DbDivision>(
        "SELECT id, name, department_id, is_dummy, created_at, updated_at FROM divisions WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(TryInto::try_into).transpose()
}
