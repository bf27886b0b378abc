use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::Loggable;
use crate::utils::parse_uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Sector {
    pub id: Uuid,
    pub name: String,
    /// Marks the protected "غير محدد" fallback row.
    pub is_dummy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Sector {
    fn entity_type() -> &'static str { "sector" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSector {
    pub id: String,
    pub name: String,
    pub is_dummy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbSector> for Sector {
    type Error = AppError;

    fn try_from(db: DbSector) -> Result<Self, Self::Error> {
        Ok(Sector {
            id: parse_uuid(&db.id, "sector")?,
            name: db.name,
            is_dummy: db.is_dummy,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub sector_id: Uuid,
    pub is_dummy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Department {
    fn entity_type() -> &'static str { "department" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDepartment {
    pub id: String,
    pub name: String,
    pub sector_id: String,
    pub is_dummy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbDepartment> for Department {
    type Error = AppError;

    fn try_from(db: DbDepartment) -> Result<Self, Self::Error> {
        Ok(Department {
            id: parse_uuid(&db.id, "department")?,
            name: db.name,
            sector_id: parse_uuid(&db.sector_id, "sector")?,
            is_dummy: db.is_dummy,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Division {
    pub id: Uuid,
    pub name: String,
    pub department_id: Uuid,
    pub is_dummy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Division {
    fn entity_type() -> &'static str { "division" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDivision {
    pub id: String,
    pub name: String,
    pub department_id: String,
    pub is_dummy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbDivision> for Division {
    type Error = AppError;

    fn try_from(db: DbDivision) -> Result<Self, Self::Error> {
        Ok(Division {
            id: parse_uuid(&db.id, "division")?,
            name: db.name,
            department_id: parse_uuid(&db.department_id, "department")?,
            is_dummy: db.is_dummy,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SectorCreateRequest {
    #[schema(example = "قطاع الخدمات")]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepartmentCreateRequest {
    #[schema(example = "إدارة النقل")]
    pub name: String,
    pub sector_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DivisionCreateRequest {
    #[schema(example = "شعبة الصيانة")]
    pub name: String,
    pub department_id: Uuid,
}
