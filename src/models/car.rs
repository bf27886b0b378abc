use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::Loggable;
use crate::utils::parse_uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Car {
    pub id: Uuid,
    pub fleet_no: String,
    pub plate_no: String,
    #[schema(example = "operational")]
    pub status: String,
    pub sector_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub division_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Car {
    fn entity_type() -> &'static str { "car" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCar {
    pub id: String,
    pub fleet_no: String,
    pub plate_no: String,
    pub status: String,
    pub sector_id: Option<String>,
    pub department_id: Option<String>,
    pub division_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCar> for Car {
    type Error = AppError;

    fn try_from(db: DbCar) -> Result<Self, Self::Error> {
        Ok(Car {
            id: parse_uuid(&db.id, "car")?,
            fleet_no: db.fleet_no,
            plate_no: db.plate_no,
            status: db.status,
            sector_id: opt_uuid(db.sector_id, "sector")?,
            department_id: opt_uuid(db.department_id, "department")?,
            division_id: opt_uuid(db.division_id, "division")?,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

fn opt_uuid(value: Option<String>, what: &str) -> Result<Option<Uuid>, AppError> {
    value.map(|v| parse_uuid(&v, what)).transpose()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CarCreateRequest {
    #[schema(example = "FL-1042")]
    pub fleet_no: String,
    #[schema(example = "7213 ABC")]
    pub plate_no: String,
    #[serde(default)]
    pub status: Option<String>,
    pub sector_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub division_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CarUpdateRequest {
    pub fleet_no: Option<String>,
    pub plate_no: Option<String>,
    pub status: Option<String>,
    pub sector_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub division_id: Option<Uuid>,
}
