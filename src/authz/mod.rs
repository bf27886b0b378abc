//! Authorization core.
//!
//! Three-tier role model (super_admin / admin / normal) with per-module
//! CRUD grants for normal users:
//! - `catalog` owns the fixed module x permission-type capability space
//! - `identity` loads the signals role resolution reads (profile state
//!   plus the legacy superuser flag and "Admin" group membership)
//! - `role` resolves the effective role, tracking whether it came from a
//!   profile or from the legacy fallback
//! - `evaluator` is the single authorization decision point and the
//!   grant/revoke/assign mutation surface
//!
//! Decisions are re-evaluated from the database on every check; nothing
//! is cached across requests because grants and profile state can change
//! between one request and the next.

mod catalog;
mod evaluator;
mod identity;
mod role;

pub use catalog::{ensure_default_catalog, get_or_create_module_permission, Module, PermissionType};
pub use evaluator::PermissionEvaluator;
pub use identity::{load_identity, Identity, ProfileState};
pub use role::{resolve_role, Role, RoleResolution, RoleSource};

/// Name of the legacy administrators group. Membership grants
/// admin-equivalent powers to accounts provisioned before profiles
/// existed.
pub const LEGACY_ADMIN_GROUP: &str = "Admin";
