pub mod auth;
pub mod cars;
pub mod health;
pub mod hierarchy;
pub mod rbac;
