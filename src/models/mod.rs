pub mod car;
pub mod hierarchy;
pub mod rbac;
pub mod user;
