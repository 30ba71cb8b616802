//! Identity domain: users, roles, pages and their permission links.

pub mod models;

pub use models::page::Page;
pub use models::permission::{PagePermission, RolePermission};
pub use models::role::Role;
pub use models::user::{User, UserSource};
