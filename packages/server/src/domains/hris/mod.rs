//! HRIS domain: local replicas of the HR system of record and the
//! replication engine that reconciles them.

pub mod models;
pub mod replicator;
pub mod source;

pub use models::assignment::DepartmentAssignment;
pub use models::department::Department;
pub use models::employee::Employee;
pub use models::security_user::SecurityUser;
pub use replicator::{OpStats, ReplicationSummary, Replicator};
pub use source::{
    AttendanceRecord, HrisDepartment, HrisDepartmentAssignment, HrisDirectory, HrisEmployee,
    HrisSecurityUser, PgHrisDirectory,
};
