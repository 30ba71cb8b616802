//! Meal-request backend core.
//!
//! Subsystems:
//! - `kernel::jobs` - persistent job scheduler with lease-based locking and
//!   pluggable dispatch
//! - `domains::auth` - token authority and rotating refresh sessions
//! - `domains::hris` - replication of the external HR system of record
//! - `domains::attendance` - line-scoped attendance sync from the TMS
//! - `domains::meal` - meal-request lifecycle engine
//!
//! HTTP routing, serialization formats, LDAP, SMTP and migrations live
//! outside this crate; it exposes services and capability traits for them.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::Config;
