//! Append-only audit logs.
//!
//! One row per business event; the core writes these and never reads them
//! back. Payloads are opaque JSON so log shape can evolve without schema
//! churn.

pub mod models;

pub use models::{
    LogAuthentication, LogConfiguration, LogMealRequest, LogReplication, LogRole, LogUser,
};
