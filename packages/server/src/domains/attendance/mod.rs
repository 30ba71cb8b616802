//! Line-scoped attendance synchronisation from the external time-tracking
//! source.

pub mod sync;

pub use sync::{AttendanceSync, SyncOutcome};
