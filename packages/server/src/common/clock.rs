//! UTC clock and identifier generation.
//!
//! All timestamps in the system are timezone-aware UTC. Everything that needs
//! the current time goes through [`now`] so there is exactly one place where
//! "now" is defined.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

/// Current UTC time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Generate a fresh database identifier (UUID v4).
pub fn db_id() -> Uuid {
    Uuid::new_v4()
}

/// Coerce a naive legacy timestamp to UTC.
///
/// Old rows were written without timezone information but always held UTC
/// values; comparisons must not panic on them.
pub fn coerce_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_utc() {
        let t = now();
        assert_eq!(t.timezone(), Utc);
    }

    #[test]
    fn db_ids_are_unique() {
        assert_ne!(db_id(), db_id());
    }

    #[test]
    fn coerce_utc_keeps_wall_clock() {
        let naive = NaiveDateTime::parse_from_str("2025-06-01 12:30:00", "%Y-%m-%d %H:%M:%S")
            .expect("valid timestamp");
        let aware = coerce_utc(naive);
        assert_eq!(aware.naive_utc(), naive);
    }
}
