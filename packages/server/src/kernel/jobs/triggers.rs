//! Trigger evaluation: when is a job due, and how are missed firings
//! handled.
//!
//! Cron expressions are the standard five fields
//! (`minute hour day month weekday`); the parser used internally wants a
//! seconds column, so a literal `0` is prepended after validation.
//! `coalesce` collapses a backlog of missed firings into the latest one;
//! `misfire_grace` drops firings that are already too stale to honour.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use crate::common::{AppError, AppResult};

/// Hard cap on backlog evaluation so a job idle for months cannot spin the
/// dispatcher.
const MAX_BACKLOG_FIRES: usize = 1_000;

#[derive(Debug, Clone)]
pub enum Trigger {
    Interval(Duration),
    Cron(Box<Schedule>),
}

impl Trigger {
    pub fn interval(seconds: i64) -> AppResult<Self> {
        if seconds <= 0 {
            return Err(AppError::validation("interval must be positive"));
        }
        Ok(Self::Interval(Duration::seconds(seconds)))
    }

    /// Parse a five-field cron expression.
    pub fn cron(expression: &str) -> AppResult<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(AppError::validation(format!(
                "cron expression must have exactly 5 fields (minute hour day month weekday), got {}",
                fields.len()
            )));
        }
        let with_seconds = format!("0 {}", fields.join(" "));
        let schedule = Schedule::from_str(&with_seconds)
            .map_err(|e| AppError::validation(format!("invalid cron expression: {e}")))?;
        Ok(Self::Cron(Box::new(schedule)))
    }

    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval(step) => Some(after + *step),
            Self::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

/// Fire times due in `(last, now]`, after misfire handling.
///
/// With `coalesce` the backlog collapses to its latest entry. Without it,
/// firings older than `misfire_grace` are dropped; `None` grace means any
/// lateness is still in time.
pub fn due_fires(
    trigger: &Trigger,
    last: DateTime<Utc>,
    now: DateTime<Utc>,
    misfire_grace: Option<Duration>,
    coalesce: bool,
) -> Vec<DateTime<Utc>> {
    let mut fires = Vec::new();
    let mut cursor = last;
    while let Some(next) = trigger.next_after(cursor) {
        if next > now || fires.len() >= MAX_BACKLOG_FIRES {
            break;
        }
        // Guard against schedules that do not advance.
        if next <= cursor {
            break;
        }
        fires.push(next);
        cursor = next;
    }

    if fires.is_empty() {
        return fires;
    }
    if coalesce {
        return vec![*fires.last().expect("non-empty")];
    }
    if let Some(grace) = misfire_grace {
        fires.retain(|fire| now - *fire <= grace);
    }
    fires
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn five_field_cron_parses() {
        assert!(Trigger::cron("0 * * * *").is_ok());
        assert!(Trigger::cron("*/5 9-17 * * 1-5").is_ok());
    }

    #[test]
    fn six_field_cron_is_rejected() {
        let err = Trigger::cron("0 0 * * * *").expect_err("six fields");
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn nonsense_cron_is_rejected() {
        assert!(Trigger::cron("61 * * * *").is_err());
        assert!(Trigger::cron("not a cron").is_err());
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        assert!(Trigger::interval(0).is_err());
        assert!(Trigger::interval(-5).is_err());
        assert!(Trigger::interval(60).is_ok());
    }

    #[test]
    fn interval_fires_step_after_last() {
        let trigger = Trigger::interval(3600).expect("trigger");
        assert_eq!(trigger.next_after(at(9, 0)), Some(at(10, 0)));
    }

    #[test]
    fn hourly_cron_next_fire() {
        let trigger = Trigger::cron("0 * * * *").expect("trigger");
        assert_eq!(trigger.next_after(at(9, 30)), Some(at(10, 0)));
        // Strictly after: a fire exactly at the boundary moves to the next hour.
        assert_eq!(trigger.next_after(at(9, 0)), Some(at(10, 0)));
    }

    #[test]
    fn nothing_due_before_next_fire() {
        let trigger = Trigger::cron("0 * * * *").expect("trigger");
        let fires = due_fires(&trigger, at(9, 0), at(9, 59), None, true);
        assert!(fires.is_empty());
    }

    #[test]
    fn coalesce_collapses_downtime_to_one_fire() {
        // Scheduler was down from 9:00 through 12:30; three fires were missed.
        let trigger = Trigger::cron("0 * * * *").expect("trigger");
        let fires = due_fires(&trigger, at(9, 0), at(12, 30), None, true);
        assert_eq!(fires, vec![at(12, 0)]);
    }

    #[test]
    fn hourly_coalesced_fires_once_per_hour_across_outage() {
        // Down for 30 minutes over the boundary: exactly one fire survives.
        let trigger = Trigger::cron("0 * * * *").expect("trigger");
        let fires = due_fires(&trigger, at(9, 0), at(10, 30), None, true);
        assert_eq!(fires, vec![at(10, 0)]);
        // And the hour after resumes normally.
        let fires = due_fires(&trigger, at(10, 0), at(11, 0), None, true);
        assert_eq!(fires, vec![at(11, 0)]);
    }

    #[test]
    fn without_coalesce_all_backlog_fires_survive() {
        let trigger = Trigger::cron("0 * * * *").expect("trigger");
        let fires = due_fires(&trigger, at(9, 0), at(12, 0), None, false);
        assert_eq!(fires, vec![at(10, 0), at(11, 0), at(12, 0)]);
    }

    #[test]
    fn misfire_grace_drops_stale_fires() {
        let trigger = Trigger::cron("0 * * * *").expect("trigger");
        let fires = due_fires(
            &trigger,
            at(9, 0),
            at(12, 30),
            Some(Duration::minutes(45)),
            false,
        );
        // 10:00 and 11:00 are more than 45 minutes late; only 12:00 is in time.
        assert_eq!(fires, vec![at(12, 0)]);
    }

    #[test]
    fn interval_backlog_is_capped() {
        let trigger = Trigger::interval(1).expect("trigger");
        let fires = due_fires(&trigger, at(9, 0), at(10, 0), None, false);
        assert_eq!(fires.len(), MAX_BACKLOG_FIRES);
    }
}
