//! Attendance sync: line-scoped, never blind.
//!
//! Lines are grouped by their parent request's UTC date, each date resolved
//! to HRIS employee ids and fetched from the TMS in one batched query, and
//! local attendance rows are written only when the remote data actually
//! differs, so a second run over unchanged data performs zero writes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::common::clock;
use crate::common::AppResult;
use crate::domains::hris::source::{AttendanceRecord, HrisDirectory};
use crate::domains::hris::Employee;
use crate::domains::meal::models::line_attendance::MealRequestLineAttendance;

/// Aggregate counters for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub total: u64,
    pub synced: u64,
    pub unchanged: u64,
    pub not_found: u64,
    pub errors: u64,
}

impl SyncOutcome {
    pub fn describe(&self) -> String {
        format!(
            "{} lines: {} synced, {} unchanged, {} not found, {} errors",
            self.total, self.synced, self.unchanged, self.not_found, self.errors
        )
    }
}

/// A line targeted for sync, carrying its attendance date (the parent
/// request's UTC date, per the TMS contract).
#[derive(sqlx::FromRow, Debug, Clone)]
struct TargetLine {
    id: i64,
    employee_code: String,
    attendance_date: NaiveDate,
}

pub struct AttendanceSync {
    pool: PgPool,
    directory: Arc<dyn HrisDirectory>,
}

impl AttendanceSync {
    pub fn new(pool: PgPool, directory: Arc<dyn HrisDirectory>) -> Self {
        Self { pool, directory }
    }

    /// Sliding-window sync: every non-deleted line whose parent request is
    /// at most `months_back` months old.
    pub async fn sync_window(&self, months_back: i32) -> AppResult<SyncOutcome> {
        let window_start = clock::now() - chrono::Duration::days(months_back as i64 * 30);
        let targets = self.targets_in_window(window_start).await?;
        info!(
            lines = targets.len(),
            months_back, "attendance sliding-window sync starting"
        );
        self.sync_targets(targets).await
    }

    /// Explicit-id sync, used right after a request is created.
    pub async fn sync_lines(&self, line_ids: &[i64]) -> AppResult<SyncOutcome> {
        let targets = self.targets_by_ids(line_ids).await?;
        self.sync_targets(targets).await
    }

    async fn targets_in_window(&self, start: DateTime<Utc>) -> AppResult<Vec<TargetLine>> {
        sqlx::query_as::<_, TargetLine>(
            "SELECT l.id, l.employee_code,
                    (r.request_time AT TIME ZONE 'UTC')::date AS attendance_date
             FROM meal_request_lines l
             JOIN meal_requests r ON r.id = l.meal_request_id
             WHERE l.is_deleted = false
               AND r.is_deleted = false
               AND r.request_time >= $1
             ORDER BY l.id",
        )
        .bind(start)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn targets_by_ids(&self, line_ids: &[i64]) -> AppResult<Vec<TargetLine>> {
        let mut targets = Vec::with_capacity(line_ids.len());
        for chunk in crate::common::db::in_chunks(line_ids) {
            let batch = sqlx::query_as::<_, TargetLine>(
                "SELECT l.id, l.employee_code,
                        (r.request_time AT TIME ZONE 'UTC')::date AS attendance_date
                 FROM meal_request_lines l
                 JOIN meal_requests r ON r.id = l.meal_request_id
                 WHERE l.id = ANY($1) AND l.is_deleted = false
                 ORDER BY l.id",
            )
            .bind(chunk)
            .fetch_all(&self.pool)
            .await?;
            targets.extend(batch);
        }
        Ok(targets)
    }

    async fn sync_targets(&self, targets: Vec<TargetLine>) -> AppResult<SyncOutcome> {
        let mut outcome = SyncOutcome {
            total: targets.len() as u64,
            ..Default::default()
        };

        let mut by_date: HashMap<NaiveDate, Vec<TargetLine>> = HashMap::new();
        for target in targets {
            by_date.entry(target.attendance_date).or_default().push(target);
        }

        let mut dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        dates.sort();
        for date in dates {
            let lines = by_date.remove(&date).expect("date key present");
            match self.sync_one_date(date, &lines).await {
                Ok((synced, unchanged, not_found)) => {
                    outcome.synced += synced;
                    outcome.unchanged += unchanged;
                    outcome.not_found += not_found;
                }
                Err(e) => {
                    warn!(%date, "attendance fetch failed for date: {e}");
                    outcome.errors += lines.len() as u64;
                }
            }
        }

        info!("attendance sync finished: {}", outcome.describe());
        Ok(outcome)
    }

    async fn sync_one_date(
        &self,
        date: NaiveDate,
        lines: &[TargetLine],
    ) -> AppResult<(u64, u64, u64)> {
        let (mut synced, mut unchanged, mut not_found) = (0u64, 0u64, 0u64);

        let codes: Vec<String> = {
            let mut codes: Vec<String> =
                lines.iter().map(|l| l.employee_code.clone()).collect();
            codes.sort();
            codes.dedup();
            codes
        };

        // Employee codes resolve to HRIS ids locally; the TMS only speaks
        // the original employee id.
        let employees = Employee::find_by_codes(&codes, &self.pool).await?;
        let id_by_code: HashMap<String, i64> =
            employees.into_iter().map(|e| (e.code, e.id)).collect();
        let employee_ids: Vec<i64> = id_by_code.values().copied().collect();
        if employee_ids.is_empty() {
            return Ok((0, 0, lines.len() as u64));
        }

        let remote = self
            .directory
            .attendance_for_employees(&employee_ids, date)
            .await?;
        let remote_by_employee: HashMap<i64, AttendanceRecord> =
            remote.into_iter().map(|r| (r.employee_id, r)).collect();

        let line_ids: Vec<i64> = lines.iter().map(|l| l.id).collect();
        let local_rows = MealRequestLineAttendance::find_for_lines(&line_ids, &self.pool).await?;
        let local_by_line: HashMap<i64, MealRequestLineAttendance> =
            local_rows.into_iter().map(|a| (a.meal_request_line_id, a)).collect();

        for line in lines {
            let Some(&employee_id) = id_by_code.get(&line.employee_code) else {
                not_found += 1;
                continue;
            };
            let Some(record) = remote_by_employee.get(&employee_id) else {
                not_found += 1;
                continue;
            };

            let hours = compute_working_hours(record.time_in, record.time_out, record.working_hours);
            if has_changed(local_by_line.get(&line.id), record, hours) {
                MealRequestLineAttendance::upsert(
                    line.id,
                    &line.employee_code,
                    date,
                    record.time_in,
                    record.time_out,
                    hours,
                    &self.pool,
                )
                .await?;
                synced += 1;
            } else {
                unchanged += 1;
            }
        }

        Ok((synced, unchanged, not_found))
    }
}

/// Working hours for an attendance record: the TMS value when present,
/// otherwise `(out - in)` rounded to two decimals. Negative spans (bad
/// punches) clamp to zero.
fn compute_working_hours(
    time_in: Option<DateTime<Utc>>,
    time_out: Option<DateTime<Utc>>,
    tms_hours: Option<f64>,
) -> Option<Decimal> {
    if let Some(hours) = tms_hours {
        return Decimal::from_f64_retain(hours).map(|d| d.round_dp(2));
    }
    let (time_in, time_out) = (time_in?, time_out?);
    let span = time_out - time_in;
    let hours = span.num_seconds() as f64 / 3_600.0;
    if hours < 0.0 {
        warn!(%time_in, %time_out, "negative working hours computed, clamping to zero");
        return Some(Decimal::ZERO);
    }
    Decimal::from_f64_retain(hours).map(|d| d.round_dp(2))
}

/// Whether the local row differs from the remote record.
fn has_changed(
    local: Option<&MealRequestLineAttendance>,
    record: &AttendanceRecord,
    computed_hours: Option<Decimal>,
) -> bool {
    let Some(local) = local else {
        return true;
    };
    local.attendance_in != record.time_in
        || local.attendance_out != record.time_out
        || local.working_hours != computed_hours
}
