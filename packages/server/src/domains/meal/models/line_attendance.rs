use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::common::clock;
use crate::common::AppResult;

/// Attendance snapshot for one meal request line (1:1).
///
/// `attendance_date` is the parent request's date (the contract with the
/// TMS), not the line's creation date. `working_hours` is decimal(4,2).
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MealRequestLineAttendance {
    pub id: i64,
    pub meal_request_line_id: i64,
    pub employee_code: String,
    pub attendance_date: NaiveDate,
    pub attendance_in: Option<DateTime<Utc>>,
    pub attendance_out: Option<DateTime<Utc>>,
    pub working_hours: Option<Decimal>,
    pub attendance_synced_at: DateTime<Utc>,
}

impl MealRequestLineAttendance {
    pub async fn find_for_line(line_id: i64, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM meal_request_line_attendance WHERE meal_request_line_id = $1",
        )
        .bind(line_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Load the attendance rows for a batch of lines, chunked.
    pub async fn find_for_lines(line_ids: &[i64], pool: &PgPool) -> AppResult<Vec<Self>> {
        let mut rows = Vec::new();
        for chunk in crate::common::db::in_chunks(line_ids) {
            let batch = sqlx::query_as::<_, Self>(
                "SELECT * FROM meal_request_line_attendance
                 WHERE meal_request_line_id = ANY($1)",
            )
            .bind(chunk)
            .fetch_all(pool)
            .await?;
            rows.extend(batch);
        }
        Ok(rows)
    }

    /// Write-only-when-changed upsert keyed on the line id.
    pub async fn upsert(
        line_id: i64,
        employee_code: &str,
        attendance_date: NaiveDate,
        attendance_in: Option<DateTime<Utc>>,
        attendance_out: Option<DateTime<Utc>>,
        working_hours: Option<Decimal>,
        pool: &PgPool,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO meal_request_line_attendance (
                meal_request_line_id, employee_code, attendance_date,
                attendance_in, attendance_out, working_hours, attendance_synced_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (meal_request_line_id) DO UPDATE SET
                 attendance_in = EXCLUDED.attendance_in,
                 attendance_out = EXCLUDED.attendance_out,
                 working_hours = EXCLUDED.working_hours,
                 attendance_synced_at = EXCLUDED.attendance_synced_at
             RETURNING *",
        )
        .bind(line_id)
        .bind(employee_code)
        .bind(attendance_date)
        .bind(attendance_in)
        .bind(attendance_out)
        .bind(working_hours)
        .bind(clock::now())
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
