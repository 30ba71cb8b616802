//! External HR system contract.
//!
//! The replicator and attendance sync talk to the HRIS/TMS only through
//! [`HrisDirectory`]. The bulk reads return `Ok(None)` on what looks like a
//! transient connection failure so a replication run can abort gracefully
//! instead of wiping local data against an empty read.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::warn;

use crate::common::db::in_chunks;
use crate::common::AppResult;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct HrisEmployee {
    pub id: i64,
    pub code: String,
    pub name_en: String,
    pub name_ar: String,
    pub title: Option<String>,
    pub department_id: Option<i64>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct HrisDepartment {
    pub id: i64,
    pub name_en: String,
    pub name_ar: String,
    pub parent_id: Option<i64>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct HrisSecurityUser {
    pub user_name: String,
    pub employee_id: Option<i64>,
    pub is_deleted: bool,
    pub is_locked: bool,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct HrisDepartmentAssignment {
    pub employee_id: i64,
    pub department_id: i64,
}

/// One day of attendance punches for one employee, as the TMS reports it.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct AttendanceRecord {
    pub employee_id: i64,
    pub time_in: Option<DateTime<Utc>>,
    pub time_out: Option<DateTime<Utc>>,
    pub working_hours: Option<f64>,
}

#[async_trait]
pub trait HrisDirectory: Send + Sync {
    async fn active_employees(&self) -> AppResult<Option<Vec<HrisEmployee>>>;
    async fn departments(&self) -> AppResult<Option<Vec<HrisDepartment>>>;
    async fn security_users(&self) -> AppResult<Option<Vec<HrisSecurityUser>>>;
    async fn department_assignments(&self) -> AppResult<Option<Vec<HrisDepartmentAssignment>>>;

    /// Batched attendance query for one calendar date.
    async fn attendance_for_employees(
        &self,
        employee_ids: &[i64],
        date: NaiveDate,
    ) -> AppResult<Vec<AttendanceRecord>>;
}

/// Directory reading from the HR database replica over its own pool.
pub struct PgHrisDirectory {
    pool: PgPool,
}

impl PgHrisDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HrisDirectory for PgHrisDirectory {
    async fn active_employees(&self) -> AppResult<Option<Vec<HrisEmployee>>> {
        let result = sqlx::query_as::<_, HrisEmployee>(
            "SELECT employee_id AS id, employee_code AS code,
                    name_en, name_ar, title, department_id
             FROM hr_employees
             WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await;
        match result {
            Ok(rows) => Ok(Some(rows)),
            Err(e) => {
                warn!("HRIS employee read failed: {e}");
                Ok(None)
            }
        }
    }

    async fn departments(&self) -> AppResult<Option<Vec<HrisDepartment>>> {
        let result = sqlx::query_as::<_, HrisDepartment>(
            "SELECT department_id AS id, name_en, name_ar, parent_department_id AS parent_id
             FROM hr_departments",
        )
        .fetch_all(&self.pool)
        .await;
        match result {
            Ok(rows) => Ok(Some(rows)),
            Err(e) => {
                warn!("HRIS department read failed: {e}");
                Ok(None)
            }
        }
    }

    async fn security_users(&self) -> AppResult<Option<Vec<HrisSecurityUser>>> {
        let result = sqlx::query_as::<_, HrisSecurityUser>(
            "SELECT user_name, employee_id, is_deleted, is_locked
             FROM hr_security_users",
        )
        .fetch_all(&self.pool)
        .await;
        match result {
            Ok(rows) => Ok(Some(rows)),
            Err(e) => {
                warn!("HRIS security user read failed: {e}");
                Ok(None)
            }
        }
    }

    async fn department_assignments(&self) -> AppResult<Option<Vec<HrisDepartmentAssignment>>> {
        let result = sqlx::query_as::<_, HrisDepartmentAssignment>(
            "SELECT employee_id, org_unit_id AS department_id
             FROM hr_department_assignments",
        )
        .fetch_all(&self.pool)
        .await;
        match result {
            Ok(rows) => Ok(Some(rows)),
            Err(e) => {
                warn!("HRIS department assignment read failed: {e}");
                Ok(None)
            }
        }
    }

    async fn attendance_for_employees(
        &self,
        employee_ids: &[i64],
        date: NaiveDate,
    ) -> AppResult<Vec<AttendanceRecord>> {
        let mut records = Vec::new();
        for chunk in in_chunks(employee_ids) {
            let batch = sqlx::query_as::<_, AttendanceRecord>(
                "SELECT employee_id, time_in, time_out, working_hours
                 FROM tms_attendance
                 WHERE attendance_date = $1 AND employee_id = ANY($2)",
            )
            .bind(date)
            .bind(chunk)
            .fetch_all(&self.pool)
            .await?;
            records.extend(batch);
        }
        Ok(records)
    }
}
