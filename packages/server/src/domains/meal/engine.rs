//! Meal-request lifecycle engine.
//!
//! Requests are born at `OnProgress`, get their attendance fetched in the
//! background, and move to `Pending` for processing. Status transitions,
//! copying and soft deletion all run under explicit guards; the soft delete
//! and status paths hold a row lock for the duration of the transaction.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::common::{AppError, AppResult};
use crate::domains::attendance::AttendanceSync;
use crate::domains::audit::LogMealRequest;
use crate::domains::hris::Employee;

use super::models::line::{MealRequestLine, NewLine};
use super::models::request::MealRequest;
use super::models::status::{MealType, RequestStatus};

#[derive(Debug, Clone)]
pub struct CreatedRequest {
    pub request: MealRequest,
    pub lines: Vec<MealRequestLine>,
    /// Employee ids that could not be resolved and were rejected
    /// individually.
    pub skipped_employees: Vec<i64>,
}

#[derive(Clone)]
pub struct MealRequestEngine {
    pool: PgPool,
    attendance: Arc<AttendanceSync>,
}

impl MealRequestEngine {
    pub fn new(pool: PgPool, attendance: Arc<AttendanceSync>) -> Self {
        Self { pool, attendance }
    }

    /// Create a request with one line per resolvable employee, then kick off
    /// the attendance fetch that moves it to `Pending`.
    pub async fn create(
        &self,
        requester_id: Uuid,
        meal_type_id: i32,
        notes: Option<&str>,
        employee_ids: &[i64],
    ) -> AppResult<CreatedRequest> {
        if employee_ids.is_empty() {
            return Err(AppError::validation("a meal request needs at least one employee"));
        }
        let meal_type = MealType::find_by_id(meal_type_id, &self.pool).await?;
        if !meal_type.is_active {
            return Err(AppError::validation("meal type is inactive"));
        }

        // Resolve employees up front; missing ones are rejected individually
        // while the rest of the request goes through.
        let mut code_by_employee: HashMap<i64, String> = HashMap::new();
        let mut skipped = Vec::new();
        for &employee_id in employee_ids {
            match Employee::find_by_id(employee_id, &self.pool).await {
                Ok(employee) => {
                    code_by_employee.insert(employee.id, employee.code);
                }
                Err(_) => {
                    warn!(employee_id, "skipping unknown employee on meal request");
                    skipped.push(employee_id);
                }
            }
        }
        if code_by_employee.is_empty() {
            return Err(AppError::validation("no resolvable employees on the request"));
        }

        let mut tx = self.pool.begin().await?;
        let request = MealRequest::insert(
            requester_id,
            RequestStatus::OnProgress,
            meal_type_id,
            notes,
            None,
            &mut tx,
        )
        .await?;

        let rows: Vec<NewLine> = employee_ids
            .iter()
            .filter_map(|employee_id| {
                code_by_employee.get(employee_id).map(|code| NewLine {
                    employee_id: *employee_id,
                    employee_code: code.clone(),
                    notes: None,
                    is_accepted: false,
                })
            })
            .collect();
        let lines = MealRequestLine::insert_many(request.id, &rows, &mut tx).await?;
        tx.commit().await?;

        self.log(request.id, Some(requester_id), "created", None, None).await;
        info!(
            request_id = request.id,
            lines = lines.len(),
            skipped = skipped.len(),
            "meal request created"
        );

        // Attendance runs in the background; its completion flips the
        // request to Pending whatever the per-line outcomes were.
        let engine = self.clone();
        let request_id = request.id;
        let line_ids: Vec<i64> = lines.iter().map(|l| l.id).collect();
        tokio::spawn(async move {
            if let Err(e) = engine.finalize_request(request_id, &line_ids).await {
                error!(request_id, "failed to finalize meal request: {e}");
            }
        });

        Ok(CreatedRequest {
            request,
            lines,
            skipped_employees: skipped,
        })
    }

    /// Fetch attendance for the request's lines and transition it to
    /// `Pending`. Sub-failures log and do not block the transition.
    pub async fn finalize_request(&self, request_id: i64, line_ids: &[i64]) -> AppResult<()> {
        if let Err(e) = self.attendance.sync_lines(line_ids).await {
            warn!(request_id, "attendance fetch failed during finalize: {e}");
        }

        let mut tx = self.pool.begin().await?;
        MealRequest::mark_pending(request_id, &mut tx).await?;
        tx.commit().await?;
        info!(request_id, "meal request moved to pending");
        Ok(())
    }

    pub async fn get_request(&self, id: i64) -> AppResult<MealRequest> {
        let request = MealRequest::find_by_id(id, &self.pool).await?;
        if request.is_deleted {
            return Err(AppError::not_found("MealRequest", id));
        }
        Ok(request)
    }

    pub async fn request_lines(&self, request_id: i64) -> AppResult<Vec<MealRequestLine>> {
        MealRequestLine::list_for_request(request_id, false, &self.pool).await
    }

    /// Transition a request's status with optional optimistic concurrency.
    ///
    /// Approval accepts every line, rejection clears them; both happen in
    /// the same transaction as the status write.
    pub async fn update_status(
        &self,
        id: i64,
        new_status: RequestStatus,
        actor: Uuid,
        expected_status: Option<i32>,
    ) -> AppResult<MealRequest> {
        let mut tx = self.pool.begin().await?;
        let current = MealRequest::find_for_update(id, &mut tx)
            .await?
            .filter(|r| !r.is_deleted)
            .ok_or_else(|| AppError::not_found("MealRequest", id))?;

        if let Some(expected) = expected_status {
            if current.status_id != expected {
                return Err(AppError::StatusAlreadyChanged {
                    expected,
                    current: current.status_id,
                });
            }
        }

        let updated = MealRequest::set_status(id, new_status, Some(actor), &mut tx).await?;
        match new_status {
            RequestStatus::Approved => {
                MealRequestLine::set_accepted_for_request(id, true, &mut tx).await?;
            }
            RequestStatus::Rejected => {
                MealRequestLine::set_accepted_for_request(id, false, &mut tx).await?;
            }
            _ => {}
        }
        tx.commit().await?;

        self.log(
            id,
            Some(actor),
            "status_changed",
            Some(serde_json::json!({ "status_id": current.status_id })),
            Some(serde_json::json!({ "status_id": new_status.id() })),
        )
        .await;
        Ok(updated)
    }

    /// Copy a processed request into a fresh `Pending` one.
    ///
    /// Each chain (rooted at `original_request_id`) allows at most one
    /// pending copy per requester at a time.
    pub async fn copy(&self, source_id: i64, requester_id: Uuid) -> AppResult<(MealRequest, u64)> {
        let source = MealRequest::find_by_id(source_id, &self.pool).await?;
        if source.is_deleted {
            return Err(AppError::not_found("MealRequest", source_id));
        }
        if source.requester_id != requester_id {
            return Err(AppError::authorization("you can only copy your own requests"));
        }
        if source.status_id == RequestStatus::Pending.id() {
            return Err(AppError::validation(
                "cannot copy a request that is still pending",
            ));
        }

        let original_id = source.original_request_id.unwrap_or(source.id);
        if let Some(pending) =
            MealRequest::find_pending_copy(original_id, requester_id, &self.pool).await?
        {
            return Err(AppError::validation(format!(
                "a pending copy of this request already exists (request #{})",
                pending.id
            )));
        }

        let source_lines = MealRequestLine::list_for_request(source_id, false, &self.pool).await?;

        let mut tx = self.pool.begin().await?;
        let copy = MealRequest::insert(
            requester_id,
            RequestStatus::Pending,
            source.meal_type_id,
            source.notes.as_deref(),
            Some(original_id),
            &mut tx,
        )
        .await?;

        // Attendance and shift data are reset; copied lines start accepted.
        let rows: Vec<NewLine> = source_lines
            .iter()
            .map(|line| NewLine {
                employee_id: line.employee_id,
                employee_code: line.employee_code.clone(),
                notes: line.notes.clone(),
                is_accepted: true,
            })
            .collect();
        let copied = MealRequestLine::insert_many(copy.id, &rows, &mut tx).await?.len() as u64;
        tx.commit().await?;

        self.log(
            copy.id,
            Some(requester_id),
            "copied",
            Some(serde_json::json!({ "source_request_id": source_id })),
            Some(serde_json::json!({ "lines_copied": copied })),
        )
        .await;
        Ok((copy, copied))
    }

    /// Soft-delete a pending request the caller owns. The row stays locked
    /// from the guard checks through the line sweep.
    pub async fn soft_delete(&self, id: i64, caller_id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let request = MealRequest::find_for_update(id, &mut tx)
            .await?
            .ok_or_else(|| AppError::not_found("MealRequest", id))?;

        if request.is_deleted {
            return Err(AppError::validation("request is already deleted"));
        }
        if request.requester_id != caller_id {
            return Err(AppError::authorization("you can only delete your own requests"));
        }
        if request.status_id != RequestStatus::Pending.id() {
            return Err(AppError::validation("only pending requests can be deleted"));
        }

        sqlx::query(
            "UPDATE meal_requests SET is_deleted = true, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        MealRequestLine::soft_delete_for_request(id, &mut tx).await?;
        tx.commit().await?;

        self.log(id, Some(caller_id), "deleted", None, None).await;
        Ok(())
    }

    /// Add one employee line to an existing request.
    pub async fn add_line(
        &self,
        request_id: i64,
        employee_id: i64,
        notes: Option<&str>,
    ) -> AppResult<MealRequestLine> {
        let request = self.get_request(request_id).await?;
        if RequestStatus::from_id(request.status_id)?.is_terminal() {
            return Err(AppError::validation("cannot modify a closed request"));
        }
        if MealRequestLine::exists_for_employee(request_id, employee_id, &self.pool).await? {
            return Err(AppError::conflict("employee is already on this request"));
        }
        let employee = Employee::find_by_id(employee_id, &self.pool).await?;

        let mut tx = self.pool.begin().await?;
        let line = MealRequestLine::insert(
            request_id,
            employee.id,
            &employee.code,
            notes,
            false,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(line)
    }

    pub async fn update_line(
        &self,
        line_id: i64,
        shift_hours: Option<Decimal>,
        notes: Option<&str>,
        is_accepted: Option<bool>,
    ) -> AppResult<MealRequestLine> {
        MealRequestLine::update_details(line_id, shift_hours, notes, is_accepted, &self.pool).await
    }

    pub async fn delete_line(&self, line_id: i64) -> AppResult<()> {
        MealRequestLine::soft_delete(line_id, &self.pool).await
    }

    /// Bulk accept or reject a subset of a request's lines.
    pub async fn set_line_acceptance(
        &self,
        request_id: i64,
        line_ids: &[i64],
        accepted: bool,
    ) -> AppResult<u64> {
        self.get_request(request_id).await?;
        MealRequestLine::set_accepted_for_lines(request_id, line_ids, accepted, &self.pool).await
    }

    /// Per-status request counts.
    pub async fn stats(
        &self,
        from: Option<chrono::DateTime<chrono::Utc>>,
        to: Option<chrono::DateTime<chrono::Utc>>,
    ) -> AppResult<Vec<(i32, i64)>> {
        MealRequest::stats(from, to, &self.pool).await
    }

    async fn log(
        &self,
        request_id: i64,
        actor: Option<Uuid>,
        action: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) {
        let entry = LogMealRequest::new(request_id, actor, action, old_value, new_value);
        if let Err(e) = entry.insert(&self.pool).await {
            warn!(request_id, "failed to write meal request log: {e}");
        }
    }
}
