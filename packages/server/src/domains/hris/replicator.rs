//! HRIS replication: reconcile the external HR system of record into the
//! local replica tables.
//!
//! The run is deactivate-then-upsert inside a single transaction:
//! everything local is presumed gone, then every record the HRIS still
//! asserts is re-inserted or reactivated. Manual state survives by
//! construction: the sweep only touches HRIS-owned rows, and users with
//! `status_override` or `user_source = manual` are never written.

use std::collections::HashMap;

use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};
use crate::domains::audit::LogReplication;
use crate::domains::identity::{User, UserSource};

use super::models::assignment::DepartmentAssignment;
use super::models::department::Department;
use super::models::employee::Employee;
use super::models::security_user::SecurityUser;
use super::source::HrisDirectory;

/// Per-operation counters for the replication log.
#[derive(Debug, Clone, Default)]
pub struct OpStats {
    pub operation: String,
    pub processed: i64,
    pub created: i64,
    pub updated: i64,
    pub skipped: i64,
    pub failed: i64,
    pub duration_ms: i64,
}

impl OpStats {
    fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationSummary {
    pub operations: Vec<OpStats>,
    pub duration_ms: i64,
}

impl ReplicationSummary {
    pub fn operation(&self, name: &str) -> Option<&OpStats> {
        self.operations.iter().find(|op| op.operation == name)
    }

    /// Short human-readable form, used as the job result summary.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .operations
            .iter()
            .map(|op| {
                format!(
                    "{}: {}/{} created/updated, {} skipped",
                    op.operation, op.created, op.updated, op.skipped
                )
            })
            .collect();
        format!("{} ({} ms)", parts.join("; "), self.duration_ms)
    }
}

pub struct Replicator {
    pool: PgPool,
    directory: Arc<dyn HrisDirectory>,
}

impl Replicator {
    pub fn new(pool: PgPool, directory: Arc<dyn HrisDirectory>) -> Self {
        Self { pool, directory }
    }

    /// Run a full replication. Aborts without local changes when any of the
    /// required HRIS reads comes back null (transient outage), rolls back on
    /// any phase failure, and always leaves a log trail.
    pub async fn run(&self, triggered_by: Option<Uuid>) -> AppResult<ReplicationSummary> {
        info!("starting HRIS replication");
        let started = clock::now();

        let departments = self.directory.departments().await?;
        let employees = self.directory.active_employees().await?;
        let security_users = self.directory.security_users().await?;
        let assignments = self.directory.department_assignments().await?;

        let (Some(departments), Some(employees), Some(security_users)) =
            (departments, employees, security_users)
        else {
            let err = AppError::external("HRIS read returned no data, aborting replication");
            warn!("{err}");
            self.log_failure("replication", &err, triggered_by).await;
            return Err(err);
        };

        match self
            .run_phases(
                &departments,
                &employees,
                &security_users,
                assignments.as_deref(),
                triggered_by,
                started,
            )
            .await
        {
            Ok(summary) => {
                info!("HRIS replication finished: {}", summary.describe());
                Ok(summary)
            }
            Err(e) => {
                warn!("HRIS replication failed, rolled back: {e}");
                self.log_failure("replication", &e, triggered_by).await;
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        departments: &[super::source::HrisDepartment],
        employees: &[super::source::HrisEmployee],
        security_users: &[super::source::HrisSecurityUser],
        assignments: Option<&[super::source::HrisDepartmentAssignment]>,
        triggered_by: Option<Uuid>,
        started: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<ReplicationSummary> {
        let mut tx = self.pool.begin().await?;
        let mut summary = ReplicationSummary::default();

        // Deactivate phase, scoped: employees, security users, and only the
        // HRIS-owned department assignments.
        Employee::deactivate_all(&mut tx).await?;
        SecurityUser::mark_all_deleted(&mut tx).await?;
        let swept = DepartmentAssignment::deactivate_hris_synced(&mut tx).await?;
        info!(swept, "deactivated HRIS-synced department assignments");

        // Departments, two passes: rows first, parents second.
        let phase_started = clock::now();
        let mut dept_stats = OpStats::new("departments");
        let mut dept_map: HashMap<i64, Uuid> = HashMap::new();
        for dept in departments {
            dept_stats.processed += 1;
            match Department::upsert_basic(dept.id, &dept.name_en, &dept.name_ar, &mut tx).await {
                Ok(local) => {
                    let fresh = local.created_at == local.updated_at;
                    if fresh {
                        dept_stats.created += 1;
                    } else {
                        dept_stats.updated += 1;
                    }
                    dept_map.insert(dept.id, local.id);
                }
                Err(e) => {
                    warn!(hris_id = dept.id, "failed to upsert department: {e}");
                    dept_stats.failed += 1;
                }
            }
        }
        for dept in departments {
            let Some(parent_hris_id) = dept.parent_id else {
                continue;
            };
            let Some(&local_id) = dept_map.get(&dept.id) else {
                continue;
            };
            match dept_map.get(&parent_hris_id) {
                Some(&local_parent) => {
                    Department::set_parent(local_id, Some(local_parent), &mut tx).await?;
                }
                None => {
                    warn!(
                        hris_id = dept.id,
                        parent = parent_hris_id,
                        "parent department missing, keeping node top-level"
                    );
                    Department::set_parent(local_id, None, &mut tx).await?;
                }
            }
        }
        dept_stats.duration_ms = (clock::now() - phase_started).num_milliseconds();
        summary.operations.push(dept_stats);

        // Employees, keyed by their HRIS id.
        let phase_started = clock::now();
        let mut emp_stats = OpStats::new("employees");
        for emp in employees {
            emp_stats.processed += 1;
            let local_dept = emp.department_id.and_then(|id| dept_map.get(&id).copied());
            if emp.department_id.is_some() && local_dept.is_none() {
                warn!(
                    code = %emp.code,
                    "skipping employee: department not present in mapping"
                );
                emp_stats.skipped += 1;
                continue;
            }
            match Employee::upsert(
                emp.id,
                &emp.code,
                &emp.name_en,
                &emp.name_ar,
                emp.title.as_deref(),
                local_dept,
                &mut tx,
            )
            .await
            {
                Ok(_) => emp_stats.created += 1,
                Err(e) => {
                    warn!(code = %emp.code, "failed to upsert employee: {e}");
                    emp_stats.failed += 1;
                }
            }
        }
        emp_stats.duration_ms = (clock::now() - phase_started).num_milliseconds();
        summary.operations.push(emp_stats);

        // Security users plus the employee-linking sub-pass.
        let phase_started = clock::now();
        let mut sec_stats = OpStats::new("security_users");
        for sec in security_users {
            sec_stats.processed += 1;
            match SecurityUser::upsert(
                &sec.user_name,
                sec.employee_id,
                sec.is_deleted,
                sec.is_locked,
                &mut tx,
            )
            .await
            {
                Ok(_) => sec_stats.created += 1,
                Err(e) => {
                    warn!(user_name = %sec.user_name, "failed to upsert security user: {e}");
                    sec_stats.failed += 1;
                }
            }
        }
        let linked = SecurityUser::link_employees(&mut tx).await?;
        sec_stats.updated = linked as i64;
        sec_stats.duration_ms = (clock::now() - phase_started).num_milliseconds();
        summary.operations.push(sec_stats);

        // User account passes: link, pre-create, status sync. All inside the
        // same transaction so the intermediate stub state is never visible.
        let phase_started = clock::now();
        let mut user_stats = OpStats::new("user_accounts");
        user_stats.updated = self.link_users_to_employees(&mut tx).await?;
        let (created, skipped, errors) = self.precreate_user_accounts(&mut tx).await?;
        user_stats.created = created;
        user_stats.skipped = skipped;
        user_stats.failed = errors;
        let status = self.sync_user_active_status(&mut tx).await?;
        user_stats.processed = status.deactivated + status.reactivated + status.skipped_override;
        user_stats.skipped += status.skipped_override;
        info!(
            deactivated = status.deactivated,
            reactivated = status.reactivated,
            skipped_override = status.skipped_override,
            "user status sync complete"
        );
        user_stats.duration_ms = (clock::now() - phase_started).num_milliseconds();
        summary.operations.push(user_stats);

        // Department assignments, when the HRIS returned them at all.
        if let Some(assignments) = assignments {
            let phase_started = clock::now();
            let stats = self
                .sync_department_assignments(assignments, &dept_map, &mut tx)
                .await?;
            let mut assign_stats = stats;
            assign_stats.duration_ms = (clock::now() - phase_started).num_milliseconds();
            summary.operations.push(assign_stats);
        } else {
            warn!("HRIS returned no department assignments, phase skipped");
        }

        summary.duration_ms = (clock::now() - started).num_milliseconds();

        for op in &summary.operations {
            LogReplication::new(
                &op.operation,
                "success",
                op.processed,
                op.created,
                op.updated,
                op.skipped,
                op.failed,
                op.duration_ms,
                None,
                triggered_by,
            )
            .insert_tx(&mut tx)
            .await?;
        }

        tx.commit().await?;
        Ok(summary)
    }

    /// Link application users to employees through the security-user table,
    /// matching usernames case-insensitively. Only users with no employee
    /// link yet are touched, and an employee is never linked twice.
    async fn link_users_to_employees(&self, conn: &mut sqlx::PgConnection) -> AppResult<i64> {
        let linked = sqlx::query(
            "UPDATE users u
             SET employee_id = su.employee_id, updated_at = NOW()
             FROM security_users su
             WHERE LOWER(su.user_name) = LOWER(u.username)
               AND su.employee_id IS NOT NULL
               AND u.employee_id IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM users other WHERE other.employee_id = su.employee_id
               )",
        )
        .execute(conn)
        .await?
        .rows_affected();
        Ok(linked as i64)
    }

    /// Pre-create stub accounts for linked security users that have no local
    /// user yet: inactive, passwordless, HRIS-sourced.
    async fn precreate_user_accounts(
        &self,
        conn: &mut sqlx::PgConnection,
    ) -> AppResult<(i64, i64, i64)> {
        let (mut created, mut skipped, mut errors) = (0i64, 0i64, 0i64);
        let linked = SecurityUser::list_linked(conn).await?;

        for sec in linked {
            let Some(employee_id) = sec.employee_id else {
                continue;
            };
            let username_taken = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE LOWER(username) = LOWER($1)",
            )
            .bind(&sec.user_name)
            .fetch_one(&mut *conn)
            .await?;
            if username_taken > 0 {
                skipped += 1;
                continue;
            }
            let employee_linked = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE employee_id = $1",
            )
            .bind(employee_id)
            .fetch_one(&mut *conn)
            .await?;
            if employee_linked > 0 {
                skipped += 1;
                continue;
            }

            let stub = User::hris_stub(&sec.user_name, employee_id);
            let inserted = sqlx::query(
                "INSERT INTO users (
                    id, username, password_hash, is_super_admin, is_active, is_blocked,
                    user_source, status_override, employee_id, created_at, updated_at
                 )
                 VALUES ($1, $2, NULL, false, false, false, $3, false, $4, $5, $5)",
            )
            .bind(stub.id)
            .bind(&stub.username)
            .bind(UserSource::Hris)
            .bind(employee_id)
            .bind(stub.created_at)
            .execute(&mut *conn)
            .await;
            match inserted {
                Ok(_) => created += 1,
                Err(e) => {
                    warn!(username = %stub.username, "failed to pre-create user: {e}");
                    errors += 1;
                }
            }
        }
        Ok((created, skipped, errors))
    }

    /// Strategy A status sync: only HRIS-sourced users without a status
    /// override follow the directory state.
    async fn sync_user_active_status(
        &self,
        conn: &mut sqlx::PgConnection,
    ) -> AppResult<StatusSyncStats> {
        let deactivated = sqlx::query(
            "UPDATE users u
             SET is_active = false, updated_at = NOW()
             FROM security_users su
             WHERE LOWER(su.user_name) = LOWER(u.username)
               AND u.user_source = 'hris'
               AND u.status_override = false
               AND u.is_active = true
               AND (su.is_deleted OR su.is_locked)",
        )
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let reactivated = sqlx::query(
            "UPDATE users u
             SET is_active = true, updated_at = NOW()
             FROM security_users su
             WHERE LOWER(su.user_name) = LOWER(u.username)
               AND u.user_source = 'hris'
               AND u.status_override = false
               AND u.is_active = false
               AND NOT (su.is_deleted OR su.is_locked)",
        )
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let skipped_override = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)
             FROM users u
             JOIN security_users su ON LOWER(su.user_name) = LOWER(u.username)
             WHERE u.user_source = 'hris' AND u.status_override = true",
        )
        .fetch_one(&mut *conn)
        .await?;

        Ok(StatusSyncStats {
            deactivated: deactivated as i64,
            reactivated: reactivated as i64,
            skipped_override,
        })
    }

    async fn sync_department_assignments(
        &self,
        assignments: &[super::source::HrisDepartmentAssignment],
        dept_map: &HashMap<i64, Uuid>,
        conn: &mut sqlx::PgConnection,
    ) -> AppResult<OpStats> {
        let mut stats = OpStats::new("department_assignments");

        // Resolve employee → user in one pass instead of per row.
        let employee_ids: Vec<i64> = {
            let mut ids: Vec<i64> = assignments.iter().map(|a| a.employee_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let rows: Vec<(i64, Uuid)> = sqlx::query_as(
            "SELECT e.id, u.id
             FROM employees e
             JOIN users u ON u.employee_id = e.id
             WHERE e.id = ANY($1)",
        )
        .bind(&employee_ids)
        .fetch_all(&mut *conn)
        .await?;
        let user_by_employee: HashMap<i64, Uuid> = rows.into_iter().collect();

        for assignment in assignments {
            stats.processed += 1;

            let Some(&user_id) = user_by_employee.get(&assignment.employee_id) else {
                stats.skipped += 1;
                continue;
            };
            let Some(&department_id) = dept_map.get(&assignment.department_id) else {
                stats.skipped += 1;
                continue;
            };

            match DepartmentAssignment::find_by_user_and_department(user_id, department_id, conn)
                .await?
            {
                Some(existing) if existing.is_synced_from_hris => {
                    if !existing.is_active {
                        DepartmentAssignment::reactivate(existing.id, conn).await?;
                        stats.updated += 1;
                    }
                }
                Some(existing) => {
                    info!(
                        user_id = %user_id,
                        department_id = %department_id,
                        "promoting manual department assignment to HRIS-managed"
                    );
                    DepartmentAssignment::convert_to_hris(existing.id, conn).await?;
                    stats.updated += 1;
                }
                None => {
                    DepartmentAssignment::insert_hris(user_id, department_id, conn).await?;
                    stats.created += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn log_failure(&self, operation: &str, error: &AppError, triggered_by: Option<Uuid>) {
        let log = LogReplication::new(
            operation,
            "failed",
            0,
            0,
            0,
            0,
            0,
            0,
            Some(&error.to_string()),
            triggered_by,
        );
        if let Err(e) = log.insert(&self.pool).await {
            warn!("failed to write replication failure log: {e}");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StatusSyncStats {
    deactivated: i64,
    reactivated: i64,
    skipped_override: i64,
}
