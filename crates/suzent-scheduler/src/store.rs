use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use suzent_core::types::now_rfc3339;

use crate::cron_expr;
use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{CronJob, CronJobUpdate, CronRun, DeliveryMode, NewCronJob, RunStatus};

/// Persistent store for cron jobs and their run history.
pub struct CronStore {
    db: Mutex<Connection>,
}

impl CronStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Create a job. The cron expression is validated and `next_run_at`
    /// computed here, at creation time.
    pub fn create_job(&self, new: NewCronJob) -> Result<CronJob> {
        let next_run = cron_expr::next_after(&new.cron_expr, Utc::now())?
            .map(|dt| dt.to_rfc3339());
        let now = now_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO cron_jobs
             (name, cron_expr, prompt, active, delivery_mode, model_override,
              next_run_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                new.name,
                new.cron_expr,
                new.prompt,
                new.active as i64,
                new.delivery_mode.to_string(),
                new.model_override,
                next_run,
                now
            ],
        )?;
        let id = db.last_insert_rowid();
        info!(job_id = id, name = %new.name, "cron job created");
        drop(db);

        self.get_job(id)?
            .ok_or(SchedulerError::JobNotFound { id })
    }

    pub fn get_job(&self, id: i64) -> Result<Option<CronJob>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("{JOB_SELECT} WHERE id = ?1"),
            [id],
            row_to_job,
        )
        .optional()
        .map_err(SchedulerError::Database)
    }

    pub fn list_jobs(&self, active_only: bool) -> Result<Vec<CronJob>> {
        let db = self.db.lock().unwrap();
        let sql = if active_only {
            format!("{JOB_SELECT} WHERE active = 1 ORDER BY id")
        } else {
            format!("{JOB_SELECT} ORDER BY id")
        };
        let mut stmt = db.prepare(&sql)?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(jobs)
    }

    /// Apply a partial update. A changed cron expression is validated and
    /// `next_run_at` recomputed.
    pub fn update_job(&self, id: i64, update: CronJobUpdate) -> Result<CronJob> {
        let existing = self
            .get_job(id)?
            .ok_or(SchedulerError::JobNotFound { id })?;

        let cron_changed = update
            .cron_expr
            .as_ref()
            .is_some_and(|e| *e != existing.cron_expr);
        let next_run = if cron_changed {
            let expr = update.cron_expr.as_ref().unwrap();
            cron_expr::next_after(expr, Utc::now())?.map(|dt| dt.to_rfc3339())
        } else {
            existing.next_run_at.clone()
        };

        let name = update.name.unwrap_or(existing.name);
        let expr = update.cron_expr.unwrap_or(existing.cron_expr);
        let prompt = update.prompt.unwrap_or(existing.prompt);
        let active = update.active.unwrap_or(existing.active);
        let delivery = update.delivery_mode.unwrap_or(existing.delivery_mode);
        let model_override = update.model_override.unwrap_or(existing.model_override);

        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE cron_jobs SET name=?1, cron_expr=?2, prompt=?3, active=?4,
             delivery_mode=?5, model_override=?6, next_run_at=?7, updated_at=?8
             WHERE id=?9",
            rusqlite::params![
                name,
                expr,
                prompt,
                active as i64,
                delivery.to_string(),
                model_override,
                next_run,
                now_rfc3339(),
                id
            ],
        )?;
        drop(db);

        self.get_job(id)?
            .ok_or(SchedulerError::JobNotFound { id })
    }

    pub fn delete_job(&self, id: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM cron_jobs WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id });
        }
        db.execute("DELETE FROM cron_runs WHERE job_id = ?1", [id])?;
        info!(job_id = id, "cron job deleted");
        Ok(())
    }

    /// Advance the schedule before a run: stamp `last_run_at`, set the new
    /// `next_run_at`, and reset the retry counter.
    pub fn advance_schedule(
        &self,
        id: i64,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE cron_jobs SET last_run_at=?1, next_run_at=?2, retry_count=0, updated_at=?3
             WHERE id=?4",
            rusqlite::params![
                last_run_at.to_rfc3339(),
                next_run_at.map(|dt| dt.to_rfc3339()),
                now_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn set_next_run(&self, id: i64, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE cron_jobs SET next_run_at=?1, updated_at=?2 WHERE id=?3",
            rusqlite::params![next_run_at.map(|dt| dt.to_rfc3339()), now_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn record_result(&self, id: i64, result: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE cron_jobs SET last_result=?1, last_error=NULL, updated_at=?2 WHERE id=?3",
            rusqlite::params![result, now_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Record a failure with its backoff state.
    pub fn record_failure(
        &self,
        id: i64,
        error: &str,
        next_run_at: Option<DateTime<Utc>>,
        retry_count: u32,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE cron_jobs SET last_error=?1, next_run_at=?2, retry_count=?3, updated_at=?4
             WHERE id=?5",
            rusqlite::params![
                error,
                next_run_at.map(|dt| dt.to_rfc3339()),
                retry_count,
                now_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn deactivate(&self, id: i64, error: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE cron_jobs SET active=0, last_error=?1, updated_at=?2 WHERE id=?3",
            rusqlite::params![error, now_rfc3339(), id],
        )?;
        info!(job_id = id, "cron job deactivated");
        Ok(())
    }

    // --- run history --------------------------------------------------------

    pub fn create_run(&self, job_id: i64, started_at: DateTime<Utc>) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO cron_runs (job_id, started_at, status) VALUES (?1, ?2, 'running')",
            rusqlite::params![job_id, started_at.to_rfc3339()],
        )?;
        Ok(db.last_insert_rowid())
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE cron_runs SET finished_at=?1, status=?2, result=?3, error=?4 WHERE id=?5",
            rusqlite::params![now_rfc3339(), status.to_string(), result, error, run_id],
        )?;
        Ok(())
    }

    pub fn list_runs(&self, job_id: i64, limit: usize) -> Result<Vec<CronRun>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, job_id, started_at, finished_at, status, result, error
             FROM cron_runs WHERE job_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(rusqlite::params![job_id, limit as i64], |row| {
                let status_str: String = row.get(4)?;
                Ok(CronRun {
                    id: row.get(0)?,
                    job_id: row.get(1)?,
                    started_at: row.get(2)?,
                    finished_at: row.get(3)?,
                    status: RunStatus::from_str(&status_str).unwrap_or(RunStatus::Error),
                    result: row.get(5)?,
                    error: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(runs)
    }
}

const JOB_SELECT: &str = "SELECT id, name, cron_expr, prompt, active, delivery_mode,
    model_override, retry_count, last_run_at, next_run_at, last_result, last_error,
    created_at, updated_at FROM cron_jobs";

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<CronJob> {
    let delivery_str: String = row.get(5)?;
    Ok(CronJob {
        id: row.get(0)?,
        name: row.get(1)?,
        cron_expr: row.get(2)?,
        prompt: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        delivery_mode: DeliveryMode::from_str(&delivery_str).unwrap_or(DeliveryMode::Announce),
        model_override: row.get(6)?,
        retry_count: row.get::<_, i64>(7)? as u32,
        last_run_at: row.get(8)?,
        next_run_at: row.get(9)?,
        last_result: row.get(10)?,
        last_error: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CronStore {
        CronStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn new_job(name: &str, expr: &str) -> NewCronJob {
        NewCronJob {
            name: name.to_string(),
            cron_expr: expr.to_string(),
            prompt: "say 1".to_string(),
            active: true,
            delivery_mode: DeliveryMode::Announce,
            model_override: None,
        }
    }

    #[test]
    fn create_computes_next_run() {
        let s = store();
        let job = s.create_job(new_job("daily", "*/1 * * * *")).unwrap();
        assert!(job.active);
        assert!(job.next_run_at.is_some());
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn invalid_cron_rejected_on_create_and_update() {
        let s = store();
        assert!(matches!(
            s.create_job(new_job("bad", "not cron")).unwrap_err(),
            SchedulerError::InvalidCronExpr(_)
        ));

        let job = s.create_job(new_job("ok", "* * * * *")).unwrap();
        let err = s
            .update_job(
                job.id,
                CronJobUpdate {
                    cron_expr: Some("nope".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCronExpr(_)));
    }

    #[test]
    fn advance_resets_retry_count() {
        let s = store();
        let job = s.create_job(new_job("j", "* * * * *")).unwrap();
        s.record_failure(job.id, "boom", None, 3).unwrap();
        assert_eq!(s.get_job(job.id).unwrap().unwrap().retry_count, 3);

        let now = Utc::now();
        s.advance_schedule(job.id, now, Some(now + chrono::Duration::minutes(1)))
            .unwrap();
        let job = s.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.retry_count, 0);
        assert!(job.last_run_at.is_some());
    }

    #[test]
    fn run_lifecycle() {
        let s = store();
        let job = s.create_job(new_job("j", "* * * * *")).unwrap();
        let run_id = s.create_run(job.id, Utc::now()).unwrap();

        let runs = s.list_runs(job.id, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Running);

        s.finish_run(run_id, RunStatus::Success, Some("done"), None)
            .unwrap();
        let runs = s.list_runs(job.id, 10).unwrap();
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].result.as_deref(), Some("done"));
        assert!(runs[0].finished_at.is_some());
    }

    #[test]
    fn delete_unknown_job_fails() {
        let s = store();
        assert!(matches!(
            s.delete_job(42).unwrap_err(),
            SchedulerError::JobNotFound { id: 42 }
        ));
    }

    #[test]
    fn deactivate_keeps_job_but_inactive() {
        let s = store();
        let job = s.create_job(new_job("j", "* * * * *")).unwrap();
        s.deactivate(job.id, "max retries").unwrap();

        let job = s.get_job(job.id).unwrap().unwrap();
        assert!(!job.active);
        assert_eq!(job.last_error.as_deref(), Some("max retries"));
        assert!(s.list_jobs(true).unwrap().is_empty());
        assert_eq!(s.list_jobs(false).unwrap().len(), 1);
    }
}
