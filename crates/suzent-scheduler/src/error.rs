use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cron job not found: {id}")]
    JobNotFound { id: i64 },

    #[error("Invalid cron expression: {0}")]
    InvalidCronExpr(String),

    #[error("Scheduler is not running")]
    NotRunning,
}

impl From<SchedulerError> for suzent_core::SuzentError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::JobNotFound { id } => {
                suzent_core::SuzentError::NotFound(format!("cron job {id}"))
            }
            SchedulerError::InvalidCronExpr(expr) => {
                suzent_core::SuzentError::invalid_input("cron_expr", expr)
            }
            SchedulerError::Database(e) => suzent_core::SuzentError::Database(e.to_string()),
            SchedulerError::NotRunning => {
                suzent_core::SuzentError::Internal("scheduler is not running".to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
