use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A persisted cron job definition.
#[derive(Debug, Clone, Serialize)]
pub struct CronJob {
    pub id: i64,
    pub name: String,
    pub cron_expr: String,
    pub prompt: String,
    pub active: bool,
    pub delivery_mode: DeliveryMode,
    pub model_override: Option<String>,
    pub retry_count: u32,
    pub last_run_at: Option<String>,
    pub next_run_at: Option<String>,
    pub last_result: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// How a finished job's result is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Push a notification for polling clients.
    Announce,
    /// Record the result silently.
    None,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Announce => write!(f, "announce"),
            DeliveryMode::None => write!(f, "none"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "announce" => Ok(DeliveryMode::Announce),
            "none" => Ok(DeliveryMode::None),
            _ => Err(()),
        }
    }
}

/// One execution record of a cron job.
#[derive(Debug, Clone, Serialize)]
pub struct CronRun {
    pub id: i64,
    pub job_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            _ => Err(()),
        }
    }
}

/// Fields accepted when creating a job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCronJob {
    pub name: String,
    pub cron_expr: String,
    pub prompt: String,
    #[serde(default = "bool_true")]
    pub active: bool,
    #[serde(default = "default_delivery")]
    pub delivery_mode: DeliveryMode,
    #[serde(default)]
    pub model_override: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_delivery() -> DeliveryMode {
    DeliveryMode::Announce
}

/// Partial job update; `None` fields are untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CronJobUpdate {
    pub name: Option<String>,
    pub cron_expr: Option<String>,
    pub prompt: Option<String>,
    pub active: Option<bool>,
    pub delivery_mode: Option<DeliveryMode>,
    pub model_override: Option<Option<String>>,
}

/// One entry in the bounded announce queue.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub job_id: i64,
    pub job_name: String,
    pub result: String,
    pub timestamp: String,
}
