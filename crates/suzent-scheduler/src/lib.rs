pub mod brain;
pub mod cron_expr;
pub mod db;
pub mod error;
pub mod heartbeat;
pub mod store;
pub mod types;

pub use brain::SchedulerBrain;
pub use error::SchedulerError;
pub use heartbeat::HeartbeatRunner;
pub use store::CronStore;
pub use types::{CronJob, CronRun, DeliveryMode, Notification, RunStatus};
