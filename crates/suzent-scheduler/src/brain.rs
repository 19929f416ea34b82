//! Scheduler brain — fires due cron jobs through the chat turn pipeline.
//!
//! One tick loop polls the job table; due jobs run as turns on their own
//! `cron-<id>` chat. The schedule is advanced *before* the body executes so
//! a slow or crashing job can never cause a catch-up storm. Failures back
//! off exponentially on the job row; after five attempts the job is
//! deactivated.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use suzent_agent::pipeline::{run_turn_collect, TurnContext, TurnRequest};
use suzent_core::config::DEFAULT_USER_ID;

use crate::cron_expr;
use crate::store::CronStore;
use crate::types::{CronJob, Notification, RunStatus};

/// Maximum retry attempts before a failing job is deactivated.
const MAX_RETRIES: u32 = 5;
/// Bounded announce queue size; oldest entries are evicted.
const MAX_NOTIFICATIONS: usize = 20;

pub struct SchedulerBrain<C: TurnContext> {
    ctx: Arc<C>,
    store: Arc<CronStore>,
    tick_interval: Duration,
    notifications: Mutex<VecDeque<Notification>>,
}

impl<C: TurnContext> SchedulerBrain<C> {
    pub fn new(ctx: Arc<C>, store: Arc<CronStore>, tick_secs: u64) -> Self {
        Self {
            ctx,
            store,
            tick_interval: Duration::from_secs(tick_secs),
            notifications: Mutex::new(VecDeque::with_capacity(MAX_NOTIFICATIONS)),
        }
    }

    pub fn store(&self) -> &Arc<CronStore> {
        &self.store
    }

    /// Main tick loop. Runs until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.tick_interval.as_secs(), "scheduler started");
        self.initialize_schedules();

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = Self::tick(&self) {
                        error!(error = %e, "scheduler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Compute `next_run_at` for active jobs that are missing one.
    fn initialize_schedules(&self) {
        let jobs = match self.store.list_jobs(true) {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed to list jobs at startup");
                return;
            }
        };
        let now = Utc::now();
        for job in jobs.iter().filter(|j| j.next_run_at.is_none()) {
            match cron_expr::next_after(&job.cron_expr, now) {
                Ok(next) => {
                    let _ = self.store.set_next_run(job.id, next);
                }
                Err(e) => warn!(job_id = job.id, error = %e, "unschedulable job"),
            }
        }
    }

    /// One tick: spawn an execution for every due job.
    fn tick(this: &Arc<Self>) -> crate::error::Result<()> {
        let now = Utc::now();
        for job in this.store.list_jobs(true)? {
            let Some(ref next_str) = job.next_run_at else {
                if let Ok(next) = cron_expr::next_after(&job.cron_expr, now) {
                    let _ = this.store.set_next_run(job.id, next);
                }
                continue;
            };
            let due = chrono::DateTime::parse_from_rfc3339(next_str)
                .map(|dt| dt.with_timezone(&Utc) <= now)
                .unwrap_or(false);
            if due {
                let brain = Arc::clone(this);
                tokio::spawn(async move { brain.execute_job(job.id).await });
            }
        }
        Ok(())
    }

    /// Schedule an immediate execution, independent of the tick loop.
    pub fn trigger_now(this: &Arc<Self>, job_id: i64) {
        let brain = Arc::clone(this);
        tokio::spawn(async move { brain.execute_job(job_id).await });
    }

    pub async fn execute_job(&self, job_id: i64) {
        let job = match self.store.get_job(job_id) {
            Ok(Some(job)) if job.active => job,
            Ok(_) => return,
            Err(e) => {
                error!(job_id, error = %e, "job fetch failed");
                return;
            }
        };

        let chat_id = format!("cron-{job_id}");
        if self.ctx.streams().is_active(&chat_id) {
            debug!(job_id, "skipping cron job, stream already active");
            return;
        }

        // Advance before executing to prevent drift and catch-up storms.
        let now = Utc::now();
        let retry_count_before = job.retry_count;
        match cron_expr::next_after(&job.cron_expr, now) {
            Ok(next) => {
                if let Err(e) = self.store.advance_schedule(job_id, now, next) {
                    error!(job_id, error = %e, "schedule advance failed");
                    return;
                }
            }
            Err(e) => {
                error!(job_id, error = %e, "invalid cron expression");
                let _ = self.store.deactivate(job_id, &e.to_string());
                return;
            }
        }

        self.ensure_cron_chat(&chat_id, &job);
        let run_id = match self.store.create_run(job_id, now) {
            Ok(id) => id,
            Err(e) => {
                error!(job_id, error = %e, "run row creation failed");
                return;
            }
        };

        info!(job_id, name = %job.name, "executing cron job");

        let mut config_override = serde_json::json!({ "memory_enabled": true });
        if let Some(ref model) = job.model_override {
            config_override["model"] = serde_json::json!(model);
        }
        let request = TurnRequest {
            chat_id: Some(chat_id),
            user_id: DEFAULT_USER_ID.to_string(),
            message: job.prompt.clone(),
            files: Vec::new(),
            config_override: Some(config_override),
        };

        match run_turn_collect(Arc::clone(&self.ctx), request).await {
            Ok(result) => {
                let _ = self.store.record_result(job_id, &result);
                let _ = self
                    .store
                    .finish_run(run_id, RunStatus::Success, Some(&result), None);

                if job.delivery_mode == crate::types::DeliveryMode::Announce && !result.is_empty()
                {
                    self.push_notification(Notification {
                        job_id: job.id,
                        job_name: job.name.clone(),
                        result: result.chars().take(500).collect(),
                        timestamp: Utc::now().to_rfc3339(),
                    });
                }
            }
            Err(error) => {
                warn!(job_id, error = %error, "cron job failed");
                let _ = self
                    .store
                    .finish_run(run_id, RunStatus::Error, None, Some(&error));
                self.handle_retry(job_id, retry_count_before, &error);
            }
        }
    }

    /// Exponential backoff on the job row; deactivate after MAX_RETRIES.
    fn handle_retry(&self, job_id: i64, current_retry: u32, error: &str) {
        if current_retry < MAX_RETRIES {
            let backoff = chrono::Duration::minutes(2i64.pow(current_retry));
            let _ = self.store.record_failure(
                job_id,
                error,
                Some(Utc::now() + backoff),
                current_retry + 1,
            );
        } else {
            let _ = self
                .store
                .deactivate(job_id, &format!("Max retries exceeded: {error}"));
            warn!(job_id, "cron job deactivated after {current_retry} retries");
        }
    }

    fn ensure_cron_chat(&self, chat_id: &str, job: &CronJob) {
        if let Ok(None) = self.ctx.chats().get(chat_id) {
            let config = serde_json::json!({ "platform": "cron", "cron_job_id": job.id });
            if let Err(e) =
                self.ctx
                    .chats()
                    .create(Some(chat_id), &format!("Cron: {}", job.name), config, vec![])
            {
                error!(chat_id, error = %e, "cron chat creation failed");
            }
        }
    }

    /// Push onto the bounded announce queue, evicting the oldest entry.
    /// Also used by the heartbeat for its alerts.
    pub fn push_notification(&self, notification: Notification) {
        let mut queue = self.notifications.lock().unwrap();
        if queue.len() >= MAX_NOTIFICATIONS {
            queue.pop_front();
        }
        queue.push_back(notification);
    }

    /// Drain and return all pending notifications.
    pub fn drain_notifications(&self) -> Vec<Notification> {
        let mut queue = self.notifications.lock().unwrap();
        queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Notification queue behavior is independent of the TurnContext; a
    // minimal test double keeps these tests synchronous.
    struct NullCtx {
        config: suzent_core::SuzentConfig,
        chats: Arc<suzent_chats::ChatStore>,
        agents: suzent_agent::AgentSessionManager,
        streams: suzent_agent::StreamRegistry,
    }

    impl NullCtx {
        fn new() -> Self {
            let config = suzent_core::SuzentConfig::default();
            let chats = Arc::new(
                suzent_chats::ChatStore::new(rusqlite::Connection::open_in_memory().unwrap())
                    .unwrap(),
            );
            let agents = suzent_agent::AgentSessionManager::new(
                Arc::new(config.clone()),
                Arc::clone(&chats),
                None,
                Arc::new(suzent_nodes_stub()),
                Box::new(|_| unreachable!("no provider in this test")),
            );
            Self {
                config,
                chats,
                agents,
                streams: suzent_agent::StreamRegistry::new(),
            }
        }
    }

    fn suzent_nodes_stub() -> suzent_nodes::NodeManager {
        suzent_nodes::NodeManager::new()
    }

    impl TurnContext for NullCtx {
        fn config(&self) -> &suzent_core::SuzentConfig {
            &self.config
        }
        fn chats(&self) -> &Arc<suzent_chats::ChatStore> {
            &self.chats
        }
        fn memory(&self) -> Option<&Arc<suzent_memory::MemoryManager>> {
            None
        }
        fn agents(&self) -> &suzent_agent::AgentSessionManager {
            &self.agents
        }
        fn streams(&self) -> &suzent_agent::StreamRegistry {
            &self.streams
        }
    }

    fn brain() -> SchedulerBrain<NullCtx> {
        let store =
            Arc::new(CronStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        SchedulerBrain::new(Arc::new(NullCtx::new()), store, 30)
    }

    fn notification(i: i64) -> Notification {
        Notification {
            job_id: i,
            job_name: format!("job-{i}"),
            result: "r".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn notification_queue_is_bounded() {
        let b = brain();
        for i in 0..25 {
            b.push_notification(notification(i));
        }
        let drained = b.drain_notifications();
        assert_eq!(drained.len(), MAX_NOTIFICATIONS);
        // Oldest entries were evicted.
        assert_eq!(drained[0].job_id, 5);
        assert_eq!(drained.last().unwrap().job_id, 24);
        // A second drain is empty.
        assert!(b.drain_notifications().is_empty());
    }

    #[test]
    fn retry_backoff_doubles_then_deactivates() {
        let b = brain();
        let job = b
            .store
            .create_job(crate::types::NewCronJob {
                name: "flaky".to_string(),
                cron_expr: "* * * * *".to_string(),
                prompt: "p".to_string(),
                active: true,
                delivery_mode: crate::types::DeliveryMode::None,
                model_override: None,
            })
            .unwrap();

        for attempt in 0..MAX_RETRIES {
            b.handle_retry(job.id, attempt, "boom");
            let j = b.store.get_job(job.id).unwrap().unwrap();
            assert_eq!(j.retry_count, attempt + 1);
            assert!(j.active);
        }

        b.handle_retry(job.id, MAX_RETRIES, "boom");
        let j = b.store.get_job(job.id).unwrap().unwrap();
        assert!(!j.active);
        assert!(j.last_error.unwrap().contains("Max retries"));
    }
}
