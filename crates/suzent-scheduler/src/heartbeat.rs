//! Heartbeat runner — periodic self-check turns on a persistent chat.
//!
//! Unlike cron (isolated, precisely timed), the heartbeat runs one fixed
//! chat (`heartbeat-main`) at a coarse interval, gated on the presence of a
//! HEARTBEAT.md checklist in the shared workspace. A response that is just
//! the HEARTBEAT_OK sentinel is recorded and suppressed; anything else goes
//! to the notification callback.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use suzent_agent::pipeline::{run_turn_collect, TurnContext, TurnRequest};
use suzent_core::config::DEFAULT_USER_ID;

pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";
pub const HEARTBEAT_CHAT_ID: &str = "heartbeat-main";
/// Filler tolerated around the sentinel before a response counts as an alert.
const OK_FILLER_MAX_CHARS: usize = 300;
/// Smallest configurable interval.
const MIN_INTERVAL_MINUTES: u64 = 1;

pub type NotificationCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval_minutes: u64,
    pub heartbeat_md_exists: bool,
    pub last_run_at: Option<String>,
    pub last_result: Option<String>,
    pub last_error: Option<String>,
}

struct HeartbeatState {
    enabled: bool,
    interval_minutes: u64,
    last_run_at: Option<String>,
    last_result: Option<String>,
    last_error: Option<String>,
    shutdown: Option<watch::Sender<bool>>,
}

pub struct HeartbeatRunner<C: TurnContext> {
    ctx: Arc<C>,
    state: Mutex<HeartbeatState>,
    notify: Mutex<Option<NotificationCallback>>,
}

impl<C: TurnContext> HeartbeatRunner<C> {
    pub fn new(ctx: Arc<C>, interval_minutes: u64) -> Self {
        Self {
            ctx,
            state: Mutex::new(HeartbeatState {
                enabled: false,
                interval_minutes: interval_minutes.max(MIN_INTERVAL_MINUTES),
                last_run_at: None,
                last_result: None,
                last_error: None,
                shutdown: None,
            }),
            notify: Mutex::new(None),
        }
    }

    pub fn set_notification_callback(&self, callback: NotificationCallback) {
        *self.notify.lock().unwrap() = Some(callback);
    }

    fn heartbeat_md_path(&self) -> std::path::PathBuf {
        self.ctx.config().heartbeat_md_path()
    }

    /// Start the loop if HEARTBEAT.md exists; otherwise stay disabled.
    pub fn start(this: &Arc<Self>) {
        if !this.heartbeat_md_path().exists() {
            info!(
                path = %this.heartbeat_md_path().display(),
                "heartbeat disabled: HEARTBEAT.md not found"
            );
            return;
        }
        Self::spawn_loop(this);
        info!("heartbeat started");
    }

    /// Enable the loop. Fails quietly when HEARTBEAT.md is missing.
    pub fn enable(this: &Arc<Self>) -> bool {
        if !this.heartbeat_md_path().exists() {
            warn!("cannot enable heartbeat: HEARTBEAT.md not found");
            return false;
        }
        if this.state.lock().unwrap().shutdown.is_some() {
            return true;
        }
        Self::spawn_loop(this);
        info!("heartbeat enabled");
        true
    }

    pub fn disable(&self) {
        let mut state = self.state.lock().unwrap();
        state.enabled = false;
        if let Some(shutdown) = state.shutdown.take() {
            let _ = shutdown.send(true);
        }
        info!("heartbeat disabled");
    }

    /// Change the interval (minimum 1 minute) and restart the loop when it
    /// was running.
    pub fn set_interval(this: &Arc<Self>, minutes: u64) {
        let was_running = {
            let mut state = this.state.lock().unwrap();
            state.interval_minutes = minutes.max(MIN_INTERVAL_MINUTES);
            state.shutdown.is_some()
        };
        if was_running {
            this.disable();
            Self::enable(this);
        }
    }

    /// Run one tick immediately, outside the loop cadence.
    pub fn trigger_now(this: &Arc<Self>) {
        let runner = Arc::clone(this);
        tokio::spawn(async move { runner.tick().await });
    }

    pub fn status(&self) -> HeartbeatStatus {
        let state = self.state.lock().unwrap();
        HeartbeatStatus {
            enabled: state.enabled,
            running: state.shutdown.is_some(),
            interval_minutes: state.interval_minutes,
            heartbeat_md_exists: self.heartbeat_md_path().exists(),
            last_run_at: state.last_run_at.clone(),
            last_result: state.last_result.clone(),
            last_error: state.last_error.clone(),
        }
    }

    fn spawn_loop(this: &Arc<Self>) {
        let (tx, mut rx) = watch::channel(false);
        let interval_minutes = {
            let mut state = this.state.lock().unwrap();
            state.enabled = true;
            state.shutdown = Some(tx);
            state.interval_minutes
        };

        let runner = Arc::clone(this);
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(interval_minutes * 60);
            loop {
                runner.tick().await;
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            debug!("heartbeat loop stopped");
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn tick(&self) {
        let Some(checklist) = self.read_checklist() else {
            debug!("heartbeat skipped: HEARTBEAT.md empty or missing");
            return;
        };

        if self.ctx.streams().is_active(HEARTBEAT_CHAT_ID) {
            debug!("heartbeat skipped: stream already active");
            return;
        }

        self.ensure_heartbeat_chat();
        self.state.lock().unwrap().last_run_at = Some(Utc::now().to_rfc3339());

        let prompt = format!(
            "Read the following HEARTBEAT.md checklist and follow it strictly. \
             Do not infer or repeat old tasks from prior messages. \
             If nothing needs attention, reply {HEARTBEAT_OK}.\n\n---\n{checklist}\n---"
        );
        let request = TurnRequest {
            chat_id: Some(HEARTBEAT_CHAT_ID.to_string()),
            user_id: DEFAULT_USER_ID.to_string(),
            message: prompt,
            files: Vec::new(),
            config_override: Some(serde_json::json!({ "memory_enabled": true })),
        };

        match run_turn_collect(Arc::clone(&self.ctx), request).await {
            Ok(response) => {
                let mut state = self.state.lock().unwrap();
                state.last_error = None;
                if is_heartbeat_ok(&response) {
                    debug!("heartbeat OK, nothing needs attention");
                    state.last_result = Some(HEARTBEAT_OK.to_string());
                    return;
                }
                state.last_result = Some(response.clone());
                drop(state);

                info!(preview = %response.chars().take(100).collect::<String>(), "heartbeat alert");
                if let Some(callback) = self.notify.lock().unwrap().as_ref() {
                    callback(response);
                }
            }
            Err(e) => {
                error!(error = %e, "heartbeat turn failed");
                self.state.lock().unwrap().last_error = Some(e);
            }
        }
    }

    /// Read HEARTBEAT.md, returning `None` when missing or content-free
    /// (blank lines and markdown headers only).
    fn read_checklist(&self) -> Option<String> {
        let path = self.heartbeat_md_path();
        let content = std::fs::read_to_string(&path).ok()?.trim().to_string();
        let has_content = content
            .lines()
            .any(|line| !line.trim().is_empty() && !line.trim().starts_with('#'));
        has_content.then_some(content)
    }

    fn ensure_heartbeat_chat(&self) {
        if let Ok(None) = self.ctx.chats().get(HEARTBEAT_CHAT_ID) {
            let config = serde_json::json!({ "platform": "heartbeat" });
            if let Err(e) =
                self.ctx
                    .chats()
                    .create(Some(HEARTBEAT_CHAT_ID), "Heartbeat", config, vec![])
            {
                error!(error = %e, "heartbeat chat creation failed");
            }
        }
    }
}

/// True when the response is the HEARTBEAT_OK sentinel, alone or with at
/// most [`OK_FILLER_MAX_CHARS`] of surrounding filler.
pub fn is_heartbeat_ok(response: &str) -> bool {
    if response.is_empty() || response == HEARTBEAT_OK {
        return true;
    }
    let remaining = if let Some(rest) = response.strip_prefix(HEARTBEAT_OK) {
        rest.trim()
    } else if let Some(rest) = response.strip_suffix(HEARTBEAT_OK) {
        rest.trim()
    } else {
        return false;
    };
    remaining.chars().count() <= OK_FILLER_MAX_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_sentinel_is_ok() {
        assert!(is_heartbeat_ok(HEARTBEAT_OK));
        assert!(is_heartbeat_ok(""));
    }

    #[test]
    fn sentinel_with_small_filler_is_ok() {
        assert!(is_heartbeat_ok("HEARTBEAT_OK — all checks passed."));
        assert!(is_heartbeat_ok("All quiet today. HEARTBEAT_OK"));
    }

    #[test]
    fn sentinel_with_large_filler_is_alert() {
        let long = format!("{HEARTBEAT_OK} {}", "x".repeat(301));
        assert!(!is_heartbeat_ok(&long));
    }

    #[test]
    fn sentinel_in_the_middle_is_alert() {
        assert!(!is_heartbeat_ok("before HEARTBEAT_OK after"));
        assert!(!is_heartbeat_ok("The disk is filling up fast."));
    }
}
