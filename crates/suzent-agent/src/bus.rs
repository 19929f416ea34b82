//! Streaming bus — at most one active stream per chat id.
//!
//! A turn registers a controller before running its agent and holds the
//! returned guard for the turn's lifetime; dropping the guard unregisters
//! the chat even when the SSE consumer disappears mid-stream. `stop()`
//! raises the controller's cancel signal; the agent loop observes it at its
//! next suspension point.

use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use suzent_core::SuzentError;

#[derive(Debug)]
pub struct StreamController {
    token: CancellationToken,
    reason: Mutex<Option<String>>,
}

impl StreamController {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel_reason(&self) -> Option<String> {
        self.reason.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct StreamRegistry {
    inner: Arc<DashMap<String, Arc<StreamController>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller for a chat. Fails with `StreamActive` when the
    /// chat already has one — per-chat turns are serialized here.
    pub fn register(&self, chat_id: &str) -> Result<StreamGuard, SuzentError> {
        let controller = Arc::new(StreamController::new());
        let entry = self.inner.entry(chat_id.to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SuzentError::StreamActive {
                chat_id: chat_id.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Arc::clone(&controller));
                debug!(chat_id, "stream registered");
                Ok(StreamGuard {
                    registry: Arc::downgrade(&self.inner),
                    chat_id: chat_id.to_string(),
                    controller,
                })
            }
        }
    }

    /// Raise the cancel signal for a chat's active stream.
    /// Returns false when no stream is active.
    pub fn stop(&self, chat_id: &str, reason: &str) -> bool {
        match self.inner.get(chat_id) {
            Some(entry) => {
                let controller = entry.value();
                *controller.reason.lock().unwrap() = Some(reason.to_string());
                controller.token.cancel();
                info!(chat_id, reason, "stream stop requested");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, chat_id: &str) -> bool {
        self.inner.contains_key(chat_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.len()
    }
}

/// RAII registration handle. Dropping it unregisters the chat.
#[derive(Debug)]
pub struct StreamGuard {
    registry: Weak<DashMap<String, Arc<StreamController>>>,
    chat_id: String,
    controller: Arc<StreamController>,
}

impl StreamGuard {
    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.chat_id);
            debug!(chat_id = %self.chat_id, "stream unregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_registration_conflicts() {
        let registry = StreamRegistry::new();
        let _guard = registry.register("c1").unwrap();

        let err = registry.register("c1").unwrap_err();
        assert!(matches!(err, SuzentError::StreamActive { .. }));
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn drop_unregisters() {
        let registry = StreamRegistry::new();
        {
            let _guard = registry.register("c1").unwrap();
            assert!(registry.is_active("c1"));
        }
        assert!(!registry.is_active("c1"));
        assert!(registry.register("c1").is_ok());
    }

    #[test]
    fn stop_cancels_and_records_reason() {
        let registry = StreamRegistry::new();
        let guard = registry.register("c1").unwrap();

        assert!(registry.stop("c1", "user pressed stop"));
        assert!(guard.controller().is_cancelled());
        assert_eq!(
            guard.controller().cancel_reason().as_deref(),
            Some("user pressed stop")
        );
    }

    #[test]
    fn stop_without_stream_returns_false() {
        let registry = StreamRegistry::new();
        assert!(!registry.stop("ghost", "reason"));
    }
}
