//! Shared host context for the turn pipeline.
//!
//! The gateway's `AppState` implements this; the scheduler, heartbeat, and
//! social consumer drive turns through the same trait, so every entry point
//! shares one pipeline implementation.

use std::sync::Arc;

use suzent_chats::ChatStore;
use suzent_core::SuzentConfig;
use suzent_memory::{CompletionClient, MemoryManager};

use crate::bus::StreamRegistry;
use crate::manager::AgentSessionManager;
use crate::tools::SocialSender;

pub trait TurnContext: Send + Sync + 'static {
    fn config(&self) -> &SuzentConfig;
    fn chats(&self) -> &Arc<ChatStore>;
    fn memory(&self) -> Option<&Arc<MemoryManager>>;
    fn agents(&self) -> &AgentSessionManager;
    fn streams(&self) -> &StreamRegistry;

    /// LLM used for compression summaries (usually the extraction model).
    fn summarizer(&self) -> Option<Arc<dyn CompletionClient>> {
        None
    }

    /// Outbound handle to the social channel manager, when platforms are up.
    fn social_sender(&self) -> Option<Arc<dyn SocialSender>> {
        None
    }
}
