//! Automatic read receipts for status broadcasts.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use kai_transport::{BestEffort, InboundEvent, MessagingTransport};

use crate::policy_store::PolicyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusViewOutcome {
    NotStatus,
    Disabled,
    AlreadyViewed,
    Viewed,
    Failed,
}

/// Marks status broadcasts as read, at most once per message.
#[derive(Debug, Default)]
pub struct StatusViewer {
    viewed: Mutex<HashSet<(String, String)>>,
}

impl StatusViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn observe(
        &self,
        transport: &dyn MessagingTransport,
        policy: &PolicyStore,
        event: &InboundEvent,
    ) -> StatusViewOutcome {
        if !event.is_status_broadcast() {
            return StatusViewOutcome::NotStatus;
        }
        if !policy.auto_status_view_enabled() {
            return StatusViewOutcome::Disabled;
        }
        let key = (event.conversation_id.clone(), event.message_id.clone());
        // Claim before the await so concurrent copies of the same event
        // cannot both send a read receipt.
        if !self.lock().insert(key.clone()) {
            return StatusViewOutcome::AlreadyViewed;
        }
        match transport
            .read_messages(&[event.message_ref()])
            .await
            .best_effort("status read receipt")
        {
            Some(()) => {
                tracing::debug!(message_id = %event.message_id, "viewed status update");
                StatusViewOutcome::Viewed
            }
            None => {
                self.lock().remove(&key);
                StatusViewOutcome::Failed
            }
        }
    }

    pub fn viewed_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<(String, String)>> {
        self.viewed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
