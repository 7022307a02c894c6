//! Shared plumbing handed to every command handler.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use kai_identity::{IdentityCache, MetadataParseError};
use kai_transport::{
    BestEffort, InboundEvent, MessageRef, MessagingTransport, OutboundContent, TransportError,
};
use thiserror::Error;

use crate::command_registry::CommandRegistry;
use crate::policy_store::PolicyStore;

#[derive(Debug, Error)]
/// Failure inside a command handler. The dispatcher logs it and answers the
/// requester with one generic reply.
pub enum HandlerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Metadata(#[from] MetadataParseError),
    #[error("{command} cannot handle {kind} content")]
    UnsupportedContent { command: &'static str, kind: String },
    #[error("failed to persist policy state")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("handler i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> Self {
        Self::Persistence(error.into())
    }
}

#[derive(Debug, Clone, Default)]
/// Filesystem locations handlers may touch.
pub struct HandlerPaths {
    pub assets_dir: Option<PathBuf>,
    pub auth_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct AgentClock {
    process_started: Instant,
    connected_at: Mutex<Option<Instant>>,
}

impl Default for AgentClock {
    fn default() -> Self {
        Self {
            process_started: Instant::now(),
            connected_at: Mutex::new(None),
        }
    }
}

impl AgentClock {
    pub fn mark_connected(&self) {
        *self
            .connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn mark_disconnected(&self) {
        *self
            .connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_connected(&self) -> bool {
        self.connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn process_uptime(&self) -> Duration {
        self.process_started.elapsed()
    }

    /// Time since the last connection-open event, zero while disconnected.
    pub fn connection_uptime(&self) -> Duration {
        self.connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|connected| connected.elapsed())
            .unwrap_or_default()
    }
}

/// Everything a handler can reach: the transport primitives, the two owned
/// stores and the registry for help rendering.
pub struct HandlerContext {
    pub transport: Arc<dyn MessagingTransport>,
    pub policy: Arc<PolicyStore>,
    pub identities: IdentityCache,
    pub registry: Arc<CommandRegistry>,
    pub paths: HandlerPaths,
    pub clock: AgentClock,
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("policy", &self.policy)
            .field("identities", &self.identities.len())
            .field("commands", &self.registry.names())
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl HandlerContext {
    pub fn new(
        transport: Arc<dyn MessagingTransport>,
        policy: Arc<PolicyStore>,
        identities: IdentityCache,
        registry: Arc<CommandRegistry>,
        paths: HandlerPaths,
    ) -> Self {
        Self {
            transport,
            policy,
            identities,
            registry,
            paths,
            clock: AgentClock::default(),
        }
    }

    pub async fn send(
        &self,
        conversation_id: &str,
        content: OutboundContent,
    ) -> Result<MessageRef, HandlerError> {
        Ok(self.transport.send_message(conversation_id, content).await?)
    }

    /// Sends `text` back into the event's conversation.
    pub async fn reply(
        &self,
        event: &InboundEvent,
        text: impl Into<String>,
    ) -> Result<MessageRef, HandlerError> {
        self.send(&event.conversation_id, OutboundContent::text(text))
            .await
    }

    /// Like [`Self::reply`], mentioning the requester.
    pub async fn reply_mentioning_sender(
        &self,
        event: &InboundEvent,
        text: impl Into<String>,
    ) -> Result<MessageRef, HandlerError> {
        let mention = vec![event.sender_hint().to_string()];
        self.send(
            &event.conversation_id,
            OutboundContent::text_with_mentions(text, mention),
        )
        .await
    }

    pub fn resolve(&self, id: &str) -> String {
        self.identities.resolve(id)
    }

    pub fn command_prefix(&self) -> String {
        self.policy.command_prefix()
    }

    pub fn owner_identity(&self) -> Option<String> {
        self.policy.owner_identity()
    }

    /// Path of `name` inside the assets directory, when it exists.
    pub fn asset_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.paths.assets_dir.as_deref()?.join(name);
        path.is_file().then_some(path)
    }

    /// Reads an optional asset. A missing or unreadable asset yields `None`
    /// and the caller falls back to text.
    pub async fn load_asset(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.asset_path(name)?;
        tokio::fs::read(&path).await.best_effort("asset read")
    }

    pub fn auth_dir(&self) -> Option<&Path> {
        self.paths.auth_dir.as_deref()
    }
}
