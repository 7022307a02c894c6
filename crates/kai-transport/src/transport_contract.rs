use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::inbound::{MediaKind, MediaMessage};
use crate::outbound::OutboundContent;

#[derive(Debug, Error)]
/// Failures reported by a transport primitive.
pub enum TransportError {
    #[error("transport is not connected")]
    Unavailable,
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("transport rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Addresses one message inside one conversation.
pub struct MessageRef {
    pub conversation_id: String,
    pub message_id: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
}

/// Primitives the agent consumes from the messaging transport.
///
/// Implementations must be safe to call from concurrently running handlers.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn send_message(
        &self,
        conversation_id: &str,
        content: OutboundContent,
    ) -> Result<MessageRef, TransportError>;

    async fn send_reaction(&self, target: &MessageRef, glyph: &str) -> Result<(), TransportError>;

    /// Returns the raw metadata payload for one group.
    async fn query_group_metadata(&self, group_id: &str) -> Result<Value, TransportError>;

    /// Lists the ids of every group the account participates in.
    async fn query_group_membership(&self) -> Result<Vec<String>, TransportError>;

    async fn download_media(
        &self,
        media: &MediaMessage,
        kind: MediaKind,
    ) -> Result<Vec<u8>, TransportError>;

    async fn read_messages(&self, messages: &[MessageRef]) -> Result<(), TransportError>;

    async fn send_presence_available(&self) -> Result<(), TransportError>;

    /// Display name of a contact, when the transport knows one.
    async fn contact_name(&self, _id: &str) -> Result<Option<String>, TransportError> {
        Ok(None)
    }
}
