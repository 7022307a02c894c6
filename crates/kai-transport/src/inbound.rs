//! Inbound transport events and tagged message content.

use serde::{Deserialize, Serialize};

use crate::transport_contract::MessageRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
/// Everything the transport can push at the agent.
pub enum TransportEvent {
    Message(InboundEvent),
    ConnectionOpen {
        account_id: String,
    },
    GroupMetadataChanged {
        group_id: String,
    },
    ConnectionClosed {
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Media families the transport can download.
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Sticker,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Sticker => "sticker",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Transport-side handle to a downloadable media payload.
pub struct MediaMessage {
    pub reference: String,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub ptt: bool,
    #[serde(default)]
    pub gif_playback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A message referenced by a reply.
pub struct QuotedMessage {
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    pub content: Box<MessageContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Message body, classified once by the transport adapter.
pub enum MessageContent {
    Text {
        text: String,
    },
    Image(MediaMessage),
    Video(MediaMessage),
    Audio(MediaMessage),
    Sticker(MediaMessage),
    /// Extended text replying to another message.
    QuotedRef {
        text: String,
        quoted: QuotedMessage,
    },
    ViewOnce {
        inner: Box<MessageContent>,
    },
    Unsupported {
        kind: String,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Plain or extended text body, if any.
    pub fn text_body(&self) -> Option<&str> {
        match self {
            Self::Text { text } | Self::QuotedRef { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn media(&self) -> Option<(MediaKind, &MediaMessage)> {
        match self {
            Self::Image(media) => Some((MediaKind::Image, media)),
            Self::Video(media) => Some((MediaKind::Video, media)),
            Self::Audio(media) => Some((MediaKind::Audio, media)),
            Self::Sticker(media) => Some((MediaKind::Sticker, media)),
            _ => None,
        }
    }

    /// Short name of the variant, used in operator logs and user replies.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Audio(_) => "audio",
            Self::Sticker(_) => "sticker",
            Self::QuotedRef { .. } => "quoted_text",
            Self::ViewOnce { .. } => "view_once",
            Self::Unsupported { kind } => kind.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One inbound message as delivered by the transport.
pub struct InboundEvent {
    pub message_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub is_self_originated: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    pub content: MessageContent,
}

impl InboundEvent {
    pub fn is_group(&self) -> bool {
        kai_identity::is_group_id(&self.conversation_id)
    }

    pub fn is_status_broadcast(&self) -> bool {
        kai_identity::is_broadcast_id(&self.conversation_id)
    }

    pub fn text_body(&self) -> Option<&str> {
        self.content.text_body()
    }

    pub fn quoted(&self) -> Option<&QuotedMessage> {
        match &self.content {
            MessageContent::QuotedRef { quoted, .. } => Some(quoted),
            _ => None,
        }
    }

    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            conversation_id: self.conversation_id.clone(),
            message_id: self.message_id.clone(),
            from_me: self.is_self_originated,
            participant_id: self.participant_id.clone(),
        }
    }

    /// The identity a reply should mention: the participant in groups, the
    /// conversation itself otherwise.
    pub fn sender_hint(&self) -> &str {
        self.participant_id
            .as_deref()
            .filter(|participant| !participant.trim().is_empty())
            .unwrap_or(self.conversation_id.as_str())
    }
}
