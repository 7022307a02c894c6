//! Outbound content shapes sent through [`crate::MessagingTransport`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// A message the agent asks the transport to deliver.
pub enum OutboundContent {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<String>,
    },
    Image {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<String>,
    },
    Video {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(default)]
        mimetype: Option<String>,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        gif_playback: bool,
    },
    Audio {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(default)]
        mimetype: Option<String>,
        #[serde(default)]
        ptt: bool,
    },
    Sticker {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl OutboundContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            mentions: Vec::new(),
        }
    }

    pub fn text_with_mentions(text: impl Into<String>, mentions: Vec<String>) -> Self {
        Self::Text {
            text: text.into(),
            mentions,
        }
    }

    /// Body text or caption, whichever the variant carries.
    pub fn visible_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text.as_str()),
            Self::Image { caption, .. } | Self::Video { caption, .. } => caption.as_deref(),
            Self::Audio { .. } | Self::Sticker { .. } => None,
        }
    }

    pub fn mentions(&self) -> &[String] {
        match self {
            Self::Text { mentions, .. } | Self::Image { mentions, .. } => mentions.as_slice(),
            _ => &[],
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::OutboundContent;

    #[test]
    fn unit_media_payloads_serialize_as_base64() {
        let content = OutboundContent::Sticker {
            data: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let value = serde_json::to_value(&content).expect("serialize");
        assert_eq!(value, json!({"type": "sticker", "data": "3q2+7w=="}));
    }

    #[test]
    fn unit_visible_text_reads_caption_for_media() {
        let image = OutboundContent::Image {
            data: Vec::new(),
            caption: Some("caption".to_string()),
            mentions: vec!["1@s.whatsapp.net".to_string()],
        };
        assert_eq!(image.visible_text(), Some("caption"));
        assert_eq!(image.mentions().to_vec(), vec!["1@s.whatsapp.net".to_string()]);
        assert_eq!(
            OutboundContent::Audio {
                data: Vec::new(),
                mimetype: None,
                ptt: true
            }
            .visible_text(),
            None
        );
    }

    #[test]
    fn regression_text_without_mentions_omits_the_field() {
        let value = serde_json::to_value(OutboundContent::text("hi")).expect("serialize");
        assert_eq!(value, json!({"type": "text", "text": "hi"}));
    }
}
