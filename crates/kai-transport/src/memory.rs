//! In-memory transport that records every outbound action.
//!
//! Serves seeded group metadata, group membership, media and contact names,
//! and keeps an ordered log of what the agent sent. Used by the fixture
//! replay binary and as the test double across the workspace.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::inbound::{MediaKind, MediaMessage};
use crate::outbound::OutboundContent;
use crate::transport_contract::{MessageRef, MessagingTransport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
/// One action observed by the in-memory transport.
pub enum OutboundRecord {
    Message {
        conversation_id: String,
        message_id: String,
        content: OutboundContent,
    },
    Reaction {
        conversation_id: String,
        message_id: String,
        glyph: String,
    },
    Read {
        messages: Vec<MessageRef>,
    },
    Presence,
    MetadataQuery {
        group_id: String,
    },
    MembershipQuery,
    Download {
        reference: String,
        kind: MediaKind,
    },
}

#[derive(Debug, Default)]
struct Seeds {
    groups: BTreeMap<String, Value>,
    media: BTreeMap<String, Vec<u8>>,
    contacts: BTreeMap<String, String>,
    failing_groups: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryTransport {
    seeds: Mutex<Seeds>,
    records: Mutex<Vec<OutboundRecord>>,
    next_message_id: AtomicU64,
    fail_reactions: AtomicBool,
    fail_sends: AtomicBool,
    download_delay_ms: AtomicU64,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_group(&self, group_id: impl Into<String>, raw_metadata: Value) {
        self.lock_seeds().groups.insert(group_id.into(), raw_metadata);
    }

    pub fn seed_media(&self, reference: impl Into<String>, bytes: Vec<u8>) {
        self.lock_seeds().media.insert(reference.into(), bytes);
    }

    pub fn seed_contact(&self, id: impl Into<String>, name: impl Into<String>) {
        self.lock_seeds().contacts.insert(id.into(), name.into());
    }

    /// Makes metadata queries for `group_id` fail with `Unavailable`.
    pub fn fail_group_metadata(&self, group_id: impl Into<String>) {
        self.lock_seeds().failing_groups.insert(group_id.into());
    }

    pub fn set_fail_reactions(&self, fail: bool) {
        self.fail_reactions.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_download_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.download_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<OutboundRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(conversation_id, content)` for every delivered message, in order.
    pub fn sent_messages(&self) -> Vec<(String, OutboundContent)> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                OutboundRecord::Message {
                    conversation_id,
                    content,
                    ..
                } => Some((conversation_id, content)),
                _ => None,
            })
            .collect()
    }

    /// Visible text of every delivered message, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent_messages()
            .into_iter()
            .filter_map(|(_, content)| content.visible_text().map(str::to_string))
            .collect()
    }

    /// `(message_id, glyph)` for every delivered reaction.
    pub fn reactions(&self) -> Vec<(String, String)> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                OutboundRecord::Reaction {
                    message_id, glyph, ..
                } => Some((message_id, glyph)),
                _ => None,
            })
            .collect()
    }

    pub fn metadata_queries(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                OutboundRecord::MetadataQuery { group_id } => Some(group_id),
                _ => None,
            })
            .collect()
    }

    pub fn read_receipts(&self) -> Vec<MessageRef> {
        self.records()
            .into_iter()
            .flat_map(|record| match record {
                OutboundRecord::Read { messages } => messages,
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn presence_updates(&self) -> usize {
        self.records()
            .iter()
            .filter(|record| matches!(record, OutboundRecord::Presence))
            .count()
    }

    pub fn clear_records(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, record: OutboundRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    fn lock_seeds(&self) -> std::sync::MutexGuard<'_, Seeds> {
        self.seeds.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessagingTransport for InMemoryTransport {
    async fn send_message(
        &self,
        conversation_id: &str,
        content: OutboundContent,
    ) -> Result<MessageRef, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable);
        }
        let sequence = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message_id = format!("kai-out-{sequence}");
        self.record(OutboundRecord::Message {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.clone(),
            content,
        });
        Ok(MessageRef {
            conversation_id: conversation_id.to_string(),
            message_id,
            from_me: true,
            participant_id: None,
        })
    }

    async fn send_reaction(&self, target: &MessageRef, glyph: &str) -> Result<(), TransportError> {
        if self.fail_reactions.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected {
                operation: "reaction",
                reason: "reactions disabled".to_string(),
            });
        }
        self.record(OutboundRecord::Reaction {
            conversation_id: target.conversation_id.clone(),
            message_id: target.message_id.clone(),
            glyph: glyph.to_string(),
        });
        Ok(())
    }

    async fn query_group_metadata(&self, group_id: &str) -> Result<Value, TransportError> {
        self.record(OutboundRecord::MetadataQuery {
            group_id: group_id.to_string(),
        });
        let seeds = self.lock_seeds();
        if seeds.failing_groups.contains(group_id) {
            return Err(TransportError::Unavailable);
        }
        seeds
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound {
                what: "group",
                id: group_id.to_string(),
            })
    }

    async fn query_group_membership(&self) -> Result<Vec<String>, TransportError> {
        self.record(OutboundRecord::MembershipQuery);
        Ok(self.lock_seeds().groups.keys().cloned().collect())
    }

    async fn download_media(
        &self,
        media: &MediaMessage,
        kind: MediaKind,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(OutboundRecord::Download {
            reference: media.reference.clone(),
            kind,
        });
        let delay_ms = self.download_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        self.lock_seeds()
            .media
            .get(&media.reference)
            .cloned()
            .ok_or_else(|| TransportError::NotFound {
                what: "media",
                id: media.reference.clone(),
            })
    }

    async fn read_messages(&self, messages: &[MessageRef]) -> Result<(), TransportError> {
        self.record(OutboundRecord::Read {
            messages: messages.to_vec(),
        });
        Ok(())
    }

    async fn send_presence_available(&self) -> Result<(), TransportError> {
        self.record(OutboundRecord::Presence);
        Ok(())
    }

    async fn contact_name(&self, id: &str) -> Result<Option<String>, TransportError> {
        Ok(self.lock_seeds().contacts.get(id).cloned())
    }
}
