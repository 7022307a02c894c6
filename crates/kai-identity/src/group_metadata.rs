//! Raw group-metadata parsing.
//!
//! Transports hand back group metadata either as a protocol node tree
//! (`{"tag":"group","attrs":{..},"content":[{"tag":"participant",..}]}`,
//! possibly wrapped in an `iq` result) or as a flat record with a
//! `participants` array. Both parse into [`GroupMetadata`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::identity_cache::AliasObservation;
use crate::jid::is_anonymous_id;

#[derive(Debug, Error)]
/// Reasons a raw metadata payload could not be parsed.
pub enum MetadataParseError {
    #[error("group metadata payload has no group node")]
    MissingGroupNode,
    #[error("group metadata payload has no group id")]
    MissingGroupId,
    #[error("group metadata record is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A group member as reported by the transport. `id` may be anonymous.
pub struct GroupParticipant {
    pub id: String,
    #[serde(default, alias = "phoneNumber")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub admin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Parsed group metadata.
pub struct GroupMetadata {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

#[derive(Debug, Deserialize)]
struct FlatGroupRecord {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    participants: Vec<Value>,
}

impl GroupMetadata {
    pub fn participant_ids(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(|participant| participant.id.as_str())
    }
}

/// Parses a raw metadata payload. `fallback_group_id` fills in the group id
/// when the payload itself does not carry one.
pub fn parse_group_metadata(
    raw: &Value,
    fallback_group_id: &str,
) -> Result<GroupMetadata, MetadataParseError> {
    if raw.get("participants").is_some() {
        let record =
            serde_json::from_value::<FlatGroupRecord>(with_default_id(raw, fallback_group_id))?;
        let id = non_empty(&record.id).ok_or(MetadataParseError::MissingGroupId)?;
        let participants = record
            .participants
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<GroupParticipant>(entry).ok())
            .filter_map(|mut participant| {
                participant.id = non_empty(&participant.id)?;
                Some(participant)
            })
            .collect();
        return Ok(GroupMetadata {
            id,
            subject: record.subject,
            participants,
        });
    }

    let group_node = find_group_node(raw).ok_or(MetadataParseError::MissingGroupNode)?;
    let attrs = group_node.get("attrs");
    let id = attr_str(attrs, "id")
        .map(|id| {
            if id.contains('@') {
                id.to_string()
            } else {
                format!("{id}@g.us")
            }
        })
        .or_else(|| non_empty(fallback_group_id))
        .ok_or(MetadataParseError::MissingGroupId)?;
    let subject = attr_str(attrs, "subject").map(str::to_string);

    let participants = group_node
        .get("content")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter(|child| child.get("tag").and_then(Value::as_str) == Some("participant"))
                .filter_map(|child| {
                    let attrs = child.get("attrs");
                    let id = attr_str(attrs, "jid")?;
                    Some(GroupParticipant {
                        id: id.to_string(),
                        phone_number: attr_str(attrs, "phone_number").map(str::to_string),
                        admin: attr_str(attrs, "type").map(str::to_string),
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(GroupMetadata {
        id,
        subject,
        participants,
    })
}

/// Extracts the alias observations a metadata record carries: every
/// participant listed under an anonymous id together with its phone number.
pub fn alias_observations(metadata: &GroupMetadata) -> Vec<AliasObservation> {
    metadata
        .participants
        .iter()
        .filter(|participant| is_anonymous_id(&participant.id))
        .map(|participant| AliasObservation {
            anonymous_id: Some(participant.id.clone()),
            real_id: participant.phone_number.clone(),
        })
        .collect()
}

fn find_group_node(raw: &Value) -> Option<&Value> {
    match raw.get("tag").and_then(Value::as_str) {
        Some("group") => Some(raw),
        _ => raw
            .get("content")
            .and_then(Value::as_array)?
            .iter()
            .find_map(find_group_node),
    }
}

fn attr_str<'a>(attrs: Option<&'a Value>, key: &str) -> Option<&'a str> {
    attrs?
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn with_default_id(raw: &Value, fallback_group_id: &str) -> Value {
    let mut record = raw.clone();
    if let Value::Object(map) = &mut record {
        map.entry("id")
            .or_insert_with(|| Value::String(fallback_group_id.to_string()));
    }
    record
}
