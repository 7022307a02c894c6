//! Authorization gate: sender extraction, alias collapsing and the owner
//! verdict.

use kai_identity::{user_part, IdentityCache};
use kai_transport::InboundEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationVerdict {
    pub raw_sender: String,
    pub resolved_identity: String,
    pub is_owner_privileged: bool,
}

/// Sender identifier of `event`: the participant in groups (falling back to
/// the conversation id), the conversation id otherwise. `None` when the
/// event carries no usable identifier at all.
pub fn raw_sender_id(event: &InboundEvent) -> Option<&str> {
    let participant = event
        .participant_id
        .as_deref()
        .map(str::trim)
        .filter(|participant| !participant.is_empty());
    let conversation = Some(event.conversation_id.trim()).filter(|id| !id.is_empty());
    if event.is_group() {
        participant.or(conversation)
    } else {
        conversation
    }
}

/// Runs the gate for one event. Returns `None` when no reply target exists.
pub fn authorize(
    event: &InboundEvent,
    identities: &IdentityCache,
    owner_identity: Option<&str>,
) -> Option<AuthorizationVerdict> {
    let raw_sender = raw_sender_id(event)?;
    let resolved_identity = identities.resolve(raw_sender);
    let is_owner_privileged = event.is_self_originated
        || owner_identity
            .map(|owner| is_owner_identity(&resolved_identity, owner))
            .unwrap_or(false);
    Some(AuthorizationVerdict {
        raw_sender: raw_sender.to_string(),
        resolved_identity,
        is_owner_privileged,
    })
}

/// Compares the numeric portions of two identifiers. Malformed input on
/// either side is never the owner.
pub fn is_owner_identity(candidate: &str, owner: &str) -> bool {
    match (user_part(candidate), user_part(owner)) {
        (Some(candidate), Some(owner)) => candidate == owner,
        _ => false,
    }
}
