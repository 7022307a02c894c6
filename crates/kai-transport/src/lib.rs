//! Transport contract for the Kai command agent.
//!
//! The messaging transport (session, encryption, wire protocol) lives outside
//! this workspace. This crate pins down what the agent needs from it: the
//! inbound event shapes, the outbound content shapes, and the
//! [`MessagingTransport`] primitives. Content variants are decided once at
//! the adapter boundary so handlers match on explicit tags.
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use kai_transport::{MessageContent, TransportEvent};
//!
//! let raw = r#"{
//!   "event": "message",
//!   "message_id": "3EB0A1",
//!   "conversation_id": "120363000000000001@g.us",
//!   "participant_id": "123@lid",
//!   "content": { "type": "text", "text": ".ping" }
//! }"#;
//!
//! let parsed: TransportEvent = serde_json::from_str(raw)?;
//! let TransportEvent::Message(event) = parsed else {
//!     panic!("expected a message event");
//! };
//! assert!(event.is_group());
//! assert_eq!(event.text_body(), Some(".ping"));
//! assert!(matches!(event.content, MessageContent::Text { .. }));
//! # Ok(())
//! # }
//! ```

pub mod best_effort;
pub mod inbound;
pub mod memory;
pub mod outbound;
pub mod transport_contract;

pub use best_effort::*;
pub use inbound::*;
pub use outbound::*;
pub use transport_contract::*;
