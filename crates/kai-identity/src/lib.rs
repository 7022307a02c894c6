//! Identity handling for the Kai command agent.
//!
//! Parses transport identifiers, collapses anonymous participant ids onto the
//! real identities observed in group metadata, and extracts those
//! observations from raw metadata payloads.

pub mod group_metadata;
pub mod identity_cache;
pub mod jid;

pub use group_metadata::*;
pub use identity_cache::*;
pub use jid::*;
