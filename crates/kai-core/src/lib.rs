//! Low-level helpers shared by the Kai crates.
//!
//! Holds the atomic write used for settings persistence and the clock and
//! uptime helpers used by the informational commands.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp_ms, format_uptime};
