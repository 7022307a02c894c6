//! Command dispatch for the Kai messaging agent.
//!
//! An inbound event flows through the [`Dispatcher`]: prefix check, command
//! parsing, [`CommandRegistry`] lookup, the authorization gate (which
//! collapses anonymous sender ids through the identity cache), the
//! owner-only and privacy-mode policies, a best-effort reaction and finally
//! the command handler. [`KaiAgent`] wires the dispatcher to the transport
//! event stream together with the out-of-band group-metadata sync, status
//! auto-viewing and presence refresh.

pub mod agent;
pub mod authorization;
pub mod command_registry;
pub mod dispatch_metrics;
pub mod dispatcher;
pub mod handler_context;
pub mod handlers;
pub mod metadata_sync;
pub mod policy_store;
pub mod presence_refresh;
pub mod reactions;
pub mod status_viewer;

pub use agent::*;
pub use authorization::*;
pub use command_registry::*;
pub use dispatch_metrics::*;
pub use dispatcher::*;
pub use handler_context::*;
pub use metadata_sync::*;
pub use policy_store::*;
pub use presence_refresh::*;
pub use reactions::*;
pub use status_viewer::*;
