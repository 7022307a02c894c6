//! Per-stage counters for the dispatch state machine.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
/// Counters for every stage of the dispatch state machine.
pub struct DispatchMetrics {
    received: AtomicU64,
    prefix_mismatches: AtomicU64,
    lookups: AtomicU64,
    unknown_commands: AtomicU64,
    authorizations: AtomicU64,
    no_target_drops: AtomicU64,
    owner_rejections: AtomicU64,
    private_drops: AtomicU64,
    reactions: AtomicU64,
    executions: AtomicU64,
    handler_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchMetricsSnapshot {
    pub received: u64,
    pub prefix_mismatches: u64,
    pub lookups: u64,
    pub unknown_commands: u64,
    pub authorizations: u64,
    pub no_target_drops: u64,
    pub owner_rejections: u64,
    pub private_drops: u64,
    pub reactions: u64,
    pub executions: u64,
    pub handler_errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchCounter {
    Received,
    PrefixMismatch,
    Lookup,
    UnknownCommand,
    Authorization,
    NoTarget,
    OwnerRejected,
    PrivateDropped,
    Reaction,
    Execution,
    HandlerError,
}

impl DispatchMetrics {
    pub(crate) fn record(&self, counter: DispatchCounter) {
        let slot = match counter {
            DispatchCounter::Received => &self.received,
            DispatchCounter::PrefixMismatch => &self.prefix_mismatches,
            DispatchCounter::Lookup => &self.lookups,
            DispatchCounter::UnknownCommand => &self.unknown_commands,
            DispatchCounter::Authorization => &self.authorizations,
            DispatchCounter::NoTarget => &self.no_target_drops,
            DispatchCounter::OwnerRejected => &self.owner_rejections,
            DispatchCounter::PrivateDropped => &self.private_drops,
            DispatchCounter::Reaction => &self.reactions,
            DispatchCounter::Execution => &self.executions,
            DispatchCounter::HandlerError => &self.handler_errors,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        DispatchMetricsSnapshot {
            received: load(&self.received),
            prefix_mismatches: load(&self.prefix_mismatches),
            lookups: load(&self.lookups),
            unknown_commands: load(&self.unknown_commands),
            authorizations: load(&self.authorizations),
            no_target_drops: load(&self.no_target_drops),
            owner_rejections: load(&self.owner_rejections),
            private_drops: load(&self.private_drops),
            reactions: load(&self.reactions),
            executions: load(&self.executions),
            handler_errors: load(&self.handler_errors),
        }
    }
}
