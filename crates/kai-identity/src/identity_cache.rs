//! Anonymous-to-real identity aliasing.
//!
//! The cache is fed out of band by group-metadata observations and read
//! synchronously during dispatch. Lookups never block on ingestion: an id
//! that has not been observed yet resolves to itself.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::jid::is_anonymous_id;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// One `(anonymous id, real id)` pair seen in group metadata. Either side may
/// be missing when the transport omitted it.
pub struct AliasObservation {
    pub anonymous_id: Option<String>,
    pub real_id: Option<String>,
}

impl AliasObservation {
    pub fn new(anonymous_id: impl Into<String>, real_id: impl Into<String>) -> Self {
        Self {
            anonymous_id: Some(anonymous_id.into()),
            real_id: Some(real_id.into()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Outcome counts for one `ingest` call.
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
/// Process-wide alias map shared by the dispatcher, handlers and the
/// metadata sync task. Cloning shares the same underlying map.
pub struct IdentityCache {
    aliases: Arc<RwLock<HashMap<String, String>>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the real identity recorded for `id`, or `id` itself.
    pub fn resolve(&self, id: &str) -> String {
        let aliases = self.aliases.read().unwrap_or_else(PoisonError::into_inner);
        aliases
            .get(id.trim())
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Upserts every well-formed observation. Conflicting observations for
    /// an already-known anonymous id overwrite the earlier mapping.
    pub fn ingest<I>(&self, observations: I) -> IngestReport
    where
        I: IntoIterator<Item = AliasObservation>,
    {
        let mut report = IngestReport::default();
        let mut aliases = self.aliases.write().unwrap_or_else(PoisonError::into_inner);
        for observation in observations {
            let (Some(anonymous_id), Some(real_id)) = (
                observation.anonymous_id.as_deref().map(str::trim),
                observation.real_id.as_deref().map(str::trim),
            ) else {
                report.skipped += 1;
                continue;
            };
            if real_id.is_empty() || !is_anonymous_id(anonymous_id) {
                report.skipped += 1;
                continue;
            }

            match aliases.insert(anonymous_id.to_string(), real_id.to_string()) {
                None => {
                    report.inserted += 1;
                    tracing::debug!(anonymous_id, real_id, "identity alias recorded");
                }
                Some(previous) if previous == real_id => report.unchanged += 1,
                Some(previous) => {
                    report.updated += 1;
                    tracing::warn!(
                        anonymous_id,
                        previous = previous.as_str(),
                        real_id,
                        "conflicting identity alias observed; keeping latest"
                    );
                }
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.aliases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every alias. Debug and test hook only.
    pub fn purge(&self) {
        self.aliases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::{AliasObservation, IdentityCache, IngestReport};

    #[test]
    fn unit_resolve_returns_input_for_unknown_ids() {
        let cache = IdentityCache::new();
        assert_eq!(cache.resolve("123@lid"), "123@lid");
        assert_eq!(
            cache.resolve("233500000000@s.whatsapp.net"),
            "233500000000@s.whatsapp.net"
        );
        assert_eq!(cache.resolve(""), "");
    }

    #[test]
    fn unit_ingest_then_resolve_returns_real_identity() {
        let cache = IdentityCache::new();
        let report = cache.ingest([AliasObservation::new("123@lid", "9998887777@s.whatsapp.net")]);
        assert_eq!(
            report,
            IngestReport {
                inserted: 1,
                ..IngestReport::default()
            }
        );
        assert_eq!(cache.resolve("123@lid"), "9998887777@s.whatsapp.net");
    }

    #[test]
    fn functional_ingest_is_last_write_wins_without_history() {
        let cache = IdentityCache::new();
        cache.ingest([AliasObservation::new("123@lid", "111@s.whatsapp.net")]);
        let report = cache.ingest([AliasObservation::new("123@lid", "222@s.whatsapp.net")]);
        assert_eq!(report.updated, 1);
        assert_eq!(cache.resolve("123@lid"), "222@s.whatsapp.net");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn functional_ingest_skips_malformed_observations_silently() {
        let cache = IdentityCache::new();
        let report = cache.ingest([
            AliasObservation {
                anonymous_id: None,
                real_id: Some("111@s.whatsapp.net".to_string()),
            },
            AliasObservation {
                anonymous_id: Some("123@lid".to_string()),
                real_id: None,
            },
            AliasObservation::new("123@lid", "   "),
            AliasObservation::new("233500000000@s.whatsapp.net", "111@s.whatsapp.net"),
        ]);
        assert_eq!(report.skipped, 4);
        assert!(cache.is_empty());
    }

    #[test]
    fn functional_repeated_ingest_is_idempotent() {
        let cache = IdentityCache::new();
        let batch = vec![
            AliasObservation::new("1@lid", "10@s.whatsapp.net"),
            AliasObservation::new("2@lid", "20@s.whatsapp.net"),
        ];
        cache.ingest(batch.clone());
        let report = cache.ingest(batch);
        assert_eq!(report.unchanged, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn integration_clones_share_the_same_alias_map() {
        let cache = IdentityCache::new();
        let reader = cache.clone();
        cache.ingest([AliasObservation::new("7@lid", "70@s.whatsapp.net")]);
        assert_eq!(reader.resolve("7@lid"), "70@s.whatsapp.net");
        reader.purge();
        assert_eq!(cache.resolve("7@lid"), "7@lid");
    }

    #[test]
    fn regression_concurrent_conflicting_ingest_settles_on_one_observed_value() {
        let cache = Arc::new(IdentityCache::new());
        let writers = (0..8)
            .map(|index| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..100 {
                        cache.ingest([AliasObservation::new(
                            "42@lid",
                            format!("{index}@s.whatsapp.net"),
                        )]);
                    }
                })
            })
            .collect::<Vec<_>>();
        for writer in writers {
            writer.join().expect("writer thread");
        }
        let resolved = cache.resolve("42@lid");
        let observed = (0..8)
            .map(|index| format!("{index}@s.whatsapp.net"))
            .collect::<Vec<_>>();
        assert!(observed.contains(&resolved));
        assert_eq!(cache.len(), 1);
    }
}
