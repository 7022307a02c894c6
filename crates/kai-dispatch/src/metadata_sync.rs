//! Out-of-band feed of the identity cache from group metadata.

use kai_identity::{alias_observations, parse_group_metadata, IdentityCache, IngestReport};
use kai_transport::{MessagingTransport, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataSyncError {
    #[error("group metadata query failed: {0}")]
    Query(#[from] TransportError),
    #[error("group metadata was malformed: {0}")]
    Parse(#[from] kai_identity::MetadataParseError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Totals for one membership sweep.
pub struct GroupSweepReport {
    pub groups_seen: usize,
    pub groups_synced: usize,
    pub groups_failed: usize,
    pub aliases_inserted: usize,
    pub aliases_updated: usize,
}

impl GroupSweepReport {
    fn absorb(&mut self, report: IngestReport) {
        self.groups_synced += 1;
        self.aliases_inserted += report.inserted;
        self.aliases_updated += report.updated;
    }
}

/// Queries one group and ingests the aliases its participants carry.
#[tracing::instrument(skip(transport, identities))]
pub async fn sync_group(
    transport: &dyn MessagingTransport,
    identities: &IdentityCache,
    group_id: &str,
) -> Result<IngestReport, MetadataSyncError> {
    let raw = transport.query_group_metadata(group_id).await?;
    let metadata = parse_group_metadata(&raw, group_id)?;
    let report = identities.ingest(alias_observations(&metadata));
    tracing::debug!(
        participants = metadata.participants.len(),
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        "group metadata ingested"
    );
    Ok(report)
}

/// Syncs every group the account participates in. A failing group is
/// logged and counted; the sweep carries on.
#[tracing::instrument(skip_all)]
pub async fn sync_all_groups(
    transport: &dyn MessagingTransport,
    identities: &IdentityCache,
) -> Result<GroupSweepReport, TransportError> {
    let groups = transport.query_group_membership().await?;
    let mut sweep = GroupSweepReport {
        groups_seen: groups.len(),
        ..GroupSweepReport::default()
    };
    for group_id in &groups {
        match sync_group(transport, identities, group_id).await {
            Ok(report) => sweep.absorb(report),
            Err(error) => {
                sweep.groups_failed += 1;
                tracing::warn!(group_id = %group_id, error = %error, "group metadata sync failed");
            }
        }
    }
    tracing::info!(
        groups = sweep.groups_seen,
        synced = sweep.groups_synced,
        failed = sweep.groups_failed,
        aliases = sweep.aliases_inserted + sweep.aliases_updated,
        "group metadata sweep finished"
    );
    Ok(sweep)
}
