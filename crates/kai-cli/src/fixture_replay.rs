//! Replays a JSON fixture of transport events through the agent over the
//! in-memory transport.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use kai_dispatch::{AgentConfig, DispatchMetricsSnapshot, KaiAgent};
use kai_transport::memory::{InMemoryTransport, OutboundRecord};
use kai_transport::TransportEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FIXTURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayFixture {
    pub schema_version: u32,
    /// When set, replay starts with a connection-open for this account.
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub groups: BTreeMap<String, Value>,
    /// Media reference to base64 payload.
    #[serde(default)]
    pub media: BTreeMap<String, String>,
    #[serde(default)]
    pub contacts: BTreeMap<String, String>,
    #[serde(default)]
    pub events: Vec<TransportEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub events: usize,
    pub outbound_records: usize,
    pub dispatch: DispatchMetricsSnapshot,
}

pub fn load_fixture(path: &Path) -> Result<ReplayFixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    let fixture = serde_json::from_str::<ReplayFixture>(&raw)
        .with_context(|| format!("failed to parse fixture {}", path.display()))?;
    if fixture.schema_version != FIXTURE_SCHEMA_VERSION {
        bail!(
            "unsupported fixture schema_version {} (expected {})",
            fixture.schema_version,
            FIXTURE_SCHEMA_VERSION
        );
    }
    Ok(fixture)
}

fn seed_transport(fixture: &ReplayFixture) -> Result<InMemoryTransport> {
    let transport = InMemoryTransport::new();
    for (group_id, metadata) in &fixture.groups {
        transport.seed_group(group_id.clone(), metadata.clone());
    }
    for (reference, encoded) in &fixture.media {
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .with_context(|| format!("fixture media '{reference}' is not valid base64"))?;
        transport.seed_media(reference.clone(), bytes);
    }
    for (id, name) in &fixture.contacts {
        transport.seed_contact(id.clone(), name.clone());
    }
    Ok(transport)
}

/// Runs every fixture event to completion, in order, and returns the
/// recorded outbound actions.
pub async fn replay_fixture(
    fixture: ReplayFixture,
    config: AgentConfig,
) -> Result<(Vec<OutboundRecord>, ReplaySummary)> {
    let transport = Arc::new(seed_transport(&fixture)?);
    let agent = KaiAgent::new(config, transport.clone())?;

    let mut events = Vec::with_capacity(fixture.events.len() + 1);
    if let Some(account_id) = fixture.account_id {
        events.push(TransportEvent::ConnectionOpen { account_id });
    }
    events.extend(fixture.events);

    let event_count = events.len();
    for event in events {
        agent.handle_event(event).await;
    }
    agent.shutdown().await;

    let records = transport.records();
    let summary = ReplaySummary {
        events: event_count,
        outbound_records: records.len(),
        dispatch: agent.metrics(),
    };
    tracing::info!(
        events = summary.events,
        outbound_records = summary.outbound_records,
        executed = summary.dispatch.executions,
        "fixture replay finished"
    );
    Ok((records, summary))
}

pub fn write_records<W: Write>(writer: &mut W, records: &[OutboundRecord]) -> Result<()> {
    for record in records {
        let line = serde_json::to_string(record).context("failed to encode outbound record")?;
        writeln!(writer, "{line}").context("failed to write outbound record")?;
    }
    writer.flush().context("failed to flush outbound records")
}
