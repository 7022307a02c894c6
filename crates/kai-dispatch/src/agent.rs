//! Top-level agent: owns the policy and identity stores and routes every
//! transport event to the dispatcher or a side-channel flow.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kai_identity::{normalize_user_id, IdentityCache};
use kai_transport::{
    BestEffort, InboundEvent, MessagingTransport, OutboundContent, TransportEvent,
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::command_registry::CommandRegistry;
use crate::dispatch_metrics::DispatchMetricsSnapshot;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::handler_context::{HandlerContext, HandlerPaths};
use crate::handlers::{builtin_reactions, register_builtin_commands, WELCOME_ASSET};
use crate::metadata_sync::{sync_all_groups, sync_group};
use crate::policy_store::{BotPolicyState, PolicyPatch, PolicyStore, DEFAULT_COMMAND_PREFIX};
use crate::presence_refresh::{
    start_presence_refresh, PresenceRefreshHandle, DEFAULT_PRESENCE_INTERVAL,
};
use crate::status_viewer::{StatusViewOutcome, StatusViewer};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub command_prefix: String,
    /// Explicit owner. When absent the connected account becomes the owner.
    pub owner_identity: Option<String>,
    pub settings_path: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub auth_dir: Option<PathBuf>,
    pub presence_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            owner_identity: None,
            settings_path: None,
            assets_dir: None,
            auth_dir: None,
            presence_interval: DEFAULT_PRESENCE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
/// Summary returned when the dispatch loop drains.
pub struct DispatchLoopReport {
    pub events: u64,
    pub task_failures: u64,
}

#[derive(Debug)]
pub struct KaiAgent {
    dispatcher: Dispatcher,
    status_viewer: StatusViewer,
    configured_owner: Option<String>,
    presence_interval: Duration,
    presence: Mutex<Option<PresenceRefreshHandle>>,
}

impl KaiAgent {
    /// Builds the agent, loading persisted policy from
    /// `config.settings_path` when one is set.
    pub fn new(config: AgentConfig, transport: Arc<dyn MessagingTransport>) -> Result<Self> {
        let defaults = BotPolicyState {
            command_prefix: config.command_prefix.clone(),
            ..BotPolicyState::default()
        };
        let policy = match &config.settings_path {
            Some(path) => PolicyStore::load(path.clone(), defaults)?,
            None => PolicyStore::in_memory(defaults),
        };
        let configured_owner = config
            .owner_identity
            .as_deref()
            .map(normalize_owner)
            .filter(|owner| !owner.is_empty());
        policy.set_owner_identity(configured_owner.clone());

        let mut registry = CommandRegistry::new();
        register_builtin_commands(&mut registry);
        let context = HandlerContext::new(
            transport,
            Arc::new(policy),
            IdentityCache::new(),
            Arc::new(registry),
            HandlerPaths {
                assets_dir: config.assets_dir,
                auth_dir: config.auth_dir,
            },
        );
        Ok(Self {
            dispatcher: Dispatcher::new(Arc::new(context), builtin_reactions()),
            status_viewer: StatusViewer::new(),
            configured_owner,
            presence_interval: config.presence_interval,
            presence: Mutex::new(None),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn identities(&self) -> &IdentityCache {
        &self.context().identities
    }

    pub fn metrics(&self) -> DispatchMetricsSnapshot {
        self.dispatcher.metrics()
    }

    pub fn set_owner_identity(&self, id: &str) {
        self.context()
            .policy
            .set_owner_identity(Some(normalize_owner(id)));
    }

    pub fn policy_state(&self) -> BotPolicyState {
        self.context().policy.snapshot()
    }

    /// Applies and persists a partial policy update.
    pub fn set_policy_state(&self, patch: PolicyPatch) -> Result<BotPolicyState> {
        self.context().policy.apply(patch)
    }

    pub fn purge_identity_cache(&self) {
        self.context().identities.purge();
    }

    /// Consumes `events` until the sender side closes. Each event runs as
    /// its own task; panics and cancellations are reported in one place.
    pub fn start_dispatch(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) -> JoinHandle<DispatchLoopReport> {
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            let mut report = DispatchLoopReport::default();
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    next = events.recv() => match next {
                        Some(event) => {
                            report.events += 1;
                            let worker = Arc::clone(&agent);
                            in_flight.spawn(async move { worker.handle_event(event).await });
                        }
                        None => break,
                    },
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        record_task_result(joined, &mut report);
                    }
                }
            }
            while let Some(joined) = in_flight.join_next().await {
                record_task_result(joined, &mut report);
            }
            agent.shutdown().await;
            tracing::info!(
                events = report.events,
                task_failures = report.task_failures,
                "dispatch loop drained"
            );
            report
        })
    }

    /// Routes one transport event to completion.
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => {
                self.handle_message(&message).await;
            }
            TransportEvent::ConnectionOpen { account_id } => {
                self.on_connection_open(&account_id).await;
            }
            TransportEvent::GroupMetadataChanged { group_id } => {
                let ctx = self.context();
                if let Err(error) =
                    sync_group(ctx.transport.as_ref(), &ctx.identities, &group_id).await
                {
                    tracing::warn!(
                        group_id = %group_id,
                        error = %error,
                        "group metadata refresh failed"
                    );
                }
            }
            TransportEvent::ConnectionClosed { reason } => {
                tracing::info!(
                    reason = reason.as_deref().unwrap_or("unknown"),
                    "connection closed"
                );
                self.context().clock.mark_disconnected();
                self.stop_presence().await;
            }
        }
    }

    /// Dispatches a message, then marks it read when it is a status update.
    pub async fn handle_message(&self, message: &InboundEvent) -> DispatchOutcome {
        let outcome = self.dispatcher.handle(message).await;
        let ctx = self.context();
        if self
            .status_viewer
            .observe(ctx.transport.as_ref(), &ctx.policy, message)
            .await
            == StatusViewOutcome::Failed
        {
            tracing::debug!(
                message_id = %message.message_id,
                "status read receipt failed"
            );
        }
        outcome
    }

    /// Stops background work started on connection open.
    pub async fn shutdown(&self) {
        self.stop_presence().await;
    }

    async fn on_connection_open(&self, account_id: &str) {
        let ctx = self.context();
        ctx.clock.mark_connected();
        let owner = match &self.configured_owner {
            Some(owner) => owner.clone(),
            None => {
                let owner = normalize_owner(account_id);
                ctx.policy.set_owner_identity(Some(owner.clone()));
                owner
            }
        };
        tracing::info!(owner = %owner, "connection open");

        self.start_presence().await;
        self.send_welcome(&owner).await;
        if let Err(error) = sync_all_groups(ctx.transport.as_ref(), &ctx.identities).await {
            tracing::warn!(error = %error, "group membership query failed");
        }
    }

    async fn send_welcome(&self, owner: &str) {
        let ctx = self.context();
        let name = ctx
            .transport
            .contact_name(owner)
            .await
            .best_effort("owner contact name")
            .flatten()
            .filter(|name| !name.trim().is_empty());
        let greeting = name
            .as_deref()
            .map(|name| format!("@{name}"))
            .unwrap_or_else(|| "there".to_string());
        let mentions = name.map(|_| vec![owner.to_string()]).unwrap_or_default();
        let text = format!(
            "Hey {greeting},\n\n\
             ✅ Kai is now connected and ready to go!\n\n\
             Type {prefix}menu to see all commands\n\
             🔒 Current mode: {mode}",
            prefix = ctx.command_prefix(),
            mode = ctx.policy.mode().as_str().to_uppercase(),
        );
        let content = match ctx.load_asset(WELCOME_ASSET).await {
            Some(data) => OutboundContent::Image {
                data,
                caption: Some(text),
                mentions,
            },
            None => OutboundContent::text_with_mentions(text, mentions),
        };
        ctx.send(owner, content).await.best_effort("welcome message");
    }

    async fn start_presence(&self) {
        let mut presence = self.presence.lock().await;
        if presence.as_ref().is_some_and(PresenceRefreshHandle::is_running) {
            return;
        }
        match start_presence_refresh(Arc::clone(&self.context().transport), self.presence_interval)
        {
            Ok(handle) => *presence = Some(handle),
            Err(error) => tracing::warn!(error = %error, "presence refresh not started"),
        }
    }

    async fn stop_presence(&self) {
        if let Some(mut handle) = self.presence.lock().await.take() {
            handle.shutdown().await;
        }
    }

    fn context(&self) -> &HandlerContext {
        self.dispatcher.context()
    }
}

fn normalize_owner(raw: &str) -> String {
    normalize_user_id(raw).unwrap_or_else(|| raw.trim().to_string())
}

fn record_task_result(joined: Result<(), JoinError>, report: &mut DispatchLoopReport) {
    let Err(error) = joined else {
        return;
    };
    report.task_failures += 1;
    if error.is_panic() {
        tracing::error!(error = %error, "event task panicked");
    } else {
        tracing::warn!(error = %error, "event task cancelled");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kai_transport::memory::InMemoryTransport;
    use kai_transport::{InboundEvent, MessageContent, OutboundContent, TransportEvent};
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    use super::{AgentConfig, KaiAgent};
    use crate::policy_store::{BotMode, PolicyPatch};

    const ACCOUNT: &str = "233500000000:17@s.whatsapp.net";
    const OWNER: &str = "233500000000@s.whatsapp.net";
    const GROUP: &str = "120363000000000001@g.us";

    fn agent_with(config: AgentConfig) -> (Arc<InMemoryTransport>, Arc<KaiAgent>) {
        let transport = Arc::new(InMemoryTransport::new());
        let agent = KaiAgent::new(config, transport.clone()).expect("agent");
        (transport, Arc::new(agent))
    }

    fn text_event(
        id: &str,
        conversation: &str,
        participant: Option<&str>,
        text: &str,
    ) -> InboundEvent {
        InboundEvent {
            message_id: id.to_string(),
            conversation_id: conversation.to_string(),
            participant_id: participant.map(str::to_string),
            is_self_originated: false,
            push_name: None,
            content: MessageContent::text(text),
        }
    }

    #[tokio::test]
    async fn functional_connection_open_sets_owner_welcomes_and_syncs_groups() {
        let (transport, agent) = agent_with(AgentConfig::default());
        transport.seed_group(
            GROUP,
            json!({"id": GROUP, "participants": [
                {"id": "55@lid", "phone_number": OWNER}
            ]}),
        );
        agent
            .handle_event(TransportEvent::ConnectionOpen {
                account_id: ACCOUNT.to_string(),
            })
            .await;

        assert_eq!(agent.policy_state().owner_identity.as_deref(), Some(OWNER));
        let messages = transport.sent_messages();
        assert_eq!(messages[0].0, OWNER);
        let welcome = messages[0].1.visible_text().expect("welcome");
        assert!(welcome.starts_with("Hey there,"));
        assert!(welcome.contains("Current mode: PUBLIC"));
        assert_eq!(agent.identities().resolve("55@lid"), OWNER);
        assert_eq!(transport.metadata_queries(), vec![GROUP.to_string()]);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn functional_configured_owner_survives_connection_open() {
        let (transport, agent) = agent_with(AgentConfig {
            owner_identity: Some("233599999999@c.us".to_string()),
            ..AgentConfig::default()
        });
        transport.seed_contact("233599999999@s.whatsapp.net", "Kofi");
        agent
            .handle_event(TransportEvent::ConnectionOpen {
                account_id: ACCOUNT.to_string(),
            })
            .await;
        assert_eq!(
            agent.policy_state().owner_identity.as_deref(),
            Some("233599999999@s.whatsapp.net")
        );
        let messages = transport.sent_messages();
        let OutboundContent::Text { text, mentions } = &messages[0].1 else {
            panic!("expected text welcome");
        };
        assert!(text.starts_with("Hey @Kofi,"));
        assert_eq!(mentions, &vec!["233599999999@s.whatsapp.net".to_string()]);
        agent.shutdown().await;
    }

    #[tokio::test]
    async fn functional_group_change_refreshes_aliases() {
        let (transport, agent) = agent_with(AgentConfig::default());
        transport.seed_group(
            GROUP,
            json!({"id": GROUP, "participants": [
                {"id": "56@lid", "phoneNumber": "233512345678@s.whatsapp.net"}
            ]}),
        );
        agent
            .handle_event(TransportEvent::GroupMetadataChanged {
                group_id: GROUP.to_string(),
            })
            .await;
        assert_eq!(
            agent.identities().resolve("56@lid"),
            "233512345678@s.whatsapp.net"
        );
        agent.purge_identity_cache();
        assert_eq!(agent.identities().resolve("56@lid"), "56@lid");
    }

    #[tokio::test]
    async fn functional_status_updates_are_viewed_once() {
        let (transport, agent) = agent_with(AgentConfig::default());
        let status = text_event("s1", "status@broadcast", Some(OWNER), "hello");
        agent.handle_message(&status).await;
        agent.handle_message(&status).await;
        assert_eq!(transport.read_receipts().len(), 1);

        agent
            .set_policy_state(PolicyPatch {
                auto_status_view_enabled: Some(false),
                ..PolicyPatch::default()
            })
            .expect("patch");
        agent
            .handle_message(&text_event("s2", "status@broadcast", Some(OWNER), "more"))
            .await;
        assert_eq!(transport.read_receipts().len(), 1);
    }

    #[tokio::test]
    async fn integration_dispatch_loop_drains_every_event() {
        let temp = tempdir().expect("tempdir");
        let (transport, agent) = agent_with(AgentConfig {
            settings_path: Some(temp.path().join("settings.json")),
            presence_interval: Duration::from_secs(3600),
            ..AgentConfig::default()
        });
        let (tx, rx) = mpsc::channel(8);
        let loop_handle = agent.start_dispatch(rx);
        tx.send(TransportEvent::ConnectionOpen {
            account_id: ACCOUNT.to_string(),
        })
        .await
        .expect("send");
        for index in 0..3 {
            tx.send(TransportEvent::Message(text_event(
                &format!("m{index}"),
                "233511111111@s.whatsapp.net",
                None,
                ".echo hi",
            )))
            .await
            .expect("send");
        }
        tx.send(TransportEvent::ConnectionClosed { reason: None })
            .await
            .expect("send");
        drop(tx);

        let report = loop_handle.await.expect("loop");
        assert_eq!(report.events, 5);
        assert_eq!(report.task_failures, 0);
        assert_eq!(agent.metrics().executions, 3);
        let echoes = transport
            .sent_texts()
            .into_iter()
            .filter(|text| text.contains("ECHO PROTOCOL"))
            .count();
        assert_eq!(echoes, 3);
    }

    #[tokio::test]
    async fn integration_private_mode_persists_across_restart() {
        let temp = tempdir().expect("tempdir");
        let config = AgentConfig {
            settings_path: Some(temp.path().join("settings.json")),
            ..AgentConfig::default()
        };
        let (_, agent) = agent_with(config.clone());
        agent
            .set_policy_state(PolicyPatch {
                mode: Some(BotMode::Private),
                ..PolicyPatch::default()
            })
            .expect("patch");
        drop(agent);

        let (transport, restarted) = agent_with(config);
        assert_eq!(restarted.policy_state().mode, BotMode::Private);
        restarted.set_owner_identity(OWNER);
        restarted
            .handle_message(&text_event("m1", "233511111111@s.whatsapp.net", None, ".menu"))
            .await;
        assert!(transport.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn regression_malformed_settings_file_fails_construction() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{\"mode\": ").expect("write");
        let error = KaiAgent::new(
            AgentConfig {
                settings_path: Some(path),
                ..AgentConfig::default()
            },
            Arc::new(InMemoryTransport::new()),
        )
        .expect_err("malformed settings");
        assert!(error.to_string().contains("failed to parse settings file"));
    }
}
