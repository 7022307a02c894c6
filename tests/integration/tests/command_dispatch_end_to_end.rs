use std::sync::Arc;
use std::time::Duration;

use kai_dispatch::{AgentConfig, KaiAgent, PolicyPatch};
use kai_identity::AliasObservation;
use kai_transport::memory::{InMemoryTransport, OutboundRecord};
use kai_transport::{
    InboundEvent, MediaMessage, MessageContent, OutboundContent, QuotedMessage, TransportEvent,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

const ACCOUNT: &str = "233500000000:4@s.whatsapp.net";
const OWNER: &str = "233500000000@s.whatsapp.net";
const STRANGER: &str = "233511111111@s.whatsapp.net";
const GROUP: &str = "120363000000000042@g.us";

struct Scenario {
    _workspace: TempDir,
    transport: Arc<InMemoryTransport>,
    agent: Arc<KaiAgent>,
}

impl Scenario {
    async fn connected() -> Self {
        let workspace = tempfile::tempdir().expect("tempdir");
        let transport = Arc::new(InMemoryTransport::new());
        let agent = KaiAgent::new(
            AgentConfig {
                settings_path: Some(workspace.path().join("settings.json")),
                presence_interval: Duration::from_secs(3600),
                ..AgentConfig::default()
            },
            transport.clone(),
        )
        .expect("agent");
        let agent = Arc::new(agent);
        agent
            .handle_event(TransportEvent::ConnectionOpen {
                account_id: ACCOUNT.to_string(),
            })
            .await;
        // Presence refresh is not under test here.
        agent.shutdown().await;
        transport.clear_records();
        Self {
            _workspace: workspace,
            transport,
            agent,
        }
    }

    async fn send(&self, event: InboundEvent) {
        self.agent.handle_event(TransportEvent::Message(event)).await;
    }
}

fn text_message(
    id: &str,
    conversation: &str,
    participant: Option<&str>,
    from_me: bool,
    text: &str,
) -> InboundEvent {
    InboundEvent {
        message_id: id.to_string(),
        conversation_id: conversation.to_string(),
        participant_id: participant.map(str::to_string),
        is_self_originated: from_me,
        push_name: None,
        content: MessageContent::text(text),
    }
}

#[tokio::test]
async fn integration_owner_ping_reacts_once_then_replies_twice() {
    let scenario = Scenario::connected().await;
    scenario
        .send(text_message("p1", OWNER, None, false, ".ping"))
        .await;

    let records = scenario.transport.records();
    assert_eq!(records.len(), 3, "unexpected records: {records:?}");
    assert_eq!(
        records[0],
        OutboundRecord::Reaction {
            conversation_id: OWNER.to_string(),
            message_id: "p1".to_string(),
            glyph: "🏓".to_string(),
        }
    );
    let texts = scenario.transport.sent_texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("Pinging"));
    assert!(texts[1].contains("Pong! Latency:"));
}

#[tokio::test]
async fn integration_tagall_outside_group_replies_without_metadata_query() {
    let scenario = Scenario::connected().await;
    scenario
        .send(text_message("t1", OWNER, None, true, ".tagall hello"))
        .await;

    assert_eq!(
        scenario.transport.sent_texts(),
        vec!["❌ This command can only be used in a group.".to_string()]
    );
    assert!(scenario.transport.metadata_queries().is_empty());
}

#[tokio::test]
async fn integration_tagall_renders_resolved_identity_instead_of_anonymous_id() {
    let scenario = Scenario::connected().await;
    scenario.transport.seed_group(
        GROUP,
        json!({"id": GROUP, "participants": [{"id": "123@lid"}, {"id": OWNER}]}),
    );
    scenario
        .agent
        .identities()
        .ingest([AliasObservation::new("123@lid", "9998887777@s.whatsapp.net")]);

    scenario
        .send(text_message("g1", GROUP, Some(OWNER), true, ".tagall"))
        .await;

    let messages = scenario.transport.sent_messages();
    assert_eq!(messages.len(), 1);
    let OutboundContent::Text { text, mentions } = &messages[0].1 else {
        panic!("expected text broadcast, got {:?}", messages[0].1);
    };
    assert!(mentions.contains(&"9998887777@s.whatsapp.net".to_string()));
    assert!(!mentions.iter().any(|mention| mention.starts_with("123")));
    assert!(text.contains("@9998887777"));
    assert!(!text.contains("@123"));
}

#[tokio::test]
async fn integration_private_mode_silences_non_owner_menu() {
    let scenario = Scenario::connected().await;
    scenario
        .send(text_message("m1", OWNER, None, true, ".mode private"))
        .await;
    scenario.transport.clear_records();

    scenario
        .send(text_message("m2", STRANGER, None, false, ".menu"))
        .await;
    assert!(scenario.transport.sent_messages().is_empty());
    assert!(scenario.transport.records().is_empty());
    assert_eq!(scenario.agent.metrics().private_drops, 1);
}

#[tokio::test]
async fn integration_anonymous_owner_in_group_is_privileged_after_metadata_change() {
    let scenario = Scenario::connected().await;
    scenario.transport.seed_group(
        GROUP,
        json!({"id": GROUP, "participants": [
            {"id": "777@lid", "phone_number": OWNER}
        ]}),
    );
    let command = text_message("h1", GROUP, Some("777@lid"), false, ".hidetag ship it");

    scenario.send(command.clone()).await;
    assert_eq!(
        scenario.transport.sent_texts(),
        vec!["❌ This command is for the owner only.".to_string()]
    );

    scenario
        .agent
        .handle_event(TransportEvent::GroupMetadataChanged {
            group_id: GROUP.to_string(),
        })
        .await;
    scenario.transport.clear_records();
    scenario.send(command).await;

    let messages = scenario.transport.sent_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].1.mentions().to_vec(), vec![OWNER.to_string()]);
    assert_eq!(
        messages[1].1.visible_text(),
        Some("✅ Hidden tag message sent.")
    );
}

#[tokio::test]
async fn integration_conflicting_observations_keep_the_latest_mapping() {
    let scenario = Scenario::connected().await;
    for real in ["233520000001@s.whatsapp.net", "233520000002@s.whatsapp.net"] {
        scenario.transport.seed_group(
            GROUP,
            json!({"id": GROUP, "participants": [{"id": "900@lid", "phoneNumber": real}]}),
        );
        scenario
            .agent
            .handle_event(TransportEvent::GroupMetadataChanged {
                group_id: GROUP.to_string(),
            })
            .await;
    }
    assert_eq!(
        scenario.agent.identities().resolve("900@lid"),
        "233520000002@s.whatsapp.net"
    );
}

#[tokio::test(start_paused = true)]
async fn integration_slow_download_does_not_hold_back_later_commands() {
    let scenario = Scenario::connected().await;
    scenario.transport.seed_media("vo-1", vec![1, 2, 3]);
    scenario
        .transport
        .set_download_delay(Duration::from_secs(5));

    let slow = InboundEvent {
        content: MessageContent::QuotedRef {
            text: ".vv".to_string(),
            quoted: QuotedMessage {
                participant_id: Some(STRANGER.to_string()),
                message_id: Some("q1".to_string()),
                content: Box::new(MessageContent::ViewOnce {
                    inner: Box::new(MessageContent::Image(MediaMessage {
                        reference: "vo-1".to_string(),
                        ..MediaMessage::default()
                    })),
                }),
            },
        },
        ..text_message("v1", OWNER, None, true, "")
    };
    let quick = text_message("p2", OWNER, None, true, ".ping");

    let (tx, rx) = mpsc::channel(4);
    let dispatch = scenario.agent.start_dispatch(rx);
    tx.send(TransportEvent::Message(slow)).await.expect("send");
    tx.send(TransportEvent::Message(quick)).await.expect("send");
    drop(tx);
    let report = dispatch.await.expect("dispatch loop");
    assert_eq!(report.events, 2);
    assert_eq!(report.task_failures, 0);

    let texts = scenario.transport.sent_texts();
    let pong = texts
        .iter()
        .position(|text| text.contains("Pong!"))
        .expect("pong");
    let forwarded = texts
        .iter()
        .position(|text| text.contains("View-once message forwarded"))
        .expect("forwarded");
    assert!(pong < forwarded, "reply order: {texts:?}");
}

#[tokio::test]
async fn integration_policy_patch_round_trips_through_agent_surface() {
    let scenario = Scenario::connected().await;
    let state = scenario
        .agent
        .set_policy_state(PolicyPatch {
            auto_status_view_enabled: Some(false),
            ..PolicyPatch::default()
        })
        .expect("patch");
    assert!(!state.auto_status_view_enabled);
    assert_eq!(scenario.agent.policy_state(), state);
    assert_eq!(state.owner_identity.as_deref(), Some(OWNER));
}
