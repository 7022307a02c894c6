//! One inbound event through the command state machine.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use kai_transport::{BestEffort, InboundEvent};

use crate::authorization::authorize;
use crate::command_registry::normalize_command_name;
use crate::dispatch_metrics::{DispatchCounter, DispatchMetrics, DispatchMetricsSnapshot};
use crate::handler_context::{HandlerContext, HandlerError};
use crate::policy_store::BotMode;
use crate::reactions::ReactionTable;

pub const OWNER_ONLY_REPLY: &str = "❌ This command is for the owner only.";
pub const HANDLER_FAILURE_REPLY: &str = "❌ An error occurred while processing your command";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lower-cased first token. Empty when only the prefix was sent.
    pub name: String,
    pub args: Vec<String>,
}

/// Strips `prefix` from `body` and splits the rest on whitespace runs.
/// Returns `None` when `body` does not start with `prefix`.
pub fn parse_command_line(body: &str, prefix: &str) -> Option<ParsedCommand> {
    let rest = body.strip_prefix(prefix)?;
    let mut tokens = rest.split_whitespace();
    let name = normalize_command_name(tokens.next().unwrap_or_default());
    Some(ParsedCommand {
        name,
        args: tokens.map(str::to_string).collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Terminal state reached by one event.
pub enum DispatchOutcome {
    PrefixMismatch,
    UnknownCommand { command: String },
    NoTarget { command: String },
    OwnerRejected { command: String },
    PrivateDropped { command: String },
    Executed { command: String },
    HandlerFailed { command: String },
}

impl DispatchOutcome {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::PrefixMismatch => "prefix_mismatch",
            Self::UnknownCommand { .. } => "unknown_command",
            Self::NoTarget { .. } => "no_target",
            Self::OwnerRejected { .. } => "owner_rejected",
            Self::PrivateDropped { .. } => "private_dropped",
            Self::Executed { .. } => "executed",
            Self::HandlerFailed { .. } => "handler_failed",
        }
    }
}

/// Runs the command state machine. Nothing escapes [`Dispatcher::handle`]:
/// every path ends in a reply, a silent drop or a logged failure.
#[derive(Debug)]
pub struct Dispatcher {
    context: Arc<HandlerContext>,
    reactions: ReactionTable,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    pub fn new(context: Arc<HandlerContext>, reactions: ReactionTable) -> Self {
        Self {
            context,
            reactions,
            metrics: DispatchMetrics::default(),
        }
    }

    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    pub fn metrics(&self) -> DispatchMetricsSnapshot {
        self.metrics.snapshot()
    }

    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(conversation_id = %event.conversation_id, message_id = %event.message_id)
    )]
    pub async fn handle(&self, event: &InboundEvent) -> DispatchOutcome {
        self.metrics.record(DispatchCounter::Received);
        let ctx = self.context.as_ref();

        let prefix = ctx.policy.command_prefix();
        let Some(parsed) = event
            .text_body()
            .and_then(|body| parse_command_line(body, &prefix))
        else {
            self.metrics.record(DispatchCounter::PrefixMismatch);
            return DispatchOutcome::PrefixMismatch;
        };
        let command = parsed.name.clone();

        self.metrics.record(DispatchCounter::Lookup);
        let Some(definition) = ctx.registry.lookup(&parsed.name) else {
            self.metrics.record(DispatchCounter::UnknownCommand);
            tracing::debug!(command = %command, "ignoring unknown command");
            return DispatchOutcome::UnknownCommand { command };
        };

        self.metrics.record(DispatchCounter::Authorization);
        let owner = ctx.policy.owner_identity();
        let Some(verdict) = authorize(event, &ctx.identities, owner.as_deref()) else {
            self.metrics.record(DispatchCounter::NoTarget);
            tracing::debug!(command = %command, "dropping command without a reply target");
            return DispatchOutcome::NoTarget { command };
        };

        if definition.requires_owner && !verdict.is_owner_privileged {
            self.metrics.record(DispatchCounter::OwnerRejected);
            tracing::info!(
                command = %command,
                sender = %verdict.resolved_identity,
                "rejecting owner-only command"
            );
            ctx.reply(event, OWNER_ONLY_REPLY)
                .await
                .best_effort("owner-only rejection reply");
            return DispatchOutcome::OwnerRejected { command };
        }

        if ctx.policy.mode() == BotMode::Private && !verdict.is_owner_privileged {
            self.metrics.record(DispatchCounter::PrivateDropped);
            tracing::debug!(command = %command, "private mode: dropping non-owner command");
            return DispatchOutcome::PrivateDropped { command };
        }

        if let Some(glyph) = self.reactions.glyph_for(&command) {
            self.metrics.record(DispatchCounter::Reaction);
            ctx.transport
                .send_reaction(&event.message_ref(), glyph)
                .await
                .best_effort("command reaction");
        }

        let run = AssertUnwindSafe(definition.handler.run(ctx, event, &parsed.args));
        let result = match run.catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::Panicked(panic_message(&*payload))),
        };
        match result {
            Ok(()) => {
                self.metrics.record(DispatchCounter::Execution);
                DispatchOutcome::Executed { command }
            }
            Err(error) => {
                self.metrics.record(DispatchCounter::HandlerError);
                tracing::warn!(
                    command = %command,
                    error = %error_chain(&error),
                    "command handler failed"
                );
                ctx.reply(event, HANDLER_FAILURE_REPLY)
                    .await
                    .best_effort("handler failure reply");
                DispatchOutcome::HandlerFailed { command }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
