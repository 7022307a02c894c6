use async_trait::async_trait;
use kai_identity::{display_handle, parse_group_metadata};
use kai_transport::{InboundEvent, OutboundContent};

use super::HIDETAG_ASSET;
use crate::command_registry::CommandHandler;
use crate::handler_context::{HandlerContext, HandlerError};

pub const GROUP_ONLY_REPLY: &str = "❌ This command can only be used in a group.";

/// Queries the event's group and resolves every participant through the
/// identity cache. Anonymous ids never reach the rendered output unless
/// they have not been observed yet.
async fn resolved_participants(
    ctx: &HandlerContext,
    event: &InboundEvent,
) -> Result<Vec<String>, HandlerError> {
    let raw = ctx
        .transport
        .query_group_metadata(&event.conversation_id)
        .await?;
    let metadata = parse_group_metadata(&raw, &event.conversation_id)?;
    Ok(metadata
        .participant_ids()
        .map(|participant| ctx.resolve(participant))
        .collect())
}

fn message_or(args: &[String], fallback: &str) -> String {
    let message = args.join(" ");
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

/// `tagall [message]`: mentions every participant by handle.
pub struct TagAllCommand;

#[async_trait]
impl CommandHandler for TagAllCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        args: &[String],
    ) -> Result<(), HandlerError> {
        if !event.is_group() {
            ctx.reply(event, GROUP_ONLY_REPLY).await?;
            return Ok(());
        }
        let mentions = resolved_participants(ctx, event).await?;
        let tagged = mentions
            .iter()
            .map(|participant| format!("@{}", display_handle(participant)))
            .collect::<Vec<_>>()
            .join(" ");
        let text = format!(
            "*--[ BROADCAST ALERT ]--*\n*Message: {}*\n\n{tagged}",
            message_or(args, "Attention everyone!")
        );
        ctx.send(
            &event.conversation_id,
            OutboundContent::text_with_mentions(text, mentions),
        )
        .await?;
        Ok(())
    }
}

/// `hidetag [message]`: mentions everyone without rendering the handles.
pub struct HideTagCommand;

#[async_trait]
impl CommandHandler for HideTagCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        args: &[String],
    ) -> Result<(), HandlerError> {
        if !event.is_group() {
            ctx.reply(event, GROUP_ONLY_REPLY).await?;
            return Ok(());
        }
        let mentions = resolved_participants(ctx, event).await?;
        let text = format!(
            "*--[ STEALTH BROADCAST ]--*\n*Message: {}*",
            message_or(args, "🤫 Secret message for the group!")
        );
        let content = match ctx.load_asset(HIDETAG_ASSET).await {
            Some(data) => OutboundContent::Image {
                data,
                caption: Some(text),
                mentions,
            },
            None => OutboundContent::text_with_mentions(text, mentions),
        };
        ctx.send(&event.conversation_id, content).await?;
        ctx.reply(event, "✅ Hidden tag message sent.").await?;
        Ok(())
    }
}
