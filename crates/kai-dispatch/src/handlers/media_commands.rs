use async_trait::async_trait;
use kai_identity::display_handle;
use kai_transport::{
    BestEffort, InboundEvent, MediaKind, MediaMessage, MessageContent, OutboundContent,
};

use crate::command_registry::CommandHandler;
use crate::handler_context::{HandlerContext, HandlerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Where a recovered view-once message is re-sent.
pub enum ForwardTarget {
    Conversation,
    Owner,
}

/// `vv` and `vv2`: re-send the media inside a quoted view-once message.
pub struct ViewOnceCommand {
    target: ForwardTarget,
}

impl ViewOnceCommand {
    pub fn new(target: ForwardTarget) -> Self {
        Self { target }
    }

    fn command_name(&self) -> &'static str {
        match self.target {
            ForwardTarget::Conversation => "vv",
            ForwardTarget::Owner => "vv2",
        }
    }
}

#[async_trait]
impl CommandHandler for ViewOnceCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        _args: &[String],
    ) -> Result<(), HandlerError> {
        let inner = match event.quoted().map(|quoted| quoted.content.as_ref()) {
            Some(MessageContent::ViewOnce { inner }) => inner.as_ref(),
            _ => {
                ctx.reply(
                    event,
                    "❌ Please reply to a view-once message to use this command.",
                )
                .await?;
                return Ok(());
            }
        };
        let target = match self.target {
            ForwardTarget::Conversation => Some(event.conversation_id.clone()),
            ForwardTarget::Owner => ctx.owner_identity(),
        };
        let Some(target) = target else {
            ctx.reply(event, "❌ Could not determine where to send the message.")
                .await?;
            return Ok(());
        };

        let content = match inner.media() {
            Some((kind, media)) if kind != MediaKind::Sticker => {
                let data = ctx.transport.download_media(media, kind).await?;
                let label = format!("DECRYPTED {}", kind.as_str().to_uppercase());
                let caption = labelled(&label, media.caption.as_deref());
                media_content(kind, media, data, Some(caption))
            }
            _ => match inner.text_body() {
                Some(text) => OutboundContent::text(labelled("DECRYPTED MESSAGE", Some(text))),
                None => {
                    return Err(HandlerError::UnsupportedContent {
                        command: self.command_name(),
                        kind: inner.kind_name().to_string(),
                    })
                }
            },
        };
        ctx.send(&target, content).await?;
        ctx.reply(event, "✅ View-once message forwarded.").await?;
        Ok(())
    }
}

/// Re-sendable content for downloaded `media`. Audio and stickers carry no
/// caption.
fn media_content(
    kind: MediaKind,
    media: &MediaMessage,
    data: Vec<u8>,
    caption: Option<String>,
) -> OutboundContent {
    match kind {
        MediaKind::Image => OutboundContent::Image {
            data,
            caption,
            mentions: Vec::new(),
        },
        MediaKind::Video => OutboundContent::Video {
            data,
            mimetype: media.mimetype.clone(),
            caption,
            gif_playback: media.gif_playback,
        },
        MediaKind::Audio => OutboundContent::Audio {
            data,
            mimetype: media.mimetype.clone(),
            ptt: media.ptt,
        },
        MediaKind::Sticker => OutboundContent::Sticker { data },
    }
}

fn labelled(label: &str, body: Option<&str>) -> String {
    format!("*--[ {label} ]--*\n{}", body.unwrap_or_default())
}

/// `save`: forwards the quoted message to the owner's direct chat.
pub struct SaveCommand;

#[async_trait]
impl CommandHandler for SaveCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        _args: &[String],
    ) -> Result<(), HandlerError> {
        let Some(quoted) = event.quoted() else {
            ctx.reply(event, "❌ Please reply to a status or message to save it.")
                .await?;
            return Ok(());
        };
        let Some(owner) = ctx.owner_identity() else {
            ctx.reply(event, "❌ Owner JID not configured. Cannot save message.")
                .await?;
            return Ok(());
        };

        let source = match quoted.participant_id.as_deref() {
            Some(participant) => source_name(ctx, participant).await,
            None => "Unknown".to_string(),
        };
        let header = format!("*--[ ARCHIVED DATA ]--*\n*Source: {source}*");
        let with_header = |body: Option<&str>| {
            format!("{header}\n\n{}", body.unwrap_or_default())
                .trim()
                .to_string()
        };

        let content = quoted.content.as_ref();
        if let Some(text) = content.text_body() {
            ctx.send(&owner, OutboundContent::text(with_header(Some(text))))
                .await?;
        } else if let Some((kind, media)) = content.media() {
            let data = ctx.transport.download_media(media, kind).await?;
            let caption = with_header(media.caption.as_deref());
            ctx.send(&owner, media_content(kind, media, data, Some(caption)))
                .await?;
            if matches!(kind, MediaKind::Audio | MediaKind::Sticker) {
                ctx.send(&owner, OutboundContent::text(header.clone())).await?;
            }
        } else {
            ctx.reply(
                event,
                format!(
                    "❌ Saving this type of message ({}) is not yet supported.",
                    content.kind_name()
                ),
            )
            .await?;
            return Ok(());
        }
        ctx.reply(event, "✅ Saved to your DMs!").await?;
        Ok(())
    }
}

/// Contact name when the transport knows one, else the resolved handle.
async fn source_name(ctx: &HandlerContext, participant: &str) -> String {
    let resolved = ctx.resolve(participant);
    let contact = ctx
        .transport
        .contact_name(&resolved)
        .await
        .best_effort("contact name lookup")
        .flatten()
        .filter(|name| !name.trim().is_empty());
    contact.unwrap_or_else(|| display_handle(&resolved))
}
