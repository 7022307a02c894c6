//! Built-in command set.

mod broadcast_commands;
mod info_commands;
mod media_commands;
mod settings_commands;

use std::sync::Arc;

use kai_transport::{BestEffort, InboundEvent, OutboundContent};

pub use broadcast_commands::{HideTagCommand, TagAllCommand};
pub use info_commands::{EchoCommand, InfoCommand, MenuCommand, PingCommand, UptimeCommand};
pub use media_commands::{ForwardTarget, SaveCommand, ViewOnceCommand};
pub use settings_commands::{AutoStatusViewCommand, CleanCommand, ModeCommand};

use crate::command_registry::CommandRegistry;
use crate::handler_context::{HandlerContext, HandlerError};
use crate::reactions::ReactionTable;

pub const WELCOME_ASSET: &str = "welcome.jpg";
pub const HIDETAG_ASSET: &str = "hidetag.jpg";

/// Menu sections in display order.
pub const MENU_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "🛠️ Utilities",
        &[
            "menu", "help", "info", "ping", "uptime", "echo", "vv", "vv2", "save", "tagall",
            "hidetag",
        ],
    ),
    ("⚙️ Settings", &["autostatusview", "mode", "clean"]),
];

pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    let menu = Arc::new(MenuCommand);
    registry.register("menu", menu.clone(), "Show this menu", None, false);
    registry.register("help", menu, "Show this menu", None, false);
    registry.register(
        "autostatusview",
        Arc::new(AutoStatusViewCommand),
        "Toggle automatic status viewing",
        Some("on/off"),
        false,
    );
    registry.register("info", Arc::new(InfoCommand), "Show bot information", None, false);
    registry.register("clean", Arc::new(CleanCommand), "Clean auth data", None, true);
    registry.register("ping", Arc::new(PingCommand), "Check if bot is alive", None, false);
    registry.register(
        "echo",
        Arc::new(EchoCommand),
        "Repeat your message",
        Some("<message>"),
        false,
    );
    registry.register("uptime", Arc::new(UptimeCommand), "Show bot uptime", None, false);
    registry.register(
        "mode",
        Arc::new(ModeCommand),
        "Set bot mode",
        Some("public/private"),
        true,
    );
    registry.register(
        "vv",
        Arc::new(ViewOnceCommand::new(ForwardTarget::Conversation)),
        "Forward a view-once message",
        None,
        true,
    );
    registry.register(
        "vv2",
        Arc::new(ViewOnceCommand::new(ForwardTarget::Owner)),
        "Forward a view-once message to the owner",
        None,
        true,
    );
    registry.register(
        "save",
        Arc::new(SaveCommand),
        "Save a replied-to status/message to your DMs",
        None,
        true,
    );
    registry.register("tagall", Arc::new(TagAllCommand), "Tag all group members", None, true);
    registry.register(
        "hidetag",
        Arc::new(HideTagCommand),
        "Send a message to tag all group members secretly",
        Some("[message]"),
        true,
    );
}

pub fn builtin_reactions() -> ReactionTable {
    ReactionTable::from_iter([
        ("menu", "📋"),
        ("help", "❓"),
        ("autostatusview", "👁️"),
        ("info", "ℹ️"),
        ("clean", "🧹"),
        ("ping", "🏓"),
        ("echo", "🔊"),
        ("uptime", "⏱️"),
        ("mode", "🔒"),
        ("vv", "👀"),
        ("vv2", "👀"),
        ("save", "💾"),
        ("tagall", "📣"),
        ("hidetag", "👻"),
    ])
}

/// Sends `text` mentioning the requester, as an image caption when `asset`
/// is available. A failed image send falls back to plain text.
async fn send_card(
    ctx: &HandlerContext,
    event: &InboundEvent,
    text: String,
    asset: &str,
) -> Result<(), HandlerError> {
    let mentions = vec![event.sender_hint().to_string()];
    if let Some(image) = ctx.load_asset(asset).await {
        let sent = ctx
            .send(
                &event.conversation_id,
                OutboundContent::Image {
                    data: image,
                    caption: Some(text.clone()),
                    mentions: mentions.clone(),
                },
            )
            .await
            .best_effort("image card");
        if sent.is_some() {
            return Ok(());
        }
    }
    ctx.send(
        &event.conversation_id,
        OutboundContent::text_with_mentions(text, mentions),
    )
    .await?;
    Ok(())
}
