use std::time::Instant;

use async_trait::async_trait;
use kai_core::format_uptime;
use kai_transport::InboundEvent;

use super::{send_card, MENU_CATEGORIES, WELCOME_ASSET};
use crate::command_registry::CommandHandler;
use crate::handler_context::{HandlerContext, HandlerError};

/// `menu` and `help`.
pub struct MenuCommand;

#[async_trait]
impl CommandHandler for MenuCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        _args: &[String],
    ) -> Result<(), HandlerError> {
        send_card(ctx, event, render_menu(ctx), WELCOME_ASSET).await
    }
}

fn render_menu(ctx: &HandlerContext) -> String {
    let prefix = ctx.command_prefix();
    let mut text = format!(
        "*--[ KAI BOT SYSTEM INTERFACE ]--*\n\n\
         *>> SYSTEM STATUS <<*\n\
         ├── Platform: {os} ({arch})\n\
         ├── Process Uptime: {process}\n\
         ├── Bot Uptime: {bot}\n\
         ├── Access Mode: *{mode}*\n\
         └── Command Prefix: *{prefix}*\n\n\
         *>> CURRENT TIMESTAMP <<*\n\
         └── {now}\n\n\
         *>> COMMAND MODULES <<*\n",
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        process = format_uptime(ctx.clock.process_uptime()),
        bot = format_uptime(ctx.clock.connection_uptime()),
        mode = ctx.policy.mode().as_str().to_uppercase(),
        now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
    );
    for (category, names) in MENU_CATEGORIES {
        text.push_str(&format!("\n*--[ {category} ]--*\n"));
        for name in names.iter() {
            let Some(command) = ctx.registry.lookup(name) else {
                continue;
            };
            text.push_str(&format!(
                "├── *{prefix}{name}* - {}\n",
                command.description
            ));
            if let Some(usage) = &command.usage {
                text.push_str(&format!("│   └── Usage: {prefix}{name} {usage}\n"));
            }
        }
    }
    text.push_str("\n*--[ INTERFACE END ]--*");
    text
}

pub struct InfoCommand;

#[async_trait]
impl CommandHandler for InfoCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        _args: &[String],
    ) -> Result<(), HandlerError> {
        let text = format!(
            "*--[ KAI BOT INFORMATION ]--*\n\n\
             ├── *Version*: {version}\n\
             ├── *Platform*: {os} ({arch})\n\
             └── *Commands*: {count}\n\n\
             Type {prefix}menu for all commands",
            version = env!("CARGO_PKG_VERSION"),
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            count = ctx.registry.len(),
            prefix = ctx.command_prefix(),
        );
        send_card(ctx, event, text, WELCOME_ASSET).await
    }
}

pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        _args: &[String],
    ) -> Result<(), HandlerError> {
        let started = Instant::now();
        ctx.reply(
            event,
            "*--[ NETWORK DIAGNOSTIC ]--*\n*>> Pinging remote node... <<*",
        )
        .await?;
        let latency_ms = started.elapsed().as_millis();
        ctx.reply(
            event,
            format!("*--[ NETWORK RESPONSE ]--*\n*>> Pong! Latency: {latency_ms}ms <<*"),
        )
        .await?;
        Ok(())
    }
}

pub struct EchoCommand;

#[async_trait]
impl CommandHandler for EchoCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        args: &[String],
    ) -> Result<(), HandlerError> {
        if args.is_empty() {
            ctx.reply(
                event,
                format!("Usage: {}echo <message>", ctx.command_prefix()),
            )
            .await?;
            return Ok(());
        }
        ctx.reply_mentioning_sender(
            event,
            format!("*--[ ECHO PROTOCOL ]--*\n*>> {} <<*", args.join(" ")),
        )
        .await?;
        Ok(())
    }
}

pub struct UptimeCommand;

#[async_trait]
impl CommandHandler for UptimeCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        _args: &[String],
    ) -> Result<(), HandlerError> {
        ctx.reply_mentioning_sender(
            event,
            format!(
                "*--[ SYSTEM UPTIME ]--*\n├── Bot Uptime: {}\n└── Process Uptime: {}",
                format_uptime(ctx.clock.connection_uptime()),
                format_uptime(ctx.clock.process_uptime()),
            ),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use kai_transport::{MessageContent, OutboundContent};
    use tempfile::tempdir;

    use crate::handlers::test_support::{
        assets_paths, builtin_dispatcher, default_dispatcher, from_owner, message, STRANGER,
    };
    use crate::policy_store::{BotPolicyState, PolicyStore};

    #[tokio::test]
    async fn functional_ping_reacts_then_sends_two_replies() {
        let (transport, dispatcher) = default_dispatcher();
        let outcome = dispatcher.handle(&from_owner(".ping")).await;
        assert_eq!(outcome.reason_code(), "executed");
        assert_eq!(
            transport.reactions(),
            vec![("cmd-1".to_string(), "🏓".to_string())]
        );
        let texts = transport.sent_texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("Pinging"));
        assert!(texts[1].contains("Pong! Latency:"));
    }

    #[tokio::test]
    async fn functional_menu_lists_both_categories_with_usage() {
        let (transport, dispatcher) = default_dispatcher();
        dispatcher
            .handle(&message(STRANGER, None, MessageContent::text(".HELP")))
            .await;
        let messages = transport.sent_messages();
        assert_eq!(messages.len(), 1);
        let (conversation, content) = &messages[0];
        assert_eq!(conversation, STRANGER);
        assert_eq!(content.mentions().to_vec(), vec![STRANGER.to_string()]);
        let text = content.visible_text().expect("menu text");
        assert!(text.contains("🛠️ Utilities"));
        assert!(text.contains("⚙️ Settings"));
        assert!(text.contains("Access Mode: *PUBLIC*"));
        assert!(text.contains("Usage: .mode public/private"));
        assert!(text.contains("*.hidetag* - Send a message to tag all group members secretly"));
    }

    #[tokio::test]
    async fn functional_menu_and_info_use_welcome_image_when_present() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("welcome.jpg"), [0xff_u8, 0xd8]).expect("asset");
        let (transport, dispatcher) = builtin_dispatcher(
            PolicyStore::in_memory(BotPolicyState::default()),
            assets_paths(temp.path().to_path_buf()),
        );
        dispatcher.handle(&from_owner(".menu")).await;
        dispatcher.handle(&from_owner(".info")).await;
        let messages = transport.sent_messages();
        assert_eq!(messages.len(), 2);
        let captions = messages
            .iter()
            .map(|(_, content)| {
                let OutboundContent::Image { data, caption, .. } = content else {
                    panic!("expected image card, got {content:?}");
                };
                assert_eq!(data, &vec![0xff, 0xd8]);
                caption.clone().unwrap_or_default()
            })
            .collect::<Vec<_>>();
        assert!(captions[0].contains("COMMAND MODULES"));
        assert!(captions[1].contains("KAI BOT INFORMATION"));
    }

    #[tokio::test]
    async fn functional_echo_repeats_arguments_or_shows_usage() {
        let (transport, dispatcher) = default_dispatcher();
        dispatcher.handle(&from_owner(".echo")).await;
        dispatcher.handle(&from_owner(".echo hello   there")).await;
        assert_eq!(
            transport.sent_texts(),
            vec![
                "Usage: .echo <message>".to_string(),
                "*--[ ECHO PROTOCOL ]--*\n*>> hello there <<*".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn regression_uptime_reports_zero_bot_uptime_before_connect() {
        let (transport, dispatcher) = default_dispatcher();
        dispatcher.handle(&from_owner(".uptime")).await;
        let texts = transport.sent_texts();
        assert!(texts[0].contains("Bot Uptime: 0d 0h 0m 0s"));
    }
}
