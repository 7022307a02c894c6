use async_trait::async_trait;
use kai_transport::InboundEvent;

use crate::command_registry::CommandHandler;
use crate::handler_context::{HandlerContext, HandlerError};
use crate::policy_store::BotMode;

/// `mode [public|private]`. Owner gating happens in the dispatcher.
pub struct ModeCommand;

#[async_trait]
impl CommandHandler for ModeCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        args: &[String],
    ) -> Result<(), HandlerError> {
        let prefix = ctx.command_prefix();
        let Some(requested) = args.first() else {
            let current = ctx.policy.mode().as_str().to_uppercase();
            ctx.reply(
                event,
                format!(
                    "*--[ CURRENT MODE ]--*\n*>> {current} <<*\n\
                     In private mode, only you can use commands.\n\
                     Usage: {prefix}mode public/private"
                ),
            )
            .await?;
            return Ok(());
        };
        let Some(mode) = BotMode::parse(requested) else {
            ctx.reply(
                event,
                format!("Invalid mode. Usage: {prefix}mode public/private"),
            )
            .await?;
            return Ok(());
        };
        let state = ctx.policy.set_mode(mode)?;
        tracing::info!(mode = state.mode.as_str(), "bot mode changed");
        ctx.reply(
            event,
            format!(
                "*--[ MODE UPDATE ]--*\n*>> Bot mode set to: [{}] <<*",
                state.mode.as_str().to_uppercase()
            ),
        )
        .await?;
        Ok(())
    }
}

/// `autostatusview [on|off]`. Without a recognized argument it reports the
/// current setting and leaves the settings file alone.
pub struct AutoStatusViewCommand;

#[async_trait]
impl CommandHandler for AutoStatusViewCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        args: &[String],
    ) -> Result<(), HandlerError> {
        let requested = args.first().map(|arg| arg.to_lowercase());
        let text = match requested.as_deref() {
            Some("on") => {
                ctx.policy.set_auto_status_view(true)?;
                "*--[ STATUS UPDATE ]--*\n*>> Auto status viewing: [ENABLED] <<*".to_string()
            }
            Some("off") => {
                ctx.policy.set_auto_status_view(false)?;
                "*--[ STATUS UPDATE ]--*\n*>> Auto status viewing: [DISABLED] <<*".to_string()
            }
            _ => {
                let state = if ctx.policy.auto_status_view_enabled() {
                    "ACTIVE"
                } else {
                    "INACTIVE"
                };
                format!("*--[ STATUS QUERY ]--*\n*>> Auto status viewing is currently: [{state}] <<*")
            }
        };
        ctx.reply(event, text).await?;
        Ok(())
    }
}

/// `clean`: removes the pairing/auth directory so the next start re-pairs.
pub struct CleanCommand;

#[async_trait]
impl CommandHandler for CleanCommand {
    async fn run(
        &self,
        ctx: &HandlerContext,
        event: &InboundEvent,
        _args: &[String],
    ) -> Result<(), HandlerError> {
        let Some(auth_dir) = ctx.auth_dir() else {
            ctx.reply(event, "❌ No authorization directory is configured.")
                .await?;
            return Ok(());
        };
        match tokio::fs::remove_dir_all(auth_dir).await {
            Ok(()) => tracing::info!(path = %auth_dir.display(), "purged auth directory"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %auth_dir.display(), "auth directory already absent")
            }
            Err(error) => return Err(error.into()),
        }
        ctx.reply(
            event,
            "*--[ SYSTEM ALERT ]--*\n*>> Authorization data purged successfully. Please restart the bot and re-pair. <<*",
        )
        .await?;
        Ok(())
    }
}
