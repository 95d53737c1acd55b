//! Member-tier commands.

use crate::{
    domain::Role,
    messaging::types::OutgoingText,
    utils::format_duration,
};

use super::{Command, CommandContext, HandlerFuture};

pub fn commands() -> Vec<Command> {
    vec![
        Command {
            name: "help",
            aliases: &[],
            tier: Role::Member,
            description: "Show this help menu",
            handler: help,
        },
        Command {
            name: "profile",
            aliases: &["me"],
            tier: Role::Member,
            description: "Show your (or a mentioned user's) contact info",
            handler: profile,
        },
        Command {
            name: "ping",
            aliases: &[],
            tier: Role::Member,
            description: "Pong/ping",
            handler: ping,
        },
        Command {
            name: "uptime",
            aliases: &[],
            tier: Role::Member,
            description: "Bot uptime",
            handler: uptime,
        },
        Command {
            name: "version",
            aliases: &[],
            tier: Role::Member,
            description: "Bot version",
            handler: version,
        },
        Command {
            name: "kaion",
            aliases: &[],
            tier: Role::Member,
            description: "Enable Kai replies for you in this group",
            handler: kai_on,
        },
        Command {
            name: "kaioff",
            aliases: &[],
            tier: Role::Member,
            description: "Disable Kai replies for you in this group",
            handler: kai_off,
        },
        Command {
            name: "kaistatus",
            aliases: &["kai", "kstatus"],
            tier: Role::Member,
            description: "Show whether Kai is ON/OFF for you in this group",
            handler: kai_status,
        },
    ]
}

fn help(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let text = ctx
            .state
            .commands
            .render_help(ctx.role, &ctx.prefix, &ctx.state.cfg.bot_name);
        ctx.reply(text).await;
        Ok(())
    })
}

fn profile(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let target = ctx.mentioned().unwrap_or_else(|| ctx.sender.clone());
        let text = OutgoingText::new()
            .text("👤 Profile\nUser: ")
            .mention(&target)
            .text(format!("\nID: {target}"));
        ctx.reply(text).await;
        Ok(())
    })
}

fn ping(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.reply("🏓 Pong!").await;
        Ok(())
    })
}

fn uptime(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let secs = ctx.state.started_at.elapsed().as_secs();
        ctx.reply(format!("Uptime: {}", format_duration(secs))).await;
        Ok(())
    })
}

fn version(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let cfg = &ctx.state.cfg;
        ctx.reply(format!("{} v{}", cfg.bot_name, cfg.bot_version))
            .await;
        Ok(())
    })
}

fn kai_on(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        ctx.state
            .records
            .set_kai_preference(&ctx.chat, &ctx.sender, true)
            .await;
        ctx.reply("✅ Kai ON for you in this group.").await;
        Ok(())
    })
}

fn kai_off(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        ctx.state
            .records
            .set_kai_preference(&ctx.chat, &ctx.sender, false)
            .await;
        ctx.reply("⛔ Kai OFF for you in this group.").await;
        Ok(())
    })
}

fn kai_status(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let status = match ctx
            .state
            .records
            .kai_preference(&ctx.chat, &ctx.sender)
            .await
        {
            None => "ON (default)",
            Some(true) => "ON",
            Some(false) => "OFF",
        };
        ctx.reply(format!("Kai for you in this group: {status}"))
            .await;
        Ok(())
    })
}
