//! Group-admin commands. All of them are group-scoped.

use serde_json::json;

use crate::{
    domain::Role,
    errors::Error,
    identity::is_group_admin,
    messaging::types::OutgoingText,
    moderation::{issue_warning, WarnReason},
    records::RespondMode,
};

use super::{parse_switch, Command, CommandContext, HandlerFuture};

pub fn commands() -> Vec<Command> {
    vec![
        Command {
            name: "setrules",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Set group rules: setrules <text>",
            handler: set_rules,
        },
        Command {
            name: "rules",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Show group rules",
            handler: rules,
        },
        Command {
            name: "warn",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Warn a user: warn @user [reason]",
            handler: warn,
        },
        Command {
            name: "warns",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Show warns for a user: warns @user",
            handler: warns,
        },
        Command {
            name: "setwarnsthreshold",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Set warns needed for action: setwarnsthreshold <n>",
            handler: set_warn_threshold,
        },
        Command {
            name: "kick",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Kick a user: kick @user (bot needs admin)",
            handler: kick,
        },
        Command {
            name: "welcome",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Toggle welcome messages: welcome on/off",
            handler: welcome,
        },
        Command {
            name: "antilink",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Toggle anti-link: antilink on/off",
            handler: antilink,
        },
        Command {
            name: "antispam",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Toggle anti-spam: antispam on/off",
            handler: antispam,
        },
        Command {
            name: "respondmode",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "When Kai answers here: respondmode mention/always",
            handler: respond_mode,
        },
        Command {
            name: "addbadword",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Block a word in this group: addbadword <word>",
            handler: add_bad_word,
        },
        Command {
            name: "delbadword",
            aliases: &[],
            tier: Role::GroupAdmin,
            description: "Unblock a word in this group: delbadword <word>",
            handler: del_bad_word,
        },
    ]
}

fn usage(ctx: &CommandContext, syntax: &str) -> Error {
    Error::usage(format!("Usage: {}{syntax}", ctx.prefix))
}

fn set_rules(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let text = ctx.rest().to_string();
        if text.is_empty() {
            return Err(usage(ctx, "setrules <rules text>"));
        }
        ctx.state
            .records
            .mutate_group(&ctx.chat, |g| g.rules = text)
            .await;
        ctx.reply("✅ Rules set for this group.").await;
        Ok(())
    })
}

fn rules(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let cfg = ctx.state.records.group(&ctx.chat).await;
        let rules = cfg.rules_text().unwrap_or("No rules set.");
        ctx.reply(format!("📜 Rules:\n{rules}")).await;
        Ok(())
    })
}

fn warn(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let Some(target) = ctx.target() else {
            return Err(usage(ctx, "warn @user [reason]"));
        };
        let reason = ctx.args.iter().skip(1).cloned().collect::<Vec<_>>().join(" ");
        let reason = (!reason.is_empty()).then_some(reason);

        ctx.state
            .records
            .log(
                "warn",
                json!({ "chatId": ctx.chat, "by": ctx.sender, "target": target, "reason": reason }),
            )
            .await;
        issue_warning(&ctx.state, &ctx.chat, &target, WarnReason::Manual { reason }).await;
        Ok(())
    })
}

fn warns(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let Some(target) = ctx.mentioned() else {
            return Err(usage(ctx, "warns @user"));
        };
        let cfg = ctx.state.records.group(&ctx.chat).await;
        let text = OutgoingText::new()
            .text("⚠️ ")
            .mention(&target)
            .text(format!(
                " has {} warns. (threshold {})",
                cfg.warns_for(&target),
                cfg.threshold()
            ));
        ctx.reply(text).await;
        Ok(())
    })
}

fn set_warn_threshold(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let n = ctx
            .args
            .first()
            .and_then(|a| a.parse::<u32>().ok())
            .filter(|n| *n >= 1);
        let Some(n) = n else {
            return Err(usage(ctx, "setwarnsthreshold <n>"));
        };
        ctx.state
            .records
            .mutate_group(&ctx.chat, |g| g.warn_threshold = n)
            .await;
        ctx.reply(format!("✅ Warn threshold set to {n}")).await;
        Ok(())
    })
}

fn kick(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let Some(target) = ctx.mentioned() else {
            return Err(usage(ctx, "kick @user"));
        };

        let state = &ctx.state;
        let bot_is_admin = match state.transport.self_identity() {
            Some(me) => is_group_admin(state.transport.as_ref(), &ctx.chat, &me).await,
            None => false,
        };
        if !bot_is_admin {
            ctx.reply("I need admin to kick. Owner has been notified.")
                .await;
            state
                .notify_owners(format!(
                    "⚠️ Kick of {target} requested in group {} but the bot is not admin.",
                    ctx.chat
                ))
                .await;
            return Ok(());
        }

        match state
            .transport
            .remove_participants(&ctx.chat, std::slice::from_ref(&target))
            .await
        {
            Ok(()) => {
                let text = OutgoingText::new()
                    .text("🚫 ")
                    .mention(&target)
                    .text(" kicked.");
                state.send(&ctx.chat, text).await;
            }
            Err(e) => {
                tracing::warn!(chat = %ctx.chat, target = %target, error = %e, "kick failed");
                ctx.reply("⚠️ Kick failed.").await;
            }
        }
        Ok(())
    })
}

async fn toggle(
    ctx: &CommandContext,
    command: &str,
    label: &str,
    apply: impl FnOnce(&mut crate::records::GroupConfig, bool),
) -> crate::Result<()> {
    ctx.require_group()?;
    let Some(on) = parse_switch(ctx.args.first()) else {
        return Err(usage(ctx, &format!("{command} on|off")));
    };
    ctx.state
        .records
        .mutate_group(&ctx.chat, |g| apply(g, on))
        .await;
    let state = if on { "ON" } else { "OFF" };
    ctx.reply(format!("✅ {label} {state}")).await;
    Ok(())
}

fn welcome(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(toggle(ctx, "welcome", "Welcome messages", |g, on| {
        g.welcome = Some(on)
    }))
}

fn antilink(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(toggle(ctx, "antilink", "Antilink", |g, on| {
        g.automod.antilink = Some(on)
    }))
}

fn antispam(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(toggle(ctx, "antispam", "Antispam", |g, on| {
        g.automod.antispam = Some(on)
    }))
}

fn respond_mode(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let mode = match ctx.args.first().map(|a| a.to_lowercase()).as_deref() {
            Some("mention") => RespondMode::Mention,
            Some("always") => RespondMode::Always,
            _ => return Err(usage(ctx, "respondmode mention|always")),
        };
        ctx.state
            .records
            .mutate_group(&ctx.chat, |g| g.respond_mode = Some(mode))
            .await;
        let label = match mode {
            RespondMode::Mention => "only when mentioned or replied to",
            RespondMode::Always => "to every message",
        };
        ctx.reply(format!("✅ Kai now responds {label}.")).await;
        Ok(())
    })
}

fn add_bad_word(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let word = ctx.rest().to_lowercase();
        if word.is_empty() {
            return Err(usage(ctx, "addbadword <word>"));
        }
        let added = ctx
            .state
            .records
            .mutate_group(&ctx.chat, |g| g.bad_words.insert(word.clone()))
            .await;
        let text = if added {
            format!("✅ Added \"{word}\" to this group's blocked words.")
        } else {
            format!("\"{word}\" is already blocked here.")
        };
        ctx.reply(text).await;
        Ok(())
    })
}

fn del_bad_word(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let word = ctx.rest().to_lowercase();
        if word.is_empty() {
            return Err(usage(ctx, "delbadword <word>"));
        }
        let removed = ctx
            .state
            .records
            .mutate_group(&ctx.chat, |g| g.bad_words.remove(&word))
            .await;
        let text = if removed {
            format!("✅ Removed \"{word}\" from this group's blocked words.")
        } else {
            format!("\"{word}\" was not blocked here.")
        };
        ctx.reply(text).await;
        Ok(())
    })
}
