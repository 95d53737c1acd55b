//! Owner-only commands. Replies go to the chat the command came from.

use serde_json::json;
use tracing::{info, warn};

use crate::{
    domain::{Identity, Role},
    errors::Error,
    identity::normalize,
    messaging::types::{OutgoingText, RoleChange},
    utils::truncate_text,
};

use super::{Command, CommandContext, HandlerFuture};

pub fn commands() -> Vec<Command> {
    vec![
        Command {
            name: "forcekick",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: force kick user from group",
            handler: force_kick,
        },
        Command {
            name: "forceadd",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: force add phone number to group (requires bot admin)",
            handler: force_add,
        },
        Command {
            name: "forcepromote",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: promote user",
            handler: force_promote,
        },
        Command {
            name: "forcedemote",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: demote user",
            handler: force_demote,
        },
        Command {
            name: "broadcast",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: broadcast to all groups",
            handler: broadcast,
        },
        Command {
            name: "shutdown",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: shutdown bot",
            handler: shutdown,
        },
        Command {
            name: "setprefix",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: set command prefix: setprefix <char>",
            handler: set_prefix,
        },
        Command {
            name: "getgroups",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: list groups bot is in",
            handler: get_groups,
        },
        Command {
            name: "getgroupinfo",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: get group metadata: getgroupinfo <groupId>",
            handler: get_group_info,
        },
        Command {
            name: "ban",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: ignore a user everywhere: ban @user",
            handler: ban,
        },
        Command {
            name: "unban",
            aliases: &[],
            tier: Role::Owner,
            description: "Owner only: lift a global ban: unban @user",
            handler: unban,
        },
    ]
}

fn usage(ctx: &CommandContext, syntax: &str) -> Error {
    Error::usage(format!("Usage: {}{syntax}", ctx.prefix))
}

fn force_kick(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let Some(target) = ctx.mentioned() else {
            return Err(usage(ctx, "forcekick @user"));
        };
        match ctx
            .state
            .transport
            .remove_participants(&ctx.chat, std::slice::from_ref(&target))
            .await
        {
            Ok(()) => {
                let text = OutgoingText::new()
                    .text("✅ ")
                    .mention(&target)
                    .text(" removed by owner.");
                ctx.state.send(&ctx.chat, text).await;
            }
            Err(e) => {
                warn!(chat = %ctx.chat, target = %target, error = %e, "forcekick failed");
                ctx.reply("⚠️ forcekick failed. Ensure bot is admin.").await;
            }
        }
        Ok(())
    })
}

fn force_add(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.require_group()?;
        let number = ctx
            .args
            .first()
            .map(|a| a.trim_start_matches('+'))
            .filter(|a| !a.is_empty() && a.chars().all(|c| c.is_ascii_digit()));
        let Some(number) = number else {
            return Err(usage(ctx, "forceadd <number_without_plus>"));
        };
        let who = normalize(&format!("{number}@{}", ctx.state.cfg.user_server));
        match ctx
            .state
            .transport
            .add_participants(&ctx.chat, std::slice::from_ref(&who))
            .await
        {
            Ok(()) => ctx.reply(format!("✅ Added {number}")).await,
            Err(e) => {
                warn!(chat = %ctx.chat, who = %who, error = %e, "forceadd failed");
                ctx.reply("⚠️ forceadd failed. Ensure bot/admin permissions.")
                    .await;
            }
        }
        Ok(())
    })
}

async fn change_role(ctx: &CommandContext, change: RoleChange) -> crate::Result<()> {
    let (command, done, failed) = match change {
        RoleChange::Promote => ("forcepromote", " promoted.", "⚠️ promote failed."),
        RoleChange::Demote => ("forcedemote", " demoted.", "⚠️ demote failed."),
    };
    ctx.require_group()?;
    let Some(target) = ctx.mentioned() else {
        return Err(usage(ctx, &format!("{command} @user")));
    };
    match ctx
        .state
        .transport
        .update_participant_role(&ctx.chat, std::slice::from_ref(&target), change)
        .await
    {
        Ok(()) => {
            let text = OutgoingText::new().text("✅ ").mention(&target).text(done);
            ctx.state.send(&ctx.chat, text).await;
        }
        Err(e) => {
            warn!(chat = %ctx.chat, target = %target, ?change, error = %e, "role change failed");
            ctx.reply(failed).await;
        }
    }
    Ok(())
}

fn force_promote(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(change_role(ctx, RoleChange::Promote))
}

fn force_demote(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(change_role(ctx, RoleChange::Demote))
}

fn broadcast(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let body = ctx.rest().to_string();
        if body.is_empty() {
            return Err(usage(ctx, "broadcast <text>"));
        }
        let groups = ctx.state.transport.participating_groups().await?;
        let text = format!("📢 *Broadcast from Owner*\n\n{body}");

        let mut delivered = 0usize;
        for group in &groups {
            if ctx.state.send(&group.id, text.as_str()).await {
                delivered += 1;
            }
        }
        info!(delivered, total = groups.len(), "broadcast finished");
        ctx.state
            .records
            .log(
                "broadcast",
                json!({
                    "by": ctx.sender,
                    "text": truncate_text(&body, 500),
                    "delivered": delivered,
                    "total": groups.len(),
                }),
            )
            .await;
        ctx.reply(format!(
            "📢 Broadcast finished ({delivered}/{} groups).",
            groups.len()
        ))
        .await;
        Ok(())
    })
}

fn shutdown(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        info!(by = %ctx.sender, "shutdown requested");
        ctx.reply("Shutting down (owner requested).").await;
        ctx.state.shutdown.cancel();
        Ok(())
    })
}

fn set_prefix(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let mut chars = ctx.args.first().map(|a| a.chars()).into_iter().flatten();
        let prefix = match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_whitespace() => c.to_string(),
            _ => return Err(usage(ctx, "setprefix <char>")),
        };
        ctx.state
            .records
            .mutate_bot_config(|b| b.prefix = prefix.clone())
            .await;
        ctx.reply(format!("Prefix changed to {prefix}")).await;
        Ok(())
    })
}

fn get_groups(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let groups = ctx.state.transport.participating_groups().await?;
        let list = groups
            .iter()
            .map(|g| {
                let subject = g.subject.as_deref().unwrap_or("no-name");
                format!("{} ({subject})", g.id)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let list = if list.is_empty() {
            "No groups".to_string()
        } else {
            list
        };
        ctx.reply(format!("Groups:\n{list}")).await;
        Ok(())
    })
}

fn get_group_info(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let Some(gid) = ctx.args.first().map(|a| Identity::from(a.as_str())) else {
            return Err(usage(ctx, "getgroupinfo <groupId>"));
        };
        match ctx.state.transport.group_metadata(&gid).await {
            Ok(meta) => {
                ctx.reply(format!(
                    "Group: {}\nID: {gid}\nMembers: {}\nAdmins: {}",
                    meta.subject_or_default(),
                    meta.participants.len(),
                    meta.admins().len()
                ))
                .await;
            }
            Err(e) => {
                warn!(chat = %gid, error = %e, "getgroupinfo failed");
                ctx.reply("Failed to fetch metadata.").await;
            }
        }
        Ok(())
    })
}

fn ban(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let Some(target) = ctx.target() else {
            return Err(usage(ctx, "ban @user"));
        };
        let outcome = ctx
            .state
            .records
            .mutate_bot_config(|b| {
                if b.is_owner(&target) {
                    Err(Error::usage("Owners cannot be banned."))
                } else if b.is_banned(&target) {
                    Ok(false)
                } else {
                    b.global_bans.push(target.clone());
                    Ok(true)
                }
            })
            .await?;
        let tail = if outcome {
            " is now ignored by the bot."
        } else {
            " was already banned."
        };
        ctx.reply(OutgoingText::new().text("🔨 ").mention(&target).text(tail))
            .await;
        Ok(())
    })
}

fn unban(ctx: &CommandContext) -> HandlerFuture<'_> {
    Box::pin(async move {
        let Some(target) = ctx.target() else {
            return Err(usage(ctx, "unban @user"));
        };
        let removed = ctx
            .state
            .records
            .mutate_bot_config(|b| {
                let before = b.global_bans.len();
                b.global_bans.retain(|id| id != &target);
                before != b.global_bans.len()
            })
            .await;
        let tail = if removed {
            " unbanned."
        } else {
            " was not banned."
        };
        ctx.reply(OutgoingText::new().text("✅ ").mention(&target).text(tail))
            .await;
        Ok(())
    })
}
