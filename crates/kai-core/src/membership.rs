//! Welcome, goodbye, and "bot added" notices for participant events.

use serde_json::json;
use tracing::{info, warn};

use crate::{
    domain::Identity,
    messaging::types::{OutgoingText, ParticipantAction, ParticipantUpdate},
    state::AppState,
};

pub async fn handle_participants(state: &AppState, update: &ParticipantUpdate) {
    let chat = &update.chat_id;
    let me = state.transport.self_identity();

    for who in &update.participants {
        let is_self = me.as_ref() == Some(who);
        match (update.action, is_self) {
            (ParticipantAction::Add, true) => announce_self_added(state, chat).await,
            (ParticipantAction::Remove, true) => {
                info!(chat = %chat, "agent removed from group");
                state
                    .records
                    .log("bot_removed", json!({ "chatId": chat, "by": update.by }))
                    .await;
            }
            (ParticipantAction::Add, false) => welcome(state, chat, who).await,
            (ParticipantAction::Remove, false) => goodbye(state, chat, who).await,
            (ParticipantAction::Promote | ParticipantAction::Demote, _) => {}
        }
    }
}

async fn announce_self_added(state: &AppState, chat: &Identity) {
    match state.transport.group_metadata(chat).await {
        Ok(meta) => {
            let admins = meta
                .admins()
                .iter()
                .map(|a| a.user().to_string())
                .collect::<Vec<_>>();
            let admins = if admins.is_empty() {
                "none".to_string()
            } else {
                admins.join(", ")
            };
            let text = format!(
                "🤖 *Bot added to group*\nName: {}\nID: {}\nMembers: {}\nAdmins: {}",
                meta.subject_or_default(),
                chat,
                meta.participants.len(),
                admins
            );
            state.notify_owners(text).await;
            state
                .records
                .log(
                    "bot_added",
                    json!({
                        "chatId": chat,
                        "subject": meta.subject,
                        "members": meta.participants.len(),
                    }),
                )
                .await;
        }
        Err(e) => {
            warn!(chat = %chat, error = %e, "metadata unavailable for new group");
            state
                .notify_owners(format!("🤖 Bot added to {chat}"))
                .await;
            state
                .records
                .log(
                    "bot_added_fallback",
                    json!({ "chatId": chat, "error": e.to_string() }),
                )
                .await;
        }
    }
}

/// Subject for greeting texts; a failed lookup degrades to a generic name.
async fn subject(state: &AppState, chat: &Identity) -> String {
    match state.transport.group_metadata(chat).await {
        Ok(meta) => meta.subject_or_default().to_string(),
        Err(_) => "this group".to_string(),
    }
}

async fn welcome(state: &AppState, chat: &Identity, who: &Identity) {
    let cfg = state.records.group(chat).await;
    if !cfg.welcome_enabled() {
        return;
    }
    let prefix = state.records.bot_config().await.prefix().to_string();
    let rules = match cfg.rules_text() {
        Some(r) => r.to_string(),
        None => format!("No rules set. Ask an admin to set them with {prefix}setrules."),
    };
    let subject = subject(state, chat).await;

    let text = OutgoingText::new()
        .text("👋 Welcome ")
        .mention(who)
        .text(format!(
            "!\nYou joined *{subject}*.\n\n{rules}\n\nSay hi and type *{prefix}help* to see what I can do."
        ));
    state.send(chat, text).await;
}

async fn goodbye(state: &AppState, chat: &Identity, who: &Identity) {
    if !state.records.group(chat).await.welcome_enabled() {
        return;
    }
    let subject = subject(state, chat).await;
    let text = OutgoingText::new()
        .text("👋 ")
        .mention(who)
        .text(format!(" left *{subject}*. We'll miss you!"));
    state.send(chat, text).await;
}
