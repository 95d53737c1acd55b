//! Automod detectors and the warn/escalation state machine.
//!
//! Detectors run in a fixed order (bad words, links, spam) on non-command group
//! text; the first one that fires consumes the message.

use std::{
    collections::{BTreeSet, HashMap},
    sync::OnceLock,
    time::{Duration, Instant},
};

use regex::Regex;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    domain::Identity,
    identity::is_group_admin,
    messaging::types::{InboundMessage, OutgoingText},
    records::WarnTick,
    state::AppState,
};

/// Two identical messages closer than this count as spam.
pub const SPAM_WINDOW: Duration = Duration::from_millis(5000);
/// Baselines kept before expired ones are swept.
const SPAM_SWEEP_AT: usize = 1024;

/// Which detector consumed a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    BadWord,
    Link,
    Spam,
}

/// Why a warn is being issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WarnReason {
    BadWord,
    Spam,
    Manual { reason: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EscalationOutcome {
    Removed,
    RemovalFailed(String),
    NotAdmin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarnReport {
    pub tick: WarnTick,
    /// Present when the threshold was reached.
    pub escalation: Option<EscalationOutcome>,
}

pub fn contains_bad_word(text: &str, global: &[String], chat: &BTreeSet<String>) -> bool {
    let lower = text.to_lowercase();
    global
        .iter()
        .chain(chat.iter())
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .any(|w| lower.contains(&w.to_lowercase()))
}

pub fn contains_link(text: &str) -> bool {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    LINK_RE
        .get_or_init(|| Regex::new(r"(?i)https?://\S+").expect("valid regex"))
        .is_match(text)
}

/// Last (text, time) seen per (chat, user).
#[derive(Debug, Default)]
pub struct SpamTracker {
    last: HashMap<(Identity, Identity), (String, Instant)>,
}

impl SpamTracker {
    /// Record a message and report whether it repeats the previous one within
    /// [`SPAM_WINDOW`]. The baseline is replaced either way; a first message never
    /// counts as spam.
    pub fn observe_at(
        &mut self,
        chat: &Identity,
        user: &Identity,
        text: &str,
        now: Instant,
    ) -> bool {
        let key = (chat.clone(), user.clone());
        let is_spam = match self.last.get(&key) {
            Some((prev, at)) => prev == text && now.saturating_duration_since(*at) < SPAM_WINDOW,
            None => false,
        };
        self.last.insert(key, (text.to_string(), now));
        if self.last.len() > SPAM_SWEEP_AT {
            // A baseline older than the window can never flag spam again.
            self.last
                .retain(|_, (_, at)| now.saturating_duration_since(*at) < SPAM_WINDOW);
        }
        is_spam
    }
}

/// Run the detectors on a group message. `Some` means the message was consumed.
///
/// Callers hold the chat lock so detectors see a chat's messages in order.
pub async fn moderate(
    state: &AppState,
    msg: &InboundMessage,
    sender: &Identity,
    text: &str,
) -> Option<Violation> {
    let chat = &msg.chat_id;
    let cfg = state.records.group(chat).await;

    if cfg.automod.badwords_active()
        && contains_bad_word(text, &state.cfg.global_bad_words, &cfg.bad_words)
    {
        state
            .records
            .log(
                "automod_badword",
                json!({ "chatId": chat, "sender": sender, "text": text }),
            )
            .await;
        issue_warning(state, chat, sender, WarnReason::BadWord).await;
        return Some(Violation::BadWord);
    }

    if cfg.automod.antilink_active() && contains_link(text) {
        let notice = OutgoingText::new()
            .text("🔗 Links are not allowed in this group.")
            .quoting(msg.id.as_deref());
        state.send(chat, notice).await;
        state
            .records
            .log(
                "antilink",
                json!({ "chatId": chat, "sender": sender, "text": text }),
            )
            .await;
        return Some(Violation::Link);
    }

    if cfg.automod.antispam_active() {
        let is_spam = state
            .spam
            .lock()
            .await
            .observe_at(chat, sender, text, Instant::now());
        if is_spam {
            state
                .records
                .log(
                    "antispam_warn",
                    json!({ "chatId": chat, "sender": sender, "text": text }),
                )
                .await;
            issue_warning(state, chat, sender, WarnReason::Spam).await;
            return Some(Violation::Spam);
        }
    }

    None
}

/// Increment the offender's warn counter, announce it, and escalate at the threshold.
///
/// Shared by the automod detectors and the manual `warn` command.
pub async fn issue_warning(
    state: &AppState,
    chat: &Identity,
    offender: &Identity,
    reason: WarnReason,
) -> WarnReport {
    let tick = state
        .records
        .mutate_group(chat, |g| g.record_warn(offender))
        .await;
    let counter = format!("({}/{})", tick.count, tick.threshold);

    let notice = match &reason {
        WarnReason::BadWord => OutgoingText::new()
            .text("⚠️ ")
            .mention(offender)
            .text(format!(" watch your language. Warning {counter}")),
        WarnReason::Spam => OutgoingText::new()
            .text("⚠️ ")
            .mention(offender)
            .text(format!(" please stop spamming. Warning {counter}")),
        WarnReason::Manual { reason } => {
            let mut t = OutgoingText::new()
                .text("⚠️ ")
                .mention(offender)
                .text(format!(" warned. {counter}"));
            if let Some(r) = reason.as_deref().filter(|r| !r.trim().is_empty()) {
                t = t.text(format!("\nReason: {r}"));
            }
            t
        }
    };
    state.send(chat, notice).await;

    let escalation = if tick.escalate {
        Some(escalate(state, chat, offender).await)
    } else {
        None
    };

    WarnReport { tick, escalation }
}

/// Remove the offender if the agent is an admin of the chat; otherwise (or on
/// failure) notify every owner. The counter was already reset by `record_warn`.
async fn escalate(state: &AppState, chat: &Identity, offender: &Identity) -> EscalationOutcome {
    let bot_is_admin = match state.transport.self_identity() {
        Some(me) => is_group_admin(state.transport.as_ref(), chat, &me).await,
        None => false,
    };
    let outcome = if bot_is_admin {
        match state
            .transport
            .remove_participants(chat, std::slice::from_ref(offender))
            .await
        {
            Ok(()) => EscalationOutcome::Removed,
            Err(e) => EscalationOutcome::RemovalFailed(e.to_string()),
        }
    } else {
        EscalationOutcome::NotAdmin
    };

    match &outcome {
        EscalationOutcome::Removed => {
            info!(chat = %chat, offender = %offender, "removed after reaching warn threshold");
            state
                .send(
                    chat,
                    OutgoingText::new()
                        .text("🚫 ")
                        .mention(offender)
                        .text(" was removed after reaching the warn threshold."),
                )
                .await;
            state
                .records
                .log("autokick", json!({ "chatId": chat, "target": offender }))
                .await;
        }
        EscalationOutcome::RemovalFailed(err) => {
            warn!(chat = %chat, offender = %offender, error = %err, "removal failed");
            state
                .send(
                    chat,
                    OutgoingText::new()
                        .text("⚠️ Couldn't remove ")
                        .mention(offender)
                        .text(". Check my admin status. Owner notified."),
                )
                .await;
            state
                .notify_owners(format!(
                    "⚠️ User {offender} in group {chat} reached the warn threshold but removal failed ({err}). Manual action needed."
                ))
                .await;
            state
                .records
                .log(
                    "escalation_failed",
                    json!({ "chatId": chat, "target": offender, "error": err }),
                )
                .await;
        }
        EscalationOutcome::NotAdmin => {
            state
                .send(
                    chat,
                    OutgoingText::new()
                        .text("⚠️ ")
                        .mention(offender)
                        .text(" reached the warn threshold but I am not an admin. Owner notified."),
                )
                .await;
            state
                .notify_owners(format!(
                    "⚠️ User {offender} in group {chat} reached the warn threshold but the bot is not admin. Manual action needed."
                ))
                .await;
            state
                .records
                .log(
                    "escalation_failed",
                    json!({ "chatId": chat, "target": offender, "error": "bot is not admin" }),
                )
                .await;
        }
    }

    outcome
}
