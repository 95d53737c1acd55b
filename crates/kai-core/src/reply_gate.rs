//! Decides whether free text reaches the reply collaborator, and relays the answer.

use serde_json::json;
use tracing::{debug, warn};

use crate::{
    domain::Identity,
    errors::Error,
    messaging::types::{InboundMessage, OutgoingText},
    ports::ReplyRequest,
    records::RespondMode,
    state::AppState,
    utils::truncate_text,
};

pub const REPLY_FAILURE_TEXT: &str = "⚠️ Error fetching reply from Kai API.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Forward,
    /// Group in `mention` mode and the agent was neither mentioned nor quoted.
    NotAddressed,
    /// The sender switched AI replies off in this chat.
    OptedOut,
    Empty,
    Banned,
}

/// Inputs for [`decide`], gathered from the message and the records.
#[derive(Clone, Debug)]
pub struct GateInput<'a> {
    pub text: &'a str,
    pub is_group: bool,
    pub banned: bool,
    pub respond_mode: RespondMode,
    pub addressed: bool,
    pub preference: Option<bool>,
}

pub fn decide(input: &GateInput<'_>) -> GateDecision {
    if input.banned {
        return GateDecision::Banned;
    }
    if input.is_group {
        if input.respond_mode == RespondMode::Mention && !input.addressed {
            return GateDecision::NotAddressed;
        }
        if input.preference == Some(false) {
            return GateDecision::OptedOut;
        }
    }
    if input.text.trim().is_empty() {
        return GateDecision::Empty;
    }
    GateDecision::Forward
}

/// The agent is mentioned, or the message quotes one of the agent's messages.
pub fn addresses_agent(msg: &InboundMessage, me: Option<&Identity>) -> bool {
    let Some(me) = me else {
        return false;
    };
    msg.mentioned_ids.iter().any(|m| m == me) || msg.quoted_author_id.as_ref() == Some(me)
}

/// Apply the gate and, when eligible, forward to the reply collaborator.
pub async fn run(state: &AppState, msg: &InboundMessage, sender: &Identity) -> GateDecision {
    let chat = &msg.chat_id;
    let is_group = msg.is_group();
    let bot = state.records.bot_config().await;

    let (respond_mode, preference) = if is_group {
        (
            state.records.group(chat).await.respond_mode(),
            state.records.kai_preference(chat, sender).await,
        )
    } else {
        (RespondMode::Always, None)
    };

    let me = state.transport.self_identity();
    let decision = decide(&GateInput {
        text: msg.text(),
        is_group,
        banned: bot.is_banned(sender),
        respond_mode,
        addressed: addresses_agent(msg, me.as_ref()),
        preference,
    });
    if decision != GateDecision::Forward {
        debug!(chat = %chat, sender = %sender, ?decision, "reply gate closed");
        return decision;
    }

    let request = ReplyRequest {
        prompt: msg.text().trim().to_string(),
        person_id: sender.clone(),
        group_id: is_group.then(|| chat.clone()),
    };

    let limit = state.cfg.reply_timeout;
    let answer = match tokio::time::timeout(limit, state.replies.reply(request.clone())).await {
        Ok(r) => r,
        Err(_) => Err(Error::Timeout {
            operation: "reply",
            after: limit,
        }),
    };

    match answer {
        Ok(reply) => {
            state
                .send(
                    chat,
                    OutgoingText::new().text(reply.as_str()).quoting(msg.id.as_deref()),
                )
                .await;
            state
                .records
                .log(
                    "kai_reply",
                    json!({
                        "chatId": chat,
                        "sender": sender,
                        "prompt": request.prompt,
                        "reply": truncate_text(&reply, 500),
                    }),
                )
                .await;
        }
        Err(e) => {
            warn!(chat = %chat, sender = %sender, error = %e, "reply collaborator failed");
            state
                .send(
                    chat,
                    OutgoingText::new()
                        .text(REPLY_FAILURE_TEXT)
                        .quoting(msg.id.as_deref()),
                )
                .await;
            state
                .records
                .log(
                    "kai_error",
                    json!({ "chatId": chat, "sender": sender, "error": e.to_string() }),
                )
                .await;
        }
    }

    decision
}
