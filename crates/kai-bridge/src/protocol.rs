//! Line protocol spoken with the platform sidecar (one JSON object per line).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use kai_core::{
    domain::Identity,
    messaging::types::{InboundMessage, OutgoingText, ParticipantUpdate},
};

/// Lines read from the sidecar.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Session is up and knows the agent's own identity.
    Ready { self_id: Identity },
    Message(InboundMessage),
    Participants(ParticipantUpdate),
    /// Answer to an outbound request.
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Lines written to the sidecar.
#[derive(Debug, Serialize)]
pub struct Request {
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

/// `@user` placeholders in the text plus the identities the sidecar must attach.
pub fn render_text(text: &OutgoingText) -> Value {
    let mut v = json!({
        "text": text.render_plain(),
        "mentions": text.mentions(),
    });
    if let Some(q) = &text.quote {
        v["quoted"] = json!(q);
    }
    v
}
