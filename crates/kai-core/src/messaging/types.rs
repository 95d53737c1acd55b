use serde::{Deserialize, Serialize};

use crate::domain::{Identity, MentionToken};

/// Message payload variants delivered by the platform.
///
/// Each variant knows how to yield its plain text; anything the agent does not
/// understand deserializes to [`MessageContent::Unsupported`] and reads as empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Plain { text: String },
    ExtendedText { text: String },
    ImageCaption { caption: Option<String> },
    VideoCaption { caption: Option<String> },
    ButtonReply { selected_id: Option<String> },
    TemplateButtonReply { selected_id: Option<String> },
    ListReply { selected_row_id: Option<String> },
    #[serde(other)]
    Unsupported,
}

impl MessageContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Plain { text } => plain_text(text),
            Self::ExtendedText { text } => extended_text(text),
            Self::ImageCaption { caption } | Self::VideoCaption { caption } => {
                media_caption(caption.as_deref())
            }
            Self::ButtonReply { selected_id } | Self::TemplateButtonReply { selected_id } => {
                button_selection(selected_id.as_deref())
            }
            Self::ListReply { selected_row_id } => list_selection(selected_row_id.as_deref()),
            Self::Unsupported => None,
        }
    }
}

fn plain_text(text: &str) -> Option<&str> {
    Some(text)
}

fn extended_text(text: &str) -> Option<&str> {
    Some(text)
}

fn media_caption(caption: Option<&str>) -> Option<&str> {
    caption
}

fn button_selection(selected_id: Option<&str>) -> Option<&str> {
    selected_id
}

fn list_selection(selected_row_id: Option<&str>) -> Option<&str> {
    selected_row_id
}

/// One inbound chat message.
///
/// Identity fields are normalized at deserialization time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub chat_id: Identity,
    /// Participant in groups; the peer in direct chats. Falls back to `chat_id` when absent.
    #[serde(default)]
    pub sender_id: Option<Identity>,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub mentioned_ids: Vec<Identity>,
    #[serde(default)]
    pub quoted_author_id: Option<Identity>,
    #[serde(default)]
    pub from_self: bool,
}

impl InboundMessage {
    /// Plain text of whichever payload variant is present (empty if none).
    pub fn text(&self) -> &str {
        self.content
            .as_ref()
            .and_then(MessageContent::text)
            .unwrap_or("")
    }

    pub fn sender(&self) -> &Identity {
        self.sender_id.as_ref().unwrap_or(&self.chat_id)
    }

    pub fn is_group(&self) -> bool {
        self.chat_id.is_group()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

/// Membership change in a group chat.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    pub chat_id: Identity,
    pub participants: Vec<Identity>,
    pub action: ParticipantAction,
    #[serde(default)]
    pub by: Option<Identity>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Mention(MentionToken),
}

/// Outgoing text made of plain segments and mention tokens.
///
/// Business logic never writes mention markup itself; the transport decides how a
/// [`MentionToken`] is rendered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingText {
    pub segments: Vec<Segment>,
    /// Id of the inbound message this one replies to (render hint).
    pub quote: Option<String>,
}

impl OutgoingText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            return self;
        }
        match self.segments.last_mut() {
            Some(Segment::Text(prev)) => prev.push_str(&s),
            _ => self.segments.push(Segment::Text(s)),
        }
        self
    }

    pub fn mention(mut self, identity: &Identity) -> Self {
        self.segments.push(Segment::Mention(MentionToken {
            identity: identity.clone(),
        }));
        self
    }

    pub fn quoting(mut self, message_id: Option<&str>) -> Self {
        self.quote = message_id.map(str::to_string);
        self
    }

    /// Distinct identities mentioned, in order of first appearance.
    pub fn mentions(&self) -> Vec<Identity> {
        let mut out: Vec<Identity> = Vec::new();
        for seg in &self.segments {
            if let Segment::Mention(m) = seg {
                if !out.contains(&m.identity) {
                    out.push(m.identity.clone());
                }
            }
        }
        out
    }

    /// Render with `@user` placeholders for mentions.
    pub fn render_plain(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Text(t) => out.push_str(t),
                Segment::Mention(m) => {
                    out.push('@');
                    out.push_str(m.identity.user());
                }
            }
        }
        out
    }
}

impl From<&str> for OutgoingText {
    fn from(s: &str) -> Self {
        Self::new().text(s)
    }
}

impl From<String> for OutgoingText {
    fn from(s: String) -> Self {
        Self::new().text(s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupParticipant {
    pub id: Identity,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: Identity,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

impl GroupMetadata {
    pub fn is_admin(&self, who: &Identity) -> bool {
        self.participants.iter().any(|p| &p.id == who && p.admin)
    }

    pub fn admins(&self) -> Vec<&Identity> {
        self.participants
            .iter()
            .filter(|p| p.admin)
            .map(|p| &p.id)
            .collect()
    }

    pub fn subject_or_default(&self) -> &str {
        self.subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("this group")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleChange {
    Promote,
    Demote,
}
