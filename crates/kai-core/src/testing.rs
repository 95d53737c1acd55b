//! In-crate fakes shared by the unit tests.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    commands::CommandRegistry,
    config::Config,
    domain::Identity,
    errors::Error,
    messaging::{
        port::Transport,
        types::{
            GroupMetadata, GroupParticipant, InboundMessage, MessageContent, OutgoingText,
            RoleChange,
        },
    },
    ports::{ReplyClient, ReplyRequest},
    records::{BotConfig, Records},
    state::AppState,
    store::MemoryStore,
    Result,
};

pub const BOT: &str = "999@s.whatsapp.net";
pub const OWNER: &str = "100@s.whatsapp.net";
pub const ADMIN: &str = "200@s.whatsapp.net";
pub const GROUP: &str = "1203630@g.us";

#[derive(Default)]
struct Recorded {
    sent: Vec<(Identity, OutgoingText)>,
    removals: Vec<(Identity, Identity)>,
    additions: Vec<(Identity, Identity)>,
    role_changes: Vec<(Identity, Identity, RoleChange)>,
    groups: HashMap<Identity, GroupMetadata>,
    fail_metadata: bool,
    fail_removals: bool,
    fail_groups: bool,
}

/// Transport that records every outbound call.
pub struct FakeTransport {
    me: Identity,
    inner: Mutex<Recorded>,
}

impl FakeTransport {
    pub fn new(self_id: &str) -> Self {
        Self {
            me: Identity::from(self_id),
            inner: Mutex::new(Recorded::default()),
        }
    }

    fn group_entry<'a>(rec: &'a mut Recorded, chat: &Identity) -> &'a mut GroupMetadata {
        rec.groups
            .entry(chat.clone())
            .or_insert_with(|| GroupMetadata {
                id: chat.clone(),
                subject: None,
                participants: Vec::new(),
            })
    }

    pub fn set_admins(&self, chat: &Identity, admins: &[&Identity]) {
        let mut rec = self.inner.lock().unwrap();
        let meta = Self::group_entry(&mut rec, chat);
        for admin in admins {
            match meta.participants.iter_mut().find(|p| &p.id == *admin) {
                Some(p) => p.admin = true,
                None => meta.participants.push(GroupParticipant {
                    id: (*admin).clone(),
                    admin: true,
                }),
            }
        }
    }

    pub fn set_subject(&self, chat: &Identity, subject: &str) {
        let mut rec = self.inner.lock().unwrap();
        Self::group_entry(&mut rec, chat).subject = Some(subject.to_string());
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.inner.lock().unwrap().fail_metadata = fail;
    }

    pub fn fail_removals(&self, fail: bool) {
        self.inner.lock().unwrap().fail_removals = fail;
    }

    pub fn fail_groups(&self, fail: bool) {
        self.inner.lock().unwrap().fail_groups = fail;
    }

    /// Every send as (chat, rendered text).
    pub fn sent(&self) -> Vec<(Identity, String)> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(chat, t)| (chat.clone(), t.render_plain()))
            .collect()
    }

    pub fn sent_to(&self, chat: &Identity) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == chat)
            .map(|(_, t)| t)
            .collect()
    }

    pub fn last_mentions(&self) -> Vec<Identity> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .last()
            .map(|(_, t)| t.mentions())
            .unwrap_or_default()
    }

    pub fn removals(&self) -> Vec<(Identity, Identity)> {
        self.inner.lock().unwrap().removals.clone()
    }

    pub fn additions(&self) -> Vec<(Identity, Identity)> {
        self.inner.lock().unwrap().additions.clone()
    }

    pub fn role_changes(&self) -> Vec<(Identity, Identity, RoleChange)> {
        self.inner.lock().unwrap().role_changes.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn self_identity(&self) -> Option<Identity> {
        Some(self.me.clone())
    }

    async fn send_text(&self, chat: &Identity, text: OutgoingText) -> Result<()> {
        self.inner.lock().unwrap().sent.push((chat.clone(), text));
        Ok(())
    }

    async fn remove_participants(&self, chat: &Identity, who: &[Identity]) -> Result<()> {
        let mut rec = self.inner.lock().unwrap();
        if rec.fail_removals {
            return Err(Error::External("not-authorized".to_string()));
        }
        for w in who {
            rec.removals.push((chat.clone(), w.clone()));
        }
        Ok(())
    }

    async fn add_participants(&self, chat: &Identity, who: &[Identity]) -> Result<()> {
        let mut rec = self.inner.lock().unwrap();
        for w in who {
            rec.additions.push((chat.clone(), w.clone()));
        }
        Ok(())
    }

    async fn update_participant_role(
        &self,
        chat: &Identity,
        who: &[Identity],
        change: RoleChange,
    ) -> Result<()> {
        let mut rec = self.inner.lock().unwrap();
        for w in who {
            rec.role_changes.push((chat.clone(), w.clone(), change));
        }
        Ok(())
    }

    async fn group_metadata(&self, chat: &Identity) -> Result<GroupMetadata> {
        let rec = self.inner.lock().unwrap();
        if rec.fail_metadata {
            return Err(Error::External("metadata unavailable".to_string()));
        }
        Ok(rec.groups.get(chat).cloned().unwrap_or_else(|| GroupMetadata {
            id: chat.clone(),
            subject: None,
            participants: Vec::new(),
        }))
    }

    async fn participating_groups(&self) -> Result<Vec<GroupMetadata>> {
        let rec = self.inner.lock().unwrap();
        if rec.fail_groups {
            return Err(Error::External("groups unavailable".to_string()));
        }
        let mut groups: Vec<GroupMetadata> = rec.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(groups)
    }
}

enum Answer {
    Text(String),
    Fail,
    /// Never completes; the caller's timeout decides.
    Hang,
}

/// Reply collaborator returning a fixed answer (or error) and recording requests.
pub struct FakeReplies {
    answer: Answer,
    calls: Mutex<Vec<ReplyRequest>>,
}

impl FakeReplies {
    fn with(answer: Answer) -> Self {
        Self {
            answer,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(answer: &str) -> Self {
        Self::with(Answer::Text(answer.to_string()))
    }

    pub fn failing() -> Self {
        Self::with(Answer::Fail)
    }

    pub fn hanging() -> Self {
        Self::with(Answer::Hang)
    }

    pub fn calls(&self) -> Vec<ReplyRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyClient for FakeReplies {
    async fn reply(&self, req: ReplyRequest) -> Result<String> {
        self.calls.lock().unwrap().push(req);
        match &self.answer {
            Answer::Text(t) => Ok(t.clone()),
            Answer::Fail => Err(Error::External("reply service returned 503".to_string())),
            Answer::Hang => std::future::pending().await,
        }
    }
}

pub fn test_config() -> Config {
    Config {
        data_dir: PathBuf::from("/tmp/kai-test-unused"),
        seed_owners: vec![Identity::from(OWNER)],
        seed_prefix: "!".to_string(),
        bot_name: "Kai Bot".to_string(),
        bot_version: "0.0.0-test".to_string(),
        reply_url: "http://127.0.0.1:9/".to_string(),
        reply_timeout: Duration::from_secs(2),
        transport_timeout: Duration::from_secs(2),
        user_server: "s.whatsapp.net".to_string(),
        global_bad_words: Vec::new(),
    }
}

/// App state over a fresh in-memory store with [`OWNER`] as the only owner.
pub async fn test_state(transport: Arc<FakeTransport>, replies: Arc<FakeReplies>) -> AppState {
    let cfg = test_config();
    let seed: BotConfig = cfg.seed_bot_config();
    let records = Records::load(Arc::new(MemoryStore::new()), seed).await;
    AppState::new(
        Arc::new(cfg),
        transport,
        replies,
        Arc::new(records),
        CommandRegistry::builtin().expect("builtin commands"),
    )
}

fn message(chat: &str, sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: Some("msg-1".to_string()),
        chat_id: Identity::from(chat),
        sender_id: Some(Identity::from(sender)),
        content: Some(MessageContent::Plain {
            text: text.to_string(),
        }),
        mentioned_ids: Vec::new(),
        quoted_author_id: None,
        from_self: false,
    }
}

pub fn group_message(sender: &str, text: &str) -> InboundMessage {
    message(GROUP, sender, text)
}

pub fn dm_message(sender: &str, text: &str) -> InboundMessage {
    message(sender, sender, text)
}
