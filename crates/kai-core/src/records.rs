//! Typed records and the in-memory authority over them.
//!
//! Each record lives behind its own async mutex. `mutate_*` applies the closure and
//! writes the whole record while holding that mutex, so concurrent handlers for the
//! same chat cannot lose each other's updates. A failed write is logged and the
//! in-memory value stays authoritative for the rest of the process.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    domain::Identity,
    event_log::{EventLog, LogEntry},
    store::{RecordKey, RecordStore},
    Result,
};

pub const DEFAULT_WARN_THRESHOLD: u32 = 2;
pub const DEFAULT_PREFIX: &str = "!";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RespondMode {
    /// Reply in groups only when mentioned or quoted.
    #[default]
    Mention,
    /// Reply to every eligible group message.
    Always,
}

/// Automod switches. `None` means "never set" and each detector has its own default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomodFlags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badwords: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antilink: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antispam: Option<bool>,
}

impl AutomodFlags {
    /// On unless explicitly switched off.
    pub fn badwords_active(&self) -> bool {
        self.badwords != Some(false)
    }

    /// Off unless explicitly switched on.
    pub fn antilink_active(&self) -> bool {
        self.antilink == Some(true)
    }

    /// Off unless explicitly switched on.
    pub fn antispam_active(&self) -> bool {
        self.antispam == Some(true)
    }
}

/// Per-chat configuration and warn state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupConfig {
    pub rules: String,
    pub warn_threshold: u32,
    pub automod: AutomodFlags,
    pub warns: BTreeMap<Identity, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respond_mode: Option<RespondMode>,
    pub bad_words: BTreeSet<String>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            rules: String::new(),
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            automod: AutomodFlags::default(),
            warns: BTreeMap::new(),
            welcome: None,
            respond_mode: None,
            bad_words: BTreeSet::new(),
        }
    }
}

/// Result of one warn increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WarnTick {
    /// Count after the increment (before any reset).
    pub count: u32,
    pub threshold: u32,
    /// The threshold was reached: escalate. The stored counter is already back at 0.
    pub escalate: bool,
}

impl GroupConfig {
    /// Effective threshold (always at least 1, whatever the stored value says).
    pub fn threshold(&self) -> u32 {
        self.warn_threshold.max(1)
    }

    pub fn rules_text(&self) -> Option<&str> {
        let r = self.rules.trim();
        (!r.is_empty()).then_some(r)
    }

    pub fn welcome_enabled(&self) -> bool {
        self.welcome != Some(false)
    }

    pub fn respond_mode(&self) -> RespondMode {
        self.respond_mode.unwrap_or_default()
    }

    pub fn warns_for(&self, who: &Identity) -> u32 {
        self.warns.get(who).copied().unwrap_or(0)
    }

    /// Advance the warn counter for `who`.
    ///
    /// The counter resets to 0 in the same step that decides to escalate, whatever
    /// the escalation action later achieves.
    pub fn record_warn(&mut self, who: &Identity) -> WarnTick {
        let threshold = self.threshold();
        let count = self.warns_for(who).saturating_add(1);
        let escalate = count >= threshold;
        self.warns
            .insert(who.clone(), if escalate { 0 } else { count });
        WarnTick {
            count,
            threshold,
            escalate,
        }
    }
}

/// Agent-wide configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    pub owners: Vec<Identity>,
    pub prefix: String,
    pub global_bans: Vec<Identity>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            owners: Vec::new(),
            prefix: DEFAULT_PREFIX.to_string(),
            global_bans: Vec::new(),
        }
    }
}

impl BotConfig {
    pub fn is_owner(&self, who: &Identity) -> bool {
        self.owners.contains(who)
    }

    pub fn is_banned(&self, who: &Identity) -> bool {
        self.global_bans.contains(who)
    }

    /// Configured prefix, falling back to the default when the stored one is blank.
    pub fn prefix(&self) -> &str {
        if self.prefix.is_empty() {
            DEFAULT_PREFIX
        } else {
            &self.prefix
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KaiGroupPreferences {
    pub members: BTreeMap<Identity, bool>,
}

/// Per (chat, user) AI-reply opt-out. Absent means "on".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KaiPreferences {
    pub groups: BTreeMap<Identity, KaiGroupPreferences>,
}

impl KaiPreferences {
    pub fn get(&self, chat: &Identity, user: &Identity) -> Option<bool> {
        self.groups.get(chat)?.members.get(user).copied()
    }

    pub fn set(&mut self, chat: &Identity, user: &Identity, on: bool) {
        self.groups
            .entry(chat.clone())
            .or_default()
            .members
            .insert(user.clone(), on);
    }
}

pub struct Records {
    store: Arc<dyn RecordStore>,
    groups: Mutex<BTreeMap<Identity, GroupConfig>>,
    bot: Mutex<BotConfig>,
    logs: Mutex<EventLog>,
    kai: Mutex<KaiPreferences>,
}

impl Records {
    /// Load all records, falling back to defaults for anything absent or unreadable.
    ///
    /// `bot_defaults` seeds the bot config only when no record exists yet.
    pub async fn load(store: Arc<dyn RecordStore>, bot_defaults: BotConfig) -> Self {
        let groups = load_or_default(store.as_ref(), RecordKey::Groups).await;
        let bot = load_record(store.as_ref(), RecordKey::BotConfig)
            .await
            .unwrap_or(bot_defaults);
        let mut logs: EventLog = load_or_default(store.as_ref(), RecordKey::Logs).await;
        logs.enforce_capacity();
        let kai = load_or_default(store.as_ref(), RecordKey::KaiPreferences).await;

        Self {
            store,
            groups: Mutex::new(groups),
            bot: Mutex::new(bot),
            logs: Mutex::new(logs),
            kai: Mutex::new(kai),
        }
    }

    /// Snapshot of a chat's config; a missing chat yields defaults without creating it.
    pub async fn group(&self, chat: &Identity) -> GroupConfig {
        self.groups
            .lock()
            .await
            .get(chat)
            .cloned()
            .unwrap_or_default()
    }

    /// Atomically modify a chat's config (created lazily) and persist the record.
    pub async fn mutate_group<T>(
        &self,
        chat: &Identity,
        f: impl FnOnce(&mut GroupConfig) -> T,
    ) -> T {
        let mut guard = self.groups.lock().await;
        let out = f(guard.entry(chat.clone()).or_default());
        self.persist(RecordKey::Groups, &*guard).await;
        out
    }

    pub async fn bot_config(&self) -> BotConfig {
        self.bot.lock().await.clone()
    }

    pub async fn mutate_bot_config<T>(&self, f: impl FnOnce(&mut BotConfig) -> T) -> T {
        let mut guard = self.bot.lock().await;
        let out = f(&mut *guard);
        self.persist(RecordKey::BotConfig, &*guard).await;
        out
    }

    pub async fn kai_preference(&self, chat: &Identity, user: &Identity) -> Option<bool> {
        self.kai.lock().await.get(chat, user)
    }

    pub async fn set_kai_preference(&self, chat: &Identity, user: &Identity, on: bool) {
        let mut guard = self.kai.lock().await;
        guard.set(chat, user, on);
        self.persist(RecordKey::KaiPreferences, &*guard).await;
    }

    /// Append to the bounded event log.
    pub async fn log(&self, kind: &str, payload: serde_json::Value) {
        let mut guard = self.logs.lock().await;
        guard.push(LogEntry::now(kind, payload));
        self.persist(RecordKey::Logs, &*guard).await;
    }

    pub async fn recent_logs(&self, n: usize) -> Vec<LogEntry> {
        self.logs.lock().await.recent(n)
    }

    async fn persist<T: Serialize>(&self, key: RecordKey, value: &T) {
        if let Err(e) = self.write(key, value).await {
            warn!(record = key.file_name(), error = %e, "record write failed; keeping in-memory state");
        }
    }

    async fn write<T: Serialize>(&self, key: RecordKey, value: &T) -> Result<()> {
        let v = serde_json::to_value(value)?;
        self.store.set(key, v).await
    }
}

async fn load_record<T: DeserializeOwned>(store: &dyn RecordStore, key: RecordKey) -> Option<T> {
    let raw = match store.get(key).await {
        Ok(Some(v)) => v,
        Ok(None) => return None,
        Err(e) => {
            warn!(record = key.file_name(), error = %e, "record read failed; using defaults");
            return None;
        }
    };
    match serde_json::from_value(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(record = key.file_name(), error = %e, "record is malformed; using defaults");
            None
        }
    }
}

async fn load_or_default<T: DeserializeOwned + Default>(
    store: &dyn RecordStore,
    key: RecordKey,
) -> T {
    load_record(store, key).await.unwrap_or_default()
}
