use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::Identity, identity::normalize, records::BotConfig, Result};

pub const DEFAULT_REPLY_URL: &str = "https://kai-api-z744.onrender.com";
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";

/// Typed process configuration, read from the environment (and an optional `.env`).
///
/// Owners and prefix here only seed the persisted bot config on first start; after
/// that the record is authoritative.
#[derive(Clone, Debug)]
pub struct Config {
    // Storage
    pub data_dir: PathBuf,

    // Seeds for the persisted bot config
    pub seed_owners: Vec<Identity>,
    pub seed_prefix: String,

    // Presentation
    pub bot_name: String,
    pub bot_version: String,

    // Reply collaborator
    pub reply_url: String,
    pub reply_timeout: Duration,

    // Transport
    pub transport_timeout: Duration,
    pub user_server: String,

    // Moderation
    pub global_bad_words: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let data_dir = env_path("KAI_DATA_DIR").unwrap_or_else(|| PathBuf::from("./data"));
        fs::create_dir_all(&data_dir)?;

        let seed_owners = parse_csv(env_str("KAI_OWNERS"))
            .into_iter()
            .map(|s| normalize(&s))
            .collect();
        let seed_prefix = env_str("KAI_PREFIX")
            .and_then(non_empty)
            .unwrap_or_else(|| crate::records::DEFAULT_PREFIX.to_string());

        let bot_name = env_str("KAI_BOT_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| "Kai Bot".to_string());

        let reply_url = env_str("KAI_REPLY_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_REPLY_URL.to_string());
        let reply_timeout =
            Duration::from_millis(env_u64("KAI_REPLY_TIMEOUT_MS").unwrap_or(30_000).max(1));
        let transport_timeout =
            Duration::from_millis(env_u64("KAI_TRANSPORT_TIMEOUT_MS").unwrap_or(10_000).max(1));
        let user_server = env_str("KAI_USER_SERVER")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_USER_SERVER.to_string());

        let global_bad_words = parse_csv(env_str("KAI_GLOBAL_BADWORDS"))
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();

        Ok(Self {
            data_dir,
            seed_owners,
            seed_prefix,
            bot_name,
            bot_version: env!("CARGO_PKG_VERSION").to_string(),
            reply_url,
            reply_timeout,
            transport_timeout,
            user_server,
            global_bad_words,
        })
    }

    /// Bot config used when no persisted record exists yet.
    pub fn seed_bot_config(&self) -> BotConfig {
        BotConfig {
            owners: self.seed_owners.clone(),
            prefix: self.seed_prefix.clone(),
            global_bans: Vec::new(),
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
