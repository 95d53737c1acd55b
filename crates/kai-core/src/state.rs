use std::{collections::HashMap, sync::Arc, time::Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::{
    commands::CommandRegistry,
    config::Config,
    domain::Identity,
    messaging::{port::Transport, types::OutgoingText},
    moderation::SpamTracker,
    ports::ReplyClient,
    records::Records,
};

/// Shared services handed to every handler.
pub struct AppState {
    pub cfg: Arc<Config>,
    pub transport: Arc<dyn Transport>,
    pub replies: Arc<dyn ReplyClient>,
    pub records: Arc<Records>,
    pub commands: CommandRegistry,
    pub spam: Mutex<SpamTracker>,
    pub chat_locks: ChatLocks,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        transport: Arc<dyn Transport>,
        replies: Arc<dyn ReplyClient>,
        records: Arc<Records>,
        commands: CommandRegistry,
    ) -> Self {
        Self {
            cfg,
            transport,
            replies,
            records,
            commands,
            spam: Mutex::new(SpamTracker::default()),
            chat_locks: ChatLocks::default(),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Best-effort send: failures are logged, never propagated.
    pub async fn send(&self, chat: &Identity, text: impl Into<OutgoingText>) -> bool {
        match self.transport.send_text(chat, text.into()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(chat = %chat, error = %e, "send failed");
                false
            }
        }
    }

    /// Direct notice to every configured owner.
    pub async fn notify_owners(&self, text: impl Into<OutgoingText>) {
        let text = text.into();
        let owners = self.records.bot_config().await.owners;
        for owner in owners {
            self.send(&owner, text.clone()).await;
        }
    }
}

/// Idle chat locks kept before they are swept.
const CHAT_LOCK_SWEEP_AT: usize = 1024;

/// One async mutex per chat, created on demand.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<Identity, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat: &Identity) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            if map.len() >= CHAT_LOCK_SWEEP_AT {
                // Only the map references an idle lock: nobody holds or awaits it.
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(chat.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
