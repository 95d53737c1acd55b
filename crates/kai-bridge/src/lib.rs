//! Transport adapter: newline-delimited JSON over stdio to a platform sidecar.
//!
//! The sidecar owns the messaging session and its wire protocol. This crate turns
//! its events into pipeline events and implements [`Transport`] as
//! request/response pairs correlated by id.

pub mod protocol;
pub mod router;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex, PoisonError, RwLock,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use kai_core::{
    domain::Identity,
    errors::Error,
    messaging::{
        port::Transport,
        types::{GroupMetadata, OutgoingText, RoleChange},
    },
    Result,
};

use crate::protocol::{render_text, Request};

type Reply = Result<Value>;

pub struct BridgeTransport {
    outbound: mpsc::Sender<String>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_id: AtomicU64,
    self_id: RwLock<Option<Identity>>,
    /// Set once the sidecar input is gone; no response can arrive after that.
    closed: AtomicBool,
}

/// Removes an abandoned request (e.g. after a timeout) from the pending table.
struct PendingSlot<'a> {
    bridge: &'a BridgeTransport,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.bridge.pending_map().remove(&self.id);
    }
}

impl BridgeTransport {
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            self_id: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_self_identity(&self, id: Identity) {
        *self.self_id.write().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    /// Deliver a sidecar response. Returns false for unknown (or abandoned) ids.
    pub fn complete(&self, id: u64, outcome: Reply) -> bool {
        let Some(tx) = self.pending_map().remove(&id) else {
            debug!(id, "response for unknown request");
            return false;
        };
        tx.send(outcome).is_ok()
    }

    /// Fail every outstanding request and refuse new ones (the sidecar went away).
    pub fn fail_pending(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.pending_map().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(Error::External(reason.to_string())));
        }
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(id, tx);
        let _slot = PendingSlot { bridge: self, id };
        // Checked after registering so a concurrent `fail_pending` either sees this
        // request in the table or this call sees the flag.
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::External(format!("{method}: bridge input closed")));
        }

        let line = serde_json::to_string(&Request { id, method, params })?;
        self.outbound
            .send(line)
            .await
            .map_err(|_| Error::External("bridge output closed".to_string()))?;

        rx.await
            .map_err(|_| Error::External(format!("{method}: bridge closed before responding")))?
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn self_identity(&self) -> Option<Identity> {
        self.self_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn send_text(&self, chat: &Identity, text: OutgoingText) -> Result<()> {
        let mut params = render_text(&text);
        params["chat_id"] = json!(chat);
        self.call("send_text", params).await?;
        Ok(())
    }

    async fn remove_participants(&self, chat: &Identity, who: &[Identity]) -> Result<()> {
        self.call(
            "remove_participants",
            json!({ "chat_id": chat, "participants": who }),
        )
        .await?;
        Ok(())
    }

    async fn add_participants(&self, chat: &Identity, who: &[Identity]) -> Result<()> {
        self.call(
            "add_participants",
            json!({ "chat_id": chat, "participants": who }),
        )
        .await?;
        Ok(())
    }

    async fn update_participant_role(
        &self,
        chat: &Identity,
        who: &[Identity],
        change: RoleChange,
    ) -> Result<()> {
        self.call(
            "update_participant_role",
            json!({ "chat_id": chat, "participants": who, "change": change }),
        )
        .await?;
        Ok(())
    }

    async fn group_metadata(&self, chat: &Identity) -> Result<GroupMetadata> {
        let v = self
            .call("group_metadata", json!({ "chat_id": chat }))
            .await?;
        Ok(serde_json::from_value(v)?)
    }

    async fn participating_groups(&self) -> Result<Vec<GroupMetadata>> {
        let v = self.call("participating_groups", json!({})).await?;
        Ok(serde_json::from_value(v)?)
    }
}
