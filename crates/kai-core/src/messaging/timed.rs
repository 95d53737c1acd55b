use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::timeout;

use crate::{
    domain::Identity,
    errors::Error,
    messaging::{
        port::Transport,
        types::{GroupMetadata, OutgoingText, RoleChange},
    },
    Result,
};

/// Transport decorator that bounds every outbound call.
///
/// An expired call is abandoned and reported as [`Error::Timeout`]; nothing is retried.
pub struct TimeoutTransport {
    inner: Arc<dyn Transport>,
    limit: Duration,
}

impl TimeoutTransport {
    pub fn new(inner: Arc<dyn Transport>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout {
                operation,
                after: self.limit,
            }),
        }
    }
}

#[async_trait::async_trait]
impl Transport for TimeoutTransport {
    fn self_identity(&self) -> Option<Identity> {
        self.inner.self_identity()
    }

    async fn send_text(&self, chat: &Identity, text: OutgoingText) -> Result<()> {
        self.bounded("send_text", self.inner.send_text(chat, text))
            .await
    }

    async fn remove_participants(&self, chat: &Identity, who: &[Identity]) -> Result<()> {
        self.bounded("remove_participants", self.inner.remove_participants(chat, who))
            .await
    }

    async fn add_participants(&self, chat: &Identity, who: &[Identity]) -> Result<()> {
        self.bounded("add_participants", self.inner.add_participants(chat, who))
            .await
    }

    async fn update_participant_role(
        &self,
        chat: &Identity,
        who: &[Identity],
        change: RoleChange,
    ) -> Result<()> {
        self.bounded(
            "update_participant_role",
            self.inner.update_participant_role(chat, who, change),
        )
        .await
    }

    async fn group_metadata(&self, chat: &Identity) -> Result<GroupMetadata> {
        self.bounded("group_metadata", self.inner.group_metadata(chat))
            .await
    }

    async fn participating_groups(&self) -> Result<Vec<GroupMetadata>> {
        self.bounded("participating_groups", self.inner.participating_groups())
            .await
    }
}
