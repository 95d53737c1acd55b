use async_trait::async_trait;

use crate::{
    domain::Identity,
    messaging::types::{GroupMetadata, OutgoingText, RoleChange},
    Result,
};

/// Transport port: the connected platform session.
///
/// The adapter owns authentication, the wire protocol and delivery; the core only
/// sees normalized identities and [`OutgoingText`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// The agent's own identity, once the session knows it.
    fn self_identity(&self) -> Option<Identity>;

    async fn send_text(&self, chat: &Identity, text: OutgoingText) -> Result<()>;

    async fn remove_participants(&self, chat: &Identity, who: &[Identity]) -> Result<()>;
    async fn add_participants(&self, chat: &Identity, who: &[Identity]) -> Result<()>;
    async fn update_participant_role(
        &self,
        chat: &Identity,
        who: &[Identity],
        change: RoleChange,
    ) -> Result<()>;

    async fn group_metadata(&self, chat: &Identity) -> Result<GroupMetadata>;
    /// Every group the agent currently participates in.
    async fn participating_groups(&self) -> Result<Vec<GroupMetadata>>;
}
