use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between a participant's user part and its server part.
pub(crate) const SERVER_SEPARATOR: char = '@';
/// Separator introducing a device qualifier inside the user part (`user:device@server`).
pub(crate) const DEVICE_SEPARATOR: char = ':';
/// Server suffix of group chats.
const GROUP_SERVER: &str = "g.us";
/// Pseudo chat used by the platform for status updates.
const STATUS_BROADCAST: &str = "status@broadcast";

/// Participant or chat identity, always in normalized form (no device qualifier).
///
/// The only way to build one is [`crate::identity::normalize`] (or a `From`
/// conversion that goes through it), so equality and map lookups never see a
/// device-qualified form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub(crate) fn from_normalized(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// User part (everything before `@`).
    pub fn user(&self) -> &str {
        self.0
            .split_once(SERVER_SEPARATOR)
            .map(|(u, _)| u)
            .unwrap_or(&self.0)
    }

    pub fn server(&self) -> Option<&str> {
        self.0.split_once(SERVER_SEPARATOR).map(|(_, s)| s)
    }

    pub fn is_group(&self) -> bool {
        self.server() == Some(GROUP_SERVER)
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.0 == STATUS_BROADCAST
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Identity {
    fn from(raw: String) -> Self {
        crate::identity::normalize(&raw)
    }
}

impl From<&str> for Identity {
    fn from(raw: &str) -> Self {
        crate::identity::normalize(raw)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acting role for an (actor, chat) pair. Computed per message, never persisted.
///
/// Declaration order is the tier order: `Member < GroupAdmin < Owner`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Member,
    GroupAdmin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Member, Role::GroupAdmin, Role::Owner];

    /// Whether a caller with this role may invoke a command of `tier`.
    pub fn satisfies(self, tier: Role) -> bool {
        self >= tier
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Member => "member",
            Role::GroupAdmin => "groupAdmin",
            Role::Owner => "owner",
        };
        f.write_str(s)
    }
}

/// A participant reference inside outgoing text, rendered only by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MentionToken {
    pub identity: Identity,
}
