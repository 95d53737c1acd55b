use tracing::debug;

use crate::{
    domain::{Identity, Role, DEVICE_SEPARATOR, SERVER_SEPARATOR},
    messaging::port::Transport,
    records::BotConfig,
};

/// Strip the device qualifier from a raw identity.
///
/// `user:device@server` becomes `user@server`; an identity without a server part
/// keeps everything before the first `:`. Idempotent.
pub fn normalize(raw: &str) -> Identity {
    let raw = raw.trim();
    let normalized = match raw.split_once(SERVER_SEPARATOR) {
        Some((user, server)) => {
            let user = user.split(DEVICE_SEPARATOR).next().unwrap_or(user);
            format!("{user}{SERVER_SEPARATOR}{server}")
        }
        None => raw.split(DEVICE_SEPARATOR).next().unwrap_or(raw).to_string(),
    };
    Identity::from_normalized(normalized)
}

/// Turn a command argument (`@27600000000`, `27600000000`, or a full identity)
/// into a participant identity.
pub fn parse_participant(arg: &str, user_server: &str) -> Option<Identity> {
    let arg = arg.trim().trim_start_matches('@');
    if arg.is_empty() {
        return None;
    }
    if arg.contains(SERVER_SEPARATOR) {
        return Some(normalize(arg));
    }
    if !arg.chars().all(|c| c.is_ascii_digit() || c == DEVICE_SEPARATOR) {
        return None;
    }
    Some(normalize(&format!("{arg}{SERVER_SEPARATOR}{user_server}")))
}

/// Whether `who` administers `chat`, per a metadata lookup.
///
/// A failed lookup counts as "not an admin": errors never escalate privileges.
pub async fn is_group_admin(transport: &dyn Transport, chat: &Identity, who: &Identity) -> bool {
    match transport.group_metadata(chat).await {
        Ok(meta) => meta.is_admin(who),
        Err(e) => {
            debug!(chat = %chat, who = %who, error = %e, "group metadata lookup failed");
            false
        }
    }
}

/// Acting role of `actor` in `chat`.
pub async fn resolve_role(
    transport: &dyn Transport,
    bot: &BotConfig,
    chat: &Identity,
    actor: &Identity,
) -> Role {
    if bot.is_owner(actor) {
        return Role::Owner;
    }
    if chat.is_group() && is_group_admin(transport, chat, actor).await {
        return Role::GroupAdmin;
    }
    Role::Member
}
