//! Command table, prefix parsing, and the dispatch boundary.

pub mod admin;
pub mod general;
pub mod owner;

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use serde_json::json;
use tracing::{error, info};

use crate::{
    domain::{Identity, Role},
    errors::Error,
    identity::{parse_participant, resolve_role},
    messaging::types::{InboundMessage, OutgoingText},
    state::AppState,
    utils::truncate_text,
    Result,
};

pub const HELP_KEYWORD: &str = "help";
pub const FAULT_TEXT: &str = "⚠️ Command error.";
pub const GROUP_ONLY_TEXT: &str = "This command works in groups only.";

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
pub type Handler = for<'a> fn(&'a CommandContext) -> HandlerFuture<'a>;

pub struct Command {
    pub name: &'static str,
    /// Extra triggers; the name is always a trigger too.
    pub aliases: &'static [&'static str],
    pub tier: Role,
    pub description: &'static str,
    pub handler: Handler,
}

impl Command {
    pub fn triggers(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("tier", &self.tier)
            .finish()
    }
}

/// Ordered command list plus a flattened trigger -> index map, built once.
#[derive(Debug)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    /// Fails on any trigger shared by two commands (or repeated within one).
    pub fn new(commands: Vec<Command>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, cmd) in commands.iter().enumerate() {
            for trigger in cmd.triggers() {
                let key = trigger.to_lowercase();
                if key.is_empty() || key.chars().any(char::is_whitespace) {
                    return Err(Error::Registry(format!(
                        "command {} has an invalid trigger {trigger:?}",
                        cmd.name
                    )));
                }
                if let Some(prev) = index.insert(key, i) {
                    return Err(Error::Registry(format!(
                        "trigger {trigger:?} registered by both {} and {}",
                        commands[prev].name, cmd.name
                    )));
                }
            }
        }
        Ok(Self { commands, index })
    }

    /// All built-in commands.
    pub fn builtin() -> Result<Self> {
        let mut all = general::commands();
        all.extend(admin::commands());
        all.extend(owner::commands());
        Self::new(all)
    }

    pub fn lookup(&self, key: &str) -> Option<&Command> {
        self.index
            .get(&key.to_lowercase())
            .map(|&i| &self.commands[i])
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Help text listing the tiers visible to `role`.
    pub fn render_help(&self, role: Role, prefix: &str, bot_name: &str) -> String {
        let mut text = format!("*🤖 {bot_name} Help Menu*\nPrefix: `{prefix}`\n");
        for tier in Role::ALL.into_iter().filter(|t| role.satisfies(*t)) {
            let heading = match tier {
                Role::Member => "*👤 General (everyone)*",
                Role::GroupAdmin => "*🛡️ Group Admin*",
                Role::Owner => "*👑 Owner*",
            };
            text.push('\n');
            text.push_str(heading);
            text.push('\n');
            for cmd in self.commands.iter().filter(|c| c.tier == tier) {
                text.push_str(&format!(" • {prefix}{} - {}\n", cmd.name, cmd.description));
            }
        }
        text.push_str(&format!("\n_Type commands with the prefix_ {prefix}"));
        text
    }
}

/// A parsed command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// First token, case-folded.
    pub key: String,
    /// Everything after the key, trimmed, spacing preserved.
    pub rest: String,
}

impl Invocation {
    pub fn args(&self) -> Vec<String> {
        self.rest.split_whitespace().map(str::to_string).collect()
    }
}

/// Parse `text` as a command: prefixed input, or the bare help keyword.
///
/// A lone prefix is not a command.
pub fn parse_invocation(text: &str, prefix: &str) -> Option<Invocation> {
    let text = text.trim();
    let body = match text.strip_prefix(prefix) {
        Some(body) if !prefix.is_empty() => body.trim_start(),
        _ if text.eq_ignore_ascii_case(HELP_KEYWORD) => HELP_KEYWORD,
        _ => return None,
    };

    let mut parts = body.splitn(2, char::is_whitespace);
    let key = parts.next().unwrap_or("").to_lowercase();
    if key.is_empty() {
        return None;
    }
    let rest = parts.next().unwrap_or("").trim().to_string();
    Some(Invocation { key, rest })
}

/// What handlers receive.
pub struct CommandContext {
    pub state: Arc<AppState>,
    pub message: InboundMessage,
    pub chat: Identity,
    pub sender: Identity,
    pub invocation: Invocation,
    pub args: Vec<String>,
    /// Mention annotations from the message, passed through unmodified.
    pub mentions: Vec<Identity>,
    pub role: Role,
    pub is_group: bool,
    pub prefix: String,
}

impl CommandContext {
    /// Reply in the invoking chat, quoting the command message.
    pub async fn reply(&self, text: impl Into<OutgoingText>) {
        let text = text.into().quoting(self.message.id.as_deref());
        self.state.send(&self.chat, text).await;
    }

    /// Raw argument text (everything after the command key).
    pub fn rest(&self) -> &str {
        &self.invocation.rest
    }

    /// First mention, else the first argument read as a participant.
    pub fn target(&self) -> Option<Identity> {
        self.mentions.first().cloned().or_else(|| {
            self.args
                .first()
                .and_then(|a| parse_participant(a, &self.state.cfg.user_server))
        })
    }

    /// Only the first mention; for commands whose argument must be a mention.
    pub fn mentioned(&self) -> Option<Identity> {
        self.mentions.first().cloned()
    }

    pub fn require_group(&self) -> Result<()> {
        if self.is_group {
            Ok(())
        } else {
            Err(Error::usage(GROUP_ONLY_TEXT))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed { command: &'static str },
    UnknownCommand,
    PermissionDenied { required: Role },
    HandlerFault { command: &'static str },
}

/// Resolve, authorize and run one invocation.
///
/// The handler runs in its own task so neither an error nor a panic inside it can
/// take the pipeline down.
pub async fn dispatch(
    state: &Arc<AppState>,
    message: &InboundMessage,
    sender: &Identity,
    invocation: Invocation,
) -> DispatchOutcome {
    let chat = message.chat_id.clone();
    let bot = state.records.bot_config().await;
    let prefix = bot.prefix().to_string();

    let Some(cmd) = state.commands.lookup(&invocation.key) else {
        let hint = OutgoingText::new()
            .text(format!("Unknown command. Try {prefix}help"))
            .quoting(message.id.as_deref());
        state.send(&chat, hint).await;
        return DispatchOutcome::UnknownCommand;
    };
    let (name, tier, handler) = (cmd.name, cmd.tier, cmd.handler);

    let role = resolve_role(state.transport.as_ref(), &bot, &chat, sender).await;
    if !role.satisfies(tier) {
        let denial = match tier {
            Role::Owner => "🚫 Owner only command.",
            _ => "🚫 Admin only command.",
        };
        state
            .send(&chat, OutgoingText::new().text(denial).quoting(message.id.as_deref()))
            .await;
        info!(chat = %chat, sender = %sender, command = name, %role, "permission denied");
        return DispatchOutcome::PermissionDenied { required: tier };
    }

    let ctx = CommandContext {
        state: Arc::clone(state),
        message: message.clone(),
        chat: chat.clone(),
        sender: sender.clone(),
        args: invocation.args(),
        invocation,
        mentions: message.mentioned_ids.clone(),
        role,
        is_group: message.is_group(),
        prefix,
    };

    state
        .records
        .log(
            "command",
            json!({ "chatId": chat, "sender": sender, "command": name, "args": ctx.args }),
        )
        .await;

    let joined = tokio::spawn(async move {
        let result = handler(&ctx).await;
        if let Err(Error::Usage(text)) = &result {
            ctx.reply(text.as_str()).await;
            return Ok(());
        }
        result
    })
    .await;

    let fault = match joined {
        Ok(Ok(())) => return DispatchOutcome::Executed { command: name },
        Ok(Err(e)) => e.to_string(),
        Err(join_err) => format!("handler panicked: {join_err}"),
    };

    error!(chat = %chat, sender = %sender, command = name, error = %fault, "command failed");
    state
        .send(&chat, OutgoingText::new().text(FAULT_TEXT).quoting(message.id.as_deref()))
        .await;
    state
        .records
        .log(
            "command_error",
            json!({ "chatId": chat, "command": name, "error": truncate_text(&fault, 500) }),
        )
        .await;
    DispatchOutcome::HandlerFault { command: name }
}

/// Parse an `on|off` argument.
pub(crate) fn parse_switch(arg: Option<&String>) -> Option<bool> {
    match arg.map(|a| a.to_lowercase()).as_deref() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &CommandContext) -> HandlerFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn cmd(name: &'static str, aliases: &'static [&'static str], tier: Role) -> Command {
        Command {
            name,
            aliases,
            tier,
            description: "test",
            handler: noop,
        }
    }

    #[test]
    fn parses_prefixed_and_bare_help() {
        assert_eq!(
            parse_invocation("!Warn @5 be nice", "!"),
            Some(Invocation {
                key: "warn".into(),
                rest: "@5 be nice".into()
            })
        );
        assert_eq!(parse_invocation("  HELP ", "!").unwrap().key, "help");
        assert_eq!(parse_invocation("help me", "!"), None);
        assert_eq!(parse_invocation("!", "!"), None);
        assert_eq!(parse_invocation("hello", "!"), None);
        assert_eq!(parse_invocation("?ping", "!"), None);
        assert_eq!(parse_invocation("?ping", "?").unwrap().key, "ping");
    }

    #[test]
    fn rest_keeps_inner_spacing() {
        let inv = parse_invocation("!setrules No spam.\nBe  kind.", "!").unwrap();
        assert_eq!(inv.rest, "No spam.\nBe  kind.");
        assert_eq!(inv.args(), vec!["No", "spam.", "Be", "kind."]);
    }

    #[test]
    fn aliases_resolve_to_the_same_command() {
        let reg = CommandRegistry::new(vec![
            cmd("kaistatus", &["kai", "kstatus"], Role::Member),
            cmd("ping", &[], Role::Member),
        ])
        .unwrap();
        for key in ["kaistatus", "KAI", "kstatus"] {
            assert_eq!(reg.lookup(key).unwrap().name, "kaistatus");
        }
        assert!(reg.lookup("pong").is_none());
    }

    #[test]
    fn alias_collision_is_a_registry_error() {
        let err = CommandRegistry::new(vec![
            cmd("profile", &["me"], Role::Member),
            cmd("me", &[], Role::Member),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn builtin_table_has_no_collisions() {
        let reg = CommandRegistry::builtin().unwrap();
        assert!(reg.lookup("me").is_some());
        assert!(reg.lookup("setwarnsthreshold").is_some());
        assert!(reg.lookup("getgroupinfo").is_some());
    }

    #[test]
    fn help_shows_only_visible_tiers() {
        let reg = CommandRegistry::builtin().unwrap();
        let member = reg.render_help(Role::Member, "!", "Kai Bot");
        assert!(member.contains("!ping"));
        assert!(!member.contains("Group Admin"));
        assert!(!member.contains("!setprefix"));

        let admin = reg.render_help(Role::GroupAdmin, "!", "Kai Bot");
        assert!(admin.contains("!setrules"));
        assert!(!admin.contains("👑 Owner"));

        let owner = reg.render_help(Role::Owner, "?", "Kai Bot");
        assert!(owner.contains("?broadcast"));
        assert!(owner.contains("?kick"));
    }

    #[test]
    fn switch_argument() {
        assert_eq!(parse_switch(Some(&"ON".to_string())), Some(true));
        assert_eq!(parse_switch(Some(&"off".to_string())), Some(false));
        assert_eq!(parse_switch(Some(&"maybe".to_string())), None);
        assert_eq!(parse_switch(None), None);
    }
}
