//! Inbound event loop: one task per event, serialized per chat where state is shared.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info};

use crate::{
    commands::{dispatch, parse_invocation, DispatchOutcome},
    domain::Identity,
    membership,
    messaging::types::{InboundMessage, ParticipantUpdate},
    moderation::{self, Violation},
    reply_gate::{self, GateDecision},
    state::AppState,
};

/// Events delivered by the transport.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    Message(InboundMessage),
    Participants(ParticipantUpdate),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    Ignored,
    Banned,
    Command(DispatchOutcome),
    Moderated(Violation),
    Reply(GateDecision),
}

#[derive(Clone)]
pub struct Pipeline {
    state: Arc<AppState>,
}

impl Pipeline {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Consume events until the channel closes or shutdown is requested, then
    /// wait for in-flight handlers.
    pub async fn run(&self, mut events: mpsc::Receiver<TransportEvent>) {
        let mut tasks = JoinSet::new();
        let shutdown = self.state.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested; event loop stopping");
                    break;
                }
                maybe = events.recv() => {
                    let Some(event) = maybe else {
                        debug!("event source closed");
                        break;
                    };
                    let this = self.clone();
                    tasks.spawn(async move { this.handle_event(event).await });
                }
                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        error!(error = %e, "event task failed");
                    }
                }
            }
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "event task failed");
            }
        }
    }

    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(msg) => {
                let outcome = self.handle_message(&msg).await;
                debug!(chat = %msg.chat_id, ?outcome, "message handled");
            }
            TransportEvent::Participants(update) => {
                if !update.chat_id.is_status_broadcast() {
                    membership::handle_participants(&self.state, &update).await;
                }
            }
        }
    }

    /// Route one message: command, then moderation, then the reply gate.
    pub async fn handle_message(&self, msg: &InboundMessage) -> MessageOutcome {
        let state = &self.state;
        if msg.chat_id.is_status_broadcast() || msg.chat_id.is_empty() {
            return MessageOutcome::Ignored;
        }

        let sender = match (msg.from_self, state.transport.self_identity()) {
            (true, Some(me)) => me,
            (true, None) => return MessageOutcome::Ignored,
            (false, _) => msg.sender().clone(),
        };

        let bot = state.records.bot_config().await;
        if bot.is_banned(&sender) {
            debug!(chat = %msg.chat_id, sender = %sender, "dropping event from banned sender");
            return MessageOutcome::Banned;
        }

        let text = msg.text().to_string();
        if let Some(invocation) = parse_invocation(&text, bot.prefix()) {
            let outcome = dispatch(state, msg, &sender, invocation).await;
            return MessageOutcome::Command(outcome);
        }

        if msg.from_self {
            return MessageOutcome::Ignored;
        }

        if msg.is_group() && !text.trim().is_empty() {
            if let Some(v) = self.moderate(msg, &sender, &text).await {
                return MessageOutcome::Moderated(v);
            }
        }

        MessageOutcome::Reply(reply_gate::run(state, msg, &sender).await)
    }

    async fn moderate(&self, msg: &InboundMessage, sender: &Identity, text: &str) -> Option<Violation> {
        let _guard = self.state.chat_locks.lock_chat(&msg.chat_id).await;
        moderation::moderate(&self.state, msg, sender, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        dm_message, group_message, test_state, FakeReplies, FakeTransport, ADMIN, BOT, GROUP, OWNER,
    };
    use std::time::Duration;

    async fn pipeline(
        transport: &Arc<FakeTransport>,
        replies: &Arc<FakeReplies>,
    ) -> Pipeline {
        let state = test_state(transport.clone(), replies.clone()).await;
        Pipeline::new(Arc::new(state))
    }

    #[tokio::test]
    async fn bad_word_at_threshold_escalates_once() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let chat = Identity::from(GROUP);
        transport.set_admins(&chat, &[&Identity::from(BOT)]);
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;
        let offender = Identity::from("5@s.whatsapp.net");
        p.state()
            .records
            .mutate_group(&chat, |g| {
                g.bad_words.insert("darn".to_string());
                g.warns.insert(offender.clone(), 1);
            })
            .await;

        let outcome = p
            .handle_message(&group_message("5@s.whatsapp.net", "oh DARN"))
            .await;

        assert_eq!(outcome, MessageOutcome::Moderated(Violation::BadWord));
        let group_texts = transport.sent_to(&chat);
        assert!(group_texts[0].contains("Warning (2/2)"));
        assert_eq!(transport.removals(), vec![(chat.clone(), offender.clone())]);
        assert_eq!(p.state().records.group(&chat).await.warns_for(&offender), 0);
        assert!(replies.calls().is_empty());
    }

    #[tokio::test]
    async fn admin_sets_rules() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let chat = Identity::from(GROUP);
        let admin = Identity::from(ADMIN);
        transport.set_admins(&chat, &[&admin]);
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;

        let outcome = p
            .handle_message(&group_message(ADMIN, "!setrules Be nice"))
            .await;

        assert_eq!(
            outcome,
            MessageOutcome::Command(DispatchOutcome::Executed { command: "setrules" })
        );
        let cfg = p.state().records.group(&chat).await;
        assert_eq!(cfg.rules, "Be nice");
        assert!(cfg.warns.is_empty());
        assert_eq!(
            transport.sent_to(&chat),
            vec!["✅ Rules set for this group.".to_string()]
        );
    }

    #[tokio::test]
    async fn member_is_denied_admin_command() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;
        let chat = Identity::from(GROUP);

        let outcome = p
            .handle_message(&group_message("5@s.whatsapp.net", "!setrules anarchy"))
            .await;
        assert_eq!(
            outcome,
            MessageOutcome::Command(DispatchOutcome::PermissionDenied {
                required: crate::domain::Role::GroupAdmin
            })
        );
        assert_eq!(p.state().records.group(&chat).await.rules, "");
        assert_eq!(
            transport.sent_to(&chat),
            vec!["🚫 Admin only command.".to_string()]
        );
    }

    #[tokio::test]
    async fn prefix_change_takes_effect_immediately() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;

        let changed = p.handle_message(&dm_message(OWNER, "!setprefix ?")).await;
        assert!(matches!(
            changed,
            MessageOutcome::Command(DispatchOutcome::Executed { .. })
        ));

        let ping = p.handle_message(&group_message("5@s.whatsapp.net", "?ping")).await;
        assert_eq!(
            ping,
            MessageOutcome::Command(DispatchOutcome::Executed { command: "ping" })
        );

        let old = p.handle_message(&group_message("5@s.whatsapp.net", "!ping")).await;
        assert_eq!(old, MessageOutcome::Reply(GateDecision::NotAddressed));
        assert!(replies.calls().is_empty());
    }

    #[tokio::test]
    async fn direct_message_always_forwarded() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("hello back"));
        let p = pipeline(&transport, &replies).await;

        let outcome = p
            .handle_message(&dm_message("5@s.whatsapp.net", "how are you?"))
            .await;
        assert_eq!(outcome, MessageOutcome::Reply(GateDecision::Forward));
        assert_eq!(replies.calls().len(), 1);
        assert_eq!(replies.calls()[0].prompt, "how are you?");
    }

    #[tokio::test]
    async fn mention_mode_requires_mention() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("hi"));
        let p = pipeline(&transport, &replies).await;

        let plain = group_message("5@s.whatsapp.net", "anyone here?");
        assert_eq!(
            p.handle_message(&plain).await,
            MessageOutcome::Reply(GateDecision::NotAddressed)
        );
        assert!(replies.calls().is_empty());

        let mut addressed = plain.clone();
        addressed.mentioned_ids.push(Identity::from(BOT));
        assert_eq!(
            p.handle_message(&addressed).await,
            MessageOutcome::Reply(GateDecision::Forward)
        );
        assert_eq!(replies.calls().len(), 1);
    }

    #[tokio::test]
    async fn repeated_message_inside_window_is_spam_once() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("hi"));
        let p = pipeline(&transport, &replies).await;
        let chat = Identity::from(GROUP);
        p.state()
            .records
            .mutate_group(&chat, |g| g.automod.antispam = Some(true))
            .await;
        let msg = group_message("5@s.whatsapp.net", "buy now");

        let first = p.handle_message(&msg).await;
        let second = p.handle_message(&msg).await;

        assert_eq!(first, MessageOutcome::Reply(GateDecision::NotAddressed));
        assert_eq!(second, MessageOutcome::Moderated(Violation::Spam));
        assert!(replies.calls().is_empty());
        let warnings = transport.sent_to(&chat);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("please stop spamming. Warning (1/2)"));
        let sender = Identity::from("5@s.whatsapp.net");
        assert_eq!(p.state().records.group(&chat).await.warns_for(&sender), 1);
    }

    #[tokio::test]
    async fn banned_sender_has_no_effect() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("hi"));
        let p = pipeline(&transport, &replies).await;
        let banned = Identity::from("6@s.whatsapp.net");
        p.state()
            .records
            .mutate_bot_config(|b| b.global_bans.push(banned.clone()))
            .await;
        let before_groups = p.state().records.group(&Identity::from(GROUP)).await;
        let before_logs = p.state().records.recent_logs(usize::MAX).await.len();

        for text in ["!ping", "help", "oh darn https://x.io", "hello"] {
            let mut msg = group_message("6@s.whatsapp.net", text);
            msg.mentioned_ids.push(Identity::from(BOT));
            assert_eq!(p.handle_message(&msg).await, MessageOutcome::Banned);
        }
        let dm = dm_message("6@s.whatsapp.net", "hi");
        assert_eq!(p.handle_message(&dm).await, MessageOutcome::Banned);

        assert!(transport.sent().is_empty());
        assert!(replies.calls().is_empty());
        assert_eq!(
            p.state().records.group(&Identity::from(GROUP)).await,
            before_groups
        );
        assert_eq!(
            p.state().records.recent_logs(usize::MAX).await.len(),
            before_logs
        );
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_pipeline() {
        let transport = Arc::new(FakeTransport::new(BOT));
        transport.fail_groups(true);
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;

        let outcome = p.handle_message(&dm_message(OWNER, "!getgroups")).await;
        assert_eq!(
            outcome,
            MessageOutcome::Command(DispatchOutcome::HandlerFault { command: "getgroups" })
        );
        assert_eq!(
            transport.sent_to(&Identity::from(OWNER)),
            vec!["⚠️ Command error.".to_string()]
        );

        let next = p.handle_message(&dm_message(OWNER, "!ping")).await;
        assert_eq!(
            next,
            MessageOutcome::Command(DispatchOutcome::Executed { command: "ping" })
        );
    }

    #[tokio::test]
    async fn unknown_command_hints_prefix() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;
        let outcome = p
            .handle_message(&group_message("5@s.whatsapp.net", "!dance"))
            .await;
        assert_eq!(outcome, MessageOutcome::Command(DispatchOutcome::UnknownCommand));
        assert_eq!(
            transport.sent_to(&Identity::from(GROUP)),
            vec!["Unknown command. Try !help".to_string()]
        );
    }

    #[tokio::test]
    async fn bare_help_works_without_prefix() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;
        let outcome = p.handle_message(&dm_message("5@s.whatsapp.net", "Help")).await;
        assert_eq!(
            outcome,
            MessageOutcome::Command(DispatchOutcome::Executed { command: "help" })
        );
        let sent = transport.sent_to(&Identity::from("5@s.whatsapp.net"));
        assert!(sent[0].contains("General (everyone)"));
        assert!(!sent[0].contains("Owner"));
    }

    #[tokio::test]
    async fn own_messages_never_reach_the_reply_gate() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;
        let mut msg = dm_message("5@s.whatsapp.net", "a reply I sent");
        msg.from_self = true;
        assert_eq!(p.handle_message(&msg).await, MessageOutcome::Ignored);
        assert!(replies.calls().is_empty());
    }

    #[tokio::test]
    async fn status_broadcast_is_ignored() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;
        let mut msg = dm_message("5@s.whatsapp.net", "!ping");
        msg.chat_id = Identity::from("status@broadcast");
        assert_eq!(p.handle_message(&msg).await, MessageOutcome::Ignored);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn suspended_reply_does_not_hold_up_later_events() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::hanging());
        let p = pipeline(&transport, &replies).await;
        let (tx, rx) = mpsc::channel(8);
        let runner = {
            let p = p.clone();
            tokio::spawn(async move { p.run(rx).await })
        };
        let owner = Identity::from(OWNER);

        tx.send(TransportEvent::Message(dm_message("5@s.whatsapp.net", "hi")))
            .await
            .unwrap();
        tx.send(TransportEvent::Message(dm_message(OWNER, "!ping")))
            .await
            .unwrap();

        let pong = tokio::time::timeout(Duration::from_secs(1), async {
            while transport.sent_to(&owner).is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(pong.is_ok(), "ping was queued behind the pending reply");
        assert_eq!(transport.sent_to(&owner), vec!["🏓 Pong!".to_string()]);
        assert_eq!(replies.calls().len(), 1);
        assert!(transport
            .sent_to(&Identity::from("5@s.whatsapp.net"))
            .is_empty());

        p.state().shutdown.cancel();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("pipeline drained")
            .unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_command() {
        let transport = Arc::new(FakeTransport::new(BOT));
        let replies = Arc::new(FakeReplies::ok("x"));
        let p = pipeline(&transport, &replies).await;
        let (tx, rx) = mpsc::channel(8);

        let runner = {
            let p = p.clone();
            tokio::spawn(async move { p.run(rx).await })
        };
        tx.send(TransportEvent::Message(dm_message(OWNER, "!shutdown")))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("pipeline stopped")
            .unwrap();
        assert!(p.state().shutdown.is_cancelled());
        assert_eq!(
            transport.sent_to(&Identity::from(OWNER)),
            vec!["Shutting down (owner requested).".to_string()]
        );
    }
}
