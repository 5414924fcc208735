//! Message dispatcher: routes every inbound chat message to a command, a
//! pending follow-up (admin username, feedback), or the orchestrator.
//!
//! Messages from one user are handled in arrival order by a dedicated
//! worker task; different users are handled concurrently. A worker that
//! stays idle for [`WORKER_IDLE`] exits and is respawned on the next message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use m1nd_agent::{FallbackOrchestrator, UserEvent, UserState};
use m1nd_channels::DeliveryAdapter;
use m1nd_core::channel::ChannelMessage;
use m1nd_core::error::{ChannelError, OrchestrationError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::admins::AdminRegistry;
use crate::feedback::{FeedbackChoice, FeedbackLog};
use crate::stats::{format_summary, StatsRegistry};

/// How long a per-user worker waits for its next message before exiting.
pub const WORKER_IDLE: Duration = Duration::from_secs(600);

pub const PROCESSING_REPLY: &str = "Processing your question...";
pub const ERROR_REPLY: &str = "Sorry, an error occurred. Please try again later.";

const START_REPLY: &str = "Hi! This is ♾️ a space for those looking for resources: knowledge, answers, \
support. For growth, scaling and harmony. Ask me anything and I'll help you find answers.";
const HELP_REPLY: &str = "Send me any question and I'll answer it.\n\n\
/clear - start a new conversation\n\
/feedback - tell us how the last answer was\n\
/cancel - cancel the current action\n\
/help - this message";
const ADMIN_HELP: &str = "\n\nAdmin commands:\n\
/stats - usage statistics\n\
/admins - list admins\n\
/addadmin [username] - grant admin rights\n\
/removeadmin [username] - revoke admin rights";
const NO_ACCESS_REPLY: &str = "❌ You don't have access to this command.";
const CLEARED_REPLY: &str = "🧹 Conversation cleared. Let's start over!";
const ADD_ADMIN_PROMPT: &str = "📝 Send the username of the user you want to make an admin.\n\nSend /cancel to abort.";
const REMOVE_ADMIN_PROMPT: &str = "📝 Send the username of the admin you want to remove.\n\nSend /cancel to abort.";
const FEEDBACK_PROMPT: &str = "💬 Did you like the conversation? Was it useful?\n\n\
Reply with one of: like, dislike, useful, not_useful, comment.";
const FEEDBACK_HINT: &str = "Please reply with one of: like, dislike, useful, not_useful, comment. Send /cancel to skip.";
const COMMENT_PROMPT: &str = "💭 Please write your comment:";
const FEEDBACK_THANKS: &str = "Thank you for your feedback! 🙏";
const COMMENT_THANKS: &str = "✅ Thank you for your comment!";
const CANCELLED_REPLY: &str = "Cancelled.";
const NOTHING_TO_CANCEL_REPLY: &str = "Nothing to cancel.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Clear,
    Stats,
    AddAdmin,
    RemoveAdmin,
    Admins,
    Feedback,
    Cancel,
}

impl Command {
    /// Parse `/name[@bot] [argument]`, case-insensitively. Unknown commands
    /// are not commands.
    pub fn parse(text: &str) -> Option<(Command, Option<&str>)> {
        let rest = text.trim().strip_prefix('/')?;
        let (head, arg) = match rest.split_once(char::is_whitespace) {
            Some((head, arg)) => (head, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        let name = head.split_once('@').map_or(head, |(name, _)| name);

        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "clear" => Command::Clear,
            "stats" => Command::Stats,
            "addadmin" => Command::AddAdmin,
            "removeadmin" => Command::RemoveAdmin,
            "admins" => Command::Admins,
            "feedback" => Command::Feedback,
            "cancel" => Command::Cancel,
            _ => return None,
        };
        Some((command, arg))
    }
}

pub struct Dispatcher {
    orchestrator: Arc<FallbackOrchestrator>,
    delivery: DeliveryAdapter,
    priority: Vec<String>,
    admins: AdminRegistry,
    stats: StatsRegistry,
    feedback: FeedbackLog,
    worker_idle: Duration,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<FallbackOrchestrator>, delivery: DeliveryAdapter, priority: Vec<String>) -> Self {
        Self {
            orchestrator,
            delivery,
            priority,
            admins: AdminRegistry::new(),
            stats: StatsRegistry::new(),
            feedback: FeedbackLog::new(),
            worker_idle: WORKER_IDLE,
        }
    }

    pub fn with_worker_idle(mut self, idle: Duration) -> Self {
        self.worker_idle = idle;
        self
    }

    pub fn with_admins(mut self, admins: AdminRegistry) -> Self {
        self.admins = admins;
        self
    }

    pub fn admins(&self) -> &AdminRegistry {
        &self.admins
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    pub fn feedback(&self) -> &FeedbackLog {
        &self.feedback
    }

    /// Consume inbound messages until the channel closes.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<Result<ChannelMessage, ChannelError>>) {
        info!(channel = %self.delivery.channel().name(), "Dispatcher started");
        let mut workers: HashMap<String, mpsc::UnboundedSender<ChannelMessage>> = HashMap::new();

        while let Some(item) = inbound.recv().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Channel reported an error");
                    continue;
                }
            };

            let sender_id = message.sender_id.clone();
            if !workers.contains_key(&sender_id) {
                workers.retain(|_, worker| !worker.is_closed());
            }
            let worker = workers
                .entry(sender_id.clone())
                .or_insert_with(|| self.clone().spawn_worker());
            if let Err(mpsc::error::SendError(message)) = worker.send(message) {
                debug!(user_id = %sender_id, "Worker went idle; respawning");
                let worker = self.clone().spawn_worker();
                if worker.send(message).is_err() {
                    warn!(user_id = %sender_id, "User worker stopped; message dropped");
                }
                workers.insert(sender_id, worker);
            }
        }

        info!("Dispatcher stopped");
    }

    fn spawn_worker(self: Arc<Self>) -> mpsc::UnboundedSender<ChannelMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChannelMessage>();
        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(self.worker_idle, rx.recv()).await {
                    Ok(Some(message)) => self.handle(&message).await,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }
            // Refuse new messages, then finish whatever slipped in.
            rx.close();
            while let Ok(message) = rx.try_recv() {
                self.handle(&message).await;
            }
        });
        tx
    }

    /// Handle one message. Reply failures are logged, never raised.
    pub async fn handle(&self, message: &ChannelMessage) {
        let span = info_span!("message", request_id = %Uuid::new_v4(), user_id = %message.sender_id);
        async {
            if let Err(e) = self.dispatch(message).await {
                warn!(error = %e, "Failed to reply");
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, message: &ChannelMessage) -> Result<(), ChannelError> {
        let user_id = message.sender_id.as_str();
        let text = message.content.trim();
        self.stats.track(user_id, message.sender_name.as_deref()).await;

        if let Some((command, arg)) = Command::parse(text) {
            debug!(?command, "Handling command");
            return self.command(message, command, arg).await;
        }

        let store = self.orchestrator.store();
        match store.user_state(user_id).await {
            UserState::Idle => self.question(message, text).await,
            UserState::AwaitingAdminUsername => {
                store.transition(user_id, UserEvent::InputReceived).await;
                self.add_admin(message, text).await
            }
            UserState::AwaitingRemoveAdminUsername => {
                store.transition(user_id, UserEvent::InputReceived).await;
                self.remove_admin(message, text).await
            }
            UserState::AwaitingFeedbackRating => self.feedback_choice(message, text).await,
            UserState::AwaitingFeedbackComment => {
                store.transition(user_id, UserEvent::InputReceived).await;
                self.feedback
                    .record_comment(user_id, message.sender_name.as_deref(), text)
                    .await;
                self.reply(message, COMMENT_THANKS).await
            }
        }
    }

    async fn command(&self, message: &ChannelMessage, command: Command, arg: Option<&str>) -> Result<(), ChannelError> {
        let user_id = message.sender_id.as_str();
        let store = self.orchestrator.store();
        let is_admin = self.admins.is_admin(message.sender_name.as_deref()).await;

        let admin_only = matches!(
            command,
            Command::Stats | Command::AddAdmin | Command::RemoveAdmin | Command::Admins
        );
        if admin_only && !is_admin {
            warn!(command = ?command, "Admin command refused");
            return self.reply(message, NO_ACCESS_REPLY).await;
        }

        match command {
            Command::Start => {
                let text = if is_admin {
                    format!("{START_REPLY}{ADMIN_HELP}")
                } else {
                    START_REPLY.to_string()
                };
                self.reply(message, &text).await
            }
            Command::Help => {
                let text = if is_admin {
                    format!("{HELP_REPLY}{ADMIN_HELP}")
                } else {
                    HELP_REPLY.to_string()
                };
                self.reply(message, &text).await
            }
            Command::Clear => {
                store.clear(user_id).await;
                self.reply(message, CLEARED_REPLY).await
            }
            Command::Stats => {
                let summary = self.stats.summary().await;
                let text = format_summary(&summary, self.admins.len().await);
                self.reply(message, &text).await
            }
            Command::AddAdmin => match arg {
                Some(username) => {
                    store.transition(user_id, UserEvent::Cancelled).await;
                    self.add_admin(message, username).await
                }
                None => {
                    store.transition(user_id, UserEvent::AddAdminRequested).await;
                    self.reply(message, ADD_ADMIN_PROMPT).await
                }
            },
            Command::RemoveAdmin => match arg {
                Some(username) => {
                    store.transition(user_id, UserEvent::Cancelled).await;
                    self.remove_admin(message, username).await
                }
                None => {
                    store.transition(user_id, UserEvent::RemoveAdminRequested).await;
                    self.reply(message, REMOVE_ADMIN_PROMPT).await
                }
            },
            Command::Admins => {
                let text = self.admin_list().await;
                self.reply(message, &text).await
            }
            Command::Feedback => {
                store.transition(user_id, UserEvent::FeedbackRequested).await;
                self.reply(message, FEEDBACK_PROMPT).await
            }
            Command::Cancel => {
                let was_idle = store.user_state(user_id).await.is_idle();
                store.transition(user_id, UserEvent::Cancelled).await;
                let text = if was_idle { NOTHING_TO_CANCEL_REPLY } else { CANCELLED_REPLY };
                self.reply(message, text).await
            }
        }
    }

    async fn question(&self, message: &ChannelMessage, text: &str) -> Result<(), ChannelError> {
        let user_id = message.sender_id.as_str();
        let chat_id = message.chat_id.as_str();

        self.reply(message, PROCESSING_REPLY).await?;
        if let Err(e) = self.delivery.channel().send_typing(chat_id).await {
            debug!(error = %e, "Typing indicator failed");
        }

        match self.orchestrator.answer(user_id, text, &self.priority).await {
            Ok(answer) => {
                let parts = self.delivery.deliver(chat_id, &answer).await?;
                self.stats.increment_questions(user_id).await;
                self.feedback.remember_question(user_id, text).await;
                info!(answer_chars = answer.chars().count(), parts, "Answer delivered");
                Ok(())
            }
            Err(e) => {
                let OrchestrationError::AllProvidersFailed { last_errors } = &e;
                let kinds: Vec<String> = last_errors
                    .iter()
                    .map(|f| format!("{}={}", f.provider_id, f.kind))
                    .collect();
                error!(kind = %e.kind(), failures = ?kinds, error = %e, "Could not answer question");
                self.reply(message, ERROR_REPLY).await
            }
        }
    }

    async fn add_admin(&self, message: &ChannelMessage, username: &str) -> Result<(), ChannelError> {
        let requested_by = message.sender_name.as_deref();
        if !self.admins.is_admin(requested_by).await {
            return self.reply(message, NO_ACCESS_REPLY).await;
        }
        let text = match self.admins.add(username, requested_by).await {
            Ok(name) => format!("✅ Admin {name} added."),
            Err(e) => format!("❌ Could not add admin: {e}."),
        };
        self.reply(message, &text).await
    }

    async fn remove_admin(&self, message: &ChannelMessage, username: &str) -> Result<(), ChannelError> {
        let requested_by = message.sender_name.as_deref();
        if !self.admins.is_admin(requested_by).await {
            return self.reply(message, NO_ACCESS_REPLY).await;
        }
        let text = match self.admins.remove(username, requested_by).await {
            Ok(name) => format!("✅ Admin {name} removed."),
            Err(e) => format!("❌ Could not remove admin: {e}."),
        };
        self.reply(message, &text).await
    }

    async fn admin_list(&self) -> String {
        let admins = self.admins.list().await;
        if admins.is_empty() {
            return "📋 The admin list is empty.".into();
        }

        let mut out = format!("📋 Admins ({}):\n\n", admins.len());
        for (i, admin) in admins.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, admin.username));
            out.push_str(&format!("   Added: {}\n", admin.added_at.date_naive()));
            if let Some(by) = &admin.added_by {
                out.push_str(&format!("   Added by: {by}\n"));
            }
            out.push('\n');
        }
        out
    }

    async fn feedback_choice(&self, message: &ChannelMessage, text: &str) -> Result<(), ChannelError> {
        let user_id = message.sender_id.as_str();
        let store = self.orchestrator.store();

        let Ok(choice) = text.parse::<FeedbackChoice>() else {
            return self.reply(message, FEEDBACK_HINT).await;
        };
        if choice == FeedbackChoice::Comment {
            store.transition(user_id, UserEvent::CommentRequested).await;
            return self.reply(message, COMMENT_PROMPT).await;
        }

        self.feedback
            .record(user_id, message.sender_name.as_deref(), choice)
            .await;
        store.transition(user_id, UserEvent::InputReceived).await;
        self.reply(message, FEEDBACK_THANKS).await
    }

    async fn reply(&self, message: &ChannelMessage, text: &str) -> Result<(), ChannelError> {
        self.delivery.deliver(&message.chat_id, text).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use m1nd_agent::ConversationStore;
    use m1nd_channels::Segmenter;
    use m1nd_core::channel::{Channel, ChannelId};
    use m1nd_core::error::ProviderError;
    use m1nd_core::provider::{NormalizedRequest, NormalizedResponse, Provider};
    use m1nd_core::tool::ToolRegistry;
    use m1nd_providers::{ProviderGateway, ProviderRegistry, RetryPolicy};
    use std::sync::Mutex;
    use std::time::Duration;

    struct EchoProvider {
        call_count: Mutex<usize>,
        fail: bool,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &NormalizedRequest) -> Result<NormalizedResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            if self.fail {
                return Err(ProviderError::AuthenticationFailed("bad key".into()));
            }
            let question = request.turns.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(NormalizedResponse::answer(format!("answer to {question}")))
        }
    }

    struct RecordingChannel {
        id: ChannelId,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        fn id(&self) -> &ChannelId {
            &self.id
        }

        async fn start(&self) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn send(&self, _chat_id: &str, content: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(content.to_string());
            Ok(())
        }

        fn is_allowed(&self, _sender_id: &str) -> bool {
            true
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        provider: Arc<EchoProvider>,
        channel: Arc<RecordingChannel>,
        store: Arc<ConversationStore>,
    }

    impl Harness {
        fn new(fail: bool) -> Self {
            let provider = Arc::new(EchoProvider {
                call_count: Mutex::new(0),
                fail,
            });
            let gateway = ProviderGateway::new(
                ProviderRegistry::new().add(provider.clone(), Duration::from_secs(30)),
                RetryPolicy::new(0, Duration::from_millis(1)),
            );
            let store = Arc::new(ConversationStore::default());
            let orchestrator = Arc::new(FallbackOrchestrator::new(
                store.clone(),
                Arc::new(gateway),
                Arc::new(ToolRegistry::new()),
            ));
            let channel = Arc::new(RecordingChannel {
                id: ChannelId("recording".into()),
                sent: Mutex::new(Vec::new()),
            });
            let delivery =
                DeliveryAdapter::new(channel.clone(), Segmenter::default()).with_part_delay(Duration::ZERO);
            let dispatcher = Dispatcher::new(orchestrator, delivery, vec!["echo".into()])
                .with_admins(AdminRegistry::seeded(&["boss"]));
            Self {
                dispatcher,
                provider,
                channel,
                store,
            }
        }

        async fn send(&self, username: &str, text: &str) -> String {
            let message = ChannelMessage {
                channel_id: ChannelId("recording".into()),
                sender_id: format!("id-{username}"),
                sender_name: Some(username.to_string()),
                content: text.to_string(),
                chat_id: format!("chat-{username}"),
            };
            self.dispatcher.handle(&message).await;
            self.channel.sent.lock().unwrap().last().cloned().unwrap_or_default()
        }

        fn sent(&self) -> Vec<String> {
            self.channel.sent.lock().unwrap().clone()
        }

        fn provider_calls(&self) -> usize {
            *self.provider.call_count.lock().unwrap()
        }
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("/start"), Some((Command::Start, None)));
        assert_eq!(Command::parse("/START@m1nd_bot"), Some((Command::Start, None)));
        assert_eq!(
            Command::parse("/addadmin  @carol "),
            Some((Command::AddAdmin, Some("@carol")))
        );
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("hello /start"), None);
    }

    #[tokio::test]
    async fn question_is_answered_and_counted() {
        let h = Harness::new(false);
        h.send("alice", "hello").await;

        assert_eq!(h.sent(), vec![PROCESSING_REPLY.to_string(), "answer to hello".to_string()]);
        assert_eq!(h.dispatcher.stats().user("id-alice").await.unwrap().questions, 1);
        assert_eq!(h.store.history("id-alice").await.len(), 2);
    }

    #[tokio::test]
    async fn provider_failure_sends_apology() {
        let h = Harness::new(true);
        assert_eq!(h.send("alice", "hello").await, ERROR_REPLY);
        assert_eq!(h.dispatcher.stats().user("id-alice").await.unwrap().questions, 0);
    }

    #[tokio::test]
    async fn admin_commands_require_admin() {
        let h = Harness::new(false);
        assert_eq!(h.send("alice", "/stats").await, NO_ACCESS_REPLY);
        assert_eq!(h.send("alice", "/addadmin bob").await, NO_ACCESS_REPLY);
        assert!(h.send("boss", "/stats").await.contains("Bot statistics"));
        assert!(h.send("boss", "/admins").await.contains("1. @boss"));
    }

    #[tokio::test]
    async fn add_admin_in_two_steps() {
        let h = Harness::new(false);
        assert_eq!(h.send("boss", "/addadmin").await, ADD_ADMIN_PROMPT);
        assert_eq!(
            h.store.user_state("id-boss").await,
            UserState::AwaitingAdminUsername
        );

        assert_eq!(h.send("boss", "@carol").await, "✅ Admin @carol added.");
        assert!(h.dispatcher.admins().is_admin(Some("carol")).await);
        assert!(h.store.user_state("id-boss").await.is_idle());
        assert_eq!(h.provider_calls(), 0);
    }

    #[tokio::test]
    async fn remove_admin_with_argument() {
        let h = Harness::new(false);
        h.send("boss", "/addadmin carol").await;
        assert_eq!(h.send("boss", "/removeadmin carol").await, "✅ Admin @carol removed.");
        assert!(h
            .send("boss", "/removeadmin boss")
            .await
            .starts_with("❌ Could not remove admin"));
    }

    #[tokio::test]
    async fn feedback_comment_flow() {
        let h = Harness::new(false);
        h.send("alice", "what is rust?").await;

        assert_eq!(h.send("alice", "/feedback").await, FEEDBACK_PROMPT);
        assert_eq!(h.send("alice", "maybe").await, FEEDBACK_HINT);
        assert_eq!(h.send("alice", "comment").await, COMMENT_PROMPT);
        assert_eq!(h.send("alice", "Very helpful").await, COMMENT_THANKS);

        let entries = h.dispatcher.feedback().recent(5).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].comment.as_deref(), Some("Very helpful"));
        assert_eq!(entries[0].question.as_deref(), Some("what is rust?"));
        assert_eq!(h.provider_calls(), 1);
    }

    #[tokio::test]
    async fn feedback_rating() {
        let h = Harness::new(false);
        h.send("alice", "/feedback").await;
        assert_eq!(h.send("alice", "like").await, FEEDBACK_THANKS);
        assert_eq!(h.dispatcher.feedback().recent(1).await[0].liked, Some(true));
        assert!(h.store.user_state("id-alice").await.is_idle());
    }

    #[tokio::test]
    async fn cancel_returns_to_questions() {
        let h = Harness::new(false);
        assert_eq!(h.send("alice", "/cancel").await, NOTHING_TO_CANCEL_REPLY);
        h.send("boss", "/removeadmin").await;
        assert_eq!(h.send("boss", "/cancel").await, CANCELLED_REPLY);
        assert_eq!(h.send("boss", "ping").await, "answer to ping");
    }

    #[tokio::test]
    async fn clear_forgets_history() {
        let h = Harness::new(false);
        h.send("alice", "hello").await;
        assert_eq!(h.send("alice", "/clear").await, CLEARED_REPLY);
        assert!(h.store.history("id-alice").await.is_empty());
    }

    #[tokio::test]
    async fn start_shows_admin_commands_to_admins() {
        let h = Harness::new(false);
        assert!(!h.send("alice", "/start").await.contains("Admin commands"));
        assert!(h.send("boss", "/start").await.contains("Admin commands"));
    }

    #[tokio::test]
    async fn run_processes_channel_messages() {
        let h = Harness::new(false);
        let channel = h.channel.clone();
        let dispatcher = Arc::new(h.dispatcher);
        let (tx, rx) = mpsc::channel(8);

        let message = ChannelMessage {
            channel_id: ChannelId("recording".into()),
            sender_id: "7".into(),
            sender_name: None,
            content: "hi".into(),
            chat_id: "7".into(),
        };
        tx.send(Ok(message)).await.unwrap();
        tx.send(Err(ChannelError::ConnectionLost("blip".into()))).await.unwrap();
        drop(tx);

        dispatcher.run(rx).await;
        for _ in 0..100 {
            if channel.sent.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(channel.sent.lock().unwrap().last().map(String::as_str), Some("answer to hi"));
    }

    fn plain_message(sender: &str, text: &str) -> ChannelMessage {
        ChannelMessage {
            channel_id: ChannelId("recording".into()),
            sender_id: sender.into(),
            sender_name: None,
            content: text.into(),
            chat_id: sender.into(),
        }
    }

    async fn wait_for_sent(channel: &RecordingChannel, count: usize) {
        for _ in 0..100 {
            if channel.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_closes_its_queue() {
        let h = Harness::new(false);
        let dispatcher = Arc::new(h.dispatcher.with_worker_idle(Duration::from_secs(1)));

        let worker = dispatcher.clone().spawn_worker();
        worker.send(plain_message("7", "hi")).unwrap();
        wait_for_sent(&h.channel, 2).await;
        assert!(!worker.is_closed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(worker.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn run_respawns_a_worker_that_went_idle() {
        let h = Harness::new(false);
        let channel = h.channel.clone();
        let dispatcher = Arc::new(h.dispatcher.with_worker_idle(Duration::from_secs(1)));
        let (tx, rx) = mpsc::channel(8);
        let running = tokio::spawn(dispatcher.run(rx));

        tx.send(Ok(plain_message("7", "first"))).await.unwrap();
        wait_for_sent(&channel, 2).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        tx.send(Ok(plain_message("7", "second"))).await.unwrap();
        wait_for_sent(&channel, 4).await;
        drop(tx);
        running.await.unwrap();

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent[1], "answer to first");
        assert_eq!(sent[3], "answer to second");
    }
}
