//! Telegram channel adapter.
//!
//! Long-polls the Bot API's `getUpdates` with an advancing offset and turns
//! text messages into [`ChannelMessage`]s. Answers go out through
//! `sendMessage`, typing indicators through `sendChatAction`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use m1nd_config::TelegramConfig;
use m1nd_core::channel::{Channel, ChannelId, ChannelMessage};
use m1nd_core::error::ChannelError;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const API_BASE: &str = "https://api.telegram.org";

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct TelegramChannel {
    config: TelegramConfig,
    channel_id: ChannelId,
    api_base: String,
    client: reqwest::Client,
    running: Arc<AtomicBool>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            channel_id: ChannelId("telegram".into()),
            api_base: API_BASE.into(),
            client: reqwest::Client::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.config.bot_token, method)
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let failed = |reason: String| ChannelError::DeliveryFailed {
            channel: "telegram".into(),
            reason,
        };

        let reply: ApiReply<serde_json::Value> = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?
            .json()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?;

        if reply.ok {
            Ok(())
        } else {
            Err(failed(reply.description.unwrap_or_else(|| format!("{method} failed"))))
        }
    }
}

/// Telegram accepts numeric chat ids as numbers; anything else is passed as is.
fn chat_id_value(chat_id: &str) -> serde_json::Value {
    chat_id
        .parse::<i64>()
        .map(serde_json::Value::from)
        .unwrap_or_else(|_| serde_json::Value::from(chat_id))
}

/// Allowlist check over the numeric id and the username.
fn allows(allowed: &[String], sender_id: &str, username: Option<&str>) -> bool {
    allowed.iter().any(|entry| {
        let entry = entry.trim_start_matches('@');
        entry == "*"
            || entry == sender_id
            || username.is_some_and(|u| u.eq_ignore_ascii_case(entry))
    })
}

/// State owned by the background polling task.
struct Poller {
    client: reqwest::Client,
    url: String,
    poll_timeout_secs: u64,
    allowed_users: Vec<String>,
    channel_id: ChannelId,
    running: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<ChannelMessage, ChannelError>>,
}

impl Poller {
    async fn run(self) {
        let mut offset: i64 = 0;

        while self.running.load(Ordering::SeqCst) {
            let updates = match self.poll(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Telegram poll failed");
                    if self.tx.send(Err(e)).await.is_err() {
                        break;
                    }
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.into_channel_message(&self.channel_id) else {
                    continue;
                };
                if !allows(&self.allowed_users, &message.sender_id, message.sender_name.as_deref()) {
                    warn!(sender_id = %message.sender_id, "Ignoring message from unauthorized user");
                    continue;
                }
                if self.tx.send(Ok(message)).await.is_err() {
                    return;
                }
            }
        }

        debug!("Telegram polling stopped");
    }

    async fn poll(&self, offset: i64) -> Result<Vec<Update>, ChannelError> {
        let lost = |e: reqwest::Error| ChannelError::ConnectionLost(e.without_url().to_string());

        let reply: ApiReply<Vec<Update>> = self
            .client
            .get(&self.url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout_secs.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .send()
            .await
            .map_err(lost)?
            .json()
            .await
            .map_err(lost)?;

        if !reply.ok {
            return Err(ChannelError::ConnectionLost(
                reply.description.unwrap_or_else(|| "getUpdates failed".into()),
            ));
        }
        Ok(reply.result.unwrap_or_default())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(ChannelError::NotConfigured(
                "telegram.bot_token is empty (set TELEGRAM_BOT_TOKEN)".into(),
            ));
        }

        info!(poll_timeout_secs = self.config.poll_timeout_secs, "Telegram channel starting");
        let (tx, rx) = mpsc::channel(64);
        self.running.store(true, Ordering::SeqCst);

        let poller = Poller {
            client: self.client.clone(),
            url: self.method_url("getUpdates"),
            poll_timeout_secs: self.config.poll_timeout_secs,
            allowed_users: self.config.allowed_users.clone(),
            channel_id: self.channel_id.clone(),
            running: self.running.clone(),
            tx,
        };
        tokio::spawn(poller.run());

        Ok(rx)
    }

    async fn send(&self, chat_id: &str, content: &str) -> Result<(), ChannelError> {
        debug!(chat_id = %chat_id, content_len = content.len(), "Telegram send");
        self.call(
            "sendMessage",
            serde_json::json!({ "chat_id": chat_id_value(chat_id), "text": content }),
        )
        .await
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.call(
            "sendChatAction",
            serde_json::json!({ "chat_id": chat_id_value(chat_id), "action": "typing" }),
        )
        .await
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        allows(&self.config.allowed_users, sender_id, None)
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Telegram channel stopping");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// --- Bot API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

impl Update {
    /// Text messages only; stickers, photos and service updates are skipped.
    fn into_channel_message(self, channel_id: &ChannelId) -> Option<ChannelMessage> {
        let message = self.message?;
        let text = message.text?;
        let from = message.from?;
        Some(ChannelMessage {
            channel_id: channel_id.clone(),
            sender_id: from.id.to_string(),
            sender_name: from.username,
            content: text,
            chat_id: message.chat.id.to_string(),
        })
    }
}
