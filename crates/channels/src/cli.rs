//! Terminal channel: chat with the bot from stdin/stdout.
//!
//! Every line is a message from one local user, named when the channel is
//! built (`m1nd run --cli --user <name>`). Blank lines are skipped; an exit
//! word or end of input ends the session.

use async_trait::async_trait;
use m1nd_core::channel::{Channel, ChannelId, ChannelMessage};
use m1nd_core::error::ChannelError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

const EXIT_WORDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

pub struct CliChannel {
    id: ChannelId,
    user: String,
}

impl CliChannel {
    /// A terminal session owned by `user`, who is both sender id and username.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            id: ChannelId("cli".into()),
            user: user.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn chat_id(&self) -> String {
        format!("cli:{}", self.user)
    }

    /// Turn one input line into a message; `None` for blank lines.
    fn message(&self, line: &str) -> Option<ChannelMessage> {
        let content = line.trim();
        if content.is_empty() {
            return None;
        }
        Some(ChannelMessage {
            channel_id: self.id.clone(),
            sender_id: self.user.clone(),
            sender_name: Some(self.user.clone()),
            content: content.to_string(),
            chat_id: self.chat_id(),
        })
    }

    /// Forward lines from `reader` until an exit word, EOF or a closed
    /// receiver.
    fn spawn_reader<R>(&self, reader: R) -> mpsc::Receiver<Result<ChannelMessage, ChannelError>>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let session = CliChannel::new(self.user.clone());

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                };
                if is_exit(line.trim()) {
                    debug!(user = %session.user, "Terminal session ended");
                    break;
                }
                let Some(message) = session.message(&line) else {
                    continue;
                };
                if tx.send(Ok(message)).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}

fn is_exit(line: &str) -> bool {
    EXIT_WORDS.iter().any(|word| line.eq_ignore_ascii_case(word))
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(&self) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        Ok(self.spawn_reader(BufReader::new(tokio::io::stdin())))
    }

    async fn send(&self, _chat_id: &str, content: &str) -> Result<(), ChannelError> {
        println!("{content}\n");
        Ok(())
    }

    /// Only the session owner talks on this channel.
    fn is_allowed(&self, sender_id: &str) -> bool {
        sender_id == self.user
    }
}
