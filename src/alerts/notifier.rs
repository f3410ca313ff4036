//! Notification transports for heartbeats and alarms

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

/// Longest chunk sent in one message
pub const MAX_MESSAGE_CHARS: usize = 4000;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Sends text to a destination (chat id, channel, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, destination: &str, text: &str) -> Result<(), NotificationError>;

    /// Delete messages sent so far; returns how many were removed
    async fn clear_sent(&self) -> Result<usize, NotificationError> {
        Ok(0)
    }
}

/// Writes notifications to the tracing log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), NotificationError> {
        tracing::warn!(destination = %destination, "Notification: {}", text);
        Ok(())
    }
}

/// Telegram Bot API transport
pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    api_base: String,
    /// (chat id, message id) of everything sent, for `clear_sent`
    sent: Mutex<Vec<(String, i64)>>,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<TelegramMessage>,
}

#[derive(Deserialize)]
struct TelegramMessage {
    message_id: i64,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(SEND_TIMEOUT)
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Point the notifier at a different Bot API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<TelegramResponse, NotificationError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| NotificationError::Transport(format!("{} ({})", e, status)))?;

        if !body.ok {
            return Err(NotificationError::Rejected(
                body.description
                    .clone()
                    .unwrap_or_else(|| format!("status {}", status)),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "chat_id": destination,
            "text": text,
        });
        let body = self.call("sendMessage", payload).await?;

        if let Some(message) = body.result {
            self.sent
                .lock()
                .push((destination.to_string(), message.message_id));
        }

        tracing::debug!(destination = %destination, "Telegram message sent");
        Ok(())
    }

    async fn clear_sent(&self) -> Result<usize, NotificationError> {
        let sent: Vec<(String, i64)> = std::mem::take(&mut *self.sent.lock());
        let mut deleted = 0;

        for (chat_id, message_id) in sent {
            let payload = serde_json::json!({
                "chat_id": chat_id,
                "message_id": message_id,
            });
            match self.call("deleteMessage", payload).await {
                Ok(_) => deleted += 1,
                Err(e) => {
                    tracing::warn!(chat_id = %chat_id, message_id, error = %e, "Failed to delete message");
                }
            }
        }

        Ok(deleted)
    }
}

/// Split `text` into chunks of at most `max_chars` characters
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected by provider: {0}")]
    Rejected(String),
}
