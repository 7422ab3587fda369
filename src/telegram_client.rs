use crate::domain::{BotToken, ChatId, SenderMeta};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Telegram request failed")]
    Request(#[source] reqwest::Error),
    #[error("Telegram rejected the call: {0}")]
    Rejected(String),
}

// Request URLs carry the bot token.
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.without_url())
    }
}

/// Outbound half of the chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;
}

/// One inbound event, reduced to what the command router needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender: SenderMeta,
    pub text: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    http_client: Client,
    base_url: String,
    bot_token: BotToken,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(
        base_url: String,
        bot_token: BotToken,
        timeout: Duration,
        poll_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url,
            bot_token,
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.base_url,
            self.bot_token.expose_secret()
        )
    }

    /// Long-polls for updates after `offset`. Returns the offset to use next
    /// together with the messages, in arrival order.
    #[tracing::instrument(name = "Poll Telegram for updates", skip(self))]
    pub async fn get_updates(
        &self,
        offset: i64,
    ) -> Result<(i64, Vec<InboundMessage>), TransportError> {
        let response: ApiResponse<Vec<Update>> = self
            .http_client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout.as_secs().to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            // The client-wide timeout must not cut a long poll short.
            .timeout(self.poll_timeout + self.poll_grace())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let updates = response.into_result()?;
        let next_offset = updates
            .last()
            .map(|update| update.update_id + 1)
            .unwrap_or(offset);
        let messages = updates
            .into_iter()
            .filter_map(Update::into_inbound)
            .collect();

        Ok((next_offset, messages))
    }

    fn poll_grace(&self) -> Duration {
        Duration::from_secs(10)
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    #[tracing::instrument(name = "Send Telegram message", skip(self, text))]
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        let request_body = SendMessageRequest {
            chat_id: chat_id.as_i64(),
            text,
        };

        let response = self
            .http_client
            .post(self.method_url("sendMessage"))
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse<serde_json::Value> = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(TransportError::Rejected(format!("HTTP status {status}")))
            }
            Err(e) => return Err(e.into()),
        };
        body.into_result().map(|_| ())
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TransportError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TransportError::Rejected("missing `result` field".into())),
            (false, _) => Err(TransportError::Rejected(
                self.description.unwrap_or_else(|| "no description".into()),
            )),
        }
    }
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct User {
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
}

impl Update {
    fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let sender = message
            .from
            .map(|user| SenderMeta {
                first_name: user.first_name,
                last_name: user.last_name,
                username: user.username,
            })
            .unwrap_or_default();

        Some(InboundMessage {
            chat_id: ChatId::new(message.chat.id),
            sender,
            text: message.text,
        })
    }
}
