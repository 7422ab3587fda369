use crate::{
    effective_settings::{current_settings, EffectiveSettings, SettingsDefaults},
    subscriber_store::{StoreError, SubscriberStore},
    telegram_client::{ChatTransport, InboundMessage},
    weather_client::{LookupError, WeatherLookup},
};
use std::sync::Arc;
use tracing::{field::Empty, Span};

pub const COMMAND_LIST: &str = "Available commands:\n\
    /start - Start the bot\n\
    /subscribe - Subscribe to daily weather updates\n\
    /unsubscribe - Unsubscribe from updates\n\
    /weather [city] - Get current weather for a city\n\
    /help - Show this help message";

/// What one inbound text asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Subscribe,
    Unsubscribe,
    Weather(String),
    Help,
    Unknown(String),
    PlaceName(String),
}

impl Command {
    /// `None` for events that deserve no reply at all.
    pub fn parse(text: Option<&str>) -> Option<Self> {
        let text = text?.trim();
        if text.is_empty() {
            return None;
        }

        if !text.starts_with('/') {
            return Some(Self::PlaceName(text.to_string()));
        }

        let (head, argument) = match text.split_once(char::is_whitespace) {
            Some((head, argument)) => (head, argument.trim()),
            None => (text, ""),
        };
        // Group chats address commands as `/weather@SomeBot`.
        let name = head.split('@').next().unwrap_or(head);

        let command = match name {
            "/start" => Self::Start,
            "/subscribe" => Self::Subscribe,
            "/unsubscribe" => Self::Unsubscribe,
            "/weather" if !argument.is_empty() => Self::Weather(argument.to_string()),
            "/help" => Self::Help,
            _ => Self::Unknown(text.to_string()),
        };
        Some(command)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Weather(_) => "weather",
            Self::Help => "help",
            Self::Unknown(_) => "unknown",
            Self::PlaceName(_) => "place_name",
        }
    }
}

pub struct CommandRouter {
    store: Arc<dyn SubscriberStore>,
    weather: Arc<dyn WeatherLookup>,
    transport: Arc<dyn ChatTransport>,
    defaults: SettingsDefaults,
}

impl CommandRouter {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        weather: Arc<dyn WeatherLookup>,
        transport: Arc<dyn ChatTransport>,
        defaults: SettingsDefaults,
    ) -> Self {
        Self {
            store,
            weather,
            transport,
            defaults,
        }
    }

    /// Runs the action for one message and sends the reply. Never fails:
    /// adapter errors end up in the logs or in the reply text.
    #[tracing::instrument(
        name = "Handle inbound message",
        skip_all,
        fields(chat_id = %message.chat_id, command = Empty)
    )]
    pub async fn handle(&self, message: InboundMessage) {
        let Some(command) = Command::parse(message.text.as_deref()) else {
            return;
        };
        Span::current().record("command", command.name());
        tracing::info!(
            "{} sent a {} message",
            message.sender.display_name(),
            command.name()
        );

        let reply = self.reply_to(&message, command).await;

        if let Err(e) = self.transport.send(message.chat_id, &reply).await {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to deliver a reply"
            );
        }
    }

    async fn reply_to(&self, message: &InboundMessage, command: Command) -> String {
        if !matches!(command, Command::Subscribe | Command::Unsubscribe) {
            self.record_activity(message).await;
        }

        match command {
            Command::Start => self.settings().await.welcome_message,
            Command::Subscribe => {
                self.set_subscribed(message, true).await;
                self.settings().await.subscribe_message
            }
            Command::Unsubscribe => {
                self.set_subscribed(message, false).await;
                self.settings().await.unsubscribe_message
            }
            Command::Weather(place) => {
                self.weather_reply(&place, |place| {
                    format!(
                        "❌ Sorry, I couldn't get weather data for \"{place}\". \
                        Please check the city name and try again."
                    )
                })
                .await
            }
            Command::PlaceName(place) => {
                self.weather_reply(&place, |place| {
                    format!(
                        "❌ I couldn't find weather for \"{place}\".\n\n\
                        Try using: /weather {place}\n\n\
                        Or use /help to see all available commands."
                    )
                })
                .await
            }
            Command::Help => {
                format!("🤖 Weather Bot Help\n\n{COMMAND_LIST}\n\nExample: /weather London")
            }
            Command::Unknown(text) => format!("❌ Unknown command: {text}\n\n{COMMAND_LIST}"),
        }
    }

    async fn weather_reply(
        &self,
        place: &str,
        on_failure: impl FnOnce(&str) -> String,
    ) -> String {
        match self.weather.lookup(place).await {
            Ok(snapshot) => snapshot.render(),
            Err(e) => {
                log_lookup_failure(&e);
                on_failure(place)
            }
        }
    }

    /// Creates the row or refreshes its display fields and `last_active_at`.
    async fn record_activity(&self, message: &InboundMessage) {
        if let Err(e) = self
            .store
            .upsert_subscriber(message.chat_id, &message.sender)
            .await
        {
            log_store_failure(&e);
        }
    }

    async fn set_subscribed(&self, message: &InboundMessage, subscribed: bool) {
        if let Err(e) = self
            .store
            .set_subscribed(message.chat_id, &message.sender, subscribed)
            .await
        {
            log_store_failure(&e);
        }
    }

    async fn settings(&self) -> EffectiveSettings {
        current_settings(self.store.as_ref(), &self.defaults).await
    }
}

fn log_store_failure(e: &StoreError) {
    tracing::error!(
        error.cause_chain = ?e,
        error.message = %e,
        "Failed to persist subscriber state. Replying anyway."
    );
}

fn log_lookup_failure(e: &LookupError) {
    tracing::warn!(
        error.cause_chain = ?e,
        error.message = %e,
        "Weather lookup failed"
    );
}
