use crate::{
    domain::{BotToken, NotificationTime},
    subscriber_store::SubscriberStore,
};
use secrecy::{ExposeSecret, Secret};
use sqlx::FromRow;

/// Process-level values, as read from configuration files and `APP_*` variables.
#[derive(Clone, Debug)]
pub struct SettingsDefaults {
    pub bot_token: Secret<String>,
    pub weather_api_key: Secret<String>,
    pub welcome_message: String,
    pub subscribe_message: String,
    pub unsubscribe_message: String,
    pub notification_time: NotificationTime,
    pub notifications_enabled: bool,
}

/// The optional `bot_settings` row edited from the admin panel.
#[derive(Clone, Debug, Default, FromRow)]
pub struct PersistedSettings {
    pub bot_token: Option<String>,
    pub weather_api_key: Option<String>,
    pub welcome_message: Option<String>,
    pub subscribe_message: Option<String>,
    pub unsubscribe_message: Option<String>,
    pub notification_time: Option<String>,
    pub notifications_enabled: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct EffectiveSettings {
    pub bot_token: Secret<String>,
    pub weather_api_key: Secret<String>,
    pub welcome_message: String,
    pub subscribe_message: String,
    pub unsubscribe_message: String,
    pub notification_time: NotificationTime,
    pub notifications_enabled: bool,
}

#[derive(Debug)]
pub struct Credentials {
    pub bot_token: BotToken,
    pub weather_api_key: Secret<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Bot token is set neither in the bot_settings table nor in the configuration")]
    MissingBotToken,
    #[error("Weather API key is set neither in the bot_settings table nor in the configuration")]
    MissingWeatherApiKey,
    #[error("{0}")]
    InvalidBotToken(String),
    #[error("{0}")]
    InvalidUtcOffset(String),
}

impl EffectiveSettings {
    /// Startup-only check; routing must not begin when this fails.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        if self.bot_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingBotToken);
        }
        if self.weather_api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingWeatherApiKey);
        }

        let bot_token =
            BotToken::parse(self.bot_token.clone()).map_err(ConfigError::InvalidBotToken)?;

        Ok(Credentials {
            bot_token,
            weather_api_key: self.weather_api_key.clone(),
        })
    }
}

/// Persisted overrides win field by field when present and non-blank.
pub fn resolve(
    defaults: &SettingsDefaults,
    overrides: Option<&PersistedSettings>,
) -> EffectiveSettings {
    let empty = PersistedSettings::default();
    let overrides = overrides.unwrap_or(&empty);

    let notification_time = match non_blank(&overrides.notification_time) {
        Some(s) => NotificationTime::parse(s).unwrap_or_else(|e| {
            tracing::warn!(
                error.message = %e,
                "Ignoring persisted notification time. Using {}.",
                defaults.notification_time
            );
            defaults.notification_time
        }),
        None => defaults.notification_time,
    };

    EffectiveSettings {
        bot_token: secret_or(&overrides.bot_token, &defaults.bot_token),
        weather_api_key: secret_or(&overrides.weather_api_key, &defaults.weather_api_key),
        welcome_message: text_or(&overrides.welcome_message, &defaults.welcome_message),
        subscribe_message: text_or(&overrides.subscribe_message, &defaults.subscribe_message),
        unsubscribe_message: text_or(
            &overrides.unsubscribe_message,
            &defaults.unsubscribe_message,
        ),
        notification_time,
        notifications_enabled: overrides
            .notifications_enabled
            .unwrap_or(defaults.notifications_enabled),
    }
}

/// Reads the persisted row and resolves it. A store failure degrades to defaults.
#[tracing::instrument(skip_all)]
pub async fn current_settings(
    store: &dyn SubscriberStore,
    defaults: &SettingsDefaults,
) -> EffectiveSettings {
    match store.get_settings().await {
        Ok(persisted) => resolve(defaults, persisted.as_ref()),
        Err(e) => {
            tracing::warn!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to read persisted settings. Falling back to defaults."
            );
            resolve(defaults, None)
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn text_or(value: &Option<String>, default: &str) -> String {
    non_blank(value).unwrap_or(default).to_string()
}

fn secret_or(value: &Option<String>, default: &Secret<String>) -> Secret<String> {
    match non_blank(value) {
        Some(s) => Secret::new(s.to_string()),
        None => default.clone(),
    }
}
