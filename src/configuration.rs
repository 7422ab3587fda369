use crate::{domain::NotificationTime, effective_settings::SettingsDefaults};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::{deserialize_bool_from_anything, deserialize_number_from_string};
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};
use std::time::Duration;
use time::UtcOffset;
use tracing_log::log::LevelFilter;

const MIN_TICK_INTERVAL_SECONDS: u64 = 60;

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub telegram: TelegramSettings,
    pub weather: WeatherSettings,
    pub bot: BotSettings,
}

impl Settings {
    pub fn defaults(&self) -> SettingsDefaults {
        SettingsDefaults {
            bot_token: self.telegram.bot_token.clone(),
            weather_api_key: self.weather.api_key.clone(),
            welcome_message: self.bot.welcome_message.clone(),
            subscribe_message: self.bot.subscribe_message.clone(),
            unsubscribe_message: self.bot.unsubscribe_message.clone(),
            notification_time: self.bot.notification_time,
            notifications_enabled: self.bot.notifications_enabled,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    pub database_name: String,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db()
            .database(&self.database_name)
            .log_statements(LevelFilter::Trace)
    }

    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose_secret())
            .ssl_mode(ssl_mode)
    }
}

#[derive(Clone, Deserialize)]
pub struct TelegramSettings {
    pub base_url: String,
    /// May stay empty when the token is kept in the bot_settings table.
    #[serde(default = "empty_secret")]
    pub bot_token: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_timeout_seconds: u64,
}

impl TelegramSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }
}

#[derive(Clone, Deserialize)]
pub struct WeatherSettings {
    pub base_url: String,
    #[serde(default = "empty_secret")]
    pub api_key: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    #[serde(default = "metric")]
    pub units: String,
}

impl WeatherSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

#[derive(Clone, Deserialize)]
pub struct BotSettings {
    pub welcome_message: String,
    pub subscribe_message: String,
    pub unsubscribe_message: String,
    pub notification_time: NotificationTime,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub notifications_enabled: bool,
    pub default_location: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub utc_offset_hours: i8,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub tick_interval_seconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub delivery_delay_milliseconds: u64,
}

impl BotSettings {
    /// Ticks finer than a minute buy nothing: the trigger is a minute of the day.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds.max(MIN_TICK_INTERVAL_SECONDS))
    }

    pub fn delivery_delay(&self) -> Duration {
        Duration::from_millis(self.delivery_delay_milliseconds)
    }

    pub fn utc_offset(&self) -> Result<UtcOffset, String> {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0)
            .map_err(|e| format!("`{}` is not a valid UTC offset: {e}", self.utc_offset_hours))
    }
}

fn empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

fn metric() -> String {
    "metric".into()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let config_dir = std::env::current_dir()
        .map(|dir| dir.join("configuration"))
        .map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let env_config = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(config_dir.join("base.yaml")))
        .add_source(config::File::from(config_dir.join(env_config)))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}

#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "`{other}` is not a supported environment. Use either `local` or `production`."
            )),
        }
    }
}
