mod bot_token;
mod chat_id;
mod notification_time;
mod subscriber;
mod weather_snapshot;

pub use bot_token::BotToken;
pub use chat_id::ChatId;
pub use notification_time::NotificationTime;
pub use subscriber::{SenderMeta, Subscriber};
pub use weather_snapshot::{Condition, WeatherSnapshot};
