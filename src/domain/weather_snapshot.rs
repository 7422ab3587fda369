use time::OffsetDateTime;

const FALLBACK_EMOJI: &str = "🌤️";

/// Main weather group as reported by the upstream service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    Clear,
    Clouds,
    Rain,
    Drizzle,
    Thunderstorm,
    Snow,
    Mist,
    Fog,
    Other(String),
}

impl Condition {
    pub fn parse(s: &str) -> Self {
        match s {
            "Clear" => Self::Clear,
            "Clouds" => Self::Clouds,
            "Rain" => Self::Rain,
            "Drizzle" => Self::Drizzle,
            "Thunderstorm" => Self::Thunderstorm,
            "Snow" => Self::Snow,
            "Mist" => Self::Mist,
            "Fog" => Self::Fog,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Clear => "☀️",
            Self::Clouds => "☁️",
            Self::Rain => "🌧️",
            Self::Drizzle => "🌦️",
            Self::Thunderstorm => "⛈️",
            Self::Snow => "❄️",
            Self::Mist | Self::Fog => "🌫️",
            Self::Other(_) => FALLBACK_EMOJI,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeatherSnapshot {
    pub place: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub condition: Condition,
    pub description: String,
    pub humidity: u8,
    pub wind_speed: f64,
    pub observed_at: OffsetDateTime,
}

impl WeatherSnapshot {
    pub fn render(&self) -> String {
        format!(
            "{emoji} Weather in {place}\n\
            \n\
            🌡️ Temperature: {temp}°C (feels like {feels_like}°C)\n\
            📝 Description: {description}\n\
            💧 Humidity: {humidity}%\n\
            💨 Wind Speed: {wind} m/s",
            emoji = self.condition.emoji(),
            place = self.place,
            temp = whole_degrees(self.temperature),
            feels_like = whole_degrees(self.feels_like),
            description = self.description,
            humidity = self.humidity,
            wind = self.wind_speed,
        )
    }
}

fn whole_degrees(value: f64) -> i64 {
    value.round() as i64
}
