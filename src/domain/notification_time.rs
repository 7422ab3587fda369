use serde::Deserialize;
use std::fmt;

/// Minute of the day, 24h clock, at which scheduled notifications go out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct NotificationTime {
    hour: u8,
    minute: u8,
}

impl NotificationTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, String> {
        if hour > 23 || minute > 59 {
            return Err(format!("`{hour:02}:{minute:02}` is not a valid time of day"));
        }
        Ok(Self { hour, minute })
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("`{s}` is not in HH:MM format"))?;

        let parse_part = |part: &str| -> Result<u8, String> {
            if part.is_empty() || part.len() > 2 || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("`{s}` is not in HH:MM format"));
            }
            part.parse::<u8>()
                .map_err(|_| format!("`{s}` is not in HH:MM format"))
        };

        Self::new(parse_part(hour)?, parse_part(minute)?)
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl TryFrom<String> for NotificationTime {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl fmt::Display for NotificationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}
