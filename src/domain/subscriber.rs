use super::ChatId;
use time::OffsetDateTime;

/// Display metadata that arrives with every inbound message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SenderMeta {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl SenderMeta {
    /// Best human-readable handle for log lines.
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscriber {
    pub chat_id: ChatId,
    pub sender: SenderMeta,
    pub subscribed: bool,
    pub blocked: bool,
    pub location: Option<String>,
    pub last_active_at: OffsetDateTime,
}

impl Subscriber {
    pub fn receives_notifications(&self) -> bool {
        self.subscribed && !self.blocked
    }

    /// The subscriber's own place, unless it is unset or blank.
    pub fn location_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.location.as_deref() {
            Some(location) if !location.trim().is_empty() => location,
            _ => default,
        }
    }
}
