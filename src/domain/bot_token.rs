use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, Secret};

const TOKEN_PATTERN: &str = r"^[0-9]+:[A-Za-z0-9_-]+$";

/// Telegram bot token in the `<bot id>:<secret>` shape handed out by BotFather.
#[derive(Clone, Debug)]
pub struct BotToken(Secret<String>);

impl BotToken {
    pub fn parse(s: Secret<String>) -> Result<Self, String> {
        static RE: Lazy<Regex> = Lazy::new(|| Regex::new(TOKEN_PATTERN).unwrap());

        if RE.is_match(s.expose_secret()) {
            Ok(Self(s))
        } else {
            Err(format!(
                "Bot token `{}` does not look like `<digits>:<token>`",
                redacted(s.expose_secret())
            ))
        }
    }

    /// First few characters, safe to put in a log line.
    pub fn redacted(&self) -> String {
        redacted(self.0.expose_secret())
    }
}

impl ExposeSecret<String> for BotToken {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}

fn redacted(s: &str) -> String {
    let prefix: String = s.chars().take(10).collect();
    format!("{prefix}...")
}
