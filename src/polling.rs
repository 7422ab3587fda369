use crate::{command_router::CommandRouter, telegram_client::TelegramClient};
use std::{sync::Arc, time::Duration};

const BACKOFF_AFTER_ERROR: Duration = Duration::from_secs(5);

/// Feeds inbound Telegram messages to the router, in arrival order.
pub async fn run_until_stopped(
    client: TelegramClient,
    router: Arc<CommandRouter>,
) -> Result<(), anyhow::Error> {
    let mut offset = 0;
    tracing::info!("Polling Telegram for messages");

    loop {
        match client.get_updates(offset).await {
            Ok((next_offset, messages)) => {
                offset = next_offset;
                for message in messages {
                    router.handle(message).await;
                }
            }
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Polling Telegram failed. Retrying shortly."
                );
                tokio::time::sleep(BACKOFF_AFTER_ERROR).await;
            }
        }
    }
}
