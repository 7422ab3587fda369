use crate::{
    domain::Subscriber,
    subscriber_store::SubscriberStore,
    telegram_client::{ChatTransport, TransportError},
    weather_client::{LookupError, WeatherLookup},
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{field::Empty, Span};
use uuid::Uuid;

const GREETING: &str = "🌅 Good morning! Here's your daily weather update:";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed(DeliveryReport),
    AlreadyRunning,
    SubscribersUnavailable,
}

#[derive(Debug, thiserror::Error)]
enum DeliveryError {
    #[error("Failed to look up weather for `{place}`")]
    Lookup {
        place: String,
        #[source]
        source: LookupError,
    },
    #[error("Failed to send the update")]
    Transport(#[from] TransportError),
}

/// Sends the daily update to every subscriber, one at a time.
pub struct FanOutDispatcher {
    store: Arc<dyn SubscriberStore>,
    weather: Arc<dyn WeatherLookup>,
    transport: Arc<dyn ChatTransport>,
    default_location: String,
    delivery_delay: Duration,
    running: Mutex<()>,
}

impl FanOutDispatcher {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        weather: Arc<dyn WeatherLookup>,
        transport: Arc<dyn ChatTransport>,
        default_location: String,
        delivery_delay: Duration,
    ) -> Self {
        Self {
            store,
            weather,
            transport,
            default_location,
            delivery_delay,
            running: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// A call made while another run is in progress returns `AlreadyRunning` without waiting.
    #[tracing::instrument(name = "Fan out daily update", skip(self), fields(run_id = %Uuid::new_v4(), recipients = Empty))]
    pub async fn dispatch(&self) -> DispatchOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::warn!("A fan-out run is already in progress. Skipping.");
            return DispatchOutcome::AlreadyRunning;
        };

        let subscribers = match self.store.list_subscribed().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Failed to list subscribers. Nothing was sent."
                );
                return DispatchOutcome::SubscribersUnavailable;
            }
        };
        let recipients: Vec<Subscriber> = subscribers
            .into_iter()
            .filter(Subscriber::receives_notifications)
            .collect();
        Span::current().record("recipients", recipients.len());

        let mut report = DeliveryReport::default();
        let mut last_send: Option<Instant> = None;

        for subscriber in &recipients {
            report.attempted += 1;

            match self.deliver(subscriber, &mut last_send).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        chat_id = %subscriber.chat_id,
                        error.cause_chain = ?e,
                        error.message = %e,
                        "Failed to deliver the daily update. Skipping."
                    );
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Fan-out run finished"
        );
        DispatchOutcome::Completed(report)
    }

    /// Sends start at least `delivery_delay` apart, however long the lookups take.
    #[tracing::instrument(skip_all, fields(chat_id = %subscriber.chat_id))]
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        last_send: &mut Option<Instant>,
    ) -> Result<(), DeliveryError> {
        let place = subscriber.location_or(&self.default_location);
        let snapshot = self
            .weather
            .lookup(place)
            .await
            .map_err(|source| DeliveryError::Lookup {
                place: place.to_string(),
                source,
            })?;
        let message = format!("{GREETING}\n\n{}", snapshot.render());

        if let Some(previous) = *last_send {
            tokio::time::sleep_until(previous + self.delivery_delay).await;
        }
        *last_send = Some(Instant::now());
        self.transport.send(subscriber.chat_id, &message).await?;
        Ok(())
    }
}
