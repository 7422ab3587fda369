use crate::{
    app_state::AppState,
    command_router::CommandRouter,
    configuration::{DatabaseSettings, Settings},
    effective_settings::{current_settings, ConfigError},
    fan_out::FanOutDispatcher,
    polling,
    routes::{dispatch, health_check, stats},
    scheduler::SchedulerLoop,
    subscriber_store::{PgSubscriberStore, SubscriberStore},
    telegram_client::{ChatTransport, TelegramClient},
    telemetry::request_span,
    weather_client::{OpenWeatherClient, WeatherLookup},
};
use anyhow::Context;
use axum::Router;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub struct Application {
    listener: TcpListener,
    state: AppState,
    router: Arc<CommandRouter>,
    telegram: TelegramClient,
    scheduler: SchedulerLoop,
}

impl Application {
    /// Fails with a [`ConfigError`] when the resolved credentials are missing or
    /// malformed. Nothing is routed in that case.
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let db_pool = get_connection_pool(&config.database);
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to migrate the database")?;
        let store: Arc<dyn SubscriberStore> = Arc::new(PgSubscriberStore::new(db_pool));

        let defaults = config.defaults();
        let credentials = current_settings(store.as_ref(), &defaults)
            .await
            .credentials()?;
        let utc_offset = config
            .bot
            .utc_offset()
            .map_err(ConfigError::InvalidUtcOffset)?;
        tracing::info!(
            bot_token = %credentials.bot_token.redacted(),
            "Credentials resolved"
        );

        let telegram = TelegramClient::new(
            config.telegram.base_url.clone(),
            credentials.bot_token,
            config.telegram.timeout(),
            config.telegram.poll_timeout(),
        )
        .context("Failed to build the Telegram client")?;
        let transport: Arc<dyn ChatTransport> = Arc::new(telegram.clone());
        let weather: Arc<dyn WeatherLookup> = Arc::new(
            OpenWeatherClient::new(
                config.weather.base_url.clone(),
                credentials.weather_api_key,
                config.weather.units.clone(),
                config.weather.timeout(),
            )
            .context("Failed to build the weather client")?,
        );

        let dispatcher = Arc::new(FanOutDispatcher::new(
            store.clone(),
            weather.clone(),
            transport.clone(),
            config.bot.default_location.clone(),
            config.bot.delivery_delay(),
        ));
        let router = Arc::new(CommandRouter::new(
            store.clone(),
            weather,
            transport,
            defaults.clone(),
        ));
        let scheduler = SchedulerLoop {
            dispatcher: dispatcher.clone(),
            store: store.clone(),
            defaults,
            tick_interval: config.bot.tick_interval(),
            utc_offset,
        };

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;

        Ok(Self {
            listener,
            state: AppState { dispatcher, store },
            router,
            telegram,
            scheduler,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Serves HTTP, ticks the scheduler and polls Telegram until one of them stops.
    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        tracing::info!("Listening on {}", self.listener.local_addr()?);

        tokio::select! {
            result = serve(self.listener, self.state) => result.context("HTTP server stopped"),
            result = self.scheduler.run_until_stopped() => result,
            result = polling::run_until_stopped(self.telegram, self.router) => result,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health_check::router())
        .merge(dispatch::router())
        .merge(stats::router())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

pub fn get_connection_pool(config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(config.with_db())
}
