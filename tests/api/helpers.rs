use async_trait::async_trait;
use fake::{
    faker::{internet::en::Username, name::en::FirstName},
    Fake,
};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use time::OffsetDateTime;
use tokio::net::TcpListener;
use weatherbot::{
    app_state::AppState,
    command_router::CommandRouter,
    configuration::get_configuration,
    domain::{BotToken, ChatId, SenderMeta, Subscriber},
    effective_settings::PersistedSettings,
    fan_out::FanOutDispatcher,
    startup::serve,
    subscriber_store::{StoreError, SubscriberStore},
    telegram_client::{InboundMessage, TelegramClient},
    telemetry::{get_subscriber, init_subscriber},
    weather_client::OpenWeatherClient,
};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

static TRACING: Lazy<()> = Lazy::new(|| {
    let name = "test";
    let default_env_filter = "info";
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(name.into(), default_env_filter.into(), std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(name.into(), default_env_filter.into(), std::io::sink);
        init_subscriber(subscriber);
    }
});

static FAILED_TO_EXECUTE_REQUEST: &str = "Failed to execute request";

pub const BOT_TOKEN: &str = "123456789:TEST_bot-token";
pub const DELIVERY_DELAY_MILLISECONDS: u64 = 50;

pub struct TestApp {
    pub address: SocketAddr,
    pub store: Arc<InMemoryStore>,
    pub router: CommandRouter,
    pub telegram_server: MockServer,
    pub weather_server: MockServer,
    client: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Lazy::force(&TRACING);

        let telegram_server = MockServer::start().await;
        let weather_server = MockServer::start().await;

        let mut config = get_configuration().expect("Failed to read configuration");
        config.telegram.base_url = telegram_server.uri();
        config.telegram.bot_token = Secret::new(BOT_TOKEN.into());
        config.weather.base_url = weather_server.uri();
        config.weather.api_key = Secret::new("test-weather-key".into());
        config.bot.delivery_delay_milliseconds = DELIVERY_DELAY_MILLISECONDS;

        let store = Arc::new(InMemoryStore::default());
        let bot_token =
            BotToken::parse(config.telegram.bot_token.clone()).expect("Invalid test bot token");
        let transport = Arc::new(
            TelegramClient::new(
                config.telegram.base_url.clone(),
                bot_token,
                config.telegram.timeout(),
                config.telegram.poll_timeout(),
            )
            .expect("Failed to build Telegram client"),
        );
        let weather = Arc::new(
            OpenWeatherClient::new(
                config.weather.base_url.clone(),
                config.weather.api_key.clone(),
                config.weather.units.clone(),
                config.weather.timeout(),
            )
            .expect("Failed to build weather client"),
        );

        let dispatcher = Arc::new(FanOutDispatcher::new(
            store.clone(),
            weather.clone(),
            transport.clone(),
            config.bot.default_location.clone(),
            config.bot.delivery_delay(),
        ));
        let router = CommandRouter::new(store.clone(), weather, transport, config.defaults());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind address");
        let address = listener.local_addr().expect("Failed to get local address");
        let state = AppState {
            dispatcher,
            store: store.clone(),
        };
        tokio::spawn(async move {
            serve(listener, state).await.expect("Failed to run server");
        });

        Self {
            address,
            store,
            router,
            telegram_server,
            weather_server,
            client: Client::new(),
        }
    }

    pub async fn send_text(&self, chat_id: i64, text: &str) {
        self.router
            .handle(InboundMessage {
                chat_id: ChatId::new(chat_id),
                sender: random_sender(),
                text: Some(text.to_string()),
            })
            .await;
    }

    pub async fn send_event_without_text(&self, chat_id: i64) {
        self.router
            .handle(InboundMessage {
                chat_id: ChatId::new(chat_id),
                sender: random_sender(),
                text: None,
            })
            .await;
    }

    pub async fn post_dispatch(&self) -> Response {
        self.client
            .post(self.url("/dispatch"))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn get_stats(&self) -> Response {
        self.client
            .get(self.url("/stats"))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn get_health_check(&self) -> Response {
        self.client
            .get(self.url("/health_check"))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    /// Messages Telegram received so far, as `(chat_id, text)`, in order.
    pub async fn sent_messages(&self) -> Vec<(i64, String)> {
        self.telegram_server
            .received_requests()
            .await
            .expect("Request recording is disabled")
            .iter()
            .filter(|request| request.url.path().ends_with("/sendMessage"))
            .map(|request| {
                let body: Value =
                    serde_json::from_slice(&request.body).expect("Failed to parse request body");
                (
                    body["chat_id"].as_i64().expect("Missing chat_id"),
                    body["text"].as_str().expect("Missing text").to_string(),
                )
            })
            .collect()
    }

    pub async fn mount_telegram_accepting_messages(&self) {
        Mock::given(path(format!("/bot{BOT_TOKEN}/sendMessage")))
            .and(method("POST"))
            .respond_with(telegram_ok())
            .mount(&self.telegram_server)
            .await;
    }

    pub async fn mount_weather(&self, place: &str, body: Value) {
        Mock::given(path("/data/2.5/weather"))
            .and(method("GET"))
            .and(query_param("q", place))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.weather_server)
            .await;
    }

    fn url(&self, endpoint: &str) -> String {
        format!("http://{}{endpoint}", self.address)
    }
}

pub fn telegram_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": { "message_id": 1 }
    }))
}

pub fn weather_body(place: &str, temp: f64, feels_like: f64, condition: &str) -> Value {
    json!({
        "name": place,
        "main": { "temp": temp, "feels_like": feels_like, "humidity": 64 },
        "weather": [{ "main": condition, "description": "as observed" }],
        "wind": { "speed": 3.5 }
    })
}

pub fn random_sender() -> SenderMeta {
    SenderMeta {
        first_name: Some(FirstName().fake()),
        last_name: None,
        username: Some(Username().fake()),
    }
}

pub fn subscriber(chat_id: i64, subscribed: bool, blocked: bool) -> Subscriber {
    Subscriber {
        chat_id: ChatId::new(chat_id),
        sender: random_sender(),
        subscribed,
        blocked,
        location: None,
        last_active_at: OffsetDateTime::now_utc(),
    }
}

/// Mirrors the Postgres store: upserts keep flags, `list_subscribed` filters.
#[derive(Default)]
pub struct InMemoryStore {
    subscribers: Mutex<BTreeMap<ChatId, Subscriber>>,
    settings: Mutex<Option<PersistedSettings>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn insert(&self, subscriber: Subscriber) {
        self.subscribers
            .lock()
            .unwrap()
            .insert(subscriber.chat_id, subscriber);
    }

    pub fn get(&self, chat_id: i64) -> Option<Subscriber> {
        self.subscribers
            .lock()
            .unwrap()
            .get(&ChatId::new(chat_id))
            .cloned()
    }

    pub fn set_settings(&self, settings: PersistedSettings) {
        *self.settings.lock().unwrap() = Some(settings);
    }

    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Query(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    fn upsert(&self, chat_id: ChatId, sender: &SenderMeta, subscribed: Option<bool>) {
        let mut subscribers = self.subscribers.lock().unwrap();
        let entry = subscribers.entry(chat_id).or_insert_with(|| Subscriber {
            chat_id,
            sender: sender.clone(),
            subscribed: false,
            blocked: false,
            location: None,
            last_active_at: OffsetDateTime::now_utc(),
        });
        if let Some(subscribed) = subscribed {
            entry.subscribed = subscribed;
        } else {
            entry.sender = sender.clone();
        }
        entry.last_active_at = OffsetDateTime::now_utc();
    }
}

#[async_trait]
impl SubscriberStore for InMemoryStore {
    async fn upsert_subscriber(
        &self,
        chat_id: ChatId,
        sender: &SenderMeta,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.upsert(chat_id, sender, None);
        Ok(())
    }

    async fn set_subscribed(
        &self,
        chat_id: ChatId,
        sender: &SenderMeta,
        subscribed: bool,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.upsert(chat_id, sender, Some(subscribed));
        Ok(())
    }

    async fn list_subscribed(&self) -> Result<Vec<Subscriber>, StoreError> {
        self.check_available()?;
        Ok(self
            .subscribers
            .lock()
            .unwrap()
            .values()
            .filter(|subscriber| subscriber.subscribed && !subscriber.blocked)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Subscriber>, StoreError> {
        self.check_available()?;
        Ok(self.subscribers.lock().unwrap().values().cloned().collect())
    }

    async fn get_settings(&self) -> Result<Option<PersistedSettings>, StoreError> {
        self.check_available()?;
        Ok(self.settings.lock().unwrap().clone())
    }
}
