use crate::domain::{Condition, WeatherSnapshot};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("No weather is known for `{0}`")]
    UnknownPlace(String),
    #[error("Weather service request failed")]
    Upstream(#[source] reqwest::Error),
    #[error("Weather service returned an unexpected payload: {0}")]
    MalformedResponse(String),
}

// Request URLs carry the API key.
impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        Self::Upstream(e.without_url())
    }
}

/// Resolves a free-text place name to its current conditions.
#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn lookup(&self, place: &str) -> Result<WeatherSnapshot, LookupError>;
}

#[derive(Clone)]
pub struct OpenWeatherClient {
    http_client: Client,
    base_url: String,
    api_key: Secret<String>,
    units: String,
}

impl OpenWeatherClient {
    pub fn new(
        base_url: String,
        api_key: Secret<String>,
        units: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            units,
        })
    }
}

#[async_trait]
impl WeatherLookup for OpenWeatherClient {
    #[tracing::instrument(name = "Look up current weather", skip(self))]
    async fn lookup(&self, place: &str) -> Result<WeatherSnapshot, LookupError> {
        let url = format!("{}/data/2.5/weather", &self.base_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("q", place),
                ("appid", self.api_key.expose_secret().as_str()),
                ("units", self.units.as_str()),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LookupError::UnknownPlace(place.to_string()));
        }

        let body = response.error_for_status()?.bytes().await?;
        let current: CurrentWeatherResponse = serde_json::from_slice(&body)
            .map_err(|e| LookupError::MalformedResponse(e.to_string()))?;

        current.into_snapshot(place)
    }
}

#[derive(Deserialize)]
struct CurrentWeatherResponse {
    #[serde(default)]
    name: String,
    main: MainReadings,
    weather: Vec<WeatherGroup>,
    wind: Wind,
}

#[derive(Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Deserialize)]
struct WeatherGroup {
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct Wind {
    speed: f64,
}

impl CurrentWeatherResponse {
    fn into_snapshot(self, queried_place: &str) -> Result<WeatherSnapshot, LookupError> {
        let group = self
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| LookupError::MalformedResponse("empty `weather` list".into()))?;

        let place = if self.name.trim().is_empty() {
            queried_place.to_string()
        } else {
            self.name
        };

        Ok(WeatherSnapshot {
            place,
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            condition: Condition::parse(&group.main),
            description: group.description,
            humidity: self.main.humidity,
            wind_speed: self.wind.speed,
            observed_at: OffsetDateTime::now_utc(),
        })
    }
}
