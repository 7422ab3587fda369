pub mod app_state;
pub mod command_router;
pub mod configuration;
pub mod domain;
pub mod effective_settings;
pub mod fan_out;
pub mod polling;
pub mod routes;
pub mod scheduler;
pub mod startup;
pub mod subscriber_store;
pub mod telegram_client;
pub mod telemetry;
pub mod utils;
pub mod weather_client;
