use weatherbot::{
    configuration::get_configuration,
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("weatherbot".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let config = get_configuration()?;
    let application = Application::build(config).await.map_err(|e| {
        tracing::error!(error.cause_chain = ?e, "Refusing to start");
        e
    })?;

    application.run_until_stopped().await
}
