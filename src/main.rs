use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marina_booking::{
    app,
    config::Config,
    services::verifier::WebhookVerifier,
    store::PgBookingStore,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Marina Booking API ({})", config.app.environment);

    // Без секрета вебхуков не стартуем
    let verifier = WebhookVerifier::from_config(&config.payment)
        .context("Webhook verifier misconfigured")?;

    let store = PgBookingStore::connect(&config.database.url, config.database.pool_size)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    store.run_migrations()
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(store);
    let app_state = AppState::new(store, verifier);

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("HOST/PORT do not form a socket address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state).into_make_service()).await?;

    Ok(())
}
