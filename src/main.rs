// End-to-end tests live in src/tests so they can reach the crate's private
// modules through the library.
#[cfg(test)]
mod tests;

use anyhow::Context;
use inkpad::util::common::load_dotenv;
use inkpad::{create_app, AppState};
use tokio::net::TcpListener;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or(format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(fmt::layer())
        .init();

    let app_state = AppState::new().await?;

    let config = &app_state.config;
    debug!("Config:\n {:#?}", config);

    if config.db.auto_migrate {
        debug!("Migrating database...");
        app_state.db.migrate().await.context("Cannot migrate database")?;
    }

    let addr = format!("{}:{}", &config.http.ip, &config.http.port);
    let app = create_app(app_state.clone()).await?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Cannot bind {addr}"))?;
    tracing::info!("{} v{} listening on {}", config.app_name, config.app_version, addr);
    axum::serve(listener, app).await?;
    Ok(())
}
