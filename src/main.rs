use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use webhook_playground::{http_server, AppError, AppState, Config, EventStore};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = Config::from_env()?;
    let addr = config.socket_addr()?;

    let store = match config.data_dir.clone() {
        Some(dir) => {
            let (store, err) = EventStore::with_data_dir(config.max_events, dir);
            if let Some(e) = err {
                tracing::warn!(error = %e, "failed to load store snapshot, starting empty");
            }
            store
        }
        None => EventStore::new(config.max_events),
    };
    let store = Arc::new(store);

    if config.stripe_webhook_secret.is_none() {
        tracing::info!("STRIPE_WEBHOOK_SECRET not set, stripe events will be stored unverified");
    }

    let state = AppState::new(store, config.stripe_webhook_secret.clone());
    let (local, server) = http_server::start(addr, state).await?;
    tracing::info!(%local, max_events = config.max_events, "webhook playground listening");

    tokio::select! {
        _ = server => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    Ok(())
}
