use std::sync::Arc;

use labnotify::{config::Config, db, dispatcher::Dispatcher, store::pg::PgStore};

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;
    let store = Arc::new(PgStore::new(pool));

    let dispatcher = Dispatcher::connect(&cfg, store.clone(), store).await?;
    tracing::info!(consumer = %cfg.consumer_name, "connected, starting dispatcher");

    let handle = dispatcher.start();

    let trigger = handle.shutdown_trigger();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = trigger.send(true);
        }
    });

    // A fatal broker error propagates here and exits the process non-zero so
    // a supervisor can restart it.
    handle.join().await
}
