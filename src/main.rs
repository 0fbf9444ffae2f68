//! Main entry point for the tracker daemon.
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use anyhow::Result;
use tracing::info;

use driver_tracker::config::Environment;
use driver_tracker::services::store;
use driver_tracker::sources::gpsd::GpsdSource;
use driver_tracker::tracker::Tracker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    color_backtrace::install();

    let env = Environment::load()?;

    let (store_tx, store_rx) = store::store_channel();
    store::run_client(store_rx, env.store_config())?;

    let source = GpsdSource::new(env.gpsd_address.clone());
    let tracker = Tracker::start(source, store_tx, env.watch_config()).await;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    drop(tracker);

    Ok(())
}
