use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use emberline_common::Config;
use emberline_engine::drain_raw_posts;
use emberline_store::StoreRegistry;

mod extract;

use extract::BareExtractor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("emberline=info".parse()?))
        .init();

    info!("Emberline worker starting...");

    let config = Config::from_env();
    let registry = StoreRegistry::from_config(&config)?;
    let extractor = BareExtractor;

    info!(
        universes = config.universes.len(),
        "Connected stores, draining raw posts"
    );

    loop {
        for universe in &config.universes {
            let Some(store) = registry.get(universe) else {
                continue;
            };
            match drain_raw_posts(
                store.as_ref(),
                &extractor,
                universe,
                config.drain_batch_limit,
            )
            .await
            {
                Ok(0) => {}
                Ok(n) => info!(universe = universe.as_str(), drained = n, "drained raw posts"),
                // Transport failures are not retried here; the next pass
                // picks the queue back up.
                Err(e) => warn!(universe = universe.as_str(), error = %e, "drain pass failed"),
            }
        }
        tokio::time::sleep(Duration::from_secs(config.drain_idle_secs)).await;
    }
}
