//! Tempo server entry point.
use std::path::Path;

use anyhow::Context;
use tempo::{
    TempoServer,
    config::{CONFIG_PATH, ServerConfig},
    logger,
};

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load_or_create(Path::new(CONFIG_PATH))
        .with_context(|| format!("Failed to load {CONFIG_PATH}"))?;
    logger::init(&config.log_level)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        let mut server = TempoServer::new(config);
        server.populate();

        let cancel_token = server.cancel_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Shutting down");
                    cancel_token.cancel();
                }
                Err(e) => log::error!("Failed to listen for ctrl-c: {e}"),
            }
        });

        server.run().await;
    });

    Ok(())
}
