use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use octane_link::dispatch::CallbackListener;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with OCTANE_LINK_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("OCTANE_LINK_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("octane_link_probe=info".parse()?)
        .add_directive("octane_link=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let args = cli::ProbeArgs::parse();
    let config = args.resolve_config()?;
    tracing::info!("Connecting to Octane at {}", config.server_address);

    let registry = config.registry();
    let connection = Arc::new(config.connection_manager());
    let installed = cli::install_callbacks(&registry, args.asset_dir.clone())?;
    tracing::info!("Installed {} callbacks", installed.len());

    let listener = CallbackListener::new(connection, registry, config.callback_source());
    let stats = listener.run().await?;
    tracing::info!(
        delivered = stats.delivered,
        malformed = stats.malformed,
        replies_sent = stats.replies_sent,
        replies_failed = stats.replies_failed,
        "Renderer closed the callback stream"
    );
    Ok(())
}
