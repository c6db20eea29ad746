use anyhow::Result;
use thermolog_core::ThermologConfig;
use thermolog_daemon::Daemon;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config = ThermologConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting Thermolog daemon v{}", env!("CARGO_PKG_VERSION"));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            let daemon = Daemon::with_config(config)?;
            daemon.run().await
        })
}
