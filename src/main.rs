//! Livedesk - session monitoring and message injection for a hosted live agent transfer bot

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livedesk=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Livedesk v{}", env!("CARGO_PKG_VERSION"));

    livedesk::cli::run()?;

    Ok(())
}
