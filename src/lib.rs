pub mod classifier;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod orchestrator;
pub mod store;
pub mod types;
pub mod utils;
pub mod vault;

use anyhow::Result;

pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

pub async fn run() -> Result<()> {
    init_logging();
    cli::run().await
}
