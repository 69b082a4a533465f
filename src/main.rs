use mealplan_portal::{app, config::Config};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Main entry point for the submission portal
///
/// Installs the tracing subscriber (`RUST_LOG`, default `info`), reads the
/// configuration from the environment and serves until Ctrl+C or SIGTERM.
#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    info!("Loading configuration...");
    let config = Config::load();

    if let Err(e) = app::run(config).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
