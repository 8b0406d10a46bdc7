// Privacy Guard — Application Entry Point
//
// Parses CLI arguments, initializes structured logging and dispatches to the
// command handler. Exits with status 1 on any error.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use privacy_guard::cli::{execute, Cli};
use privacy_guard::config::GuardConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the config file's level, then the default.
    let fallback = privacy_guard::cli::load_config(&cli)
        .map(|c| c.log_level)
        .unwrap_or_else(|_| GuardConfig::default().log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_target(false)
        .init();

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
