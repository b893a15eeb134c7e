//!
//! lectern server binary
//! ----------------------
//! Command-line entry point for the lectern gateway. Supports configuration
//! via CLI flags and `LECTERN_*` environment variables.

use anyhow::Result;
use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use lectern::config::{GatewayConfig, USAGE};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "lectern", "RUST_LOG='{}'", rust_log);

    let config = GatewayConfig::resolve(&args)?;
    lectern::server::run(config).await
}
