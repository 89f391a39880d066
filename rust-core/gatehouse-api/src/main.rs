// SPDX-License-Identifier: PMPL-1.0-or-later
//! Gatehouse API server binary
//!
//! Configuration comes from `GATEHOUSE_*` environment variables; set
//! `GATEHOUSE_LOG_JSON=1` for JSON log lines.

use gatehouse_api::ApiConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("GATEHOUSE_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ApiConfig::from_env();

    tracing::info!(
        "Starting Gatehouse API server on {}:{}",
        config.host,
        config.port
    );

    gatehouse_api::serve(config).await?;

    Ok(())
}
