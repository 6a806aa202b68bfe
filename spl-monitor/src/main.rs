use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use spl_monitor::{api, config::Config, db::SoundData, stream_handler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_args().map_err(|e| e.to_string())?;

    // Setup tracing with optional file output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt().with_env_filter(env_filter);

    if let Some(log_file) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| format!("Failed to open log file {}: {}", log_file, e))?;
        fmt_layer.with_writer(Arc::new(file)).init();
    } else {
        fmt_layer.init();
    }

    info!("Starting spl-monitor service");
    info!("Stream server: {}", config.tcp_address);
    info!("HTTP server: {}", config.http_address);
    info!(
        "Sample interval: {}s, week averaging: {:?}",
        config.sample_interval_secs, config.week_averaging
    );

    let data = Arc::new(SoundData::open(&config.db_path, config.rollup_settings()).await?);
    info!("Rollup storage opened at {}", config.db_path);

    let tcp_listener = TcpListener::bind(&config.tcp_address).await?;
    info!("Stream server listening on {}", config.tcp_address);

    let http_address = config.http_address.clone();
    let api_settings = config.api_settings();
    let data_for_http = data.clone();
    tokio::spawn(async move {
        if let Err(e) = api::run_http_server(http_address, data_for_http, api_settings).await {
            error!("HTTP server error: {}", e);
        }
    });

    stream_handler::run_stream_server(tcp_listener, data).await
}
