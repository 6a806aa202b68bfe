use serde::Deserialize;
use std::{env, fs};

use spl_rollup::{retention::DEFAULT_DAYS_TO_KEEP, WeekAveraging};

use crate::{api::ApiSettings, db::RollupSettings};

const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1:8765";
const DEFAULT_HTTP_ADDRESS: &str = "127.0.0.1:8000";
const DEFAULT_DB_PATH: &str = "audio_monitor.db";
const DEFAULT_SAMPLE_INTERVAL_SECS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub tcp_address: String,
    pub http_address: String,
    pub db_path: String,
    pub sample_interval_secs: f64,
    pub week_averaging: WeekAveraging,
    pub default_days_to_keep: i64,
    pub log_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MonitorConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    rollup: RollupConfig,
    #[serde(default)]
    retention: RetentionConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ServerConfig {
    tcp_listen_address: Option<String>,
    http_listen_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageConfig {
    db_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RollupConfig {
    sample_interval_secs: Option<f64>,
    week_averaging: Option<WeekAveraging>,
}

#[derive(Debug, Default, Deserialize)]
struct RetentionConfig {
    default_days_to_keep: Option<i64>,
}

/// Value following the first of `names` on the command line.
fn flag_value(args: &[String], names: &[&str]) -> Option<String> {
    args.iter()
        .position(|arg| names.contains(&arg.as_str()))
        .and_then(|i| args.get(i + 1))
        .cloned()
}

impl Config {
    pub fn from_args() -> Result<Self, Box<dyn std::error::Error>> {
        let args: Vec<String> = env::args().collect();
        Self::from_arg_list(&args)
    }

    pub fn from_arg_list(args: &[String]) -> Result<Self, Box<dyn std::error::Error>> {
        let log_file = flag_value(args, &["-f", "--log-file"]);

        // A missing or empty config file means all defaults
        let file_config = match flag_value(args, &["-c", "--config"]) {
            Some(path) => {
                let contents = fs::read_to_string(&path).unwrap_or_default();
                parse_config(&contents)?
            }
            None => MonitorConfig::default(),
        };

        let tcp_address = flag_value(args, &["-t", "--tcp-address"])
            .or(file_config.server.tcp_listen_address)
            .unwrap_or_else(|| DEFAULT_TCP_ADDRESS.to_string());

        let http_address = flag_value(args, &["-h", "--http-address"])
            .or(file_config.server.http_listen_address)
            .unwrap_or_else(|| DEFAULT_HTTP_ADDRESS.to_string());

        let db_path = flag_value(args, &["--db-path"])
            .or(file_config.storage.db_path)
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let sample_interval_secs = file_config
            .rollup
            .sample_interval_secs
            .unwrap_or(DEFAULT_SAMPLE_INTERVAL_SECS);
        if !sample_interval_secs.is_finite() || sample_interval_secs <= 0.0 {
            return Err(format!(
                "rollup.sample_interval_secs must be positive, got {}",
                sample_interval_secs
            )
            .into());
        }

        let default_days_to_keep = file_config
            .retention
            .default_days_to_keep
            .unwrap_or(DEFAULT_DAYS_TO_KEEP);
        if default_days_to_keep < 0 {
            return Err(format!(
                "retention.default_days_to_keep must not be negative, got {}",
                default_days_to_keep
            )
            .into());
        }

        Ok(Config {
            tcp_address,
            http_address,
            db_path,
            sample_interval_secs,
            week_averaging: file_config.rollup.week_averaging.unwrap_or_default(),
            default_days_to_keep,
            log_file,
        })
    }

    pub fn rollup_settings(&self) -> RollupSettings {
        RollupSettings {
            increment_hours: self.sample_interval_secs / 3600.0,
            week_averaging: self.week_averaging,
        }
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            default_days_to_keep: self.default_days_to_keep,
        }
    }
}

fn parse_config(contents: &str) -> Result<MonitorConfig, toml::de::Error> {
    if contents.trim().is_empty() {
        return Ok(MonitorConfig::default());
    }
    toml::from_str(contents)
}
