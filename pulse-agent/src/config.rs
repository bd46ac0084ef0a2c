//! Agent configuration.
//!
//! Sources overlay in a fixed order: built-in defaults, then the JSON
//! config file (`--config` / `CONFIG`), then explicitly passed CLI
//! flags, then environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_ENDPOINT_HOST: &str = "localhost:8080";
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_RATE_LIMIT: usize = 1;

/// Resolved agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Server host for HTTP reports.
    pub endpoint_host: String,
    /// gRPC server endpoint; when set, reports go over gRPC instead.
    pub grpc_endpoint: Option<String>,
    /// Seconds between report sends.
    pub report_interval: Duration,
    /// Seconds between metric samples.
    pub poll_interval: Duration,
    /// Shared HMAC key for signing the report body.
    pub hash_key: String,
    /// Path to the RSA public key for body encryption.
    pub public_key_path: Option<PathBuf>,
    /// Number of concurrent report sends.
    pub rate_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint_host: DEFAULT_ENDPOINT_HOST.to_string(),
            grpc_endpoint: None,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            hash_key: String::new(),
            public_key_path: None,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }
}

/// Command-line flags. Every flag is optional so an absent flag never
/// clobbers a config-file value.
#[derive(Parser, Debug, Default)]
#[command(name = "pulse-agent", about = "pulse metrics collection agent", long_about = None)]
pub struct Flags {
    /// Server report endpoint, example: "localhost:8080"
    #[arg(short = 'a')]
    pub endpoint_host: Option<String>,

    /// Seconds between sending collected metrics to the server
    #[arg(short = 'r')]
    pub report_interval: Option<i64>,

    /// Seconds between collecting metric samples
    #[arg(short = 'p')]
    pub poll_interval: Option<i64>,

    /// Key for signing the request body hash
    #[arg(short = 'k')]
    pub hash_key: Option<String>,

    /// Number of concurrent requests to the metrics server
    #[arg(short = 'l')]
    pub rate_limit: Option<usize>,

    /// Path to the file with the RSA public key
    #[arg(long = "crypto-key")]
    pub public_key_path: Option<PathBuf>,

    /// Path to a JSON config file
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

/// JSON config file shape. Interval fields are duration strings ("1s").
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub report_interval: Option<String>,
    #[serde(default)]
    pub poll_interval: Option<String>,
    #[serde(default)]
    pub hash_key: Option<String>,
    #[serde(default)]
    pub crypto_key: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<usize>,
}

impl AgentConfig {
    /// Build the configuration from every source, in precedence order.
    pub fn load() -> Self {
        let flags = Flags::parse();
        Self::from_sources(flags, |name| std::env::var(name).ok())
    }

    fn from_sources(flags: Flags, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        let config_path = env("CONFIG").map(PathBuf::from).or_else(|| flags.config.clone());
        if let Some(path) = config_path {
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<FileConfig>(&raw).map_err(|e| e.to_string()))
            {
                Ok(file) => cfg.apply_file(file),
                Err(err) => eprintln!("can't get config from file: {err}"),
            }
        }

        cfg.apply_flags(flags);
        cfg.apply_env(env);
        cfg
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(address) = file.address {
            self.endpoint_host = address;
        }
        if let Some(interval) = file.report_interval {
            if let Some(seconds) = parse_duration_secs(&interval) {
                self.report_interval = Duration::from_secs(seconds);
            }
        }
        if let Some(interval) = file.poll_interval {
            if let Some(seconds) = parse_duration_secs(&interval) {
                self.poll_interval = Duration::from_secs(seconds);
            }
        }
        if let Some(key) = file.hash_key {
            self.hash_key = key;
        }
        if let Some(crypto_key) = file.crypto_key {
            self.public_key_path = Some(PathBuf::from(crypto_key));
        }
        if let Some(rate_limit) = file.rate_limit {
            self.rate_limit = rate_limit;
        }
    }

    fn apply_flags(&mut self, flags: Flags) {
        if let Some(host) = flags.endpoint_host {
            self.endpoint_host = host;
        }
        if let Some(interval) = flags.report_interval {
            // non-positive values fall back to the default
            if interval > 0 {
                self.report_interval = Duration::from_secs(interval as u64);
            }
        }
        if let Some(interval) = flags.poll_interval {
            if interval > 0 {
                self.poll_interval = Duration::from_secs(interval as u64);
            }
        }
        if let Some(key) = flags.hash_key {
            self.hash_key = key;
        }
        if let Some(rate_limit) = flags.rate_limit {
            if rate_limit > 0 {
                self.rate_limit = rate_limit;
            }
        }
        if flags.public_key_path.is_some() {
            self.public_key_path = flags.public_key_path;
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(host) = env("ADDRESS") {
            self.endpoint_host = host;
        }
        if let Some(grpc) = env("GRPC_ADDRESS") {
            self.grpc_endpoint = Some(grpc);
        }
        if let Some(interval) = env("REPORT_INTERVAL") {
            if let Ok(seconds) = interval.parse::<u64>() {
                if seconds > 0 {
                    self.report_interval = Duration::from_secs(seconds);
                }
            }
        }
        if let Some(interval) = env("POLL_INTERVAL") {
            if let Ok(seconds) = interval.parse::<u64>() {
                if seconds > 0 {
                    self.poll_interval = Duration::from_secs(seconds);
                }
            }
        }
        if let Some(key) = env("KEY") {
            self.hash_key = key;
        }
        if let Some(rate_limit) = env("RATE_LIMIT") {
            if let Ok(rate_limit) = rate_limit.parse::<usize>() {
                if rate_limit > 0 {
                    self.rate_limit = rate_limit;
                }
            }
        }
        if let Some(crypto_key) = env("CRYPTO_KEY") {
            self.public_key_path = Some(PathBuf::from(crypto_key));
        }
    }

    /// The HTTP report URL.
    pub fn report_url(&self) -> String {
        format!("http://{}/updates/", self.endpoint_host)
    }
}

/// Parse a duration string like "10s" or "2m"; a bare integer is taken
/// as seconds.
fn parse_duration_secs(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(seconds) = s.parse::<u64>() {
        return Some(seconds);
    }
    let (number, unit) = s.split_at(s.len().checked_sub(1)?);
    let number: u64 = number.parse().ok()?;
    match unit {
        "s" => Some(number),
        "m" => Some(number * 60),
        "h" => Some(number * 3600),
        _ => None,
    }
}
