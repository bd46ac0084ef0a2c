//! Server configuration.
//!
//! Sources overlay in a fixed order: built-in defaults, then the JSON
//! config file (`--config` / `CONFIG`), then explicitly passed CLI
//! flags, then environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_ENDPOINT: &str = "localhost:8080";
const DEFAULT_STORE_INTERVAL_SECS: u64 = 300;
const DEFAULT_FILE_STORAGE_PATH: &str = "/tmp/metrics-db.json";

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen endpoint.
    pub endpoint: String,
    /// gRPC listen endpoint; the gRPC surface is disabled when unset.
    pub grpc_endpoint: Option<String>,
    /// Seconds between asynchronous snapshot saves; 0 saves
    /// synchronously after every successful update.
    pub store_interval: u64,
    /// File snapshot path; empty disables the file backend.
    pub file_storage_path: String,
    /// Restore the registry from the persistent backend at startup.
    pub restore: bool,
    /// PostgreSQL DSN; empty disables the database backend.
    pub database_dsn: String,
    /// Shared HMAC key for request verification and response signing.
    pub hash_key: String,
    /// Path to the RSA private key for body decryption.
    pub private_key_path: Option<PathBuf>,
    /// CIDR of clients allowed to write metrics.
    pub trusted_subnet: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            grpc_endpoint: None,
            store_interval: DEFAULT_STORE_INTERVAL_SECS,
            file_storage_path: DEFAULT_FILE_STORAGE_PATH.to_string(),
            restore: false,
            database_dsn: String::new(),
            hash_key: String::new(),
            private_key_path: None,
            trusted_subnet: String::new(),
        }
    }
}

/// Command-line flags. Every flag is optional so an absent flag never
/// clobbers a config-file value.
#[derive(Parser, Debug, Default)]
#[command(name = "pulsed", about = "pulse metrics server", long_about = None)]
pub struct Flags {
    /// HTTP server endpoint, example: "localhost:8080"
    #[arg(short = 'a')]
    pub endpoint: Option<String>,

    /// gRPC server endpoint, example: "localhost:3200"
    #[arg(long = "grpc")]
    pub grpc_endpoint: Option<String>,

    /// Interval in seconds between snapshot saves; 0 saves after every update
    #[arg(short = 'i')]
    pub store_interval: Option<i64>,

    /// Path to the file the metrics are read from and written to
    #[arg(short = 'f')]
    pub file_storage_path: Option<String>,

    /// Load previously saved values from the persistent backend at startup
    #[arg(short = 'r', action = clap::ArgAction::SetTrue)]
    pub restore: Option<bool>,

    /// PostgreSQL connection string
    #[arg(short = 'd')]
    pub database_dsn: Option<String>,

    /// Key for checking the request hash and signing the response body hash
    #[arg(short = 'k')]
    pub hash_key: Option<String>,

    /// Path to the file with the RSA private key
    #[arg(long = "crypto-key")]
    pub private_key_path: Option<PathBuf>,

    /// Trusted subnet in CIDR notation, example: "10.0.0.0/24"
    #[arg(short = 't')]
    pub trusted_subnet: Option<String>,

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
    pub grpc_address: Option<String>,
    #[serde(default)]
    pub store_interval: Option<String>,
    #[serde(default)]
    pub store_file: Option<String>,
    #[serde(default)]
    pub database_dsn: Option<String>,
    #[serde(default)]
    pub hash_key: Option<String>,
    #[serde(default)]
    pub crypto_key: Option<String>,
    #[serde(default)]
    pub restore: Option<bool>,
    #[serde(default)]
    pub trusted_subnet: Option<String>,
}

impl ServerConfig {
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
            self.endpoint = address;
        }
        if file.grpc_address.is_some() {
            self.grpc_endpoint = file.grpc_address;
        }
        if let Some(interval) = file.store_interval {
            if let Some(seconds) = parse_duration_secs(&interval) {
                self.store_interval = seconds;
            }
        }
        if let Some(store_file) = file.store_file {
            self.file_storage_path = store_file;
        }
        if let Some(dsn) = file.database_dsn {
            self.database_dsn = dsn;
        }
        if let Some(key) = file.hash_key {
            self.hash_key = key;
        }
        if let Some(crypto_key) = file.crypto_key {
            self.private_key_path = Some(PathBuf::from(crypto_key));
        }
        if let Some(restore) = file.restore {
            self.restore = restore;
        }
        if let Some(subnet) = file.trusted_subnet {
            self.trusted_subnet = subnet;
        }
    }

    fn apply_flags(&mut self, flags: Flags) {
        if let Some(endpoint) = flags.endpoint {
            self.endpoint = endpoint;
        }
        if flags.grpc_endpoint.is_some() {
            self.grpc_endpoint = flags.grpc_endpoint;
        }
        if let Some(interval) = flags.store_interval {
            // negative values fall back to the default
            if interval >= 0 {
                self.store_interval = interval as u64;
            }
        }
        if let Some(path) = flags.file_storage_path {
            self.file_storage_path = path;
        }
        if let Some(restore) = flags.restore {
            self.restore = restore;
        }
        if let Some(dsn) = flags.database_dsn {
            self.database_dsn = dsn;
        }
        if let Some(key) = flags.hash_key {
            self.hash_key = key;
        }
        if flags.private_key_path.is_some() {
            self.private_key_path = flags.private_key_path;
        }
        if let Some(subnet) = flags.trusted_subnet {
            self.trusted_subnet = subnet;
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = env("ADDRESS") {
            self.endpoint = endpoint;
        }
        if let Some(grpc) = env("GRPC_ADDRESS") {
            self.grpc_endpoint = Some(grpc);
        }
        if let Some(interval) = env("STORE_INTERVAL") {
            if let Ok(seconds) = interval.parse::<i64>() {
                if seconds >= 0 {
                    self.store_interval = seconds as u64;
                }
            }
        }
        if let Some(path) = env("FILE_STORAGE_PATH") {
            self.file_storage_path = path;
        }
        if let Some(restore) = env("RESTORE") {
            if let Ok(restore) = restore.parse::<bool>() {
                self.restore = restore;
            }
        }
        if let Some(dsn) = env("DATABASE_DSN") {
            self.database_dsn = dsn;
        }
        if let Some(key) = env("KEY") {
            self.hash_key = key;
        }
        if let Some(crypto_key) = env("CRYPTO_KEY") {
            self.private_key_path = Some(PathBuf::from(crypto_key));
        }
        if let Some(subnet) = env("TRUSTED_SUBNET") {
            self.trusted_subnet = subnet;
        }
    }
}

/// Parse a duration string like "300s" or "5m"; a bare integer is
/// taken as seconds.
pub fn parse_duration_secs(s: &str) -> Option<u64> {
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

/// Convenience conversion used by the snapshot writer.
pub fn store_interval_duration(cfg: &ServerConfig) -> Duration {
    Duration::from_secs(cfg.store_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::from_sources(Flags::default(), no_env);
        assert_eq!(cfg.endpoint, "localhost:8080");
        assert_eq!(cfg.store_interval, 300);
        assert_eq!(cfg.file_storage_path, "/tmp/metrics-db.json");
        assert!(!cfg.restore);
        assert!(cfg.database_dsn.is_empty());
    }

    #[test]
    fn test_flags_override_defaults() {
        let flags = Flags {
            endpoint: Some("0.0.0.0:9000".to_string()),
            store_interval: Some(0),
            restore: Some(true),
            ..Flags::default()
        };

        let cfg = ServerConfig::from_sources(flags, no_env);
        assert_eq!(cfg.endpoint, "0.0.0.0:9000");
        assert_eq!(cfg.store_interval, 0);
        assert!(cfg.restore);
    }

    #[test]
    fn test_env_overrides_flags() {
        let mut env = HashMap::new();
        env.insert("ADDRESS", "env:1234");
        env.insert("STORE_INTERVAL", "17");
        env.insert("KEY", "hunter2");
        env.insert("TRUSTED_SUBNET", "10.0.0.0/24");

        let flags = Flags { endpoint: Some("flag:1".to_string()), ..Flags::default() };
        let cfg =
            ServerConfig::from_sources(flags, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(cfg.endpoint, "env:1234");
        assert_eq!(cfg.store_interval, 17);
        assert_eq!(cfg.hash_key, "hunter2");
        assert_eq!(cfg.trusted_subnet, "10.0.0.0/24");
    }

    #[test]
    fn test_negative_store_interval_keeps_default() {
        let flags = Flags { store_interval: Some(-5), ..Flags::default() };
        let cfg = ServerConfig::from_sources(flags, no_env);
        assert_eq!(cfg.store_interval, 300);
    }

    #[test]
    fn test_config_file_then_flag_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(
            &path,
            r#"{"address":"file:1","store_interval":"1s","restore":true,"hash_key":"from-file"}"#,
        )
        .unwrap();

        let flags = Flags {
            config: Some(path),
            endpoint: Some("flag:2".to_string()),
            ..Flags::default()
        };
        let cfg = ServerConfig::from_sources(flags, no_env);

        // the flag wins over the file, the file wins over the default
        assert_eq!(cfg.endpoint, "flag:2");
        assert_eq!(cfg.store_interval, 1);
        assert!(cfg.restore);
        assert_eq!(cfg.hash_key, "from-file");
    }

    #[test]
    fn test_parse_duration_secs() {
        assert_eq!(parse_duration_secs("300"), Some(300));
        assert_eq!(parse_duration_secs("300s"), Some(300));
        assert_eq!(parse_duration_secs("5m"), Some(300));
        assert_eq!(parse_duration_secs("1h"), Some(3600));
        assert_eq!(parse_duration_secs("banana"), None);
    }
}
