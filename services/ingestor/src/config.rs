//! Environment-variable configuration
//!
//! Every knob has a default so a bare process comes up against the
//! development broker and a local store. Values are read once at
//! startup; a malformed value is a fatal startup error, not a runtime
//! fallback.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

/// Message-bus connection settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Unique per process; a random suffix is appended so concurrent
    /// instances never steal each other's broker session.
    pub client_id: String,
    pub tls: bool,
    pub keep_alive_secs: u64,
}

/// Durable store connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub pool_size: usize,
}

/// Pipeline behavior settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// First segment of every topic.
    pub topic_prefix: String,
    /// Maximum pending ticks before a flush.
    pub batch_size: usize,
    /// Maximum wait after the first pending tick before a flush.
    pub batch_interval: Duration,
    /// Indices tracked from startup.
    pub indices: Vec<String>,
    /// Expiry date label per index.
    pub expiries: HashMap<String, String>,
    /// Strikes above and below ATM to subscribe to.
    pub strike_radius: u32,
    /// Base URL of the token-resolution API.
    pub token_api_url: String,
    /// Per-request timeout for token lookups.
    pub resolve_timeout: Duration,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub store: StoreConfig,
    pub app: AppConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            mqtt: MqttConfig {
                host: env_or("MQTT_HOST", "emqx.trado.trade"),
                port: env_parse("MQTT_PORT", 8883)?,
                username: env_or("MQTT_USERNAME", "hack_iitrpr"),
                password: env_or("MQTT_PASSWORD", "hack_iitrpr"),
                client_id: suffixed_client_id(&env_or("MQTT_CLIENT_ID", "tick-ingestor")),
                tls: env_parse("MQTT_TLS", true)?,
                keep_alive_secs: env_parse("MQTT_KEEP_ALIVE_SECS", 60)?,
            },
            store: StoreConfig {
                host: env_or("PG_HOST", "localhost"),
                port: env_parse("PG_PORT", 5432)?,
                user: env_or("PG_USER", "postgres"),
                password: env_or("PG_PASSWORD", "postgres"),
                dbname: env_or("PG_DATABASE", "market_data"),
                pool_size: env_parse("PG_POOL_SIZE", 16)?,
            },
            app: AppConfig {
                topic_prefix: env_or("INDEX_PREFIX", "index"),
                batch_size: env_parse("BATCH_SIZE", 100)?,
                batch_interval: Duration::from_millis(env_parse("BATCH_INTERVAL_MS", 5000)?),
                indices: parse_index_list(&env_or(
                    "INDICES",
                    "NIFTY,BANKNIFTY,FINNIFTY,MIDCPNIFTY",
                )),
                expiries: parse_expiries(
                    "EXPIRY_DATES",
                    &env_or(
                        "EXPIRY_DATES",
                        "NIFTY=22-05-2025,BANKNIFTY=29-05-2025,\
                         FINNIFTY=29-05-2025,MIDCPNIFTY=29-05-2025",
                    ),
                )?,
                strike_radius: env_parse("STRIKE_RADIUS", 5)?,
                token_api_url: env_or("TOKEN_API_URL", "https://api.trado.trade"),
                resolve_timeout: Duration::from_millis(env_parse("TOKEN_TIMEOUT_MS", 10_000)?),
            },
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Append a random suffix to the base client id.
fn suffixed_client_id(base: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &suffix[..8])
}

/// Comma-separated index names; empty segments dropped.
fn parse_index_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// `INDEX=DD-MM-YYYY` pairs, comma-separated.
fn parse_expiries(var: &str, raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut expiries = HashMap::new();
    for entry in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let Some((index, expiry)) = entry.split_once('=') else {
            return Err(ConfigError::Invalid {
                var: var.to_string(),
                value: entry.to_string(),
            });
        };
        expiries.insert(index.trim().to_string(), expiry.trim().to_string());
    }
    Ok(expiries)
}
