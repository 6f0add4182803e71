//! Configuration for the booking engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Key id value that routes order creation straight to synthetic ids
pub const PLACEHOLDER_KEY_ID: &str = "gw_test_placeholder";

/// Secret value under which callback signatures are not verified
pub const PLACEHOLDER_KEY_SECRET: &str = "gw_secret_placeholder";

/// Booking engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Payment gateway configuration
    pub gateway: GatewayConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/booking"),
            gateway: GatewayConfig::default(),
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// Payment gateway configuration
///
/// Injected explicitly at construction; there is no process-wide mutable
/// key state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway API key id
    pub key_id: String,

    /// Gateway API key secret (also the HMAC key for callbacks)
    pub key_secret: String,

    /// ISO 4217 currency code for created orders
    pub currency: String,

    /// Maximum amount collected at booking time (CAP)
    pub booking_cap: Decimal,

    /// Minimum positive unit a gateway order can carry
    pub min_amount: Decimal,

    /// Bounded timeout for gateway order creation (milliseconds)
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            key_id: PLACEHOLDER_KEY_ID.to_string(),
            key_secret: PLACEHOLDER_KEY_SECRET.to_string(),
            currency: "INR".to_string(),
            booking_cap: Decimal::from(25_000),
            min_amount: Decimal::ONE,
            timeout_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    /// Whether real gateway credentials are configured
    pub fn has_live_keys(&self) -> bool {
        self.key_id != PLACEHOLDER_KEY_ID && !self.key_id.is_empty()
    }

    /// Whether callback signatures can be verified
    pub fn can_verify_signatures(&self) -> bool {
        self.key_secret != PLACEHOLDER_KEY_SECRET && !self.key_secret.is_empty()
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("BOOKING_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(key_id) = std::env::var("BOOKING_GATEWAY_KEY_ID") {
            config.gateway.key_id = key_id;
        }

        if let Ok(secret) = std::env::var("BOOKING_GATEWAY_KEY_SECRET") {
            config.gateway.key_secret = secret;
        }

        if let Ok(cap) = std::env::var("BOOKING_CAP") {
            config.gateway.booking_cap = cap
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid BOOKING_CAP: {}", e)))?;
        }

        Ok(config)
    }
}
