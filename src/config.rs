use serde::Deserialize;
use std::path::Path;

/// Table-layout options loaded from an optional `logdeck.toml`. Anything the
/// file omits falls back to the defaults below; structural config lives
/// here while secrets/endpoints stay in the environment (see `RuntimeConfig`).
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_partition_type")]
    pub partition_type: PartitionType,
    #[serde(default = "default_codec")]
    pub compression_codec: CompressionCodec,
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    #[serde(default = "default_hot_ttl_days")]
    pub hot_ttl_days: u32,
    #[serde(default = "default_cold_ttl_days")]
    pub cold_ttl_days: u32,
    #[serde(default = "default_archive_ttl_days")]
    pub archive_ttl_days: u32,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            partition_type: default_partition_type(),
            compression_codec: default_codec(),
            compression_level: default_compression_level(),
            hot_ttl_days: default_hot_ttl_days(),
            cold_ttl_days: default_cold_ttl_days(),
            archive_ttl_days: default_archive_ttl_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl PartitionType {
    pub fn partition_expr(&self, column: &str) -> String {
        match self {
            PartitionType::Hourly => format!("toStartOfHour({column})"),
            PartitionType::Daily => format!("toDate({column})"),
            PartitionType::Weekly => format!("toMonday({column})"),
            PartitionType::Monthly => format!("toStartOfMonth({column})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionCodec {
    LZ4,
    LZ4HC,
    ZSTD,
}

fn default_partition_type() -> PartitionType {
    PartitionType::Daily
}

fn default_codec() -> CompressionCodec {
    CompressionCodec::ZSTD
}

fn default_compression_level() -> i32 {
    3
}

fn default_hot_ttl_days() -> u32 {
    7
}

fn default_cold_ttl_days() -> u32 {
    30
}

fn default_archive_ttl_days() -> u32 {
    90
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_batch_size() -> usize {
    500
}

impl StorageConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: StorageConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

/// Connection and runtime settings, sourced from the environment (via
/// `dotenvy` for a local `.env` file in dev).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub bind_port: u16,
    pub share_secret: Option<String>,
    pub tcp_ingest_port: u16,
    pub udp_ingest_port: u16,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            clickhouse_url: std::env::var("CLICKHOUSE_URL")
                .unwrap_or_else(|_| "http://localhost:8123".to_string()),
            clickhouse_database: std::env::var("CLICKHOUSE_DATABASE")
                .unwrap_or_else(|_| "logdeck".to_string()),
            clickhouse_user: std::env::var("CLICKHOUSE_USER")
                .unwrap_or_else(|_| "default".to_string()),
            clickhouse_password: std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default(),
            bind_port: std::env::var("LOGDECK_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            share_secret: std::env::var("LOGDECK_SHARE_SECRET").ok(),
            tcp_ingest_port: std::env::var("LOGDECK_TCP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5140),
            udp_ingest_port: std::env::var("LOGDECK_UDP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5141),
        }
    }
}
