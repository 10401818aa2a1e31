use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use crate::error::ConfigError;

/// Tether (USDT) on Ethereum mainnet
pub const DEFAULT_TOKEN_ADDRESS: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

/// Addresses historically associated with mixing services. May be obsolete.
pub const DEFAULT_KNOWN_MIXERS: &[&str] = &[
    "0x5f4b5e8e6894e7b94b9b0d7b28b8011c18c04e1d",
    "0x8fa7a7e8f79d3de88f8f3cfe69325425f94c12cf",
    "0x0e83c9f1ec5f9d7a028b963907f490b30709d12c",
    "0x9d1f522d5869c9b7ad864a29eb6e9f57a170d049",
    "0x39ccecc9ebcc4ad3132a99893b28d7c890810149",
];

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub range: RangeConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// RPC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Ethereum JSON-RPC endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Attempts per unit (block or log sub-range) before it becomes a gap
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Cap on the retry delay in milliseconds
    pub max_backoff_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Randomize delays by +/-5%
    pub jitter: bool,
    /// Maximum in-flight RPC requests
    pub concurrency_limit: usize,
}

/// Block range to analyze. When `end_block` is unset the latest block is
/// used and the range covers the last `latest_span` blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    pub latest_span: u64,
}

/// Token contract under analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub contract_address: String,
    pub decimals: u32,
}

/// Fetch batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Blocks per fetch batch; cancellation is checked between batches
    pub batch_size: usize,
    /// Maximum blocks per `eth_getLogs` sub-range
    pub log_chunk_size: u64,
}

/// Parameters of the mixer-use heuristic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixerConfig {
    /// M: distinct senders required inside the incoming window
    pub min_distinct_senders: usize,
    /// W: sliding window width in seconds
    pub window_secs: u64,
    /// P: maximum number of outgoing transfers
    pub max_outgoing: usize,
    /// R: minimum outgoing total as a fraction of the incoming total
    pub min_outflow_ratio: Decimal,
}

/// Query parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub bucket_width_secs: u64,
    pub top_k: usize,
    pub frequent_addresses_n: usize,
    pub peak_k: f64,
    pub gas_percentiles: Vec<f64>,
    pub slow_block_threshold_secs: i64,
    /// Row partitions used for parallel aggregation
    pub partitions: usize,
    pub mixer: MixerConfig,
    pub known_mixer_addresses: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8545".to_string(),
            timeout_seconds: 30,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            concurrency_limit: 8,
        }
    }
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            end_block: None,
            latest_span: 10,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            contract_address: DEFAULT_TOKEN_ADDRESS.to_string(),
            decimals: 6,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            log_chunk_size: 2_000,
        }
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            min_distinct_senders: 5,
            window_secs: 3_600,
            max_outgoing: 2,
            min_outflow_ratio: Decimal::new(9, 1),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            bucket_width_secs: 86_400,
            top_k: 10,
            frequent_addresses_n: 10,
            peak_k: 2.0,
            gas_percentiles: vec![50.0, 90.0, 99.0],
            slow_block_threshold_secs: 12,
            partitions: 4,
            mixer: MixerConfig::default(),
            known_mixer_addresses: DEFAULT_KNOWN_MIXERS.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    /// Environment variables take precedence over file values
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = Self::load_from_file(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults when absent
    pub fn load_from_file(config_path: &str) -> Result<Self, ConfigError> {
        if !Path::new(config_path).exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .map_err(|_| ConfigError::FileNotFound(config_path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = env::var("ETH_RPC_URL") {
            self.rpc.endpoint = endpoint;
        }
        if let Some(timeout) = parse_env("RPC_TIMEOUT_SECONDS")? {
            self.rpc.timeout_seconds = timeout;
        }
        if let Some(attempts) = parse_env("RPC_MAX_ATTEMPTS")? {
            self.rpc.max_attempts = attempts;
        }
        if let Some(limit) = parse_env("RPC_CONCURRENCY_LIMIT")? {
            self.rpc.concurrency_limit = limit;
        }

        if let Some(start) = parse_env("START_BLOCK")? {
            self.range.start_block = Some(start);
        }
        if let Some(end) = parse_env("END_BLOCK")? {
            self.range.end_block = Some(end);
        }

        if let Ok(token_address) = env::var("TOKEN_ADDRESS") {
            self.token.contract_address = token_address;
        }
        if let Some(decimals) = parse_env("TOKEN_DECIMALS")? {
            self.token.decimals = decimals;
        }

        if let Some(width) = parse_env("BUCKET_WIDTH_SECS")? {
            self.analytics.bucket_width_secs = width;
        }
        if let Some(top_k) = parse_env("TOP_K")? {
            self.analytics.top_k = top_k;
        }
        if let Some(peak_k) = parse_env("PEAK_K")? {
            self.analytics.peak_k = peak_k;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rpc.endpoint.starts_with("http://") && !self.rpc.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.rpc.endpoint.clone()));
        }

        if self.rpc.timeout_seconds == 0 || self.rpc.timeout_seconds > 300 {
            return Err(invalid("rpc.timeout_seconds", self.rpc.timeout_seconds));
        }

        if self.rpc.max_attempts == 0 || self.rpc.max_attempts > 20 {
            return Err(invalid("rpc.max_attempts", self.rpc.max_attempts));
        }

        if !(self.rpc.backoff_multiplier >= 1.0 && self.rpc.backoff_multiplier.is_finite()) {
            return Err(invalid("rpc.backoff_multiplier", self.rpc.backoff_multiplier));
        }

        if self.rpc.concurrency_limit == 0 || self.rpc.concurrency_limit > 256 {
            return Err(invalid("rpc.concurrency_limit", self.rpc.concurrency_limit));
        }

        if let (Some(start), Some(end)) = (self.range.start_block, self.range.end_block) {
            if start > end {
                return Err(ConfigError::InvalidRange { start, end });
            }
        }

        if self.range.latest_span == 0 {
            return Err(invalid("range.latest_span", self.range.latest_span));
        }

        if crate::blockchain::validate_address(&self.token.contract_address).is_err() {
            return Err(invalid("token.contract_address", &self.token.contract_address));
        }

        // rust_decimal supports at most 28 fractional digits
        if self.token.decimals > 28 {
            return Err(invalid("token.decimals", self.token.decimals));
        }

        if self.ingestion.batch_size == 0 {
            return Err(invalid("ingestion.batch_size", self.ingestion.batch_size));
        }

        if self.ingestion.log_chunk_size == 0 {
            return Err(invalid("ingestion.log_chunk_size", self.ingestion.log_chunk_size));
        }

        if self.analytics.bucket_width_secs == 0 {
            return Err(invalid("analytics.bucket_width_secs", self.analytics.bucket_width_secs));
        }

        if self.analytics.top_k == 0 {
            return Err(invalid("analytics.top_k", self.analytics.top_k));
        }

        if !(self.analytics.peak_k >= 0.0 && self.analytics.peak_k.is_finite()) {
            return Err(invalid("analytics.peak_k", self.analytics.peak_k));
        }

        if self.analytics.partitions == 0 {
            return Err(invalid("analytics.partitions", self.analytics.partitions));
        }

        let mixer = &self.analytics.mixer;
        if mixer.min_distinct_senders == 0 {
            return Err(invalid("analytics.mixer.min_distinct_senders", mixer.min_distinct_senders));
        }
        if mixer.window_secs == 0 {
            return Err(invalid("analytics.mixer.window_secs", mixer.window_secs));
        }
        if mixer.max_outgoing == 0 {
            return Err(invalid("analytics.mixer.max_outgoing", mixer.max_outgoing));
        }
        if mixer.min_outflow_ratio.is_sign_negative() {
            return Err(invalid("analytics.mixer.min_outflow_ratio", mixer.min_outflow_ratio));
        }

        for address in &self.analytics.known_mixer_addresses {
            if crate::blockchain::validate_address(address).is_err() {
                return Err(invalid("analytics.known_mixer_addresses", address));
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging.level", &self.logging.level));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid("logging.format", &self.logging.format));
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::Parsing(e.to_string()))
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}
