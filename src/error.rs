use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the transfer analytics pipeline
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Run cancelled between fetch batches")]
    Cancelled,
}

/// RPC-related errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC method error: code={code}, message={message}")]
    Method { code: i32, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Rate limit exceeded, retry after {seconds} seconds")]
    RateLimit { seconds: u64 },

    #[error("Block not found: {block_number}")]
    BlockNotFound { block_number: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server returned HTTP {status}")]
    Server { status: u16 },

    #[error("Too many results for blocks {from_block}..={to_block}")]
    TooManyResults { from_block: u64, to_block: u64 },
}

/// Validation failures while mapping RPC payloads onto the fixed schemas.
///
/// These never abort a run: the offending block, transaction or log is
/// skipped and tallied under [`DecodeError::kind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing field {field} in {entity}")]
    MissingField { entity: &'static str, field: &'static str },

    #[error("Mistyped {entity} payload: {detail}")]
    Mistyped { entity: &'static str, detail: String },

    #[error("Invalid hex quantity in {field}: {value}")]
    InvalidQuantity { field: &'static str, value: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Expected {expected} topics, got {got}")]
    TopicCount { expected: usize, got: usize },

    #[error("Event signature mismatch: expected={expected}, got={got}")]
    EventSignature { expected: String, got: String },

    #[error("Log emitted by unexpected contract: expected={expected}, got={got}")]
    UnexpectedContract { expected: String, got: String },

    #[error("Invalid log data: expected {expected} bytes, got {got}")]
    DataLength { expected: usize, got: usize },

    #[error("Amount does not fit the supported range: {0}")]
    AmountOverflow(String),

    #[error("Gas fee overflow for transaction {0}")]
    FeeOverflow(String),

    #[error("Duplicate log {transaction_hash}#{log_index}")]
    DuplicateLog { transaction_hash: String, log_index: u64 },

    #[error("Transaction {0} references a block outside the fetched set")]
    OrphanTransaction(String),
}

impl DecodeError {
    /// Stable tally key for this defect
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::MissingField { .. } => "missing_field",
            DecodeError::Mistyped { .. } => "mistyped",
            DecodeError::InvalidQuantity { .. } => "invalid_quantity",
            DecodeError::InvalidAddress(_) => "invalid_address",
            DecodeError::InvalidHash(_) => "invalid_hash",
            DecodeError::TopicCount { .. } => "topic_count",
            DecodeError::EventSignature { .. } => "event_signature",
            DecodeError::UnexpectedContract { .. } => "unexpected_contract",
            DecodeError::DataLength { .. } => "data_length",
            DecodeError::AmountOverflow(_) => "amount_overflow",
            DecodeError::FeeOverflow(_) => "fee_overflow",
            DecodeError::DuplicateLog { .. } => "duplicate_log",
            DecodeError::OrphanTransaction(_) => "orphan_transaction",
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Invalid block range: start={start}, end={end}")]
    InvalidRange { start: u64, end: u64 },
}

/// Rejected analysis inputs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: String, value: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Errors that abort the run
    Critical,
    /// Errors that lose a unit of data (recorded as a gap)
    High,
    /// Errors that are usually retried away
    Medium,
    /// Mostly informational
    Low,
}

/// How the fetchers treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Retry with backoff
    Transient,
    /// Skip the unit and record a gap
    Permanent,
    /// Skip the unit, record a gap and count a decode defect
    Malformed,
}

impl AnalyticsError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AnalyticsError::Config(_) => ErrorSeverity::Critical,
            AnalyticsError::Cancelled => ErrorSeverity::Critical,

            AnalyticsError::Rpc(RpcError::BlockNotFound { .. }) => ErrorSeverity::High,
            AnalyticsError::Rpc(RpcError::Method { .. }) => ErrorSeverity::High,

            AnalyticsError::Rpc(RpcError::Timeout { .. }) => ErrorSeverity::Medium,
            AnalyticsError::Rpc(RpcError::RateLimit { .. }) => ErrorSeverity::Medium,
            AnalyticsError::Rpc(RpcError::TooManyResults { .. }) => ErrorSeverity::Medium,
            AnalyticsError::Decode(_) => ErrorSeverity::Medium,

            AnalyticsError::Analysis(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Bucket the failure into transient, permanent or malformed
    pub fn failure_class(&self) -> FailureClass {
        match self {
            AnalyticsError::Rpc(rpc) => rpc.failure_class(),
            AnalyticsError::Decode(_) => FailureClass::Malformed,
            _ => FailureClass::Permanent,
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }

    /// Get suggested retry delay in seconds for recoverable errors
    pub fn retry_delay(&self) -> Option<u64> {
        if !self.is_recoverable() {
            return None;
        }

        match self {
            AnalyticsError::Rpc(RpcError::RateLimit { seconds }) => Some(*seconds),
            AnalyticsError::Rpc(RpcError::Timeout { .. }) => Some(5),
            AnalyticsError::Rpc(RpcError::Connection(_)) => Some(10),
            _ => Some(5),
        }
    }
}

impl RpcError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            RpcError::Timeout { .. } | RpcError::RateLimit { .. } | RpcError::Connection(_) => {
                FailureClass::Transient
            }
            RpcError::Server { status } if *status >= 500 || *status == 429 => FailureClass::Transient,
            RpcError::Server { .. } => FailureClass::Permanent,
            RpcError::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                FailureClass::Transient
            }
            RpcError::Http(_) => FailureClass::Malformed,
            RpcError::Json(_) | RpcError::InvalidResponse(_) => FailureClass::Malformed,
            RpcError::Method { .. } | RpcError::BlockNotFound { .. } => FailureClass::Permanent,
            // handled by splitting the range, never retried verbatim
            RpcError::TooManyResults { .. } => FailureClass::Permanent,
        }
    }
}
