pub mod analytics;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod table;

pub use analytics::{AnalysisResults, AnalyticsEngine, QueryOutcome};
pub use blockchain::{RpcClient, RpcGateway};
pub use config::{AppConfig, AnalyticsConfig, LoggingConfig, MixerConfig, RpcConfig};
pub use error::{AnalyticsError, Result};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use pipeline::{AnalysisReport, Pipeline};
pub use retry::{RetryManager, RetryPolicy};
pub use table::RecordTable;
