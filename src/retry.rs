use std::time::Duration;
use tokio::time::sleep;
use crate::config::RpcConfig;
use crate::error::{AnalyticsError, FailureClass, RpcError};
use crate::logging::{LogContext, ErrorLogger, PerformanceMonitor};

/// Attempt limit and backoff schedule for one fetch unit
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&RpcConfig> for RetryPolicy {
    fn from(config: &RpcConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits, used for deterministic runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_secs_f64();
        let exponential_delay = base_delay * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let capped_delay = exponential_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            let jitter_factor = 0.1; // +/-5%
            let jitter = capped_delay * jitter_factor * (rand::random::<f64>() - 0.5);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Lifecycle of one fetch unit: `Pending -> Retrying(n) -> {Succeeded, Gap}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    /// Waiting to make attempt number `attempt`
    Retrying { attempt: u32 },
    Succeeded { attempts: u32 },
    Gap { attempts: u32, class: FailureClass },
}

impl RetryState {
    /// Number of the attempt this state is about to make
    pub fn current_attempt(&self) -> u32 {
        match self {
            RetryState::Pending => 1,
            RetryState::Retrying { attempt } => *attempt,
            RetryState::Succeeded { attempts } | RetryState::Gap { attempts, .. } => *attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded { .. } | RetryState::Gap { .. })
    }

    pub fn on_success(self) -> RetryState {
        if self.is_terminal() {
            return self;
        }
        RetryState::Succeeded { attempts: self.current_attempt() }
    }

    /// Only transient failures below the attempt limit keep the unit alive
    pub fn on_failure(self, class: FailureClass, policy: &RetryPolicy) -> RetryState {
        if self.is_terminal() {
            return self;
        }
        let attempt = self.current_attempt();
        if class == FailureClass::Transient && attempt < policy.max_attempts {
            RetryState::Retrying { attempt: attempt + 1 }
        } else {
            RetryState::Gap { attempts: attempt, class }
        }
    }
}

/// Final failure of a unit after the state machine reached `Gap`
#[derive(Debug)]
pub struct RetryFailure {
    pub error: AnalyticsError,
    pub attempts: u32,
    pub class: FailureClass,
}

/// Drives an async operation through [`RetryState`]
pub struct RetryManager {
    policy: RetryPolicy,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, policy: RetryPolicy) -> Self {
        Self {
            policy,
            operation_name: operation_name.to_string(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Backoff for the failed `attempt`, stretched to a server-provided
    /// rate-limit hint but never past `max_delay`
    fn delay_after(&self, attempt: u32, error: &AnalyticsError) -> Duration {
        let backoff = self.policy.delay_for(attempt);
        match error {
            AnalyticsError::Rpc(RpcError::RateLimit { seconds }) => {
                backoff.max(Duration::from_secs(*seconds).min(self.policy.max_delay))
            }
            _ => backoff,
        }
    }

    /// Execute an operation with retry logic
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, RetryFailure>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, AnalyticsError>>,
    {
        let monitor = PerformanceMonitor::new(&format!("retry_{}", self.operation_name));
        let mut state = RetryState::Pending;

        loop {
            let attempt = state.current_attempt();
            match operation().await {
                Ok(value) => {
                    let attempts = state.on_success().current_attempt();
                    if attempts > 1 {
                        ErrorLogger::log_recovery_success(&self.operation_name, attempts, monitor.elapsed_ms());
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let class = error.failure_class();
                    state = state.on_failure(class, &self.policy);

                    if let RetryState::Gap { attempts, class } = state {
                        let context = LogContext::new("retry", &self.operation_name)
                            .with_retry_count(attempts)
                            .with_metadata("failure_class", serde_json::json!(format!("{:?}", class)));
                        context.warn(&format!("Giving up after {} attempt(s): {}", attempts, error));
                        return Err(RetryFailure { error, attempts, class });
                    }

                    ErrorLogger::log_recovery_attempt(&error, attempt, self.policy.max_attempts);

                    let delay = self.delay_after(attempt, &error);
                    let context = LogContext::new("retry", &self.operation_name)
                        .with_retry_count(attempt)
                        .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64))
                        .with_metadata("max_attempts", serde_json::json!(self.policy.max_attempts));
                    context.debug(&format!("Retrying in {}ms (attempt {} of {})",
                        delay.as_millis(), attempt, self.policy.max_attempts));

                    sleep(delay).await;
                }
            }
        }
    }
}
