//! Caller-side retry policy with backoff and jitter
//!
//! The socket client and the registry façade never retry on their own. A
//! caller that wants retries wraps a whole operation in a [`RetryExecutor`];
//! only errors whose kind is listed in [`RetryPolicy::retry_on`] are retried.

use crate::error::{BridgeError, ErrorKind, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    pub backoff_strategy: BackoffStrategy,
    pub jitter: JitterConfig,
    /// Error kinds worth another attempt
    pub retry_on: Vec<ErrorKind>,
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear backoff (delay increases linearly)
    Linear { increment: Duration },
    /// Exponential backoff
    Exponential { multiplier: f64 },
}

/// Jitter configuration for retry delays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterConfig {
    pub enabled: bool,
    pub jitter_type: JitterType,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

/// Types of jitter strategies
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum JitterType {
    /// delay = random(0, delay * factor)
    Full,
    /// delay = delay/2 + random(0, delay/2 * factor)
    Equal,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jitter_type: JitterType::Equal,
            jitter_factor: 0.5,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::milliseconds(250),
            max_delay: Duration::seconds(5),
            backoff_strategy: BackoffStrategy::Exponential { multiplier: 2.0 },
            jitter: JitterConfig::default(),
            retry_on: vec![ErrorKind::Connection, ErrorKind::Timeout],
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Default policy with the given number of attempts (at least one)
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let steps = attempt.saturating_sub(1);
        let base_delay = match &self.backoff_strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear { increment } => {
                self.initial_delay + *increment * steps as i32
            }
            BackoffStrategy::Exponential { multiplier } => {
                let ms = self.initial_delay.num_milliseconds() as f64
                    * multiplier.powi(steps as i32);
                Duration::milliseconds(ms.min(i64::MAX as f64) as i64)
            }
        };

        let capped_delay = base_delay.min(self.max_delay);

        if self.jitter.enabled {
            self.apply_jitter(capped_delay)
        } else {
            capped_delay
        }
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let delay_ms = delay.num_milliseconds().max(0) as f64;
        let factor = self.jitter.jitter_factor.clamp(0.0, 1.0);

        let jittered_ms = match self.jitter.jitter_type {
            JitterType::Full => rng.gen_range(0.0..=delay_ms * factor),
            JitterType::Equal => {
                let half = delay_ms / 2.0;
                half + rng.gen_range(0.0..=half * factor)
            }
        };

        Duration::milliseconds(jittered_ms as i64)
    }

    /// Check if error should be retried
    pub fn should_retry(&self, error: &BridgeError) -> bool {
        self.retry_on.contains(&error.kind())
    }
}

/// Retry statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryStats {
    pub total_operations: u64,
    pub successful_first_attempt: u64,
    pub successful_after_retry: u64,
    /// Operations that exhausted their attempts or hit a non-retryable error
    pub failed: u64,
    pub total_retry_attempts: u64,
    pub last_retry: Option<DateTime<Utc>>,
}

/// Retry executor
pub struct RetryExecutor {
    policy: RetryPolicy,
    stats: Arc<RwLock<RetryStats>>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stats: Arc::new(RwLock::new(RetryStats::default())),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute operation with retry policy
    pub async fn execute<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.stats.write().await.total_operations += 1;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(result) => {
                    let mut stats = self.stats.write().await;
                    if attempt == 1 {
                        stats.successful_first_attempt += 1;
                    } else {
                        stats.successful_after_retry += 1;
                        info!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !self.policy.should_retry(&error) {
                debug!(error_kind = %error.kind(), "Error not retryable: {}", error);
                self.stats.write().await.failed += 1;
                return Err(error);
            }

            if attempt >= self.policy.max_attempts {
                warn!(attempts = attempt, "Operation failed after retries: {}", error);
                self.stats.write().await.failed += 1;
                return Err(error);
            }

            let delay = self.policy.calculate_delay(attempt);
            {
                let mut stats = self.stats.write().await;
                stats.total_retry_attempts += 1;
                stats.last_retry = Some(Utc::now());
            }

            debug!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.num_milliseconds(),
                "Retrying after error: {}",
                error
            );
            sleep(delay.to_std().unwrap_or_default()).await;
        }
    }

    pub async fn get_stats(&self) -> RetryStats {
        self.stats.read().await.clone()
    }
}

/// Retry builder for fluent API
pub struct RetryBuilder {
    policy: RetryPolicy,
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts.max(1);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    pub fn backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.policy.backoff_strategy = strategy;
        self
    }

    pub fn with_jitter(mut self, jitter_type: JitterType, factor: f64) -> Self {
        self.policy.jitter = JitterConfig {
            enabled: true,
            jitter_type,
            jitter_factor: factor,
        };
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.policy.jitter.enabled = false;
        self
    }

    /// Also retry errors of `kind`
    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        if !self.policy.retry_on.contains(&kind) {
            self.policy.retry_on.push(kind);
        }
        self
    }

    pub fn build(self) -> RetryExecutor {
        RetryExecutor::new(self.policy)
    }
}
