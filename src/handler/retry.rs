//! Retry policy for concurrency conflicts and transient infrastructure faults.
//!
//! A [`RetryConfig`] is captured when a statement is created. The process-wide default
//! only seeds new statements; changing it never affects a statement already built.

use std::sync::{LazyLock, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SqlPipeError;

use super::{ErrorHandlerBuilder, FailureContext, Recovery};

/// Deadlock victim and in-memory OLTP validation/commit-dependency failures.
pub const IMMEDIATE_ERROR_NUMBERS: &[u32] = &[1205, 41301, 41302, 41305, 41325, 41839];

/// Failover, throttling and dropped-connection faults.
pub const TRANSIENT_ERROR_NUMBERS: &[u32] = &[
    20, 64, 233, 4060, 4221, 10053, 10054, 10060, 10928, 10929, 40143, 40197, 40501, 40540,
    40613, 49918, 49919, 49920,
];

/// How an error is treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Never retried.
    Fatal,
    /// Re-executed right away.
    Immediate,
    /// Re-executed after a back-off, only when delayed retry is enabled.
    Transient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry concurrency conflicts immediately.
    pub immediate_retry: bool,
    /// Retry transient faults after `retry_delay_ms * attempt`.
    pub delayed_retry: bool,
    /// Re-executions allowed before the error moves on to the next handler.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub immediate_error_numbers: Vec<u32>,
    pub transient_error_numbers: Vec<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            immediate_retry: true,
            delayed_retry: false,
            retry_attempts: 3,
            retry_delay_ms: 500,
            immediate_error_numbers: IMMEDIATE_ERROR_NUMBERS.to_vec(),
            transient_error_numbers: TRANSIENT_ERROR_NUMBERS.to_vec(),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            immediate_retry: false,
            delayed_retry: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_immediate_retry(mut self, enabled: bool) -> Self {
        self.immediate_retry = enabled;
        self
    }

    #[must_use]
    pub fn with_delayed_retry(mut self, enabled: bool) -> Self {
        self.delayed_retry = enabled;
        self
    }

    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Classify an error against the configured tables.
    ///
    /// Only server errors and dropped connections can be retryable; shape, callback and
    /// configuration errors are always fatal.
    #[must_use]
    pub fn classify(&self, error: &SqlPipeError) -> ErrorClass {
        match error {
            SqlPipeError::Database(db) if self.immediate_error_numbers.contains(&db.number) => {
                ErrorClass::Immediate
            }
            SqlPipeError::Database(db) if self.transient_error_numbers.contains(&db.number) => {
                ErrorClass::Transient
            }
            SqlPipeError::ConnectionError(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }
}

static DEFAULT_RETRY_CONFIG: LazyLock<RwLock<RetryConfig>> =
    LazyLock::new(|| RwLock::new(RetryConfig::default()));

/// Snapshot of the configuration new statements start with.
#[must_use]
pub fn default_retry_config() -> RetryConfig {
    match DEFAULT_RETRY_CONFIG.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn update_default(f: impl FnOnce(&mut RetryConfig)) {
    let mut guard = match DEFAULT_RETRY_CONFIG.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
}

/// Replace the configuration new statements start with.
pub fn set_default_retry_config(config: RetryConfig) {
    update_default(|current| *current = config);
}

pub fn enable_immediate_retry(enabled: bool) {
    update_default(|current| current.immediate_retry = enabled);
}

pub fn enable_delayed_retry(enabled: bool) {
    update_default(|current| current.delayed_retry = enabled);
}

pub fn set_retry_attempts(attempts: u32) {
    update_default(|current| current.retry_attempts = attempts);
}

/// Head of every error-handler chain.
#[derive(Debug, Clone)]
pub struct RetryErrorHandlerBuilder {
    config: RetryConfig,
}

impl RetryErrorHandlerBuilder {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl ErrorHandlerBuilder for RetryErrorHandlerBuilder {
    fn create_error_handler(
        &self,
        failure: &FailureContext<'_>,
    ) -> Result<Option<Recovery>, SqlPipeError> {
        // rows already reached the caller; running again would duplicate them
        if failure.rows_delivered > 0 || failure.attempt >= self.config.retry_attempts {
            return Ok(None);
        }

        let recovery = match self.config.classify(failure.error) {
            ErrorClass::Immediate if self.config.immediate_retry => Some(Recovery::Retry {
                delay: Duration::ZERO,
            }),
            ErrorClass::Transient if self.config.delayed_retry => Some(Recovery::Retry {
                delay: self
                    .config
                    .retry_delay()
                    .checked_mul(failure.attempt.saturating_add(1))
                    .unwrap_or(Duration::MAX),
            }),
            _ => None,
        };
        Ok(recovery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SqlCommand;
    use crate::error::DbError;

    fn decide(config: &RetryConfig, error: &SqlPipeError, attempt: u32, rows: u64) -> Option<Duration> {
        let command = SqlCommand::text("UPDATE t SET x = 1");
        let failure = FailureContext {
            command: &command,
            error,
            attempt,
            rows_delivered: rows,
        };
        match RetryErrorHandlerBuilder::new(config.clone())
            .create_error_handler(&failure)
            .unwrap()
        {
            Some(Recovery::Retry { delay }) => Some(delay),
            Some(Recovery::Handle(_)) => panic!("retry builder never handles"),
            None => None,
        }
    }

    #[test]
    fn classification_table() {
        let config = RetryConfig::default();
        let deadlock = SqlPipeError::Database(DbError::new(1205, "deadlock victim"));
        let failover = SqlPipeError::Database(DbError::new(40613, "database unavailable"));
        let syntax = SqlPipeError::Database(DbError::new(102, "incorrect syntax"));

        assert_eq!(config.classify(&deadlock), ErrorClass::Immediate);
        assert_eq!(config.classify(&failover), ErrorClass::Transient);
        assert_eq!(config.classify(&syntax), ErrorClass::Fatal);
        assert_eq!(
            config.classify(&SqlPipeError::UnsupportedColumnType("Int32".into())),
            ErrorClass::Fatal
        );
        assert_eq!(
            config.classify(&SqlPipeError::ConnectionError("reset".into())),
            ErrorClass::Transient
        );
    }

    #[test]
    fn immediate_retries_stop_at_the_attempt_limit() {
        let config = RetryConfig::default().with_retry_attempts(2);
        let deadlock = SqlPipeError::Database(DbError::new(1205, "deadlock victim"));

        assert_eq!(decide(&config, &deadlock, 0, 0), Some(Duration::ZERO));
        assert_eq!(decide(&config, &deadlock, 1, 0), Some(Duration::ZERO));
        assert_eq!(decide(&config, &deadlock, 2, 0), None);
        assert_eq!(decide(&config, &deadlock, 0, 1), None);
    }

    #[test]
    fn delayed_retry_is_opt_in_and_backs_off() {
        let failover = SqlPipeError::Database(DbError::new(40501, "service busy"));
        let config = RetryConfig::default().with_retry_delay(Duration::from_millis(10));
        assert_eq!(decide(&config, &failover, 0, 0), None);

        let config = config.with_delayed_retry(true);
        assert_eq!(decide(&config, &failover, 0, 0), Some(Duration::from_millis(10)));
        assert_eq!(decide(&config, &failover, 2, 0), Some(Duration::from_millis(30)));
    }

    #[test]
    fn huge_delays_saturate_instead_of_overflowing() {
        let failover = SqlPipeError::Database(DbError::new(40501, "service busy"));
        let config: RetryConfig = serde_json::from_str(
            r#"{ "delayed_retry": true, "retry_delay_ms": 18446744073709551615 }"#,
        )
        .unwrap();
        assert_eq!(decide(&config, &failover, 1, 0), Some(Duration::MAX));
    }

    #[test]
    fn custom_tables_override_the_defaults() {
        let mut config = RetryConfig::default();
        config.immediate_error_numbers = vec![50001];
        let custom = SqlPipeError::Database(DbError::new(50001, "app conflict"));
        let deadlock = SqlPipeError::Database(DbError::new(1205, "deadlock victim"));
        assert_eq!(config.classify(&custom), ErrorClass::Immediate);
        assert_eq!(config.classify(&deadlock), ErrorClass::Fatal);
    }

    #[test]
    fn config_loads_from_json_with_defaults() {
        let config: RetryConfig =
            serde_json::from_str(r#"{ "delayed_retry": true, "retry_attempts": 5 }"#).unwrap();
        assert!(config.immediate_retry);
        assert!(config.delayed_retry);
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.immediate_error_numbers, IMMEDIATE_ERROR_NUMBERS);
    }
}
