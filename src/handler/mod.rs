//! Error-handler chain.
//!
//! Builders are asked in order to claim a failure. The first one returning
//! `Some(Recovery)` decides what happens; `None` (or an error from the builder itself)
//! passes the failure on. When nobody claims it, the original error reaches the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::command::SqlCommand;
use crate::error::SqlPipeError;

pub mod builtin;
pub mod retry;

pub use builtin::{FnErrorHandler, LogErrorHandler, RethrowErrorHandler};
pub use retry::{
    ErrorClass, RetryConfig, RetryErrorHandlerBuilder, default_retry_config,
    enable_delayed_retry, enable_immediate_retry, set_default_retry_config, set_retry_attempts,
};

/// What the engine knows about a failed execution.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// The command as it was sent to the driver (after modifiers).
    pub command: &'a SqlCommand,
    pub error: &'a SqlPipeError,
    /// Retries already made for this execution.
    pub attempt: u32,
    /// Rows handed to a callback or written to a sink before the failure.
    pub rows_delivered: u64,
}

/// Handler invoked with the failure; `Ok` swallows it, `Err` is returned to the caller.
pub type HandlerFn = Box<dyn FnOnce(&SqlPipeError) -> Result<(), SqlPipeError> + Send>;

/// A claimed failure.
pub enum Recovery {
    /// Run the same prepared command again after `delay`.
    Retry { delay: Duration },
    /// Hand the error to a handler.
    Handle(HandlerFn),
}

impl Recovery {
    /// Claim the failure and drop it.
    #[must_use]
    pub fn swallow() -> Self {
        Recovery::Handle(Box::new(|_| Ok(())))
    }

    /// Claim the failure and return it to the caller unchanged.
    #[must_use]
    pub fn rethrow() -> Self {
        Recovery::Handle(Box::new(|err| Err(err.clone())))
    }
}

impl fmt::Debug for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recovery::Retry { delay } => f.debug_struct("Retry").field("delay", delay).finish(),
            Recovery::Handle(_) => f.debug_tuple("Handle").field(&"<handler>").finish(),
        }
    }
}

/// One node of the error-handler chain.
pub trait ErrorHandlerBuilder: Send + Sync {
    /// Claim the failure with `Some`, or decline with `None`.
    ///
    /// # Errors
    /// An error is logged and treated like `None`.
    fn create_error_handler(
        &self,
        failure: &FailureContext<'_>,
    ) -> Result<Option<Recovery>, SqlPipeError>;
}

impl<F> ErrorHandlerBuilder for F
where
    F: Fn(&FailureContext<'_>) -> Option<Recovery> + Send + Sync,
{
    fn create_error_handler(
        &self,
        failure: &FailureContext<'_>,
    ) -> Result<Option<Recovery>, SqlPipeError> {
        Ok(self(failure))
    }
}

/// Result of running a failure through the chain.
#[derive(Debug)]
pub enum Decision {
    Retry(Duration),
    /// A handler claimed the failure and swallowed it.
    Handled,
    /// A handler claimed the failure and returned this error.
    Rethrow(SqlPipeError),
    /// No handler claimed the failure.
    Unclaimed,
}

/// Ordered handler builders, headed by the retry policy.
#[derive(Clone)]
pub struct ErrorHandlerChain {
    retry: RetryErrorHandlerBuilder,
    builders: Vec<Arc<dyn ErrorHandlerBuilder>>,
}

impl fmt::Debug for ErrorHandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlerChain")
            .field("retry", &self.retry)
            .field("builders", &self.builders.len())
            .finish()
    }
}

impl ErrorHandlerChain {
    #[must_use]
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            retry: RetryErrorHandlerBuilder::new(retry),
            builders: Vec::new(),
        }
    }

    pub fn push(&mut self, builder: Arc<dyn ErrorHandlerBuilder>) {
        self.builders.push(builder);
    }

    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry = RetryErrorHandlerBuilder::new(config);
    }

    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        self.retry.config()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Offer the failure to each builder until one claims it.
    pub fn dispatch(&self, failure: &FailureContext<'_>) -> Decision {
        let head: &dyn ErrorHandlerBuilder = &self.retry;
        let candidates =
            std::iter::once(head).chain(self.builders.iter().map(|builder| builder.as_ref()));

        for (position, builder) in candidates.enumerate() {
            match builder.create_error_handler(failure) {
                Ok(Some(Recovery::Retry { delay })) => return Decision::Retry(delay),
                Ok(Some(Recovery::Handle(handler))) => {
                    return match handler(failure.error) {
                        Ok(()) => Decision::Handled,
                        Err(err) => Decision::Rethrow(err),
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        position,
                        error = %err,
                        "error handler builder failed; trying the next one"
                    );
                }
            }
        }
        Decision::Unclaimed
    }
}
