use std::sync::Arc;

use crate::error::SqlPipeError;

use super::{ErrorHandlerBuilder, FailureContext, Recovery};

type Callback = Arc<dyn Fn(&SqlPipeError) -> Result<(), SqlPipeError> + Send + Sync>;

/// Claims every failure and passes it to a caller-supplied function.
#[derive(Clone)]
pub struct FnErrorHandler {
    callback: Callback,
}

impl FnErrorHandler {
    /// Observe the error and swallow it.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&SqlPipeError) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(move |err| {
                f(err);
                Ok(())
            }),
        }
    }

    /// Decide per error: `Ok` swallows, `Err` is returned to the caller.
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&SqlPipeError) -> Result<(), SqlPipeError> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(f),
        }
    }
}

impl ErrorHandlerBuilder for FnErrorHandler {
    fn create_error_handler(
        &self,
        _failure: &FailureContext<'_>,
    ) -> Result<Option<Recovery>, SqlPipeError> {
        let callback = Arc::clone(&self.callback);
        Ok(Some(Recovery::Handle(Box::new(move |err| callback(err)))))
    }
}

/// Logs the failure and swallows it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHandler;

impl ErrorHandlerBuilder for LogErrorHandler {
    fn create_error_handler(
        &self,
        failure: &FailureContext<'_>,
    ) -> Result<Option<Recovery>, SqlPipeError> {
        tracing::error!(
            error = %failure.error,
            sql = failure.command.command_text(),
            attempt = failure.attempt,
            "statement failed"
        );
        Ok(Some(Recovery::swallow()))
    }
}

/// Claims the failure only to return it unchanged, ending the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RethrowErrorHandler;

impl ErrorHandlerBuilder for RethrowErrorHandler {
    fn create_error_handler(
        &self,
        _failure: &FailureContext<'_>,
    ) -> Result<Option<Recovery>, SqlPipeError> {
        Ok(Some(Recovery::rethrow()))
    }
}
