use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::SqlPipeError;

/// Wraps the caller's sink so the prefix goes out right before the first byte and the
/// suffix only after a prefixed output completed.
pub(crate) struct WrappedSink<'w, W> {
    inner: &'w mut W,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
    started: bool,
}

impl<'w, W> WrappedSink<'w, W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(inner: &'w mut W, prefix: Vec<u8>, suffix: Vec<u8>) -> Self {
        Self {
            inner,
            prefix,
            suffix,
            started: false,
        }
    }

    pub(crate) async fn write(&mut self, bytes: &[u8]) -> Result<(), SqlPipeError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if !self.started {
            self.started = true;
            self.inner
                .write_all(&self.prefix)
                .await
                .map_err(|e| SqlPipeError::sink(&e))?;
        }
        self.inner
            .write_all(bytes)
            .await
            .map_err(|e| SqlPipeError::sink(&e))
    }

    pub(crate) async fn flush(&mut self) -> Result<(), SqlPipeError> {
        self.inner.flush().await.map_err(|e| SqlPipeError::sink(&e))
    }

    /// Write the suffix if anything was written, then flush.
    pub(crate) async fn finish(&mut self) -> Result<(), SqlPipeError> {
        if self.started {
            self.inner
                .write_all(&self.suffix)
                .await
                .map_err(|e| SqlPipeError::sink(&e))?;
        }
        self.flush().await
    }
}
