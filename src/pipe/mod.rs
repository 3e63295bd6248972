//! Streaming a single-column result set into a byte sink.

mod options;
mod sink;

pub use options::{DefaultOutput, OutputEncoding, StreamOptions};

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tokio::io::AsyncWrite;

use crate::command::SqlCommand;
use crate::driver::Connection;
use crate::error::SqlPipeError;
use crate::statement::{ExecutionBody, Outcome, Statement};
use crate::types::ColumnValue;

use sink::WrappedSink;

struct PipeBody<'w, W> {
    sink: WrappedSink<'w, W>,
    encoding: OutputEncoding,
    written: u64,
}

impl<W> PipeBody<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&mut self, cell: Option<&ColumnValue>) -> Result<(), SqlPipeError> {
        match cell {
            None | Some(ColumnValue::Null) => Ok(()),
            Some(ColumnValue::Text(text) | ColumnValue::Xml(text)) => {
                let bytes = self.encoding.encode(text);
                self.sink.write(&bytes).await?;
                self.written += u64::from(!bytes.is_empty());
                Ok(())
            }
            Some(ColumnValue::Binary(bytes)) => {
                self.sink.write(bytes).await?;
                self.written += u64::from(!bytes.is_empty());
                Ok(())
            }
            Some(other) => Err(SqlPipeError::UnsupportedColumnType(
                other.type_name().to_string(),
            )),
        }
    }
}

#[async_trait]
impl<'w, W> ExecutionBody for PipeBody<'w, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn run(
        &mut self,
        conn: &mut dyn Connection,
        command: &SqlCommand,
    ) -> Result<(), SqlPipeError> {
        let mut rows = conn.execute_reader(command).await?;
        while let Some(row) = rows.try_next().await? {
            self.emit(row.get_by_index(0)).await?;
            self.sink.flush().await?;
        }
        Ok(())
    }

    fn rows_delivered(&self) -> u64 {
        self.written
    }
}

impl Statement {
    /// Execute the query and write the first column of every row to `sink`.
    ///
    /// Output is `prefix + rows + suffix`, or `prefix + default + suffix` when the query
    /// produced nothing. A handled error leaves the sink with whatever was written before
    /// it and no default or suffix.
    ///
    /// # Errors
    /// Returns configuration errors, sink write failures, and execution errors no handler
    /// swallowed, including `UnsupportedColumnType` for non-text, non-binary cells.
    pub async fn stream<W>(&self, sink: &mut W, options: &StreamOptions) -> Result<(), SqlPipeError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut body = PipeBody {
            sink: WrappedSink::new(
                sink,
                options.encoded_prefix().into_owned(),
                options.encoded_suffix().into_owned(),
            ),
            encoding: options.encoding,
            written: 0,
        };

        match self.execute(&mut body).await? {
            Outcome::Completed => {
                if body.written == 0 {
                    if let Some(default) = options.encoded_default() {
                        tracing::debug!("no rows produced output, writing default");
                        body.sink.write(&default).await?;
                    }
                }
                body.sink.finish().await
            }
            other => other.into_result(),
        }
    }

    /// Stream into a `String`. Only UTF-8 output can be collected this way.
    ///
    /// # Errors
    /// See [`Statement::stream`]; also fails when the options ask for a UTF-16 encoding or
    /// a binary cell is not valid UTF-8.
    pub async fn stream_to_string(&self, options: &StreamOptions) -> Result<String, SqlPipeError> {
        if options.encoding != OutputEncoding::Utf8 {
            return Err(SqlPipeError::InvalidConfiguration(format!(
                "cannot collect {:?} output into a String",
                options.encoding
            )));
        }
        let mut buffer = Vec::new();
        self.stream(&mut buffer, options).await?;
        String::from_utf8(buffer).map_err(|e| SqlPipeError::Other(e.to_string()))
    }
}
