use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use tiberius::{Client, Config, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::command::SqlCommand;
use crate::driver::{Connection, RowStream};
use crate::error::SqlPipeError;
use crate::results::DbRow;

use super::query::{bind_query, convert_row};

/// Type alias for the tiberius client over a tokio socket.
pub type MssqlClient = Client<Compat<TcpStream>>;

/// One SQL Server connection, opened lazily and closed explicitly.
pub struct MssqlConnection {
    config: Config,
    use_browser: bool,
    client: Option<MssqlClient>,
    // set by a row stream that hit a connection fault while borrowing the client
    broken: Arc<AtomicBool>,
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("addr", &self.config.get_addr())
            .field("client", &self.client.as_ref().map(|_| "<MssqlClient>"))
            .finish()
    }
}

impl MssqlConnection {
    #[must_use]
    pub fn new(config: Config, use_browser: bool) -> Self {
        Self {
            config,
            use_browser,
            client: None,
            broken: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn tcp(config: &Config, use_browser: bool) -> Result<TcpStream, SqlPipeError> {
        let tcp = if use_browser {
            TcpStream::connect_named(config).await?
        } else {
            TcpStream::connect(config.get_addr()).await.map_err(|e| {
                SqlPipeError::ConnectionError(format!("TCP connection error: {e}"))
            })?
        };
        tcp.set_nodelay(true)
            .map_err(|e| SqlPipeError::ConnectionError(format!("TCP_NODELAY failed: {e}")))?;
        Ok(tcp)
    }

    async fn connect(&self) -> Result<MssqlClient, SqlPipeError> {
        let tcp = Self::tcp(&self.config, self.use_browser).await?;
        match Client::connect(self.config.clone(), tcp.compat_write()).await {
            Ok(client) => Ok(client),
            // Azure gateways may redirect to the node that owns the database
            Err(tiberius::error::Error::Routing { host, port }) => {
                tracing::debug!(%host, port, "following server redirect");
                let mut config = self.config.clone();
                config.host(&host);
                config.port(port);
                let tcp = Self::tcp(&config, false).await?;
                Ok(Client::connect(config, tcp.compat_write()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn client(&mut self) -> Result<&mut MssqlClient, SqlPipeError> {
        self.client
            .as_mut()
            .ok_or_else(|| SqlPipeError::ConnectionError("connection is not open".to_string()))
    }

    /// A broken socket cannot be reused; the next `open` reconnects.
    fn forget_if_broken(&mut self, err: &SqlPipeError) {
        if matches!(err, SqlPipeError::ConnectionError(_)) {
            self.client = None;
        }
    }
}

fn mark_if_broken(broken: &AtomicBool, err: &SqlPipeError) {
    if matches!(err, SqlPipeError::ConnectionError(_)) {
        broken.store(true, Ordering::Release);
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    async fn open(&mut self) -> Result<(), SqlPipeError> {
        if self.broken.swap(false, Ordering::AcqRel) {
            tracing::debug!(addr = %self.config.get_addr(), "dropping broken connection");
            self.client = None;
        }
        if self.client.is_none() {
            self.client = Some(self.connect().await?);
            tracing::debug!(addr = %self.config.get_addr(), "connection opened");
        }
        Ok(())
    }

    async fn execute_non_query(&mut self, command: &SqlCommand) -> Result<u64, SqlPipeError> {
        let query = bind_query(command);
        let result: Result<u64, SqlPipeError> = match query.execute(self.client()?).await {
            Ok(result) => Ok(result.rows_affected().iter().sum()),
            Err(e) => Err(SqlPipeError::from(e)),
        };
        if let Err(err) = &result {
            self.forget_if_broken(err);
        }
        result
    }

    async fn execute_reader<'a>(
        &'a mut self,
        command: &'a SqlCommand,
    ) -> Result<RowStream<'a>, SqlPipeError> {
        let query = bind_query(command);
        // the returned stream keeps `self` borrowed, so faults are reported through the flag
        let broken = Arc::clone(&self.broken);
        let stream = match query.query(self.client()?).await {
            Ok(stream) => stream,
            Err(e) => {
                let err = SqlPipeError::from(e);
                mark_if_broken(&broken, &err);
                return Err(err);
            }
        };
        let mut shape = None;
        Ok(stream
            .into_row_stream()
            .map(move |row| {
                let row: Result<DbRow, SqlPipeError> = row
                    .map_err(SqlPipeError::from)
                    .and_then(|row| convert_row(row, &mut shape));
                if let Err(err) = &row {
                    mark_if_broken(&broken, err);
                }
                row
            })
            .boxed())
    }

    async fn close(&mut self) -> Result<(), SqlPipeError> {
        match self.client.take() {
            Some(client) => Ok(client.close().await?),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.client.is_some() && !self.broken.load(Ordering::Acquire)
    }
}
