use thiserror::Error;

/// A fault reported by the database server.
///
/// `number` is the server's error number (`1205` for a deadlock victim, `40613` for an
/// unavailable Azure database, ...), which is what the retry policy classifies on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SQL error {number} (state {state}, class {class}): {message}")]
pub struct DbError {
    pub number: u32,
    pub state: u8,
    pub class: u8,
    pub message: String,
}

impl DbError {
    #[must_use]
    pub fn new(number: u32, message: impl Into<String>) -> Self {
        Self {
            number,
            state: 1,
            class: 16,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SqlPipeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Unsupported column type: {0}")]
    UnsupportedColumnType(String),

    #[error("Unsupported command shape: {0}")]
    UnsupportedCommandShape(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("Output sink error ({kind:?}): {message}")]
    Sink {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("Row callback error: {0}")]
    Callback(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlPipeError {
    /// Wrap an I/O failure raised while writing to an output sink.
    #[must_use]
    pub fn sink(err: &std::io::Error) -> Self {
        SqlPipeError::Sink {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Server error number, when the error came from the database.
    #[must_use]
    pub fn db_number(&self) -> Option<u32> {
        match self {
            SqlPipeError::Database(db) => Some(db.number),
            _ => None,
        }
    }

    /// Errors that never reach the error-handler chain.
    #[must_use]
    pub fn bypasses_handlers(&self) -> bool {
        matches!(
            self,
            SqlPipeError::InvalidConfiguration(_) | SqlPipeError::Sink { .. }
        )
    }
}

#[cfg(feature = "mssql")]
impl From<tiberius::error::Error> for SqlPipeError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => SqlPipeError::Database(DbError {
                number: token.code(),
                state: token.state(),
                class: token.class(),
                message: token.message().to_string(),
            }),
            tiberius::error::Error::Io { kind, message } => {
                SqlPipeError::ConnectionError(format!("{kind:?}: {message}"))
            }
            tiberius::error::Error::Tls(message) => {
                SqlPipeError::ConnectionError(format!("TLS error: {message}"))
            }
            other => SqlPipeError::Other(other.to_string()),
        }
    }
}
