use std::io;

use thiserror::Error;

/// Failure while retrieving log lines from a backend.
///
/// Circuit breakers and cursor cache misses are not errors and never show up here.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Network failure or timeout
    #[error("log backend unreachable: {message}")]
    BackendUnreachable { message: String },

    /// Backend answered with a non-2xx status
    #[error("log backend query failed with status {status}: {body}")]
    BackendQuery { status: u16, body: String },

    /// Credentials are missing or unusable
    #[error("log backend authentication misconfigured: {0}")]
    Authentication(String),

    /// Response body did not have the expected shape
    #[error("malformed log backend response: {0}")]
    MalformedResponse(String),

    /// The stream was used after close
    #[error("log stream already closed")]
    Closed,
}

impl RetrievalError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::BackendUnreachable {
            message: message.into(),
        }
    }

    /// Errors that can only happen before the first line is delivered
    pub fn is_setup_error(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Recover a retrieval error carried through [`std::io::Read`]
    pub fn from_io(err: &io::Error) -> Option<&RetrievalError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<RetrievalError>())
    }
}

impl From<RetrievalError> for io::Error {
    fn from(err: RetrievalError) -> Self {
        let kind = match &err {
            RetrievalError::BackendUnreachable { .. } => io::ErrorKind::ConnectionAborted,
            RetrievalError::Authentication(_) => io::ErrorKind::PermissionDenied,
            RetrievalError::MalformedResponse(_) => io::ErrorKind::InvalidData,
            RetrievalError::Closed => io::ErrorKind::BrokenPipe,
            RetrievalError::BackendQuery { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
