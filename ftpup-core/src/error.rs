//! Error types for the FTP uploader

use thiserror::Error;

/// Result type for uploader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Uploader error types
#[derive(Error, Debug)]
pub enum Error {
    /// Control connection could not be opened or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server rejected the credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Remote directory missing or not accessible
    #[error("Remote directory error: {0}")]
    RemoteDirectory(String),

    /// Local file missing, unreadable or not a regular file
    #[error("Local file error: {0}")]
    LocalFile(String),

    /// Data transfer failed or the server refused the store
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Malformed or unexpected server reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration or logging setup error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Closed set of fault categories, used to pick a process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Authentication,
    RemoteDirectory,
    LocalFile,
    Transfer,
    Protocol,
    InvalidInput,
    Config,
}

impl Error {
    /// Fault category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::RemoteDirectory(_) => ErrorKind::RemoteDirectory,
            Error::LocalFile(_) => ErrorKind::LocalFile,
            Error::Transfer(_) => ErrorKind::Transfer,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Re-tag a connection-level failure as a transfer failure.
    ///
    /// Used once `STOR` is underway: a dropped socket at that point is a
    /// failed transfer, whatever layer noticed it.
    pub(crate) fn into_transfer(self) -> Self {
        match self {
            Error::Connection(msg) | Error::Protocol(msg) => Error::Transfer(msg),
            other => other,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Connection(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for Error {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        Error::Config(format!("Invalid log filter: {}", err))
    }
}
