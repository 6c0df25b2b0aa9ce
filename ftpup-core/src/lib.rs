//! FTP upload core
//!
//! This crate provides the pieces of a single-file FTP upload: the
//! control-channel protocol, blocking control and data transport,
//! connection establishment, the upload itself with block-level progress
//! reporting, and per-job logging.

pub mod connection;
pub mod error;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod transport;
pub mod upload;

// Re-export commonly used types
pub use connection::{establish, Credentials};
pub use error::{Error, ErrorKind, Result};
pub use logging::{init_job_logging, JobId, JobLog, LogConfig, LogFormat};
pub use progress::{percent_complete, ConsoleProgress, NoProgress, ProgressSink, UploadTracker};
pub use protocol::{Command, Reply, ReplyClass};
pub use transport::{FtpSession, SessionState, TransportConfig};
pub use upload::{upload, LocalAsset, UploadReport};

/// Standard FTP control port
pub const DEFAULT_CONTROL_PORT: u16 = 21;

/// Bytes per block sent on the data connection; not configurable
pub const BLOCK_SIZE: usize = 8192;

/// Where per-job log files go unless configured otherwise
pub const DEFAULT_LOG_DIRECTORY: &str = "/opt/scripts/logs/";

/// `chrono` format of the per-minute log file name
pub const LOG_FILE_NAME_FORMAT: &str = "ftp_upload_%H_%M_%d_%m_%Y.log";

/// `chrono` format of the timestamp at the start of each log line
pub const LOG_TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_constants() {
        assert_eq!(DEFAULT_CONTROL_PORT, 21);
        assert_eq!(BLOCK_SIZE, 8192);
    }

    #[test]
    fn test_log_constants() {
        assert!(DEFAULT_LOG_DIRECTORY.ends_with('/'));
        assert!(LOG_FILE_NAME_FORMAT.ends_with(".log"));
    }
}
