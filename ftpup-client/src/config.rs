//! Client configuration
//!
//! Everything the command line does not carry: port, timeouts and logging.
//! All fields are optional in the TOML file and unknown keys are rejected.
//! The 8192-byte block size is fixed and cannot be set here.
//!
//! ```toml
//! port = 21
//! connect_timeout = 30
//! io_timeout = 300     # 0 disables the timeout
//!
//! [log]
//! directory = "/opt/scripts/logs/"
//! level = "info"
//! format = "text"      # or "json"
//! ```

use crate::cli::Cli;
use anyhow::{bail, Context};
use ftpup_core::{LogConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Control port
    pub port: u16,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Socket read/write timeout in seconds
    pub io_timeout: Option<u64>,
    /// Logging
    pub log: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            port: transport.port,
            connect_timeout: transport.connect_timeout,
            io_timeout: transport.io_timeout,
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load a TOML configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Configuration for this invocation: file (if any), then CLI overrides
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(dir) = &cli.log_dir {
            config.log.directory = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        Ok(())
    }

    /// Transport settings for a connection to `host`
    pub fn transport(&self, host: &str) -> TransportConfig {
        TransportConfig {
            host: host.to_string(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use ftpup_core::LogFormat;
    use std::path::PathBuf;

    fn cli(extra: &[&str]) -> Cli {
        let mut args = vec![
            "ftp-upload",
            "--ftp_host",
            "h",
            "--ftp_user",
            "u",
            "--ftp_pass",
            "p",
            "--ftp_dir",
            "d",
            "--asset",
            "a",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::resolve(&cli(&[])).unwrap();
        assert_eq!(config.port, 21);
        assert_eq!(config.log.directory, PathBuf::from("/opt/scripts/logs/"));
        assert_eq!(config.log.format, LogFormat::Text);

        let transport = config.transport("ftp.example.com");
        assert_eq!(transport.host, "ftp.example.com");
        assert_eq!(transport.port, 21);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ftp-upload.toml");
        fs::write(
            &path,
            "connect_timeout = 5\nio_timeout = 0\n\n[log]\nlevel = \"debug\"\nformat = \"json\"\n",
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.connect_timeout, 5);
        assert_eq!(config.io_timeout, Some(0));
        assert_eq!(config.port, 21);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ftp-upload.toml");
        fs::write(&path, "port = 2121\n[log]\ndirectory = \"/var/log/a\"\n").unwrap();
        let path_arg = path.to_str().unwrap();

        let config = ClientConfig::resolve(&cli(&["--config", path_arg])).unwrap();
        assert_eq!(config.port, 2121);
        assert_eq!(config.log.directory, PathBuf::from("/var/log/a"));

        let config = ClientConfig::resolve(&cli(&[
            "--config",
            path_arg,
            "--port",
            "990",
            "--log-dir",
            "/tmp/logs",
        ]))
        .unwrap();
        assert_eq!(config.port, 990);
        assert_eq!(config.log.directory, PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn test_invalid_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ClientConfig::load(&dir.path().join("missing.toml")).is_err());

        let path = dir.path().join("bad.toml");
        fs::write(&path, "connect_timeout = \"slow\"\n").unwrap();
        assert!(ClientConfig::load(&path).is_err());

        fs::write(&path, "port = 0\n").unwrap();
        let path_arg = path.to_str().unwrap();
        assert!(ClientConfig::resolve(&cli(&["--config", path_arg])).is_err());
    }

    #[test]
    fn test_block_size_is_not_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ftp-upload.toml");
        fs::write(&path, "block_size = 4096\n").unwrap();

        let err = ClientConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("block_size"), "{:#}", err);
    }
}
