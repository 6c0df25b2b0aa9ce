//! FTP upload client
//!
//! Command-line surface, configuration and delivery orchestration for
//! single-file FTP uploads.

pub mod cli;
pub mod client;
pub mod config;

pub use cli::Cli;
pub use client::{deliver, exit_code, run_cli, DeliveryRequest};
pub use config::ClientConfig;
