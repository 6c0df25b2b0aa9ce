//! Command-line surface

use clap::Parser;
use std::path::PathBuf;

/// FTP Delivery - upload one asset with live progress
#[derive(Parser, Debug)]
#[command(name = "ftp-upload")]
#[command(about = "Upload a single file to an FTP server, reporting progress on stdout")]
#[command(version)]
#[command(
    after_help = "USAGE: ftp-upload --ftp_host \"ftp.example.com\" --ftp_user \"someusername\" \
                  --ftp_pass \"somepass\" --ftp_dir \"/incoming\" --asset \"/tmp/foo/bar.mp4\""
)]
pub struct Cli {
    /// FTP host
    #[arg(long = "ftp_host", value_name = "HOST")]
    pub ftp_host: String,

    /// FTP username
    #[arg(long = "ftp_user", value_name = "USER")]
    pub ftp_user: String,

    /// FTP password
    #[arg(long = "ftp_pass", value_name = "PASS")]
    pub ftp_pass: String,

    /// Remote directory to upload into
    #[arg(long = "ftp_dir", value_name = "DIR")]
    pub ftp_dir: String,

    /// Asset to deliver
    #[arg(long, value_name = "FILE")]
    pub asset: PathBuf,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log directory, overrides the configuration file
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Control port, overrides the configuration file
    #[arg(long)]
    pub port: Option<u16>,
}
