//! Delivery orchestration
//!
//! One invocation connects, uploads a single asset and disconnects. All
//! faults surface here once, get logged, and are mapped to an exit code.

use crate::cli::Cli;
use crate::config::ClientConfig;
use clap::Parser;
use ftpup_core::{
    establish, init_job_logging, upload, ConsoleProgress, Credentials, ErrorKind, JobId,
    ProgressSink, Result, UploadReport,
};
use std::path::PathBuf;

/// Exit code of a successful delivery
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for each fault category.
///
/// Every category currently maps to 1; supervisors rely on that.
pub fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Connection => 1,
        ErrorKind::Authentication => 1,
        ErrorKind::RemoteDirectory => 1,
        ErrorKind::LocalFile => 1,
        ErrorKind::Transfer => 1,
        ErrorKind::Protocol => 1,
        ErrorKind::InvalidInput => 1,
        ErrorKind::Config => 1,
    }
}

/// What to deliver and where
#[derive(Debug)]
pub struct DeliveryRequest {
    pub host: String,
    pub credentials: Credentials,
    pub remote_dir: String,
    pub asset: PathBuf,
}

impl DeliveryRequest {
    /// Take the request out of parsed arguments; the password moves into
    /// zeroizing storage
    pub fn from_cli(cli: &mut Cli) -> Self {
        Self {
            host: cli.ftp_host.clone(),
            credentials: Credentials::new(cli.ftp_user.clone(), std::mem::take(&mut cli.ftp_pass)),
            remote_dir: cli.ftp_dir.clone(),
            asset: cli.asset.clone(),
        }
    }
}

/// Connect, upload and disconnect
pub fn deliver<S>(config: &ClientConfig, request: &DeliveryRequest, sink: &mut S) -> Result<UploadReport>
where
    S: ProgressSink + ?Sized,
{
    tracing::info!(" *** NEW FTP REQUEST ACCEPTED *** ");
    tracing::info!(
        "Arguments: host={}, user={}, pass=****, dir={}, asset={}",
        request.host,
        request.credentials.username,
        request.remote_dir,
        request.asset.display()
    );

    tracing::info!("Initiating FTP Connection");
    let mut session = establish(
        config.transport(&request.host),
        &request.credentials,
        &request.remote_dir,
    )?;
    tracing::info!("Connection to FTP Server Successful");

    tracing::info!("Starting upload of Asset: {}", request.asset.display());
    let report = upload(&mut session, &request.asset, sink)?;
    tracing::info!(
        "FTP Upload of Asset: {} Completed Successfully",
        report.remote_name
    );

    session.quit()?;
    Ok(report)
}

/// Parse arguments, run one delivery, return the process exit code
pub fn run_cli() -> i32 {
    let mut cli = Cli::parse();

    let config = match ClientConfig::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return exit_code(ErrorKind::Config);
        }
    };

    let log = match init_job_logging(&config.log, JobId::new()) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code(e.kind());
        }
    };
    tracing::info!("Job {} logging to {}", log.job_id(), log.path().display());

    let request = DeliveryRequest::from_cli(&mut cli);
    match deliver(&config, &request, &mut ConsoleProgress::stdout()) {
        Ok(report) => {
            tracing::info!(
                "**** COMPLETE: FTP Delivery of {} ({} bytes) successful ****",
                report.remote_name,
                report.bytes_sent
            );
            EXIT_SUCCESS
        }
        Err(e) => {
            tracing::error!("FTP delivery has encountered an error: {}", e);
            exit_code(e.kind())
        }
    }
}
