//! Per-job logging
//!
//! Every run gets a fresh job identifier and appends to a log file named
//! after the minute it started in. Several runs may land in the same file,
//! so each line carries its own job identifier:
//!
//! ```text
//! Mon, 19 Oct 2026 14:03:12 INFO     JOB: 6f1c…-… - Connecting to ftp.example.com:21
//! ```
//!
//! Messages spanning several lines, such as multi-line server replies, are
//! written as several prefixed lines. The JSON format writes the job
//! identifier into every object instead of relying on a span, so it survives
//! any filter.

use crate::error::{Error, Result};
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Unique token correlating every log line of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `timestamp LEVEL JOB: id - message`
    #[default]
    Text,
    /// One JSON object per event with a `job` field
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory the per-minute log files are written to
    pub directory: PathBuf,
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(crate::DEFAULT_LOG_DIRECTORY),
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log file name for a run started at `started`
pub fn log_file_name<Tz>(started: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    started.format(crate::LOG_FILE_NAME_FORMAT).to_string()
}

/// Full log file path under `directory`
pub fn log_file_path<Tz>(directory: &Path, started: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    directory.join(log_file_name(started))
}

/// Text event format stamping every line with the job identifier
#[derive(Debug, Clone)]
pub struct JobFormat {
    job_id: JobId,
}

impl JobFormat {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }
}

impl<S, N> FormatEvent<S, N> for JobFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut message = String::new();
        ctx.field_format()
            .format_fields(Writer::new(&mut message), event)?;

        let timestamp = Local::now().format(crate::LOG_TIMESTAMP_FORMAT).to_string();
        let level = event.metadata().level().as_str();
        for line in message.trim_end_matches(&['\r', '\n'][..]).split('\n') {
            writeln!(
                writer,
                "{} {:<8} JOB: {} - {}",
                timestamp,
                level,
                self.job_id,
                line.trim_end_matches('\r')
            )?;
        }
        Ok(())
    }
}

/// JSON-lines event format with the job identifier on every object
#[derive(Debug, Clone)]
pub struct JsonJobFormat {
    job_id: JobId,
}

impl JsonJobFormat {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }
}

/// Collects event fields as JSON values
#[derive(Default)]
struct JsonVisitor(Map<String, Value>);

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::from(format!("{:?}", value)));
    }
}

impl<S, N> FormatEvent<S, N> for JsonJobFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = JsonVisitor::default();
        event.record(&mut fields);

        let metadata = event.metadata();
        let line = serde_json::json!({
            "timestamp": Local::now().to_rfc3339(),
            "level": metadata.level().as_str(),
            "job": self.job_id.to_string(),
            "target": metadata.target(),
            "fields": fields.0,
        });
        writeln!(writer, "{}", line)
    }
}

/// Build the subscriber for one job, writing to `writer`
pub fn job_subscriber<W>(
    format: LogFormat,
    filter: EnvFilter,
    job_id: JobId,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer);

    match format {
        LogFormat::Text => Box::new(builder.event_format(JobFormat::new(job_id)).finish()),
        LogFormat::Json => Box::new(builder.event_format(JsonJobFormat::new(job_id)).finish()),
    }
}

/// `RUST_LOG` when set, otherwise the configured level
fn build_env_filter(level: &str) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
        _ => Ok(EnvFilter::try_new(level)?),
    }
}

/// The installed job logger
#[derive(Debug)]
pub struct JobLog {
    job_id: JobId,
    path: PathBuf,
}

impl JobLog {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// File this run appends to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Install the global subscriber for this run.
///
/// Creates the log directory if needed and opens the log file in append
/// mode, never truncating lines written by another run in the same minute.
pub fn init_job_logging(config: &LogConfig, job_id: JobId) -> Result<JobLog> {
    fs::create_dir_all(&config.directory).map_err(|e| {
        Error::Config(format!(
            "Cannot create log directory {}: {}",
            config.directory.display(),
            e
        ))
    })?;

    let path = log_file_path(&config.directory, &Local::now());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::Config(format!("Cannot open log file {}: {}", path.display(), e)))?;

    let filter = build_env_filter(&config.level)?;
    let subscriber = job_subscriber(config.format, filter, job_id, Mutex::new(file));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))?;

    Ok(JobLog { job_id, path })
}
