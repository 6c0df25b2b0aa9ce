//! Upload progress tracking
//!
//! `UploadTracker` holds the per-transfer counters and recomputes the
//! percentage after every block. Where the percentage goes is decided by a
//! `ProgressSink`; the binary writes it to stdout for a supervising process,
//! tests record it.

use std::io::{self, Write};

/// Integer percentage of `sent` over `total`, rounded half up, capped at 100.
///
/// A zero-length file is complete by definition and reports 100.
pub fn percent_complete(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (u128::from(sent) * 200 + u128::from(total)) / (u128::from(total) * 2);
    percent.min(100) as u8
}

/// Destination for progress updates
pub trait ProgressSink {
    /// Report `percent` complete for `file_label`
    fn report(&mut self, file_label: &str, percent: u8) -> io::Result<()>;
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn report(&mut self, file_label: &str, percent: u8) -> io::Result<()> {
        (**self).report(file_label, percent)
    }
}

/// Writes a single carriage-return-prefixed progress line and flushes it
pub struct ConsoleProgress<W: Write> {
    out: W,
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl ConsoleProgress<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ProgressSink for ConsoleProgress<W> {
    fn report(&mut self, file_label: &str, percent: u8) -> io::Result<()> {
        write!(self.out, "\rFile: {} Upload Progress: {:2}%", file_label, percent)?;
        self.out.flush()
    }
}

/// Discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _file_label: &str, _percent: u8) -> io::Result<()> {
        Ok(())
    }
}

/// Progress state of a single upload
#[derive(Debug, Clone)]
pub struct UploadTracker {
    bytes_sent: u64,
    total_size: u64,
    last_reported_percent: u8,
    file_label: String,
}

impl UploadTracker {
    pub fn new(total_size: u64, file_label: impl Into<String>) -> Self {
        Self {
            bytes_sent: 0,
            total_size,
            last_reported_percent: 0,
            file_label: file_label.into(),
        }
    }

    /// Account for one transmitted block and report the new percentage
    pub fn on_block<S: ProgressSink + ?Sized>(&mut self, block: &[u8], sink: &mut S) -> io::Result<u8> {
        self.bytes_sent += block.len() as u64;
        if self.bytes_sent > self.total_size {
            tracing::warn!(
                sent = self.bytes_sent,
                total = self.total_size,
                "File grew during upload"
            );
        }
        self.report(sink)
    }

    /// Report completion of a zero-length file without sending any block
    pub fn finish_empty<S: ProgressSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<u8> {
        self.report(sink)
    }

    fn report<S: ProgressSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<u8> {
        let percent = percent_complete(self.bytes_sent, self.total_size);
        sink.report(&self.file_label, percent)?;
        if percent != self.last_reported_percent {
            self.last_reported_percent = percent;
        }
        Ok(percent)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn last_reported_percent(&self) -> u8 {
        self.last_reported_percent
    }

    pub fn file_label(&self) -> &str {
        &self.file_label
    }
}
