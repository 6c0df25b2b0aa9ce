//! Single-file upload
//!
//! Resolves the local file, opens it for the duration of the call and
//! streams it to the session's current remote directory under its bare
//! file name. The process working directory is never touched: the resolved
//! path is opened directly.

use crate::error::{Error, Result};
use crate::progress::{ProgressSink, UploadTracker};
use crate::transport::FtpSession;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A local file ready to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    directory: PathBuf,
    file_name: String,
    size: u64,
}

impl LocalAsset {
    /// Split `path` into its directory and bare file name and stat the file.
    ///
    /// Trailing whitespace is trimmed from the file name, and a path with
    /// no directory part resolves against the current directory.
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let raw_name = path
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("No file name in {}", path.display())))?;
        let file_name = raw_name
            .to_str()
            .ok_or_else(|| {
                Error::InvalidInput(format!("File name is not valid UTF-8: {}", path.display()))
            })?
            .trim_end()
            .to_string();
        if file_name.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Empty file name in {}",
                path.display()
            )));
        }

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let candidate = directory.join(&file_name);
        let metadata = fs::metadata(&candidate)
            .map_err(|e| Error::LocalFile(format!("{}: {}", candidate.display(), e)))?;
        if !metadata.is_file() {
            return Err(Error::LocalFile(format!(
                "{}: not a regular file",
                candidate.display()
            )));
        }

        let directory = fs::canonicalize(&directory)
            .map_err(|e| Error::LocalFile(format!("{}: {}", directory.display(), e)))?;

        Ok(Self {
            directory,
            file_name,
            size: metadata.len(),
        })
    }

    /// Absolute directory holding the file
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Bare file name, also used as the remote name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Size at resolve time
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Absolute path of the file
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub remote_name: String,
    pub bytes_sent: u64,
    pub total_size: u64,
    pub elapsed: Duration,
}

/// Upload `local_path` through `session`, reporting progress to `sink`
pub fn upload<S>(session: &mut FtpSession, local_path: impl AsRef<Path>, sink: &mut S) -> Result<UploadReport>
where
    S: ProgressSink + ?Sized,
{
    let asset = LocalAsset::resolve(local_path)?;

    tracing::info!("Working directory: {}", asset.directory().display());
    tracing::info!("Base Filename: {}", asset.file_name());
    tracing::info!("File Total Size: {}", asset.size());

    let mut tracker = UploadTracker::new(asset.size(), asset.file_name());
    let mut file = File::open(asset.path())
        .map_err(|e| Error::LocalFile(format!("{}: {}", asset.path().display(), e)))?;

    tracing::info!("Upload of Filename: {} Started", asset.file_name());
    let started = Instant::now();

    let bytes_sent = session.store(asset.file_name(), &mut file, |block| {
        tracker
            .on_block(block, &mut *sink)
            .map(|_| ())
            .map_err(progress_failed)
    })?;

    if asset.size() == 0 {
        tracker.finish_empty(&mut *sink).map_err(progress_failed)?;
    }
    if bytes_sent != asset.size() {
        tracing::warn!(
            "File size changed during upload: expected {} bytes, sent {}",
            asset.size(),
            bytes_sent
        );
    }

    let elapsed = started.elapsed();
    tracing::info!(
        "Upload of Filename: {} Finished ({} bytes in {:.2}s)",
        asset.file_name(),
        bytes_sent,
        elapsed.as_secs_f64()
    );

    Ok(UploadReport {
        remote_name: asset.file_name().to_string(),
        bytes_sent,
        total_size: asset.size(),
        elapsed,
    })
}

fn progress_failed(err: std::io::Error) -> Error {
    Error::Transfer(format!("Progress output failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_splits_directory_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bar.mp4");
        fs::write(&path, b"0123456789").unwrap();

        let asset = LocalAsset::resolve(&path).unwrap();
        assert_eq!(asset.file_name(), "bar.mp4");
        assert_eq!(asset.directory(), fs::canonicalize(dir.path()).unwrap());
        assert_eq!(asset.size(), 10);
        assert!(asset.path().is_absolute());
    }

    #[test]
    fn test_resolve_trims_trailing_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.mov"), b"x").unwrap();

        let raw = format!("{}/clip.mov \n", dir.path().display());
        let asset = LocalAsset::resolve(raw).unwrap();
        assert_eq!(asset.file_name(), "clip.mov");
        assert_eq!(asset.size(), 1);
    }

    #[test]
    fn test_resolve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = LocalAsset::resolve(dir.path().join("nope.bin"));
        assert!(matches!(result, Err(Error::LocalFile(_))));
    }

    #[test]
    fn test_resolve_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let result = LocalAsset::resolve(dir.path().join("sub"));
        assert!(matches!(result, Err(Error::LocalFile(_))));
    }

    #[test]
    fn test_resolve_without_file_name() {
        assert!(matches!(LocalAsset::resolve("/"), Err(Error::InvalidInput(_))));
        assert!(matches!(LocalAsset::resolve("   "), Err(Error::InvalidInput(_))));
    }
}
