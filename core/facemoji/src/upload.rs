//! Per-request upload staging and result files.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::error::FacemojiError;

/// Validates uploads and stages them as temporary files.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    config: UploadConfig,
}

/// An uploaded file owned by a single request.
///
/// The file is deleted when the guard is dropped, whichever way the
/// request ends.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    original_name: String,
    size: usize,
}

impl StagedUpload {
    /// Location of the staged file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// File name the client supplied.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read the staged bytes back.
    pub fn read(&self) -> Result<Vec<u8>, FacemojiError> {
        Ok(std::fs::read(self.file.path())?)
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        debug!(path = %self.file.path().display(), "releasing staged upload");
    }
}

impl UploadStore {
    /// Open the upload directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>, config: &UploadConfig) -> Result<Self, FacemojiError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            config: config.clone(),
        })
    }

    /// Directory files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lowercase extension of `filename` if it is on the allow list.
    pub fn check_extension(&self, filename: &str) -> Result<String, FacemojiError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or(FacemojiError::UnsupportedFormat)?;
        if self.config.allowed_extensions.iter().any(|allowed| *allowed == ext) {
            Ok(ext)
        } else {
            Err(FacemojiError::UnsupportedFormat)
        }
    }

    /// Validate and write `bytes` to a uniquely named file in the upload
    /// directory.
    pub fn stage(&self, filename: &str, bytes: &[u8]) -> Result<StagedUpload, FacemojiError> {
        let ext = self.check_extension(filename)?;
        if bytes.len() > self.config.max_upload_bytes {
            return Err(FacemojiError::UploadTooLarge {
                size: bytes.len(),
                limit: self.config.max_upload_bytes,
            });
        }

        let prefix = format!("{}_", Local::now().format("%Y%m%d_%H%M%S"));
        let suffix = format!(".{ext}");
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(&self.dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        debug!(path = %file.path().display(), size = bytes.len(), "upload staged");
        Ok(StagedUpload {
            file,
            original_name: filename.to_string(),
            size: bytes.len(),
        })
    }

    /// Remove leftover uploads older than the configured age.
    pub fn sweep_stale(&self) -> Result<usize, FacemojiError> {
        let max_age = Duration::from_secs(self.config.stale_after_hours.saturating_mul(3600));
        sweep_older_than(&self.dir, max_age)
    }
}

/// Writes finished emoji as PNG files.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Open the results directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, FacemojiError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `png` as `emoji_<style>_<timestamp>.png` and return its path.
    /// A numeric suffix is added when the name is already taken.
    pub fn save(&self, png: &[u8], style: &str) -> Result<PathBuf, FacemojiError> {
        let style: String = style
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let stem = format!("emoji_{style}_{}", Local::now().format("%Y%m%d_%H%M%S"));

        let mut path = self.dir.join(format!("{stem}.png"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{stem}_{n}.png"));
            n += 1;
        }
        std::fs::write(&path, png)?;
        info!(path = %path.display(), bytes = png.len(), "result saved");
        Ok(path)
    }

    /// Remove results at least `max_age` old.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize, FacemojiError> {
        sweep_older_than(&self.dir, max_age)
    }
}

/// Delete regular files in `dir` whose modification time is at least
/// `max_age` ago. Returns the number removed.
pub fn sweep_older_than(dir: &Path, max_age: Duration) -> Result<usize, FacemojiError> {
    if !dir.exists() {
        return Ok(0);
    }
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age >= max_age {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "could not remove stale file"),
            }
        }
    }
    if removed > 0 {
        info!(dir = %dir.display(), removed, "stale files swept");
    }
    Ok(removed)
}
