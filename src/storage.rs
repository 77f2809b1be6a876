use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Creates the files thumbnails, photos and recordings are written to
pub trait FileSink: Send + Sync {
    /// Create a new empty file whose name starts with `prefix` and ends with
    /// `suffix`, returning its path
    fn create_temp_file(&self, prefix: &str, suffix: &str) -> io::Result<PathBuf>;
}

/// Millisecond timestamp used as the file name prefix for capture output
pub fn timestamp_prefix() -> String {
    Local::now().format("%Y-%m-%d-%H-%M-%S-%3f").to_string()
}

/// [`FileSink`] persisting files inside a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Sink in the system temporary directory
    pub fn system_temp() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSink for DirectorySink {
    fn create_temp_file(&self, prefix: &str, suffix: &str) -> io::Result<PathBuf> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            debug!("Created output directory: {}", self.dir.display());
        }

        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)?;

        let (_, path) = file.keep().map_err(|e| e.error)?;
        debug!("Created output file: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_sink_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("nested"));

        let first = sink.create_temp_file("2026-01-01", ".jpg").unwrap();
        let second = sink.create_temp_file("2026-01-01", ".jpg").unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(first.starts_with(sink.dir()));
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("2026-01-01"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn test_timestamp_prefix_shape() {
        let prefix = timestamp_prefix();
        // yyyy-MM-dd-HH-mm-ss-SSS
        assert_eq!(prefix.len(), 23);
        assert_eq!(prefix.matches('-').count(), 6);
    }
}
