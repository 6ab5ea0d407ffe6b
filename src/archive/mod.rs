//! Archive handling.
//!
//! The batch runner never talks to an archiver binary directly. It goes
//! through the [`Archiver`] trait, which has two operations:
//!
//! - [`Archiver::inspect`] - read the archive summary (sizes, entry count)
//! - [`Archiver::extract`] - expand the whole archive into a directory
//!
//! The only implementation shipped is [`sevenzip::SevenZip`], which drives
//! the `7z`/`7zz` command line tool.

pub mod sevenzip;

pub use sevenzip::{parse_list_summary, SevenZip};

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Totals reported by the archiver's listing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Sum of all entry sizes once extracted
    pub uncompressed_bytes: u64,
    /// Sum of all packed entry sizes
    pub compressed_bytes: u64,
    /// Number of file entries
    pub file_count: u64,
}

impl ArchiveSummary {
    /// Compression ratio (uncompressed / compressed), 0.0 when unknown.
    ///
    /// Display only, nothing gates on it.
    pub fn ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            0.0
        } else {
            self.uncompressed_bytes as f64 / self.compressed_bytes as f64
        }
    }
}

/// Archiver adapter failures. All of them are fatal for a batch run.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(
        "{tool} failed with code {} on {}",
        exit_code_label(*code),
        archive.display()
    )]
    Failed {
        tool: String,
        archive: PathBuf,
        /// `None` when the process was killed by a signal
        code: Option<i32>,
        /// Full standard error text
        stderr: String,
        /// Last 500 characters of standard output
        stdout_tail: String,
    },

    #[error("{tool} {operation} timed out after {}s on {}", limit.as_secs(), archive.display())]
    TimedOut {
        tool: String,
        operation: &'static str,
        archive: PathBuf,
        limit: Duration,
    },

    #[error("Failed to run {tool} on {}: {source}", archive.display())]
    Spawn {
        tool: String,
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create destination directory {}: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archiver binary not found: {0}")]
    NotFound(String),
}

fn exit_code_label(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// External archiver contract used by the batch runner.
///
/// Implementations must treat any non-zero exit of the underlying tool as
/// an error, even if some entries were written.
#[allow(async_fn_in_trait)]
pub trait Archiver {
    /// Read the archive summary.
    ///
    /// Returns `Ok(None)` when the listing cannot be parsed; that only
    /// disables the predicted-space check for this archive. Timeouts and
    /// spawn failures are errors.
    async fn inspect(&self, archive: &Path) -> Result<Option<ArchiveSummary>, ArchiveError>;

    /// Extract `archive` into `destination`, overwriting without prompting.
    ///
    /// Creates `destination` if needed. Returns the wall-clock time spent in
    /// the tool itself.
    async fn extract(&self, archive: &Path, destination: &Path) -> Result<Duration, ArchiveError>;
}

impl<T: Archiver> Archiver for &T {
    async fn inspect(&self, archive: &Path) -> Result<Option<ArchiveSummary>, ArchiveError> {
        (**self).inspect(archive).await
    }

    async fn extract(&self, archive: &Path, destination: &Path) -> Result<Duration, ArchiveError> {
        (**self).extract(archive, destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        let summary = ArchiveSummary {
            uncompressed_bytes: 1000,
            compressed_bytes: 250,
            file_count: 3,
        };
        assert!((summary.ratio() - 4.0).abs() < f64::EPSILON);

        let unknown = ArchiveSummary {
            compressed_bytes: 0,
            ..summary
        };
        assert_eq!(unknown.ratio(), 0.0);
    }

    #[test]
    fn test_failed_display_includes_code() {
        let err = ArchiveError::Failed {
            tool: "7z".to_string(),
            archive: PathBuf::from("/data/a.zip"),
            code: Some(2),
            stderr: String::new(),
            stdout_tail: String::new(),
        };
        assert_eq!(err.to_string(), "7z failed with code 2 on /data/a.zip");

        let killed = ArchiveError::Failed {
            tool: "7z".to_string(),
            archive: PathBuf::from("/data/a.zip"),
            code: None,
            stderr: String::new(),
            stdout_tail: String::new(),
        };
        assert!(killed.to_string().contains("code signal"));
    }
}
