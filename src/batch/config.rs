//! Batch configuration
//!
//! Built once at process start and handed to the runner.

use crate::archive::sevenzip::{DEFAULT_EXTRACT_TIMEOUT, DEFAULT_LIST_TIMEOUT};
use crate::disk::SpaceGuard;
use std::path::PathBuf;
use std::time::Duration;

/// File name of the progress log inside the state directory
pub const PROGRESS_LOG_FILE: &str = "unpack-progress.txt";

/// File name of the completion ledger inside the state directory
pub const LEDGER_FILE: &str = "unpack-completed.txt";

/// Configuration for a batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Text file listing archive paths, one per line
    pub work_list: PathBuf,

    /// Directory every archive is extracted into
    pub destination: PathBuf,

    /// Append-only progress log
    pub progress_log: PathBuf,

    /// Append-only completion ledger
    pub ledger: PathBuf,

    /// Free-space policy
    pub guard: SpaceGuard,

    /// Timeout for the archiver's listing command
    pub list_timeout: Duration,

    /// Timeout for extracting a single archive
    pub extract_timeout: Duration,
}

impl BatchConfig {
    /// Config with default policy; log and ledger go into `state_dir`.
    pub fn new(
        work_list: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        let state_dir = state_dir.into();
        Self {
            work_list: work_list.into(),
            destination: destination.into(),
            progress_log: state_dir.join(PROGRESS_LOG_FILE),
            ledger: state_dir.join(LEDGER_FILE),
            guard: SpaceGuard::default(),
            list_timeout: DEFAULT_LIST_TIMEOUT,
            extract_timeout: DEFAULT_EXTRACT_TIMEOUT,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.work_list.is_file() {
            return Err(ConfigError::WorkListNotFound(self.work_list.clone()));
        }

        if self.destination.exists() && !self.destination.is_dir() {
            return Err(ConfigError::DestinationNotDirectory(self.destination.clone()));
        }

        for (name, value) in [
            ("min_free_gb", self.guard.min_free_gb),
            ("reserve_gb", self.guard.reserve_gb),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if self.list_timeout.is_zero() || self.extract_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Work list not found: {}", .0.display())]
    WorkListNotFound(PathBuf),

    #[error("Destination exists but is not a directory: {}", .0.display())]
    DestinationNotDirectory(PathBuf),

    #[error("Invalid {name}: {value} (must be a non-negative number of GB)")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Timeouts must be greater than zero")]
    ZeroTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config(dir: &TempDir) -> BatchConfig {
        let list = dir.path().join("ziplist.txt");
        std::fs::write(&list, "").unwrap();
        BatchConfig::new(list, dir.path().join("extracted"), dir.path())
    }

    #[test]
    fn test_defaults() {
        let config = BatchConfig::new("/l.txt", "/out", "/state");
        assert_eq!(config.progress_log, PathBuf::from("/state/unpack-progress.txt"));
        assert_eq!(config.ledger, PathBuf::from("/state/unpack-completed.txt"));
        assert_eq!(config.guard.min_free_gb, 50.0);
        assert_eq!(config.guard.reserve_gb, 20.0);
        assert_eq!(config.list_timeout, Duration::from_secs(120));
        assert_eq!(config.extract_timeout, Duration::from_secs(7200));
    }

    #[test]
    fn test_validate_ok() {
        let dir = TempDir::new().unwrap();
        valid_config(&dir).validate().unwrap();
    }

    #[test]
    fn test_validate_missing_work_list() {
        let dir = TempDir::new().unwrap();
        let config = BatchConfig::new(dir.path().join("nope.txt"), dir.path(), dir.path());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WorkListNotFound(_))
        ));
    }

    #[test]
    fn test_validate_destination_is_file() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.destination = config.work_list.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DestinationNotDirectory(_))
        ));
    }

    #[test]
    fn test_validate_thresholds_and_timeouts() {
        let dir = TempDir::new().unwrap();

        let mut config = valid_config(&dir);
        config.guard.reserve_gb = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { name: "reserve_gb", .. })
        ));

        let mut config = valid_config(&dir);
        config.guard.min_free_gb = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = valid_config(&dir);
        config.extract_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }
}
