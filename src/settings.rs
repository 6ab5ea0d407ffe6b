//! Settings file for unpackd
//!
//! Optional defaults in ~/.config/unpackd/settings.json. Command line flags
//! and environment variables override anything set here.

use crate::archive::sevenzip::{DEFAULT_EXTRACT_TIMEOUT, DEFAULT_LIST_TIMEOUT};
use crate::batch::BatchConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Work list file
    #[serde(default)]
    pub work_list: Option<PathBuf>,

    /// Extraction destination directory
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// Directory holding the progress log and completion ledger
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Progress log file (overrides the state_dir default)
    #[serde(default)]
    pub progress_log: Option<PathBuf>,

    /// Completion ledger file (overrides the state_dir default)
    #[serde(default)]
    pub ledger: Option<PathBuf>,

    /// Archiver binary (path or program name)
    #[serde(default)]
    pub archiver: Option<PathBuf>,

    #[serde(default)]
    pub min_free_gb: Option<f64>,

    #[serde(default)]
    pub reserve_gb: Option<f64>,

    #[serde(default)]
    pub list_timeout_secs: Option<u64>,

    #[serde(default)]
    pub extract_timeout_secs: Option<u64>,
}

impl Settings {
    /// Get the config directory path (~/.config/unpackd)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("unpackd");

        Ok(config_dir)
    }

    /// Default settings file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Default directory for the progress log and ledger
    /// (~/.local/share/unpackd)
    pub fn default_state_dir() -> Result<PathBuf> {
        Ok(dirs::data_local_dir()
            .context("Could not determine local data directory")?
            .join("unpackd"))
    }

    /// Load settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;

        Ok(settings)
    }

    /// Save settings to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Layer `overrides` on top of these settings; fields set there win.
    pub fn merged(self, overrides: Settings) -> Settings {
        Settings {
            work_list: overrides.work_list.or(self.work_list),
            destination: overrides.destination.or(self.destination),
            state_dir: overrides.state_dir.or(self.state_dir),
            progress_log: overrides.progress_log.or(self.progress_log),
            ledger: overrides.ledger.or(self.ledger),
            archiver: overrides.archiver.or(self.archiver),
            min_free_gb: overrides.min_free_gb.or(self.min_free_gb),
            reserve_gb: overrides.reserve_gb.or(self.reserve_gb),
            list_timeout_secs: overrides.list_timeout_secs.or(self.list_timeout_secs),
            extract_timeout_secs: overrides.extract_timeout_secs.or(self.extract_timeout_secs),
        }
    }

    /// Listing and extraction timeouts, falling back to the archiver defaults.
    pub fn timeouts(&self) -> (Duration, Duration) {
        (
            self.list_timeout_secs
                .map_or(DEFAULT_LIST_TIMEOUT, Duration::from_secs),
            self.extract_timeout_secs
                .map_or(DEFAULT_EXTRACT_TIMEOUT, Duration::from_secs),
        )
    }

    /// Build the batch configuration, filling gaps with built-in defaults.
    pub fn to_batch_config(&self) -> Result<BatchConfig> {
        let work_list = self
            .work_list
            .clone()
            .context("No work list configured (use --work-list or UNPACKD_WORK_LIST)")?;
        let destination = self
            .destination
            .clone()
            .context("No destination configured (use --dest or UNPACKD_DEST)")?;
        let state_dir = match &self.state_dir {
            Some(dir) => dir.clone(),
            None => Self::default_state_dir()?,
        };

        let mut config = BatchConfig::new(work_list, destination, state_dir);
        if let Some(path) = &self.progress_log {
            config.progress_log = path.clone();
        }
        if let Some(path) = &self.ledger {
            config.ledger = path.clone();
        }
        if let Some(gb) = self.min_free_gb {
            config.guard.min_free_gb = gb;
        }
        if let Some(gb) = self.reserve_gb {
            config.guard.reserve_gb = gb;
        }
        (config.list_timeout, config.extract_timeout) = self.timeouts();

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "destination": "/mnt/out", "min_free_gb": 10.5 }"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.destination, Some(PathBuf::from("/mnt/out")));
        assert_eq!(settings.min_free_gb, Some(10.5));
        assert_eq!(settings.work_list, None);
        assert_eq!(settings.extract_timeout_secs, None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/settings.json");
        let settings = Settings {
            work_list: Some(PathBuf::from("/zips/ziplist.txt")),
            reserve_gb: Some(5.0),
            ..Default::default()
        };

        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_merged_prefers_overrides() {
        let file = Settings {
            work_list: Some(PathBuf::from("/file/list.txt")),
            destination: Some(PathBuf::from("/file/out")),
            reserve_gb: Some(5.0),
            ..Default::default()
        };
        let cli = Settings {
            destination: Some(PathBuf::from("/cli/out")),
            ..Default::default()
        };

        let merged = file.merged(cli);
        assert_eq!(merged.work_list, Some(PathBuf::from("/file/list.txt")));
        assert_eq!(merged.destination, Some(PathBuf::from("/cli/out")));
        assert_eq!(merged.reserve_gb, Some(5.0));
    }

    #[test]
    fn test_to_batch_config() {
        let settings = Settings {
            work_list: Some(PathBuf::from("/zips/list.txt")),
            destination: Some(PathBuf::from("/mnt/out")),
            state_dir: Some(PathBuf::from("/var/lib/unpackd")),
            ledger: Some(PathBuf::from("/elsewhere/done.txt")),
            min_free_gb: Some(10.0),
            extract_timeout_secs: Some(60),
            ..Default::default()
        };

        let config = settings.to_batch_config().unwrap();
        assert_eq!(config.work_list, PathBuf::from("/zips/list.txt"));
        assert_eq!(
            config.progress_log,
            PathBuf::from("/var/lib/unpackd/unpack-progress.txt")
        );
        assert_eq!(config.ledger, PathBuf::from("/elsewhere/done.txt"));
        assert_eq!(config.guard.min_free_gb, 10.0);
        assert_eq!(config.guard.reserve_gb, 20.0);
        assert_eq!(config.extract_timeout, Duration::from_secs(60));
        assert_eq!(config.list_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(
            Settings::default().timeouts(),
            (DEFAULT_LIST_TIMEOUT, DEFAULT_EXTRACT_TIMEOUT)
        );

        // No work list or destination needed, as for `inspect`
        let file = Settings {
            list_timeout_secs: Some(30),
            ..Default::default()
        };
        let cli = Settings {
            list_timeout_secs: Some(5),
            ..Default::default()
        };
        let (list, extract) = file.merged(cli).timeouts();
        assert_eq!(list, Duration::from_secs(5));
        assert_eq!(extract, DEFAULT_EXTRACT_TIMEOUT);
    }

    #[test]
    fn test_to_batch_config_requires_paths() {
        let settings = Settings {
            destination: Some(PathBuf::from("/mnt/out")),
            ..Default::default()
        };
        let err = settings.to_batch_config().unwrap_err();
        assert!(err.to_string().contains("work list"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
