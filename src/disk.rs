//! Free-space checks for the extraction target.
//!
//! All sizes in this crate are binary gigabytes (1 GB = 1024^3 bytes).
//! Free space means space available to unprivileged users (`f_bavail`),
//! not the total free block count.

use std::io;
use std::path::{Path, PathBuf};

/// Bytes per (binary) gigabyte.
pub const BYTES_PER_GB: u64 = 1 << 30;

/// Convert a byte count to binary gigabytes.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB as f64
}

/// Source of free-space samples.
pub trait SpaceProbe {
    /// Bytes available to the current user on the filesystem holding `dir`.
    fn free_bytes(&self, dir: &Path) -> io::Result<u64>;

    fn free_gb(&self, dir: &Path) -> io::Result<f64> {
        self.free_bytes(dir).map(bytes_to_gb)
    }
}

/// Probe backed by the OS free-space query (`statvfs(3)` on unix).
///
/// If `dir` does not exist yet, the nearest existing ancestor is sampled
/// instead; that is the filesystem the directory will be created on.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

impl SpaceProbe for StatvfsProbe {
    fn free_bytes(&self, dir: &Path) -> io::Result<u64> {
        let target = nearest_existing(dir).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no existing ancestor for {}", dir.display()),
            )
        })?;
        available_bytes(&target)
    }
}

/// Walk up from `path` until something exists.
fn nearest_existing(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
        .or_else(|| path.is_relative().then(|| PathBuf::from(".")))
}

fn available_bytes(path: &Path) -> io::Result<u64> {
    fs2::available_space(path)
}

/// Space policy violations. Both abort the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpaceError {
    #[error("Disk space critically low: {free_gb:.1} GB free, need at least {min_free_gb:.1} GB. Stopping.")]
    CriticalLow { free_gb: f64, min_free_gb: f64 },

    #[error("Not enough space: need ~{need_gb:.1} GB (+{reserve_gb:.1} GB reserve), have {free_gb:.1} GB. Stopping.")]
    InsufficientPredicted {
        need_gb: f64,
        free_gb: f64,
        reserve_gb: f64,
    },
}

/// Headroom policy applied before each extraction.
///
/// Both comparisons are strict, so exact equality proceeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceGuard {
    /// Abort when free space drops below this
    pub min_free_gb: f64,
    /// Space that must remain after the predicted extraction footprint
    pub reserve_gb: f64,
}

impl Default for SpaceGuard {
    fn default() -> Self {
        Self {
            min_free_gb: 50.0,
            reserve_gb: 20.0,
        }
    }
}

impl SpaceGuard {
    /// Minimum free space rule, checked before every archive.
    pub fn check_free(&self, free_gb: f64) -> Result<(), SpaceError> {
        if free_gb < self.min_free_gb {
            return Err(SpaceError::CriticalLow {
                free_gb,
                min_free_gb: self.min_free_gb,
            });
        }
        Ok(())
    }

    /// Predicted footprint rule, checked when the uncompressed size is known.
    pub fn check_predicted(&self, need_gb: f64, free_gb: f64) -> Result<(), SpaceError> {
        if need_gb > free_gb - self.reserve_gb {
            return Err(SpaceError::InsufficientPredicted {
                need_gb,
                free_gb,
                reserve_gb: self.reserve_gb,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bytes_to_gb_is_binary() {
        assert_eq!(bytes_to_gb(BYTES_PER_GB), 1.0);
        assert_eq!(bytes_to_gb(50 * BYTES_PER_GB), 50.0);
        assert!(bytes_to_gb(1_000_000_000) < 1.0);
    }

    #[test]
    fn test_min_free_boundary() {
        let guard = SpaceGuard::default();
        assert!(matches!(
            guard.check_free(49.9),
            Err(SpaceError::CriticalLow { .. })
        ));
        assert!(guard.check_free(50.1).is_ok());
        // Equality proceeds
        assert!(guard.check_free(50.0).is_ok());
    }

    #[test]
    fn test_predicted_boundary() {
        let guard = SpaceGuard::default();
        assert!(matches!(
            guard.check_predicted(31.0, 50.0),
            Err(SpaceError::InsufficientPredicted { .. })
        ));
        assert!(guard.check_predicted(29.0, 50.0).is_ok());
        // Equality proceeds
        assert!(guard.check_predicted(30.0, 50.0).is_ok());
    }

    #[test]
    fn test_error_messages() {
        let err = SpaceGuard::default().check_free(12.34).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Disk space critically low: 12.3 GB free, need at least 50.0 GB. Stopping."
        );
    }

    #[test]
    fn test_nearest_existing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("a/b/c");
        assert_eq!(nearest_existing(&missing).unwrap(), dir.path());
        assert_eq!(nearest_existing(dir.path()).unwrap(), dir.path());
    }

    #[test]
    fn test_statvfs_probe() {
        let dir = tempdir().unwrap();
        let probe = StatvfsProbe;

        let existing = probe.free_bytes(dir.path()).unwrap();
        let pending = probe.free_bytes(&dir.path().join("not/yet/created")).unwrap();

        // Same filesystem, samples taken back to back
        assert!(existing > 0);
        let diff = existing.abs_diff(pending);
        assert!(diff < 64 * 1024 * 1024, "samples differ by {diff} bytes");
    }
}
