//! Resumable batch extraction
//!
//! Processes the work list strictly one archive at a time:
//! 1. Skip     - archive no longer on disk (non-fatal)
//! 2. Space    - free space above the minimum, else abort
//! 3. Inspect  - read archive summary; abort if it would not fit
//! 4. Extract  - run the archiver, abort on any failure
//! 5. Delete   - remove the source archive, abort on failure
//! 6. Record   - append to the completion ledger
//!
//! Any error aborts the whole run; nothing is retried or rolled back. A
//! later run resumes after the last recorded archive.
//!
//! Only one process may use a given ledger and work list at a time. Two
//! concurrent runs can process the same archive twice and interleave
//! ledger writes.

pub mod config;
pub mod ledger;
pub mod worklist;

pub use config::{BatchConfig, ConfigError};
pub use ledger::CompletionLedger;
pub use worklist::{load_work_list, remaining};

use crate::archive::{ArchiveError, Archiver};
use crate::disk::{bytes_to_gb, SpaceError, SpaceProbe};
use crate::progress_log::ProgressLog;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Errors that abort a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to read work list {}: {source}", path.display())]
    WorkList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Completion ledger {} I/O failed: {source}", path.display())]
    Ledger {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write progress log {}: {source}", path.display())]
    ProgressLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to query free space for {}: {source}", path.display())]
    FreeSpace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read size of {}: {source}", path.display())]
    SourceMetadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{archive}: {source}")]
    Space {
        archive: String,
        #[source]
        source: SpaceError,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to delete {} after extraction: {source}", path.display())]
    Deletion {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of one work item that did not abort the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Source archive was not on disk
    Skipped,
    /// Extracted, deleted and recorded
    Extracted { archive_bytes: u64 },
}

/// Run statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Entries in the work list
    pub total: usize,
    /// Identifiers already in the ledger at start
    pub already_done: usize,
    /// Work items left at start
    pub remaining: usize,
    pub extracted: usize,
    pub skipped_missing: usize,
    /// Compressed bytes of the archives extracted this run
    pub bytes_extracted: u64,
}

/// Read-only snapshot of a batch, see [`status`]
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
    /// Remaining items whose archive is gone from disk
    pub missing: usize,
    /// `None` if the free-space query failed
    pub free_gb: Option<f64>,
}

/// Sequential batch controller
pub struct BatchRunner<A, P> {
    config: BatchConfig,
    archiver: A,
    probe: P,
    ledger: CompletionLedger,
    log: ProgressLog,
}

impl<A: Archiver, P: SpaceProbe> BatchRunner<A, P> {
    pub fn new(config: BatchConfig, archiver: A, probe: P) -> Self {
        let ledger = CompletionLedger::new(&config.ledger);
        let log = ProgressLog::new(&config.progress_log);
        Self {
            config,
            archiver,
            probe,
            ledger,
            log,
        }
    }

    /// Replace the progress log (e.g. to disable stdout echo)
    pub fn with_progress_log(mut self, log: ProgressLog) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every remaining archive, stopping at the first fatal error.
    ///
    /// The error is written to the progress log before it is returned.
    pub async fn run(&self) -> Result<RunStats, RunError> {
        let result = self.run_all().await;

        if let Err(e) = &result {
            if let Err(log_err) = self.log.log(format!("FATAL: {}", e)) {
                warn!("Could not record fatal error in progress log: {}", log_err);
            }
        }

        result
    }

    async fn run_all(&self) -> Result<RunStats, RunError> {
        let work = load_work_list(&self.config.work_list).map_err(|source| RunError::WorkList {
            path: self.config.work_list.clone(),
            source,
        })?;
        let completed = self.ledger.load().map_err(|source| self.ledger_error(source))?;
        let todo = remaining(&work, &completed);

        let mut stats = RunStats {
            total: work.len(),
            already_done: completed.len(),
            remaining: todo.len(),
            ..Default::default()
        };

        self.note("=== UNPACKD STARTED ===")?;
        self.note(format!(
            "Total in list: {}, Already done: {}, Remaining: {}",
            stats.total, stats.already_done, stats.remaining
        ))?;

        for (i, id) in todo.iter().enumerate() {
            let position = format!("[{}/{}]", i + 1, todo.len());
            match self.process_item(&position, id).await? {
                ItemOutcome::Skipped => stats.skipped_missing += 1,
                ItemOutcome::Extracted { archive_bytes } => {
                    stats.extracted += 1;
                    stats.bytes_extracted += archive_bytes;
                }
            }
        }

        self.note(format!(
            "=== ALL DONE === Extracted: {}, Skipped: {}, {:.2} GB processed",
            stats.extracted,
            stats.skipped_missing,
            bytes_to_gb(stats.bytes_extracted)
        ))?;

        Ok(stats)
    }

    /// Run one work item through skip check, guards, extraction, deletion
    /// and recording.
    async fn process_item(&self, position: &str, id: &str) -> Result<ItemOutcome, RunError> {
        let archive = Path::new(id);

        if !archive.exists() {
            self.note(format!("{} SKIP (not found): {}", position, id))?;
            return Ok(ItemOutcome::Skipped);
        }

        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| id.to_string());

        let free_gb = self.free_gb()?;
        let archive_bytes = fs::metadata(archive)
            .map_err(|source| RunError::SourceMetadata {
                path: archive.to_path_buf(),
                source,
            })?
            .len();
        let archive_gb = bytes_to_gb(archive_bytes);

        self.note(format!(
            "{} {} ({:.2} GB) | Free: {:.1} GB",
            position, name, archive_gb, free_gb
        ))?;

        let guard = self.config.guard;
        guard
            .check_free(free_gb)
            .map_err(|source| space_error(&name, source))?;

        match self.archiver.inspect(archive).await? {
            Some(summary) => {
                let need_gb = bytes_to_gb(summary.uncompressed_bytes);
                self.note(format!(
                    "  Info: {} files, {:.2} GB uncompressed, ratio {:.1}x",
                    summary.file_count,
                    need_gb,
                    summary.ratio()
                ))?;
                guard
                    .check_predicted(need_gb, free_gb)
                    .map_err(|source| space_error(&name, source))?;
            }
            None => {
                debug!("No summary for {}, predicted-space check disabled", id);
                self.note("  Info: unavailable, skipping size check")?;
            }
        }

        self.note("  Extracting...")?;
        let spinner = extraction_spinner(&name);
        let result = self.archiver.extract(archive, &self.config.destination).await;
        spinner.finish_and_clear();

        let elapsed = match result {
            Ok(elapsed) => elapsed,
            Err(err) => {
                if let ArchiveError::Failed {
                    tool,
                    stderr,
                    stdout_tail,
                    ..
                } = &err
                {
                    self.note(format!("  {} STDERR: {}", tool, stderr))?;
                    self.note(format!("  {} STDOUT: {}", tool, stdout_tail))?;
                }
                return Err(err.into());
            }
        };

        self.note(format!(
            "  Done in {:.0}s ({:.2} GB/min)",
            elapsed.as_secs_f64(),
            throughput_gb_per_min(archive_gb, elapsed)
        ))?;

        // The ledger entry must never exist while the source is still on disk
        fs::remove_file(archive).map_err(|source| RunError::Deletion {
            path: archive.to_path_buf(),
            source,
        })?;
        self.note(format!("  Deleted {}", name))?;

        self.ledger
            .mark_completed(id)
            .map_err(|source| self.ledger_error(source))?;

        // Informational only; the item is already recorded
        match self.probe.free_gb(&self.config.destination) {
            Ok(gb) => self.note(format!("  Free space: {:.1} GB", gb))?,
            Err(e) => {
                warn!("Free space query failed after {}: {}", name, e);
                self.note("  Free space: unknown")?;
            }
        }

        Ok(ItemOutcome::Extracted { archive_bytes })
    }

    fn free_gb(&self) -> Result<f64, RunError> {
        self.probe
            .free_gb(&self.config.destination)
            .map_err(|source| RunError::FreeSpace {
                path: self.config.destination.clone(),
                source,
            })
    }

    fn note(&self, message: impl AsRef<str>) -> Result<(), RunError> {
        self.log.log(message).map_err(|source| RunError::ProgressLog {
            path: self.log.path().to_path_buf(),
            source,
        })
    }

    fn ledger_error(&self, source: io::Error) -> RunError {
        RunError::Ledger {
            path: self.ledger.path().to_path_buf(),
            source,
        }
    }
}

/// Snapshot of a batch without touching anything.
pub fn status<P: SpaceProbe>(config: &BatchConfig, probe: &P) -> Result<StatusReport, RunError> {
    let work = load_work_list(&config.work_list).map_err(|source| RunError::WorkList {
        path: config.work_list.clone(),
        source,
    })?;
    let completed = CompletionLedger::new(&config.ledger)
        .load()
        .map_err(|source| RunError::Ledger {
            path: config.ledger.clone(),
            source,
        })?;
    let todo = remaining(&work, &completed);
    let missing = todo.iter().filter(|id| !Path::new(id).exists()).count();

    let free_gb = match probe.free_gb(&config.destination) {
        Ok(gb) => Some(gb),
        Err(e) => {
            warn!(
                "Free space query failed for {}: {}",
                config.destination.display(),
                e
            );
            None
        }
    };

    Ok(StatusReport {
        total: work.len(),
        completed: work.len() - todo.len(),
        remaining: todo.len(),
        missing,
        free_gb,
    })
}

fn space_error(archive: &str, source: SpaceError) -> RunError {
    RunError::Space {
        archive: archive.to_string(),
        source,
    }
}

/// Compressed GB per minute, 0.0 for a zero elapsed time.
fn throughput_gb_per_min(archive_gb: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        archive_gb / (secs / 60.0)
    } else {
        0.0
    }
}

/// Spinner on stderr while the archiver runs; hidden when not a terminal.
fn extraction_spinner(name: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Extracting {}", name));
    pb
}
