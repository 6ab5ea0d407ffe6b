//! 7z binary integration.
//!
//! Both operations shell out to the `7zz`/`7z` binary:
//!
//! - List: `7z l archive.zip`
//!   - the last summary line looks like
//!     `2024-01-01 12:00:00   1234567   654321  42 files`
//!   - columns before the `files` marker: uncompressed, compressed, count
//!
//! - Extract all: `7z x archive.zip -o/output/dir -y -bsp0`
//!   - `-o{dir}`: Output directory
//!   - `-y`: Yes to all prompts (overwrite)
//!   - `-bsp0`: No per-file progress output
//!
//! Every call runs under a hard timeout. When the timeout fires the child is
//! killed and the call fails with [`ArchiveError::TimedOut`].

use super::{ArchiveError, ArchiveSummary, Archiver};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Default timeout for `7z l`.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for `7z x` (2h max per archive).
pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Marker word ending the listing summary line.
const SUMMARY_MARKER: &str = "files";

/// Characters of stdout kept for diagnostics on failure.
const STDOUT_TAIL_CHARS: usize = 500;

/// Archiver backed by the 7z command line tool.
#[derive(Debug, Clone)]
pub struct SevenZip {
    binary: PathBuf,
    list_timeout: Duration,
    extract_timeout: Duration,
}

impl SevenZip {
    /// Use a specific binary with the default timeouts.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            list_timeout: DEFAULT_LIST_TIMEOUT,
            extract_timeout: DEFAULT_EXTRACT_TIMEOUT,
        }
    }

    /// Find the 7z binary (see [`locate_binary`]) and wrap it.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ArchiveError> {
        Ok(Self::new(locate_binary(explicit)?))
    }

    pub fn with_timeouts(mut self, list: Duration, extract: Duration) -> Self {
        self.list_timeout = list;
        self.extract_timeout = extract;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Short name used in log lines and errors ("7z", "7zz", ...).
    fn tool_name(&self) -> String {
        self.binary
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "7z".to_string())
    }

    /// Run a prepared command to completion under `limit`.
    async fn run(
        &self,
        mut cmd: Command,
        operation: &'static str,
        archive: &Path,
        limit: Duration,
    ) -> Result<Output, ArchiveError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {:?}", cmd.as_std());

        match tokio::time::timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(ArchiveError::Spawn {
                tool: self.tool_name(),
                archive: archive.to_path_buf(),
                source,
            }),
            // Dropping the output future kills the child (kill_on_drop)
            Err(_) => Err(ArchiveError::TimedOut {
                tool: self.tool_name(),
                operation,
                archive: archive.to_path_buf(),
                limit,
            }),
        }
    }
}

impl Archiver for SevenZip {
    async fn inspect(&self, archive: &Path) -> Result<Option<ArchiveSummary>, ArchiveError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("l").arg(archive);

        let output = self.run(cmd, "list", archive, self.list_timeout).await?;

        if !output.status.success() {
            // Not fatal: whatever made it to stdout is still worth a parse attempt
            debug!(
                "{} list exited with {:?} on {}",
                self.tool_name(),
                output.status.code(),
                archive.display()
            );
        }

        Ok(parse_list_summary(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn extract(&self, archive: &Path, destination: &Path) -> Result<Duration, ArchiveError> {
        std::fs::create_dir_all(destination).map_err(|source| ArchiveError::Destination {
            path: destination.to_path_buf(),
            source,
        })?;

        let mut output_arg = OsString::from("-o");
        output_arg.push(destination.as_os_str());

        let mut cmd = Command::new(&self.binary);
        cmd.arg("x")            // Extract with full paths
            .arg(archive)
            .arg(output_arg)    // Output directory
            .arg("-y")          // Yes to all prompts
            .arg("-bsp0");      // No progress output

        let start = Instant::now();
        let output = self.run(cmd, "extract", archive, self.extract_timeout).await?;
        let elapsed = start.elapsed();

        if !output.status.success() {
            return Err(ArchiveError::Failed {
                tool: self.tool_name(),
                archive: archive.to_path_buf(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                stdout_tail: tail_chars(
                    String::from_utf8_lossy(&output.stdout).trim(),
                    STDOUT_TAIL_CHARS,
                )
                .to_string(),
            });
        }

        Ok(elapsed)
    }
}

/// Get the path to the 7z binary.
///
/// Looks in the following locations:
/// 1. `explicit`, either a path or a program name on PATH
/// 2. `bin/7zz` or `7zz` relative to the executable
/// 3. System PATH (`7zz`, `7z`, `7za`)
pub fn locate_binary(explicit: Option<&Path>) -> Result<PathBuf, ArchiveError> {
    if let Some(explicit) = explicit {
        if explicit.is_file() {
            return Ok(explicit.to_path_buf());
        }
        return which::which(explicit)
            .map_err(|_| ArchiveError::NotFound(explicit.display().to_string()));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            for candidate in ["bin/7zz", "7zz"] {
                let bin_path = exe_dir.join(candidate);
                if bin_path.is_file() {
                    return Ok(bin_path);
                }
            }
        }
    }

    for name in ["7zz", "7z", "7za"] {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    Err(ArchiveError::NotFound(
        "no 7zz/7z/7za on PATH; install p7zip or pass --archiver".to_string(),
    ))
}

/// Parse the summary line out of `7z l` output.
///
/// Uses the last line whose final token is `files` (a trailing
/// `, N folders` clause is dropped first). The three tokens before the
/// marker are uncompressed size, compressed size and file count. Returns
/// `None` if there is no such line or a field is not an integer.
///
/// Because of the comma stripping, a line such as `100 50 3 files, 2 folders`
/// counts as a summary even though it does not literally end in `files`.
pub fn parse_list_summary(output: &str) -> Option<ArchiveSummary> {
    let line = output
        .lines()
        .rev()
        .map(|line| line.split_once(',').map_or(line, |(head, _)| head))
        .find(|line| line.split_whitespace().last() == Some(SUMMARY_MARKER))?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let n = tokens.len();
    if n < 4 {
        return None;
    }

    Some(ArchiveSummary {
        uncompressed_bytes: tokens[n - 4].parse().ok()?,
        compressed_bytes: tokens[n - 3].parse().ok()?,
        file_count: tokens[n - 2].parse().ok()?,
    })
}

/// Last `max` characters of `text`, respecting char boundaries.
fn tail_chars(text: &str, max: usize) -> &str {
    match text.char_indices().rev().nth(max.saturating_sub(1)) {
        Some((idx, _)) if max > 0 => &text[idx..],
        Some(_) => "",
        None => text,
    }
}
