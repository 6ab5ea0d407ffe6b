//! Human-readable progress log.
//!
//! Every line is `[YYYY-MM-DD HH:MM:SS] message`, appended to the log file
//! and echoed to stdout. The program never reads this file back.

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Timestamp layout used on every line.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct ProgressLog {
    path: PathBuf,
    echo: bool,
}

impl ProgressLog {
    /// Log to `path`, echoing each line to stdout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            echo: true,
        }
    }

    /// Log to `path` only.
    pub fn file_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            echo: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line.
    ///
    /// The file is opened per call so every line hits disk before the next
    /// step runs.
    pub fn log(&self, message: impl AsRef<str>) -> io::Result<()> {
        let line = format_line(Local::now(), message.as_ref());

        if self.echo {
            println!("{}", line);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

fn format_line(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {}", at.format(TIMESTAMP_FORMAT), message)
}
