//! Completion ledger.
//!
//! Append-only text file, one archive identifier per line. An identifier is
//! recorded only after its archive was extracted AND the source deleted, so
//! anything in here never needs processing again.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompletionLedger {
    path: PathBuf,
}

impl CompletionLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every completed identifier.
    ///
    /// A missing file is a first run and yields an empty set. Lines are
    /// trimmed and blank lines ignored; duplicates collapse.
    pub fn load(&self) -> io::Result<HashSet<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e),
        };

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Append `id`, creating the file if needed, and flush it to disk.
    ///
    /// A last line without its newline (torn write, hand edit) is terminated
    /// first so `id` never merges into it.
    pub fn mark_completed(&self, id: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }

        writeln!(file, "{}", id)?;
        file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = CompletionLedger::new(dir.path().join("completed.txt"));
        assert!(ledger.load().unwrap().is_empty());
        // Loading does not create the file
        assert!(!ledger.path().exists());
    }

    #[test]
    fn test_mark_and_load() {
        let dir = TempDir::new().unwrap();
        let ledger = CompletionLedger::new(dir.path().join("completed.txt"));

        ledger.mark_completed("/zips/a.zip").unwrap();
        ledger.mark_completed("/zips/b.zip").unwrap();

        let done = ledger.load().unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains("/zips/a.zip"));
        assert!(done.contains("/zips/b.zip"));

        let raw = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(raw, "/zips/a.zip\n/zips/b.zip\n");
    }

    #[test]
    fn test_duplicates_and_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("completed.txt");
        fs::write(&path, "  /zips/a.zip  \n\n/zips/a.zip\n\t\n/zips/c.zip").unwrap();

        let ledger = CompletionLedger::new(&path);
        ledger.mark_completed("/zips/c.zip").unwrap();

        let done = ledger.load().unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains("/zips/a.zip"));
        assert!(done.contains("/zips/c.zip"));
    }

    #[test]
    fn test_unterminated_last_line_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("completed.txt");
        fs::write(&path, "/zips/a.zip").unwrap();

        let ledger = CompletionLedger::new(&path);
        ledger.mark_completed("/zips/b.zip").unwrap();

        let done = ledger.load().unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains("/zips/a.zip"));
        assert!(done.contains("/zips/b.zip"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "/zips/a.zip\n/zips/b.zip\n");
    }

    #[test]
    fn test_only_grows() {
        let dir = TempDir::new().unwrap();
        let ledger = CompletionLedger::new(dir.path().join("completed.txt"));

        let mut previous = 0;
        for id in ["/z/1.zip", "/z/2.zip", "/z/1.zip", "/z/3.zip"] {
            ledger.mark_completed(id).unwrap();
            let len = fs::metadata(ledger.path()).unwrap().len();
            assert!(len > previous);
            previous = len;
        }
        assert_eq!(ledger.load().unwrap().len(), 3);
    }
}
