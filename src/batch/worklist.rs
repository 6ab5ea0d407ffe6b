//! Work list loading and resume-set computation.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Read the work list: one archive path per non-blank line, trimmed.
pub fn load_work_list(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Items of `work` not yet in `completed`, in work-list order.
pub fn remaining<'a>(work: &'a [String], completed: &HashSet<String>) -> Vec<&'a str> {
    work.iter()
        .filter(|item| !completed.contains(item.as_str()))
        .map(String::as_str)
        .collect()
}
