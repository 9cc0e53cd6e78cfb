//! Commit subject selection. Never fails: the default subject is the floor.

use std::path::Path;

use crate::repo::artifacts::COMMIT_MSG;

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(|line| line.trim().trim_matches('`').trim_matches('"').trim())
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Pick a commit subject: the `commit_msg.txt` artifact in `dir`, then the
/// first non-empty line of `output`, then `default`.
pub fn commit_subject(dir: &Path, output: Option<&str>, default: &str) -> String {
    std::fs::read_to_string(dir.join(COMMIT_MSG))
        .ok()
        .and_then(|content| first_line(&content))
        .or_else(|| output.and_then(first_line))
        .unwrap_or_else(|| default.to_string())
}
