//! Unified diff extraction from agent output.

use regex::Regex;
use std::sync::LazyLock;

static DIFF_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^```[ \t]*(?:diff|patch)[ \t]*\r?\n(.*?)^```[ \t]*$").unwrap()
});

/// The body of the last fenced block tagged `diff` or `patch`, or `None` when
/// the agent emitted no such block (it likely edited the tree directly).
pub fn extract_patch(output: &str) -> Option<String> {
    let body = DIFF_FENCE
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .last()?
        .as_str();
    if body.trim().is_empty() {
        return None;
    }
    let mut patch = body.to_string();
    if !patch.ends_with('\n') {
        patch.push('\n');
    }
    Some(patch)
}
