//! Normalize captured terminal output before parsing.

use regex::Regex;
use std::sync::LazyLock;

// CSI sequences (colors, cursor movement), OSC sequences (titles, hyperlinks)
// and the remaining two-byte escapes.
static ANSI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").unwrap()
});

/// Strip escape sequences and carriage-return redraws.
///
/// A line redrawn with bare `\r` (spinners, progress bars) keeps only what
/// was written last. Other control characters are dropped except tab and
/// newline.
pub fn clean_output(raw: &str) -> String {
    let stripped = ANSI_REGEX.replace_all(raw, "");
    let normalized = stripped.replace("\r\n", "\n");

    normalized
        .split('\n')
        .map(|line| {
            let visible = line
                .rsplit('\r')
                .find(|segment| !segment.is_empty())
                .unwrap_or("");
            visible
                .chars()
                .filter(|c| *c == '\t' || !c.is_control())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
