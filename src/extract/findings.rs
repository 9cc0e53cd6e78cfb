//! Review findings parsing.

use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::repo::artifacts::REVIEW;
use crate::review::findings::{ReviewFinding, Severity};
use crate::util::{extract_json_array, extract_json_object};

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^```[ \t]*json[ \t]*\r?\n(.*?)^```[ \t]*$").unwrap());

/// Findings plus the reviewer's own summary, when it wrote one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewReport {
    pub findings: Vec<ReviewFinding>,
    pub summary: Option<String>,
}

/// Every object becomes a finding. One that does not read as a finding is
/// kept as a general finding carrying its raw JSON; a bare string is a
/// general finding titled with the text.
fn findings_from(items: &[Value]) -> Vec<ReviewFinding> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(_) => Some(serde_json::from_value(item.clone()).unwrap_or_else(|e| {
                warn!(error = %e, "Unreadable finding kept as raw text");
                ReviewFinding::new(Severity::default(), "", "Unreadable finding")
                    .with_description(item.to_string())
            })),
            Value::String(text) if !text.trim().is_empty() => {
                Some(ReviewFinding::new(Severity::default(), "", text.trim()))
            }
            other => {
                debug!(item = %other, "Ignoring non-finding item");
                None
            }
        })
        .collect()
}

fn report_from(value: Value) -> Option<ReviewReport> {
    match value {
        Value::Array(items) => Some(ReviewReport {
            findings: findings_from(&items),
            summary: None,
        }),
        Value::Object(map) => {
            let items = map.get("findings")?.as_array()?;
            Some(ReviewReport {
                findings: findings_from(items),
                summary: map
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            })
        }
        _ => None,
    }
}

/// Parse a findings array, or an object with a `findings` array, out of text
/// that may contain prose around it.
pub fn parse_report(text: &str) -> Option<ReviewReport> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && let Some(report) = report_from(value)
    {
        return Some(report);
    }

    let fenced: Vec<_> = JSON_FENCE.captures_iter(trimmed).collect();
    for caps in fenced.iter().rev() {
        if let Some(body) = caps.get(1)
            && let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim())
            && let Some(report) = report_from(value)
        {
            return Some(report);
        }
    }

    // Prose may contain brackets of its own, so try every opening position.
    trimmed
        .char_indices()
        .filter_map(|(i, c)| match c {
            '[' => extract_json_array(&trimmed[i..]),
            '{' => extract_json_object(&trimmed[i..]),
            _ => None,
        })
        .filter_map(|json| serde_json::from_str::<Value>(&json).ok())
        .find_map(report_from)
}

/// Read findings from the `review.json` artifact in `dir`, falling back to
/// the agent's output. `None` means no findings payload could be found.
pub fn read_findings(dir: &Path, output: &str) -> Option<ReviewReport> {
    let artifact = dir.join(REVIEW);
    if let Ok(content) = std::fs::read_to_string(&artifact) {
        debug!(path = %artifact.display(), "Reading review artifact");
        if let Some(report) = parse_report(&content) {
            return Some(report);
        }
        warn!(path = %artifact.display(), "Review artifact is not a findings payload");
    }
    parse_report(output)
}
