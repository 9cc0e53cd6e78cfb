//! Note and description bodies posted to the platform.

use crate::config::{IssueContext, MergeRequestContext};
use crate::errors::WorkflowError;
use crate::platform::ChangeRequest;
use crate::review::{PostingSummary, Severity};

/// Longest diagnostic excerpt attached to a failure note.
const MAX_DIAGNOSTIC_CHARS: usize = 4000;
/// Longest raw agent output posted as a review fallback.
const MAX_RAW_REVIEW_CHARS: usize = 60_000;

/// Keep the last `max` characters, where agents usually print the cause.
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let kept: String = text.chars().skip(count - max).collect();
    format!("…{}", kept)
}

fn head(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!("{}\n\n…(truncated)", kept)
}

fn mr_label(mr: &MergeRequestContext) -> String {
    match &mr.title {
        Some(title) => format!("!{} ({})", mr.iid, title),
        None => format!("!{}", mr.iid),
    }
}

pub fn ticket_ack(issue: &IssueContext) -> String {
    format!(
        "👀 Picked up **{}**. Planning the work now; a merge request will follow.",
        issue.title
    )
}

pub fn mr_description(issue: &IssueContext, checklist: &str) -> String {
    let mut body = format!("## Tasks\n\n{}\n\nCloses #{}", checklist, issue.iid);
    if let Some(url) = &issue.url {
        body.push_str(&format!("\n\nRequested in {}", url));
    }
    body
}

pub fn mr_opened(cr: &ChangeRequest, reused: bool) -> String {
    let verb = if reused { "Continuing in" } else { "Opened" };
    format!(
        "🛠️ {} merge request !{} on branch `{}`. Implementation in progress.\n\n{}",
        verb, cr.iid, cr.source_branch, cr.web_url
    )
}

pub fn ticket_completed(cr: &ChangeRequest, subject: &str, files: usize) -> String {
    format!(
        "✅ Implementation pushed to !{}: *{}* ({} file{} changed). Ready for review.\n\n{}",
        cr.iid,
        subject,
        files,
        if files == 1 { "" } else { "s" },
        cr.web_url
    )
}

pub fn note_ack(instruction: &str) -> String {
    format!("👀 On it:\n\n> {}", instruction.replace('\n', "\n> "))
}

pub fn note_completed(branch: &str, subject: &str, files: usize) -> String {
    format!(
        "✅ Pushed *{}* to `{}` ({} file{} changed).",
        subject,
        branch,
        files,
        if files == 1 { "" } else { "s" }
    )
}

pub fn no_changes_needed() -> String {
    "ℹ️ No changes were needed for this request; nothing was committed.".to_string()
}

pub fn review_ack(mr: &MergeRequestContext) -> String {
    format!("🔍 Reviewing {} now.", mr_label(mr))
}

pub fn no_diff(target: &str, source: &str) -> String {
    format!(
        "ℹ️ No changes found between `{}` and `{}`; nothing to review.",
        target, source
    )
}

/// Summary comment: counts, severity tally, the reviewer's own summary and
/// every finding that could not be placed inline.
pub fn review_summary(summary: &PostingSummary, reviewer_summary: Option<&str>) -> String {
    let mut body = String::from("## 🔍 Review summary\n\n");
    body.push_str(&format!(
        "**{}** finding{} total, **{}** posted inline.\n",
        summary.total,
        if summary.total == 1 { "" } else { "s" },
        summary.inline_posted
    ));

    if summary.total > 0 {
        body.push('\n');
        for severity in Severity::ALL {
            let count = summary.by_severity.get(&severity).copied().unwrap_or(0);
            body.push_str(&format!("- {} {}: {}\n", severity.emoji(), severity, count));
        }
    }

    if let Some(text) = reviewer_summary {
        body.push_str(&format!("\n{}\n", text.trim()));
    }

    if !summary.leftovers.is_empty() {
        body.push_str("\n### Findings not posted inline\n\n");
        for finding in &summary.leftovers {
            body.push_str(&format!("- {}\n", finding));
        }
    }

    if summary.total == 0 {
        body.push_str("\nNo issues found. 🎉\n");
    }
    body
}

/// Fallback when the reviewer produced no findings payload.
pub fn raw_review(output: &str) -> String {
    let text = output.trim();
    if text.is_empty() {
        return "## 🔍 Review summary\n\nThe reviewer produced no output.".to_string();
    }
    format!(
        "## 🔍 Review summary\n\n{}",
        head(text, MAX_RAW_REVIEW_CHARS)
    )
}

pub fn failure(err: &WorkflowError) -> String {
    let mut body = format!("❌ The automated run failed: {}", err);
    if let Some(diagnostics) = err.diagnostics().map(str::trim).filter(|d| !d.is_empty()) {
        body.push_str(&format!(
            "\n\n<details><summary>Diagnostics</summary>\n\n```\n{}\n```\n</details>",
            tail(diagnostics, MAX_DIAGNOSTIC_CHARS)
        ));
    }
    body
}
