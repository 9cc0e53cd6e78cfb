//! Inline posting of review findings.
//!
//! The revision triple is computed once per run and reused for every
//! finding. A finding that cannot be anchored, or whose post is rejected, is
//! kept for the summary comment so nothing is lost.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::findings::{ReviewFinding, Severity};
use crate::platform::{DiffRefs, Platform};

/// What happened to a batch of findings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingSummary {
    pub total: usize,
    pub inline_posted: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Findings that must appear in the summary body, in input order.
    pub leftovers: Vec<ReviewFinding>,
}

impl PostingSummary {
    fn tally(findings: &[ReviewFinding]) -> BTreeMap<Severity, usize> {
        let mut by_severity = BTreeMap::new();
        for finding in findings {
            *by_severity.entry(finding.severity()).or_insert(0) += 1;
        }
        by_severity
    }

    /// Every finding goes to the summary.
    pub fn summary_only(findings: &[ReviewFinding]) -> Self {
        Self {
            total: findings.len(),
            inline_posted: 0,
            by_severity: Self::tally(findings),
            leftovers: findings.to_vec(),
        }
    }
}

/// Post each anchorable finding as an inline discussion on `mr_iid`.
/// With no `refs` nothing is posted inline.
pub async fn post_findings(
    platform: &dyn Platform,
    mr_iid: u64,
    refs: Option<&DiffRefs>,
    findings: &[ReviewFinding],
) -> PostingSummary {
    let Some(refs) = refs else {
        return PostingSummary::summary_only(findings);
    };

    let mut summary = PostingSummary {
        total: findings.len(),
        by_severity: PostingSummary::tally(findings),
        ..Default::default()
    };

    for finding in findings {
        let Some((path, line)) = finding.inline_anchor() else {
            debug!(title = finding.title(), "Finding has no valid anchor");
            summary.leftovers.push(finding.clone());
            continue;
        };
        let position = refs.at(path, line);
        match platform
            .post_inline_discussion(mr_iid, &position, &finding.to_comment())
            .await
        {
            Ok(()) => summary.inline_posted += 1,
            Err(e) => {
                warn!(path, line, error = %e, "Inline comment rejected");
                summary.leftovers.push(finding.clone());
            }
        }
    }

    info!(
        total = summary.total,
        inline = summary.inline_posted,
        leftovers = summary.leftovers.len(),
        "Findings posted"
    );
    summary
}
