//! Review workflow: diff a merge request, have the agent review it, post
//! findings inline where possible and a summary note.

use tracing::info;

use super::prompts;
use super::{Completion, Context, Step, conclude};
use crate::agent::AgentRequest;
use crate::config::MergeRequestContext;
use crate::errors::WorkflowError;
use crate::extract::read_findings;
use crate::messages;
use crate::notifier::Notifier;
use crate::platform::{DiffRefs, NoteTarget};
use crate::repo::Workspace;
use crate::review::{PostingSummary, post_findings};

pub async fn run(
    ctx: &Context<'_>,
    mr: &MergeRequestContext,
    focus: Option<&str>,
) -> Result<Completion, WorkflowError> {
    let notifier = Notifier::new(ctx.platform);
    let target = NoteTarget::MergeRequest(mr.iid);
    let acknowledged = notifier.notify(target, &messages::review_ack(mr)).await;
    let result = pipeline(ctx, mr, focus, &notifier).await;
    conclude(&notifier, target, acknowledged, result).await
}

async fn pipeline(
    ctx: &Context<'_>,
    mr: &MergeRequestContext,
    focus: Option<&str>,
    notifier: &Notifier<'_>,
) -> Result<Completion, WorkflowError> {
    let mut warnings = Vec::new();
    let target = NoteTarget::MergeRequest(mr.iid);

    let mut ws = ctx.acquire()?;
    ws.checkout_existing(&mr.source_branch)?;
    let diff = step!(warnings, collect_diff(ctx, &ws, mr, notifier).await);

    let prompt = prompts::review(
        mr.iid,
        mr.title.as_deref(),
        &ctx.settings.target_branch,
        &mr.source_branch,
        &diff,
        focus,
    );
    let output = ctx
        .agent
        .invoke(&AgentRequest::long(&prompt).read_only(), ws.root())
        .await
        .map_err(|e| WorkflowError::agent("review", e))?;

    let Some(report) = read_findings(ws.root(), &output.cleaned) else {
        info!("Reviewer produced no findings payload; posting raw output");
        notifier
            .notify(target, &messages::raw_review(&output.cleaned))
            .await;
        return Ok(Completion::completed("Posted unstructured review", warnings));
    };

    let summary = if ctx.settings.inline_review {
        let refs = step!(warnings, revision_refs(ctx, &ws, mr));
        post_findings(ctx.platform, mr.iid, refs.as_ref(), &report.findings).await
    } else {
        PostingSummary::summary_only(&report.findings)
    };

    notifier
        .notify(
            target,
            &messages::review_summary(&summary, report.summary.as_deref()),
        )
        .await;
    Ok(Completion::completed(
        format!(
            "{} findings, {} posted inline",
            summary.total, summary.inline_posted
        ),
        warnings,
    ))
}

/// The source branch's changes since it forked from the target. An empty
/// diff ends the run.
async fn collect_diff(
    ctx: &Context<'_>,
    ws: &Workspace,
    mr: &MergeRequestContext,
    notifier: &Notifier<'_>,
) -> Result<Step<String>, WorkflowError> {
    let target = &ctx.settings.target_branch;
    let diff = ws.review_diff(target, &mr.source_branch)?;
    if diff.trim().is_empty() {
        notifier
            .notify(
                NoteTarget::MergeRequest(mr.iid),
                &messages::no_diff(target, &mr.source_branch),
            )
            .await;
        return Ok(Step::Stop(Completion::NothingToDo(
            "Nothing to review".to_string(),
        )));
    }
    info!(bytes = diff.len(), "Review diff collected");
    Ok(Step::Continue(diff))
}

/// Without the revision triple every finding goes to the summary.
fn revision_refs(
    ctx: &Context<'_>,
    ws: &Workspace,
    mr: &MergeRequestContext,
) -> Result<Step<Option<DiffRefs>>, WorkflowError> {
    match ws.diff_refs(&ctx.settings.target_branch, &mr.source_branch) {
        Ok(refs) => Ok(Step::Continue(Some(refs))),
        Err(e) => Ok(Step::Warn(
            None,
            format!("Inline comments disabled, revision lookup failed: {}", e),
        )),
    }
}
