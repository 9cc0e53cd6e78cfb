//! Ticket workflow: issue → plan → branch and merge request → implementation
//! → finalized merge request.

use tracing::info;

use super::implement::{Implementation, implement};
use super::prompts::{self, Assignment};
use super::{Completion, Context, Step, conclude};
use crate::agent::AgentRequest;
use crate::config::IssueContext;
use crate::errors::{RepoError, WorkflowError};
use crate::extract::{WorkPlan, read_plan};
use crate::messages;
use crate::notifier::Notifier;
use crate::platform::{ChangeRequest, NewChangeRequest, NoteTarget, Outcome};
use crate::repo::artifacts::{PLAN, TODO, TODO_COMPLETED};
use crate::repo::checklist;

pub async fn run(ctx: &Context<'_>, issue: &IssueContext) -> Result<Completion, WorkflowError> {
    let notifier = Notifier::new(ctx.platform);
    let target = NoteTarget::Issue(issue.iid);
    let acknowledged = notifier.notify(target, &messages::ticket_ack(issue)).await;
    let result = pipeline(ctx, issue, &notifier).await;
    conclude(&notifier, target, acknowledged, result).await
}

async fn pipeline(
    ctx: &Context<'_>,
    issue: &IssueContext,
    notifier: &Notifier<'_>,
) -> Result<Completion, WorkflowError> {
    let mut warnings = Vec::new();
    let plan = step!(warnings, plan(ctx, issue).await);
    let cr = step!(warnings, open_change_request(ctx, issue, &plan, notifier).await);
    let (done, completed) = step!(warnings, implement_plan(ctx, &plan).await);
    step!(warnings, finalize(ctx, issue, &cr, &done, &completed, notifier).await);

    Ok(Completion::completed(
        format!("!{} updated with \"{}\"", cr.iid, done.subject),
        warnings,
    ))
}

/// Ask the agent for a plan in the scratch directory, before any clone. A
/// plan left behind by an earlier failed run is discarded first.
async fn plan(ctx: &Context<'_>, issue: &IssueContext) -> Result<Step<WorkPlan>, WorkflowError> {
    let stale = ctx.work_dir.join(PLAN);
    if stale.exists() {
        std::fs::remove_file(&stale).map_err(|source| RepoError::Io {
            path: stale.clone(),
            source,
        })?;
    }

    let prompt = prompts::plan(issue, &ctx.settings.target_branch);
    let output = ctx
        .agent
        .invoke(&AgentRequest::long(&prompt), ctx.work_dir)
        .await
        .map_err(|e| WorkflowError::agent("planning", e))?;
    let plan = read_plan(ctx.work_dir, &output.cleaned)?;
    info!(branch = %plan.branch, tasks = plan.todo.len(), "Plan accepted");
    Ok(Step::Continue(plan))
}

/// Create (or reuse) the working branch and its merge request.
async fn open_change_request(
    ctx: &Context<'_>,
    issue: &IssueContext,
    plan: &WorkPlan,
    notifier: &Notifier<'_>,
) -> Result<Step<ChangeRequest>, WorkflowError> {
    let target = &ctx.settings.target_branch;
    ctx.platform
        .ensure_branch(&plan.branch, target)
        .await
        .map_err(WorkflowError::ChangeRequest)?;

    let description = messages::mr_description(issue, &plan.checklist());
    let (outcome, cr) = ctx
        .platform
        .create_change_request(&NewChangeRequest {
            source_branch: &plan.branch,
            target_branch: target,
            title: &issue.title,
            description: &description,
        })
        .await
        .map_err(WorkflowError::ChangeRequest)?;

    let reused = matches!(outcome, Outcome::Exists);
    info!(iid = cr.iid, reused, "Merge request ready");
    notifier
        .notify(NoteTarget::Issue(issue.iid), &messages::mr_opened(&cr, reused))
        .await;
    Ok(Step::Continue(cr))
}

/// Clone, reconcile the branch, seed the checklist and implement it. An
/// unchanged tree is fatal here: the issue asked for work.
async fn implement_plan(
    ctx: &Context<'_>,
    plan: &WorkPlan,
) -> Result<Step<(Implementation, String)>, WorkflowError> {
    let mut ws = ctx.acquire()?;
    ws.reconcile_branch(&plan.branch, &ctx.settings.target_branch)?;

    let checklist = plan.checklist();
    ws.seed(TODO, &checklist)?;
    let done = implement(ctx, &ws, &plan.branch, Assignment::Checklist(&checklist))
        .await?
        .ok_or(WorkflowError::NoChanges)?;

    let completed = checklist::mark_complete(&checklist);
    ws.seed(TODO_COMPLETED, &completed)?;
    Ok(Step::Continue((done, completed)))
}

/// The push already happened, so a rejected description update is only a
/// warning.
async fn finalize(
    ctx: &Context<'_>,
    issue: &IssueContext,
    cr: &ChangeRequest,
    done: &Implementation,
    completed: &str,
    notifier: &Notifier<'_>,
) -> Result<Step<()>, WorkflowError> {
    let description = messages::mr_description(issue, completed);
    let reviewers = issue.author_id.map(|id| vec![id]);
    let update = ctx
        .platform
        .update_change_request(cr.iid, &description, reviewers.as_deref())
        .await;

    let body = messages::ticket_completed(cr, &done.subject, done.files);
    notifier.notify(NoteTarget::Issue(issue.iid), &body).await;
    notifier.notify(NoteTarget::MergeRequest(cr.iid), &body).await;

    match update {
        Ok(()) => Ok(Step::Continue(())),
        Err(e) => Ok(Step::Warn(
            (),
            format!("Merge request description was not updated: {}", e),
        )),
    }
}
