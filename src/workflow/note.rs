//! Update workflow: a reviewer's note on a merge request becomes a commit on
//! its source branch.

use super::implement::{Implementation, implement};
use super::prompts::Assignment;
use super::{Completion, Context, Step, conclude};
use crate::config::MergeRequestContext;
use crate::errors::WorkflowError;
use crate::messages;
use crate::notifier::Notifier;
use crate::platform::NoteTarget;

pub async fn run(
    ctx: &Context<'_>,
    mr: &MergeRequestContext,
    instruction: &str,
    requested_by: Option<&str>,
) -> Result<Completion, WorkflowError> {
    tracing::info!(mr = mr.iid, requested_by, "Applying note instruction");
    let notifier = Notifier::new(ctx.platform);
    let target = NoteTarget::MergeRequest(mr.iid);
    let acknowledged = notifier.notify(target, &messages::note_ack(instruction)).await;
    let result = pipeline(ctx, mr, instruction, &notifier).await;
    conclude(&notifier, target, acknowledged, result).await
}

async fn pipeline(
    ctx: &Context<'_>,
    mr: &MergeRequestContext,
    instruction: &str,
    notifier: &Notifier<'_>,
) -> Result<Completion, WorkflowError> {
    let mut warnings = Vec::new();
    let done = step!(warnings, apply(ctx, mr, instruction, notifier).await);

    notifier
        .notify(
            NoteTarget::MergeRequest(mr.iid),
            &messages::note_completed(&mr.source_branch, &done.subject, done.files),
        )
        .await;
    Ok(Completion::completed(
        format!("Pushed \"{}\" to {}", done.subject, mr.source_branch),
        warnings,
    ))
}

/// An unchanged tree is a legitimate answer to an instruction.
async fn apply(
    ctx: &Context<'_>,
    mr: &MergeRequestContext,
    instruction: &str,
    notifier: &Notifier<'_>,
) -> Result<Step<Implementation>, WorkflowError> {
    let mut ws = ctx.acquire()?;
    ws.checkout_existing(&mr.source_branch)?;

    match implement(ctx, &ws, &mr.source_branch, Assignment::Instruction(instruction)).await? {
        Some(done) => Ok(Step::Continue(done)),
        None => {
            notifier
                .notify(NoteTarget::MergeRequest(mr.iid), &messages::no_changes_needed())
                .await;
            Ok(Step::Stop(Completion::NothingToDo(
                "No changes were needed".to_string(),
            )))
        }
    }
}
