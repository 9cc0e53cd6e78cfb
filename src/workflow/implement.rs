//! Shared implementation pipeline: generate, detect, commit, push.

use tracing::{info, warn};

use super::Context;
use super::prompts::{self, Assignment, ImplementContext};
use crate::agent::AgentRequest;
use crate::errors::WorkflowError;
use crate::extract::{commit_subject, extract_patch};
use crate::repo::artifacts::PATCH;
use crate::repo::{ChangeSet, Workspace};

/// A pushed implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    pub subject: String,
    pub commit: String,
    pub files: usize,
    pub push_attempts: u32,
}

/// Run the agent against the checked-out `branch`, then commit and push
/// whatever it changed. `Ok(None)` means the working tree is unchanged; the
/// caller decides whether that is fatal.
pub async fn implement(
    ctx: &Context<'_>,
    ws: &Workspace,
    branch: &str,
    assignment: Assignment<'_>,
) -> Result<Option<Implementation>, WorkflowError> {
    let files = ws.sample_files(ctx.tunables.workspace.sample_size)?;
    let repo_path = ws.root().display().to_string();
    let commit_context = match assignment {
        Assignment::Checklist(text) | Assignment::Instruction(text) => text.to_string(),
    };
    let prompt = prompts::implement(&ImplementContext {
        repo_path: &repo_path,
        target_branch: &ctx.settings.target_branch,
        working_branch: branch,
        files: &files,
        assignment,
    });

    let output = ctx
        .agent
        .invoke(&AgentRequest::long(&prompt), ws.root())
        .await
        .map_err(|e| WorkflowError::agent("implementation", e))?;

    if let Some(patch) = extract_patch(&output.cleaned) {
        ws.seed(PATCH, &patch)?;
        match ws.apply_patch(&patch) {
            Ok(()) => info!("Applied patch from agent output"),
            Err(e) => warn!(error = %e, "Agent patch did not apply; using working tree as is"),
        }
    }

    let changes = ws.change_set()?;
    if changes.is_empty() {
        info!(branch, "Agent left the working tree unchanged");
        return Ok(None);
    }
    info!(
        modified = changes.modified.len(),
        added = changes.added.len(),
        deleted = changes.deleted.len(),
        "Changes detected"
    );

    let subject = subject_for(ctx, ws, &changes, &commit_context).await;
    let commit = ws.commit(&changes, &subject, &ctx.identity())?;
    let push_attempts = ws.push(branch, &ctx.tunables.push).await?;

    Ok(Some(Implementation {
        subject,
        commit: commit.to_string(),
        files: changes.len(),
        push_attempts,
    }))
}

/// Commit subject from a short read-only generation. Agent failure here only
/// costs the subject line.
async fn subject_for(
    ctx: &Context<'_>,
    ws: &Workspace,
    changes: &ChangeSet,
    context: &str,
) -> String {
    let prompt = prompts::commit_message(changes, context);
    let output = match ctx
        .agent
        .invoke(&AgentRequest::short(&prompt), ws.root())
        .await
    {
        Ok(output) => Some(output.cleaned),
        Err(e) => {
            warn!(error = %e, "Commit message generation failed; using fallback subject");
            None
        }
    };
    commit_subject(
        ws.root(),
        output.as_deref(),
        &ctx.tunables.commit.default_subject,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentOutput, Tier};
    use crate::config::Trigger;
    use crate::errors::AgentError;
    use crate::repo::testing::Remote;
    use crate::testing::{MockPlatform, ScriptedAgent};
    use crate::workflow::fixtures;

    fn update_trigger() -> Trigger {
        fixtures::update_trigger("main", "tweak")
    }

    #[tokio::test]
    async fn test_patch_in_output_is_applied_and_committed() {
        let remote = Remote::new();
        let work = tempfile::tempdir().unwrap();
        let settings = fixtures::settings(&remote, update_trigger());
        let tunables = fixtures::tunables();
        let platform = MockPlatform::default();
        let patch = "```diff\ndiff --git a/README.md b/README.md\n--- a/README.md\n+++ b/README.md\n@@ -1 +1 @@\n-# app\n+# app v2\n```";
        let agent = ScriptedAgent::default()
            .then_output(patch)
            .then_output("Bump readme title");
        let ctx = fixtures::context(&settings, &tunables, &platform, &agent, work.path());

        let mut ws = ctx.acquire().unwrap();
        ws.checkout_existing("main").unwrap();
        let done = implement(&ctx, &ws, "main", Assignment::Instruction("tweak"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(done.subject, "Bump readme title");
        assert_eq!(done.files, 1);
        assert_eq!(done.push_attempts, 1);
        assert_eq!(remote.file_at("main", "README.md").unwrap(), "# app v2\n");
        assert_eq!(remote.file_at("main", PATCH), None);

        let calls = agent.invocations();
        assert_eq!(calls[0].tier, Tier::Long);
        assert!(calls[0].allow_tools);
        assert_eq!(calls[1].tier, Tier::Short);
        assert!(!calls[1].allow_tools);
        assert!(calls[1].prompt.contains("M README.md"));
    }

    #[tokio::test]
    async fn test_unchanged_tree_is_none() {
        let remote = Remote::new();
        let work = tempfile::tempdir().unwrap();
        let settings = fixtures::settings(&remote, update_trigger());
        let tunables = fixtures::tunables();
        let platform = MockPlatform::default();
        let agent = ScriptedAgent::default().then_output("Nothing to do here.");
        let ctx = fixtures::context(&settings, &tunables, &platform, &agent, work.path());

        let mut ws = ctx.acquire().unwrap();
        ws.checkout_existing("main").unwrap();
        let before = remote.tip("main");
        let done = implement(&ctx, &ws, "main", Assignment::Instruction("tweak"))
            .await
            .unwrap();

        assert!(done.is_none());
        assert_eq!(remote.tip("main"), before);
        assert_eq!(agent.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_message_failure_falls_back_to_default() {
        let remote = Remote::new();
        let work = tempfile::tempdir().unwrap();
        let settings = fixtures::settings(&remote, update_trigger());
        let tunables = fixtures::tunables();
        let platform = MockPlatform::default();
        let agent = ScriptedAgent::default()
            .then(|cwd| {
                std::fs::write(cwd.join("NOTES.md"), "notes\n").unwrap();
                Ok(AgentOutput::default())
            })
            .then(|_| {
                Err(AgentError::Timeout {
                    secs: 60,
                    output: String::new(),
                })
            });
        let ctx = fixtures::context(&settings, &tunables, &platform, &agent, work.path());

        let mut ws = ctx.acquire().unwrap();
        ws.checkout_existing("main").unwrap();
        let done = implement(&ctx, &ws, "main", Assignment::Instruction("add notes"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(done.subject, "Apply automated changes");
        assert_eq!(remote.file_at("main", "NOTES.md").unwrap(), "notes\n");
    }

    #[tokio::test]
    async fn test_agent_failure_is_fatal_with_output() {
        let remote = Remote::new();
        let work = tempfile::tempdir().unwrap();
        let settings = fixtures::settings(&remote, update_trigger());
        let tunables = fixtures::tunables();
        let platform = MockPlatform::default();
        let agent = ScriptedAgent::default().then(|_| {
            Err(AgentError::NonZeroExit {
                code: 1,
                output: "rate limited".into(),
            })
        });
        let ctx = fixtures::context(&settings, &tunables, &platform, &agent, work.path());

        let mut ws = ctx.acquire().unwrap();
        ws.checkout_existing("main").unwrap();
        let err = implement(&ctx, &ws, "main", Assignment::Instruction("tweak"))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Agent { step: "implementation", .. }));
        assert_eq!(err.diagnostics(), Some("rate limited"));
    }
}
