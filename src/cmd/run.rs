//! Workflow commands: build settings from arguments, run, map the outcome to
//! an exit code.

use anyhow::Context as _;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

use mrpilot::agent::CliAgent;
use mrpilot::config::{RawSettings, TriggerKind, Tunables};
use mrpilot::errors::WorkflowError;
use mrpilot::platform::GitLab;
use mrpilot::workflow::{self, Completion, Context};

use crate::{Cli, CommonArgs, IssueArgs, MergeRequestArgs};

/// Exit code for configuration problems; everything else fatal is 1.
const EXIT_CONFIG: u8 = 2;

fn common_settings(common: &CommonArgs) -> RawSettings {
    RawSettings {
        api_base: common.api_base.clone(),
        token: common.token.clone(),
        project_id: common.project_id.clone(),
        repo_url: common.repo_url.clone(),
        target_branch: common.target_branch.clone(),
        agent_username: common.agent_username.clone(),
        commit_email: common.commit_email.clone(),
        inline_review: common.inline_review.clone(),
        ..Default::default()
    }
}

fn with_merge_request(raw: RawSettings, mr: &MergeRequestArgs) -> RawSettings {
    RawSettings {
        source_branch: mr.source_branch.clone(),
        mr_iid: mr.mr_iid.clone(),
        mr_title: mr.mr_title.clone(),
        mr_url: mr.mr_url.clone(),
        ..raw
    }
}

pub fn issue_settings(common: &CommonArgs, issue: &IssueArgs) -> RawSettings {
    RawSettings {
        issue_iid: issue.issue_iid.clone(),
        issue_title: issue.issue_title.clone(),
        issue_url: issue.issue_url.clone(),
        issue_author_id: issue.issue_author_id.clone(),
        original_needs: issue.original_needs.clone(),
        ..common_settings(common)
    }
}

pub fn note_settings(
    common: &CommonArgs,
    mr: &MergeRequestArgs,
    instruction: Option<&str>,
    note_author: Option<&str>,
) -> RawSettings {
    RawSettings {
        instruction: instruction.map(str::to_string),
        note_author: note_author.map(str::to_string),
        ..with_merge_request(common_settings(common), mr)
    }
}

pub fn review_settings(common: &CommonArgs, mr: &MergeRequestArgs) -> RawSettings {
    with_merge_request(common_settings(common), mr)
}

fn exit_code(err: &WorkflowError) -> ExitCode {
    match err {
        WorkflowError::Config(_) => ExitCode::from(EXIT_CONFIG),
        _ => ExitCode::FAILURE,
    }
}

pub async fn run_workflow(
    cli: &Cli,
    common: &CommonArgs,
    kind: TriggerKind,
    raw: RawSettings,
) -> ExitCode {
    match execute(cli.config.as_deref(), common.work_dir.as_deref(), kind, raw).await {
        Ok(Completion::Completed { summary, warnings }) => {
            for warning in &warnings {
                eprintln!("warning: {}", warning);
            }
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Ok(Completion::NothingToDo(reason)) => {
            println!("{}", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Workflow failed");
            eprintln!("Error: {}", e);
            if let Some(diagnostics) = e.diagnostics() {
                eprintln!("{}", diagnostics.trim_end());
            }
            exit_code(&e)
        }
    }
}

async fn execute(
    config: Option<&Path>,
    work_dir: Option<&Path>,
    kind: TriggerKind,
    raw: RawSettings,
) -> Result<Completion, WorkflowError> {
    let tunables = Tunables::load(config)?;
    let settings = raw.validate(kind, &tunables)?;
    if settings.trigger_kind() != kind {
        info!(
            requested = kind.as_str(),
            running = settings.trigger_kind().as_str(),
            "Note asked for a review"
        );
    }

    let platform = GitLab::new(&settings.api_base, &settings.project_id, &settings.token)
        .context("Failed to build GitLab client")?;
    let agent = CliAgent::new(tunables.agent.clone());
    let work_dir = work_dir.unwrap_or(tunables.workspace.dir.as_path());

    let ctx = Context {
        settings: &settings,
        tunables: &tunables,
        platform: &platform,
        agent: &agent,
        work_dir,
    };
    workflow::run(&ctx).await
}
