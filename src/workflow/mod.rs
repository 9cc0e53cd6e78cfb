//! Workflow controller.
//!
//! Each workflow is a linear sequence of steps. A step returns a [`Step`]:
//! continue with a value, continue with a recorded warning, or stop early
//! with a benign [`Completion`]. Fatal failures are `Err(WorkflowError)`.
//! The `step!` macro threads those three outcomes through a pipeline.
//!
//! Every workflow acknowledges the request first. A fatal failure is
//! reported back on the platform only when that acknowledgement landed;
//! otherwise the exit status is the only signal.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::config::{Settings, Trigger, Tunables};
use crate::errors::WorkflowError;
use crate::messages;
use crate::notifier::Notifier;
use crate::platform::{NoteTarget, Platform};
use crate::repo::{Identity, Workspace};

/// Unwrap a step result inside a workflow: `?` on fatal errors, early
/// `return Ok(..)` on a benign stop, warnings pushed onto `$warnings`.
macro_rules! step {
    ($warnings:expr, $step:expr) => {
        match ($step)?.proceed(&mut $warnings) {
            ::std::ops::ControlFlow::Continue(value) => value,
            ::std::ops::ControlFlow::Break(done) => return Ok(done),
        }
    };
}

pub mod implement;
pub mod note;
pub mod prompts;
pub mod review;
pub mod ticket;

const REPO_DIR: &str = "repo";

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// All steps ran. Carries a one-line account and any recoverable warnings.
    Completed {
        summary: String,
        warnings: Vec<String>,
    },
    /// A benign terminal condition ended the run early.
    NothingToDo(String),
}

impl Completion {
    pub fn completed(summary: impl Into<String>, warnings: Vec<String>) -> Self {
        Self::Completed {
            summary: summary.into(),
            warnings,
        }
    }
}

/// Outcome of one non-fatal step.
#[derive(Debug)]
pub enum Step<T> {
    Continue(T),
    /// Continue, but something recoverable went wrong.
    Warn(T, String),
    /// End the workflow successfully without running the remaining steps.
    Stop(Completion),
}

impl<T> Step<T> {
    pub fn proceed(self, warnings: &mut Vec<String>) -> ControlFlow<Completion, T> {
        match self {
            Self::Continue(value) => ControlFlow::Continue(value),
            Self::Warn(value, warning) => {
                warn!(warning = %warning, "Continuing after recoverable problem");
                warnings.push(warning);
                ControlFlow::Continue(value)
            }
            Self::Stop(done) => ControlFlow::Break(done),
        }
    }
}

/// Everything a workflow run needs, built once in `main`.
pub struct Context<'a> {
    pub settings: &'a Settings,
    pub tunables: &'a Tunables,
    pub platform: &'a dyn Platform,
    pub agent: &'a dyn Agent,
    /// Scratch directory owned by this run.
    pub work_dir: &'a Path,
}

impl Context<'_> {
    pub fn repo_dir(&self) -> PathBuf {
        self.work_dir.join(REPO_DIR)
    }

    pub fn identity(&self) -> Identity<'_> {
        Identity {
            name: &self.settings.agent_username,
            email: &self.settings.commit_email,
        }
    }

    /// Fresh clone of the target repository.
    pub fn acquire(&self) -> Result<Workspace, WorkflowError> {
        Ok(Workspace::clone(
            &self.settings.repo_url,
            Some(self.settings.token.as_str()),
            &self.repo_dir(),
        )?)
    }
}

/// Run the workflow selected by the trigger.
pub async fn run(ctx: &Context<'_>) -> Result<Completion, WorkflowError> {
    info!(
        trigger = ctx.settings.trigger_kind().as_str(),
        project = %ctx.settings.project_id,
        "Starting workflow"
    );
    std::fs::create_dir_all(ctx.work_dir).map_err(|e| {
        WorkflowError::Other(anyhow::Error::new(e).context(format!(
            "Failed to create work directory {}",
            ctx.work_dir.display()
        )))
    })?;

    match &ctx.settings.trigger {
        Trigger::Issue(issue) => ticket::run(ctx, issue).await,
        Trigger::Update {
            mr,
            instruction,
            requested_by,
        } => note::run(ctx, mr, instruction, requested_by.as_deref()).await,
        Trigger::Review { mr, focus } => review::run(ctx, mr, focus.as_deref()).await,
    }
}

/// Report a fatal failure on `target` when the run was acknowledged there.
async fn conclude(
    notifier: &Notifier<'_>,
    target: NoteTarget,
    acknowledged: bool,
    result: Result<Completion, WorkflowError>,
) -> Result<Completion, WorkflowError> {
    match &result {
        Err(e) if acknowledged => {
            notifier.notify(target, &messages::failure(e)).await;
        }
        Err(_) => debug!("Run was never acknowledged; failure reported by exit status only"),
        Ok(done) => info!(outcome = ?done, "Workflow finished"),
    }
    result
}
