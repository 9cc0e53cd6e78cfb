//! Work plan parsing. A plan without a branch or without tasks is rejected
//! here and nowhere else.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::errors::WorkflowError;
use crate::repo::artifacts::PLAN;
use crate::repo::checklist;
use crate::util::{extract_json_object, slugify};

/// Longest branch name a plan may produce.
pub const MAX_BRANCH_LEN: usize = 60;

#[derive(Debug, Deserialize)]
struct RawPlan {
    branch: String,
    todo: Vec<String>,
}

/// A validated plan: a branch-safe name and at least one task. Tasks are
/// stored without list or checkbox markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPlan {
    pub branch: String,
    pub todo: Vec<String>,
}

impl WorkPlan {
    /// Parse plan JSON from `text`, which may wrap the object in prose or a
    /// code fence.
    pub fn parse(text: &str) -> Result<Self, WorkflowError> {
        let trimmed = text.trim();
        let raw: RawPlan = match serde_json::from_str(trimmed) {
            Ok(raw) => raw,
            Err(direct) => {
                let json = extract_json_object(trimmed).ok_or_else(|| {
                    WorkflowError::MalformedPlan(format!("no JSON object found ({})", direct))
                })?;
                serde_json::from_str(&json)
                    .map_err(|e| WorkflowError::MalformedPlan(e.to_string()))?
            }
        };

        let branch = slugify(&raw.branch, MAX_BRANCH_LEN);
        if branch.is_empty() {
            return Err(WorkflowError::MalformedPlan(
                "`branch` is empty".to_string(),
            ));
        }
        let todo: Vec<String> = raw
            .todo
            .iter()
            .filter_map(|item| checklist::task_text(item))
            .collect();
        if todo.is_empty() {
            return Err(WorkflowError::MalformedPlan("`todo` is empty".to_string()));
        }
        Ok(Self { branch, todo })
    }

    /// The tasks as a markdown checklist.
    pub fn checklist(&self) -> String {
        checklist::render(&self.todo)
    }
}

/// Read the plan the agent produced in `dir`: the `plan.json` artifact when
/// present, otherwise the agent's output. The artifact is removed only after
/// a plan was accepted.
pub fn read_plan(dir: &Path, output: &str) -> Result<WorkPlan, WorkflowError> {
    let artifact = dir.join(PLAN);
    let plan = match std::fs::read_to_string(&artifact) {
        Ok(content) => {
            debug!(path = %artifact.display(), "Reading plan artifact");
            WorkPlan::parse(&content)?
        }
        Err(_) => WorkPlan::parse(output)?,
    };
    if artifact.exists()
        && let Err(e) = std::fs::remove_file(&artifact)
    {
        warn!(path = %artifact.display(), error = %e, "Failed to remove plan artifact");
    }
    Ok(plan)
}
