//! Intermediate artifacts: files the workflows write for their own
//! bookkeeping. None of them may ever be committed.

use std::path::Path;

pub const PLAN: &str = "plan.json";
pub const AGENT_LOG: &str = "agent_output.log";
pub const AGENT_CLEAN_LOG: &str = "agent_output.clean.log";
pub const TODO: &str = "todo.md";
pub const TODO_COMPLETED: &str = "todo_completed.md";
pub const COMMIT_MSG: &str = "commit_msg.txt";
pub const REVIEW: &str = "review.json";
pub const PATCH: &str = "patch.diff";
pub const AUTH_URL: &str = "auth_url.txt";

pub const EXCLUDED: [&str; 9] = [
    PLAN,
    AGENT_LOG,
    AGENT_CLEAN_LOG,
    TODO,
    TODO_COMPLETED,
    COMMIT_MSG,
    REVIEW,
    PATCH,
    AUTH_URL,
];

/// True when the file name of `path` (at any depth) is an intermediate artifact.
pub fn is_artifact(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| EXCLUDED.contains(&name))
}
