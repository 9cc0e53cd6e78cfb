//! Code-hosting platform client.
//!
//! The workflows talk to the platform only through the [`Platform`] trait so
//! they can be driven against an in-memory double in tests. [`GitLab`] is the
//! REST v4 implementation.

pub mod gitlab;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PlatformError;

pub use gitlab::GitLab;

/// Result of an idempotent creation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Exists,
}

/// A change request (merge request) as the workflows need it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeRequest {
    pub iid: u64,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub target_branch: String,
    #[serde(default)]
    pub title: String,
}

/// Parameters for opening a change request.
#[derive(Debug, Clone, Serialize)]
pub struct NewChangeRequest<'a> {
    pub source_branch: &'a str,
    pub target_branch: &'a str,
    pub title: &'a str,
    pub description: &'a str,
}

/// What a note is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteTarget {
    Issue(u64),
    MergeRequest(u64),
}

impl NoteTarget {
    /// Collection name and iid as they appear in a REST path.
    pub fn parts(&self) -> (&'static str, u64) {
        match *self {
            Self::Issue(iid) => ("issues", iid),
            Self::MergeRequest(iid) => ("merge_requests", iid),
        }
    }
}

/// The revision triple an inline discussion is anchored to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRefs {
    /// Tip of the target branch.
    pub base_sha: String,
    /// Merge-base of target and source.
    pub start_sha: String,
    /// Tip of the source branch.
    pub head_sha: String,
}

/// A full inline position: the shared revision triple plus the new-side
/// path and line of one finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffPosition {
    pub position_type: &'static str,
    pub base_sha: String,
    pub start_sha: String,
    pub head_sha: String,
    pub old_path: String,
    pub new_path: String,
    pub new_line: u32,
}

impl DiffRefs {
    pub fn at(&self, path: &str, line: u32) -> DiffPosition {
        DiffPosition {
            position_type: "text",
            base_sha: self.base_sha.clone(),
            start_sha: self.start_sha.clone(),
            head_sha: self.head_sha.clone(),
            old_path: path.to_string(),
            new_path: path.to_string(),
            new_line: line,
        }
    }
}

/// Remote operations on the code-hosting platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Create `name` from `from_ref`. An already existing branch is success.
    async fn ensure_branch(&self, name: &str, from_ref: &str) -> Result<Outcome, PlatformError>;

    /// Open a change request, or return the open one for the same branches
    /// when the platform reports a duplicate.
    async fn create_change_request(
        &self,
        request: &NewChangeRequest<'_>,
    ) -> Result<(Outcome, ChangeRequest), PlatformError>;

    /// Replace the description and, when given, the reviewer list.
    async fn update_change_request(
        &self,
        iid: u64,
        description: &str,
        reviewer_ids: Option<&[u64]>,
    ) -> Result<(), PlatformError>;

    async fn post_note(&self, target: NoteTarget, body: &str) -> Result<(), PlatformError>;

    async fn post_inline_discussion(
        &self,
        mr_iid: u64,
        position: &DiffPosition,
        body: &str,
    ) -> Result<(), PlatformError>;
}
