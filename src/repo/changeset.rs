//! The set of paths an implementation step touched.

use git2::{Delta, DiffOptions, Repository, Tree};
use tracing::debug;

use super::artifacts::is_artifact;
use crate::errors::RepoError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub modified: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.added.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.len() + self.added.len() + self.deleted.len()
    }

    /// Paths that must be written into the index.
    pub fn to_stage(&self) -> impl Iterator<Item = &str> {
        self.modified.iter().chain(self.added.iter()).map(String::as_str)
    }

    /// Compute the change set of the working tree against `baseline`,
    /// including untracked files and excluding intermediate artifacts.
    pub fn compute(repo: &Repository, baseline: &Tree<'_>) -> Result<Self, RepoError> {
        let mut opts = DiffOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_typechange(true);
        let diff = repo.diff_tree_to_workdir_with_index(Some(baseline), Some(&mut opts))?;

        let mut changes = ChangeSet::default();
        for delta in diff.deltas() {
            let file = match delta.status() {
                Delta::Deleted => delta.old_file(),
                _ => delta.new_file(),
            };
            let Some(path) = file.path().and_then(|p| p.to_str()) else {
                continue;
            };
            if is_artifact(path) {
                debug!(path, "Excluding intermediate artifact from change set");
                continue;
            }
            let path = path.to_string();
            match delta.status() {
                Delta::Added | Delta::Untracked => changes.added.push(path),
                Delta::Modified | Delta::Typechange => changes.modified.push(path),
                Delta::Deleted => changes.deleted.push(path),
                _ => {}
            }
        }
        Ok(changes)
    }
}
