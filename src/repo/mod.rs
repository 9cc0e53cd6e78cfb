//! Repository materializer.
//!
//! Owns the scratch working copy for one run: clone with injected
//! credentials, reconcile the working branch against the remote, compute the
//! change set, commit it and push with bounded retry. Also produces the
//! three-dot diff and revision triple used by reviews.

pub mod artifacts;
pub mod changeset;
pub mod checklist;
pub mod push;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use changeset::ChangeSet;
pub use workspace::{BranchState, Identity, Workspace};
