//! Structured output parsing.
//!
//! Each mode has its own failure policy:
//! - plan: strict, a malformed plan is fatal
//! - patch: optional, absence means the agent edited the tree directly
//! - commit subject: never fails, falls back to a default
//! - findings: optional, absence means the raw output becomes the summary

pub mod commit;
pub mod findings;
pub mod patch;
pub mod plan;

pub use commit::commit_subject;
pub use findings::{ReviewReport, read_findings};
pub use patch::extract_patch;
pub use plan::{WorkPlan, read_plan};
