//! Review findings and their delivery as inline comments.

pub mod findings;
pub mod post;

pub use findings::{ReviewFinding, Severity};
pub use post::{PostingSummary, post_findings};
