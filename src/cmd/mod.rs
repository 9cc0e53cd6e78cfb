//! CLI command implementations.
//!
//! | Module   | Commands handled            |
//! |----------|-----------------------------|
//! | `run`    | `Issue`, `Note`, `Review`   |
//! | `config` | `Config`                    |

pub mod config;
pub mod run;

pub use config::cmd_config;
pub use run::{issue_settings, note_settings, review_settings, run_workflow};
