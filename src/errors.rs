//! Typed error hierarchy for mrpilot.
//!
//! One enum per subsystem, plus the workflow-level enum that callers match on:
//! - `ConfigError`: missing or malformed run configuration
//! - `AgentError`: AI agent process failures
//! - `PlatformError`: code-hosting REST API failures
//! - `RepoError`: version-control failures
//! - `WorkflowError`: the fatal outcomes a workflow run can end with

use thiserror::Error;

/// Errors raised while assembling the immutable run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: String, message: String },

    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    FileParse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from a single agent invocation. Output captured before the failure
/// is kept so the caller can surface it for diagnosis.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn agent process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent timed out after {secs}s")]
    Timeout { secs: u64, output: String },

    #[error("Agent exited with non-zero code {code}")]
    NonZeroExit { code: i32, output: String },

    #[error("Agent I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Output captured before the failure, if any.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Self::Timeout { output, .. } | Self::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Errors from the code-hosting platform API.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Platform returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Platform rejected credentials ({status}) for {url}: {body}")]
    Unauthorized {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode platform response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Errors from the repository materializer.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Branch '{0}' not found on remote")]
    BranchNotFound(String),

    #[error("Clone of {url} did not produce a usable working copy: {message}")]
    Clone { url: String, message: String },

    #[error("Push of '{branch}' failed after {attempts} attempts: {last_error}")]
    PushExhausted {
        branch: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Failed to apply patch: {0}")]
    Patch(String),

    #[error("Repository I/O failure at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal outcomes of a workflow run. Each of these ends the run with a
/// non-zero exit status.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Agent failed during {step}: {source}")]
    Agent {
        step: &'static str,
        #[source]
        source: AgentError,
    },

    #[error("Malformed work plan: {0}")]
    MalformedPlan(String),

    #[error("No changes were generated")]
    NoChanges,

    #[error("Change request could not be created: {0}")]
    ChangeRequest(#[source] PlatformError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn agent(step: &'static str, source: AgentError) -> Self {
        Self::Agent { step, source }
    }

    /// Diagnostic detail worth attaching to a failure note: captured agent
    /// output or the platform's response body.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Agent { source, .. } => source.captured_output(),
            Self::ChangeRequest(
                PlatformError::Status { body, .. } | PlatformError::Unauthorized { body, .. },
            ) => Some(body),
            _ => None,
        }
    }
}
