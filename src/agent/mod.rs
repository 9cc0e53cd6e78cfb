//! AI agent invocation.
//!
//! The agent is a black box: it receives one free-text prompt, may edit the
//! working tree or drop artifact files, and writes text to stdout. Every
//! invocation is bounded by a wall-clock timeout chosen by [`Tier`].

pub mod cli;
pub mod sanitize;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::config::AgentTunables;
use crate::errors::AgentError;

pub use cli::CliAgent;
pub use sanitize::clean_output;

/// Timeout tier for an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Planning, implementation and review.
    Long,
    /// Small auxiliary generations such as a commit subject.
    Short,
}

impl Tier {
    pub fn timeout(&self, tunables: &AgentTunables) -> Duration {
        match self {
            Self::Long => Duration::from_secs(tunables.long_timeout_secs),
            Self::Short => Duration::from_secs(tunables.short_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentRequest<'a> {
    pub prompt: &'a str,
    pub tier: Tier,
    /// Allow tools with side effects (file edits, shell).
    pub allow_tools: bool,
}

impl<'a> AgentRequest<'a> {
    pub fn long(prompt: &'a str) -> Self {
        Self {
            prompt,
            tier: Tier::Long,
            allow_tools: true,
        }
    }

    pub fn short(prompt: &'a str) -> Self {
        Self {
            prompt,
            tier: Tier::Short,
            allow_tools: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.allow_tools = false;
        self
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOutput {
    pub raw: String,
    /// `raw` with terminal control sequences removed. Parsers read this.
    pub cleaned: String,
}

impl AgentOutput {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let cleaned = clean_output(&raw);
        Self { raw, cleaned }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    /// Run one prompt in `cwd`. Timeout and non-zero exit are distinct errors,
    /// both carrying the output captured so far.
    async fn invoke(&self, request: &AgentRequest<'_>, cwd: &Path) -> Result<AgentOutput, AgentError>;
}
