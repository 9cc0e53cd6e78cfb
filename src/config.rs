//! Run configuration.
//!
//! Two layers, both built once in `main` and passed down by reference:
//! - [`Settings`]: the required per-run parameters (platform credentials, project,
//!   branches, ticket / change-request identity). Supplied by flags or the
//!   pipeline's environment variables and validated by [`RawSettings::validate`].
//! - [`Tunables`]: optional knobs read from `mrpilot.toml`, every field defaulted.
//!
//! ```toml
//! [agent]
//! command = "claude"
//! long_timeout_secs = 3600
//! short_timeout_secs = 60
//!
//! [push]
//! attempts = 3
//! backoff_secs = 5
//!
//! [workspace]
//! dir = ".mrpilot-work"
//! sample_size = 200
//!
//! [commit]
//! default_subject = "Apply automated changes"
//!
//! [ticket]
//! max_description_chars = 8192
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;

pub const DEFAULT_API_BASE: &str = "https://gitlab.com";
pub const DEFAULT_AGENT_USERNAME: &str = "copilot-agent";
pub const DEFAULT_COMMIT_EMAIL: &str = "copilot@github.com";
pub const CONFIG_FILE_NAME: &str = "mrpilot.toml";

const TRUNCATION_SUFFIX: &str = "\n\n<!-- truncated -->";

/// Which workflow a run executes, mirroring the trigger types the webhook relay emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// `issue_assignee`: ticket-to-change-request.
    Issue,
    /// `mr_note`: a note on an existing change request.
    Note,
    /// `mr_reviewer`: the agent was asked to review a change request.
    Review,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue_assignee",
            Self::Note => "mr_note",
            Self::Review => "mr_reviewer",
        }
    }
}

/// Ticket identity and content for the ticket workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueContext {
    pub iid: u64,
    pub title: String,
    pub url: Option<String>,
    pub author_id: Option<u64>,
    pub description: String,
}

/// Identity of an existing change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestContext {
    pub iid: u64,
    pub source_branch: String,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// The validated trigger for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Issue(IssueContext),
    Update {
        mr: MergeRequestContext,
        instruction: String,
        requested_by: Option<String>,
    },
    Review {
        mr: MergeRequestContext,
        focus: Option<String>,
    },
}

/// Immutable per-run settings. No component reads the environment after this
/// value is built.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base: String,
    pub token: String,
    pub project_id: String,
    pub repo_url: String,
    pub target_branch: String,
    pub agent_username: String,
    pub commit_email: String,
    pub inline_review: bool,
    pub trigger: Trigger,
}

impl Settings {
    pub fn trigger_kind(&self) -> TriggerKind {
        match self.trigger {
            Trigger::Issue(_) => TriggerKind::Issue,
            Trigger::Update { .. } => TriggerKind::Note,
            Trigger::Review { .. } => TriggerKind::Review,
        }
    }
}

/// Unvalidated parameters as they arrive from flags / environment.
#[derive(Debug, Clone, Default)]
pub struct RawSettings {
    pub api_base: Option<String>,
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub repo_url: Option<String>,
    pub target_branch: Option<String>,
    pub source_branch: Option<String>,
    pub issue_iid: Option<String>,
    pub issue_title: Option<String>,
    pub issue_url: Option<String>,
    pub issue_author_id: Option<String>,
    pub original_needs: Option<String>,
    pub mr_iid: Option<String>,
    pub mr_title: Option<String>,
    pub mr_url: Option<String>,
    pub instruction: Option<String>,
    pub note_author: Option<String>,
    pub agent_username: Option<String>,
    pub commit_email: Option<String>,
    pub inline_review: Option<String>,
}

/// Treat empty / whitespace-only values as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_id(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::Invalid {
        name: name.to_string(),
        message: format!("expected a positive integer, got '{}'", value),
    })
}

impl RawSettings {
    /// Validate the raw parameters for `kind` and build immutable [`Settings`].
    ///
    /// Every missing required name is collected before failing so a broken
    /// pipeline reports all of them at once.
    pub fn validate(self, kind: TriggerKind, tunables: &Tunables) -> Result<Settings, ConfigError> {
        let mut required: Vec<(&str, &Option<String>)> = vec![
            ("GITLAB_TOKEN", &self.token),
            ("TARGET_PROJECT_ID", &self.project_id),
            ("TARGET_REPO_URL", &self.repo_url),
            ("TARGET_BRANCH", &self.target_branch),
        ];
        match kind {
            TriggerKind::Issue => {
                required.push(("TARGET_ISSUE_IID", &self.issue_iid));
                required.push(("ISSUE_TITLE", &self.issue_title));
            }
            TriggerKind::Note => {
                required.push(("SOURCE_BRANCH", &self.source_branch));
                required.push(("TARGET_MR_IID", &self.mr_iid));
                required.push(("MR_NOTE_INSTRUCTION", &self.instruction));
            }
            TriggerKind::Review => {
                required.push(("SOURCE_BRANCH", &self.source_branch));
                required.push(("TARGET_MR_IID", &self.mr_iid));
            }
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| present(value).is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let agent_username = present(&self.agent_username)
            .unwrap_or(DEFAULT_AGENT_USERNAME)
            .to_string();

        let trigger = match kind {
            TriggerKind::Issue => {
                let iid = parse_id("TARGET_ISSUE_IID", present(&self.issue_iid).unwrap_or_default())?;
                let author_id = match present(&self.issue_author_id) {
                    Some(id) => Some(parse_id("ISSUE_AUTHOR_ID", id)?),
                    None => None,
                };
                Trigger::Issue(IssueContext {
                    iid,
                    title: present(&self.issue_title).unwrap_or_default().to_string(),
                    url: present(&self.issue_url).map(str::to_string),
                    author_id,
                    description: truncate_description(
                        self.original_needs.as_deref().unwrap_or_default(),
                        tunables.ticket.max_description_chars,
                    ),
                })
            }
            TriggerKind::Note | TriggerKind::Review => {
                let mr = MergeRequestContext {
                    iid: parse_id("TARGET_MR_IID", present(&self.mr_iid).unwrap_or_default())?,
                    source_branch: present(&self.source_branch).unwrap_or_default().to_string(),
                    title: present(&self.mr_title).map(str::to_string),
                    url: present(&self.mr_url).map(str::to_string),
                };
                if kind == TriggerKind::Review {
                    Trigger::Review { mr, focus: None }
                } else {
                    let instruction = strip_mention(
                        present(&self.instruction).unwrap_or_default(),
                        &agent_username,
                    );
                    match review_request(&instruction) {
                        Some(focus) => Trigger::Review { mr, focus },
                        None if instruction.is_empty() => {
                            return Err(ConfigError::Missing(vec![
                                "MR_NOTE_INSTRUCTION".to_string(),
                            ]));
                        }
                        None => Trigger::Update {
                            mr,
                            instruction,
                            requested_by: present(&self.note_author).map(str::to_string),
                        },
                    }
                }
            }
        };

        Ok(Settings {
            api_base: present(&self.api_base)
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            token: present(&self.token).unwrap_or_default().to_string(),
            project_id: present(&self.project_id).unwrap_or_default().to_string(),
            repo_url: present(&self.repo_url).unwrap_or_default().to_string(),
            target_branch: present(&self.target_branch).unwrap_or_default().to_string(),
            agent_username,
            commit_email: present(&self.commit_email)
                .unwrap_or(DEFAULT_COMMIT_EMAIL)
                .to_string(),
            inline_review: present(&self.inline_review).is_none_or(is_truthy),
            trigger,
        })
    }
}

/// Remove the `@agent` mention from a note and trim what remains.
pub fn strip_mention(note: &str, agent_username: &str) -> String {
    note.replace(&format!("@{}", agent_username), "")
        .trim()
        .to_string()
}

/// `Some(focus)` when a note asks for a review (`review` or `/review [focus]`).
fn review_request(instruction: &str) -> Option<Option<String>> {
    let trimmed = instruction.trim();
    if trimmed.eq_ignore_ascii_case("review") {
        return Some(None);
    }
    let rest = trimmed.strip_prefix("/review")?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let focus = rest.trim();
    Some((!focus.is_empty()).then(|| focus.to_string()))
}

/// Cap a ticket description at `max_chars`, marking the cut.
pub fn truncate_description(description: &str, max_chars: usize) -> String {
    if description.chars().count() <= max_chars {
        return description.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_SUFFIX.chars().count());
    let mut truncated: String = description.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

/// Agent process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTunables {
    #[serde(default = "default_agent_command")]
    pub command: String,
    /// Arguments passed on every invocation.
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    /// Extra arguments when side-effecting tools are allowed.
    #[serde(default = "default_tool_args")]
    pub tool_args: Vec<String>,
    /// Extra arguments when only read-only tools are allowed.
    #[serde(default = "default_readonly_args")]
    pub readonly_args: Vec<String>,
    #[serde(default = "default_long_timeout")]
    pub long_timeout_secs: u64,
    #[serde(default = "default_short_timeout")]
    pub short_timeout_secs: u64,
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_tool_args() -> Vec<String> {
    vec!["--dangerously-skip-permissions".to_string()]
}

fn default_readonly_args() -> Vec<String> {
    vec!["--allowedTools".to_string(), "Read Glob Grep".to_string()]
}

fn default_long_timeout() -> u64 {
    3600
}

fn default_short_timeout() -> u64 {
    60
}

impl Default for AgentTunables {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
            tool_args: default_tool_args(),
            readonly_args: default_readonly_args(),
            long_timeout_secs: default_long_timeout(),
            short_timeout_secs: default_short_timeout(),
        }
    }
}

/// Push retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTunables {
    #[serde(default = "default_push_attempts")]
    pub attempts: u32,
    #[serde(default = "default_push_backoff")]
    pub backoff_secs: u64,
}

fn default_push_attempts() -> u32 {
    3
}

fn default_push_backoff() -> u64 {
    5
}

impl Default for PushTunables {
    fn default() -> Self {
        Self {
            attempts: default_push_attempts(),
            backoff_secs: default_push_backoff(),
        }
    }
}

impl PushTunables {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Scratch workspace layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceTunables {
    #[serde(default = "default_work_dir")]
    pub dir: PathBuf,
    /// How many repository paths to list in implementation prompts.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".mrpilot-work")
}

fn default_sample_size() -> usize {
    200
}

impl Default for WorkspaceTunables {
    fn default() -> Self {
        Self {
            dir: default_work_dir(),
            sample_size: default_sample_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitTunables {
    #[serde(default = "default_commit_subject")]
    pub default_subject: String,
}

fn default_commit_subject() -> String {
    "Apply automated changes".to_string()
}

impl Default for CommitTunables {
    fn default() -> Self {
        Self {
            default_subject: default_commit_subject(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketTunables {
    #[serde(default = "default_max_description_chars")]
    pub max_description_chars: usize,
}

fn default_max_description_chars() -> usize {
    8192
}

impl Default for TicketTunables {
    fn default() -> Self {
        Self {
            max_description_chars: default_max_description_chars(),
        }
    }
}

/// Optional knobs from `mrpilot.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default)]
    pub agent: AgentTunables,
    #[serde(default)]
    pub push: PushTunables,
    #[serde(default)]
    pub workspace: WorkspaceTunables,
    #[serde(default)]
    pub commit: CommitTunables,
    #[serde(default)]
    pub ticket: TicketTunables,
}

impl Tunables {
    /// Load tunables from `path`, or from `mrpilot.toml` in the current
    /// directory when no path is given. A missing default file yields defaults;
    /// a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE_NAME), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::FileRead {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::FileParse { path, source })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
