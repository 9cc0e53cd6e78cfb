use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use mrpilot::config::TriggerKind;

mod cmd;

#[derive(Parser)]
#[command(name = "mrpilot")]
#[command(
    version,
    about = "Turns GitLab issues and merge request notes into agent-implemented changes"
)]
pub struct Cli {
    /// Tunables file. Defaults to ./mrpilot.toml when present.
    #[arg(long, global = true, env = "MRPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for daily log files
    #[arg(long, global = true, env = "MRPILOT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan an issue, open a merge request and implement it
    Issue {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        issue: IssueArgs,
    },
    /// Apply a merge request note's instruction to its source branch
    Note {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        mr: MergeRequestArgs,
        /// Note text; the agent mention is stripped
        #[arg(long, env = "MR_NOTE_INSTRUCTION")]
        instruction: Option<String>,
        #[arg(long, env = "NOTE_AUTHOR_USERNAME")]
        note_author: Option<String>,
    },
    /// Review a merge request and post findings
    Review {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        mr: MergeRequestArgs,
    },
    /// Print the effective tunables as TOML
    Config,
}

/// Parameters every workflow takes. Required ones are checked together at
/// validation so all missing names are reported at once.
#[derive(Args, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "GITLAB_API_BASE")]
    pub api_base: Option<String>,

    /// Numeric id or `group/project` path
    #[arg(long, env = "TARGET_PROJECT_ID")]
    pub project_id: Option<String>,

    #[arg(long, env = "TARGET_REPO_URL")]
    pub repo_url: Option<String>,

    #[arg(long, env = "TARGET_BRANCH")]
    pub target_branch: Option<String>,

    #[arg(long, env = "COPILOT_AGENT_USERNAME")]
    pub agent_username: Option<String>,

    #[arg(long, env = "COPILOT_AGENT_COMMIT_EMAIL")]
    pub commit_email: Option<String>,

    /// Post review findings as inline comments (default true)
    #[arg(long, env = "ENABLE_INLINE_REVIEW_COMMENTS")]
    pub inline_review: Option<String>,

    /// Scratch directory for this run. Overrides the tunables file.
    #[arg(long, env = "MRPILOT_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
pub struct IssueArgs {
    #[arg(long, env = "TARGET_ISSUE_IID")]
    pub issue_iid: Option<String>,

    #[arg(long, env = "ISSUE_TITLE")]
    pub issue_title: Option<String>,

    #[arg(long, env = "ISSUE_URL")]
    pub issue_url: Option<String>,

    #[arg(long, env = "ISSUE_AUTHOR_ID")]
    pub issue_author_id: Option<String>,

    /// Issue description
    #[arg(long, env = "ORIGINAL_NEEDS")]
    pub original_needs: Option<String>,
}

#[derive(Args, Clone, Default)]
pub struct MergeRequestArgs {
    #[arg(long, env = "SOURCE_BRANCH")]
    pub source_branch: Option<String>,

    #[arg(long, env = "TARGET_MR_IID")]
    pub mr_iid: Option<String>,

    #[arg(long, env = "MR_TITLE")]
    pub mr_title: Option<String>,

    #[arg(long, env = "MR_URL")]
    pub mr_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Variables already present win over the file.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _guard = mrpilot::logging::init(cli.log_dir.as_deref());

    match &cli.command {
        Commands::Config => cmd::cmd_config(cli.config.as_deref()),
        Commands::Issue { common, issue } => {
            let raw = cmd::issue_settings(common, issue);
            cmd::run_workflow(&cli, common, TriggerKind::Issue, raw).await
        }
        Commands::Note {
            common,
            mr,
            instruction,
            note_author,
        } => {
            let raw = cmd::note_settings(
                common,
                mr,
                instruction.as_deref(),
                note_author.as_deref(),
            );
            cmd::run_workflow(&cli, common, TriggerKind::Note, raw).await
        }
        Commands::Review { common, mr } => {
            let raw = cmd::review_settings(common, mr);
            cmd::run_workflow(&cli, common, TriggerKind::Review, raw).await
        }
    }
}
