use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    ApplyLocation, BranchType, Cred, CredentialType, Diff, DiffFormat, ErrorCode, FetchOptions,
    Oid, PushOptions, RemoteCallbacks, Repository, Signature, Tree,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::artifacts::is_artifact;
use super::changeset::ChangeSet;
use super::push::with_retry;
use crate::config::PushTunables;
use crate::errors::RepoError;
use crate::logging::redact_url;
use crate::platform::DiffRefs;

const REMOTE: &str = "origin";
const TOKEN_USERNAME: &str = "oauth2";
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Whether the working branch was resumed or started fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    /// The branch existed on the remote and is now tracked.
    Tracked,
    /// The branch was created from the base branch.
    Created,
}

/// Who commits are authored as.
#[derive(Debug, Clone)]
pub struct Identity<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

/// A freshly cloned working copy, exclusively owned by one workflow run.
pub struct Workspace {
    repo: Repository,
    root: PathBuf,
    token: Option<String>,
    /// Commit the working branch started from in this run.
    baseline: Option<Oid>,
}

/// Embed the token into an http(s) clone URL. Other URLs (local paths, ssh)
/// are returned unchanged.
pub fn authenticated_url(url: &str, token: Option<&str>) -> String {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return url.to_string();
    };
    match reqwest::Url::parse(url) {
        Ok(mut parsed) if matches!(parsed.scheme(), "http" | "https") => {
            if parsed.set_username(TOKEN_USERNAME).is_err()
                || parsed.set_password(Some(token)).is_err()
            {
                return url.to_string();
            }
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

/// Callbacks that answer credential requests with the token. Bounded so a
/// rejected token fails instead of looping.
fn remote_callbacks<'a>(token: Option<String>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut requests = 0;
    callbacks.credentials(move |_url, username, allowed| {
        requests += 1;
        match &token {
            Some(token)
                if requests <= MAX_CREDENTIAL_ATTEMPTS
                    && allowed.contains(CredentialType::USER_PASS_PLAINTEXT) =>
            {
                Cred::userpass_plaintext(username.unwrap_or(TOKEN_USERNAME), token)
            }
            _ => Err(git2::Error::from_str("authentication failed")),
        }
    });
    callbacks
}

impl Workspace {
    /// Clone `url` into `dest`, replacing anything already there.
    pub fn clone(url: &str, token: Option<&str>, dest: &Path) -> Result<Self, RepoError> {
        if dest.exists() {
            std::fs::remove_dir_all(dest).map_err(|source| RepoError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RepoError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!(url = %redact_url(url), dest = %dest.display(), "Cloning repository");
        let token = token.map(str::to_string);
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(remote_callbacks(token.clone()));
        let repo = RepoBuilder::new()
            .fetch_options(fetch)
            .clone(&authenticated_url(url, token.as_deref()), dest)
            .map_err(|e| RepoError::Clone {
                url: redact_url(url),
                message: e.message().to_string(),
            })?;

        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| RepoError::Clone {
                url: redact_url(url),
                message: "clone has no working directory".to_string(),
            })?;

        Ok(Self {
            repo,
            root,
            token,
            baseline: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn remote_tip(&self, branch: &str) -> Result<Oid, RepoError> {
        match self
            .repo
            .find_branch(&format!("{}/{}", REMOTE, branch), BranchType::Remote)
        {
            Ok(found) => Ok(found.get().peel_to_commit()?.id()),
            Err(e) if e.code() == ErrorCode::NotFound => {
                Err(RepoError::BranchNotFound(branch.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Point local `branch` at `tip`, check it out, and record `tip` as the
    /// baseline for change detection.
    fn switch_to(&mut self, branch: &str, tip: Oid) -> Result<(), RepoError> {
        let commit = self.repo.find_commit(tip)?;
        // A branch that is the current HEAD cannot be force-moved.
        self.repo.set_head_detached(tip)?;
        self.repo.branch(branch, &commit, true)?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        self.repo.set_head(&format!("refs/heads/{}", branch))?;
        self.baseline = Some(tip);
        Ok(())
    }

    /// Track the remote `branch` if it exists, otherwise create it from the
    /// remote `base`. Re-running against the same remote state lands on the
    /// same tip.
    pub fn reconcile_branch(&mut self, branch: &str, base: &str) -> Result<BranchState, RepoError> {
        let (state, tip) = match self.remote_tip(branch) {
            Ok(tip) => (BranchState::Tracked, tip),
            Err(RepoError::BranchNotFound(_)) => (BranchState::Created, self.remote_tip(base)?),
            Err(e) => return Err(e),
        };
        self.switch_to(branch, tip)?;
        if state == BranchState::Tracked {
            self.repo
                .find_branch(branch, BranchType::Local)?
                .set_upstream(Some(&format!("{}/{}", REMOTE, branch)))?;
        }
        info!(branch, base, state = ?state, tip = %tip, "Working branch ready");
        Ok(state)
    }

    /// Check out an existing remote branch. Fails when it is absent.
    pub fn checkout_existing(&mut self, branch: &str) -> Result<(), RepoError> {
        let tip = self.remote_tip(branch)?;
        self.switch_to(branch, tip)?;
        self.repo
            .find_branch(branch, BranchType::Local)?
            .set_upstream(Some(&format!("{}/{}", REMOTE, branch)))?;
        info!(branch, tip = %tip, "Checked out existing branch");
        Ok(())
    }

    /// Write a file into the working copy root.
    pub fn seed(&self, name: &str, content: &str) -> Result<PathBuf, RepoError> {
        let path = self.root.join(name);
        std::fs::write(&path, content).map_err(|source| RepoError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Up to `limit` tracked paths, sorted, for prompt context.
    pub fn sample_files(&self, limit: usize) -> Result<Vec<String>, RepoError> {
        let index = self.repo.index()?;
        let mut paths: Vec<String> = index
            .iter()
            .filter_map(|entry| String::from_utf8(entry.path).ok())
            .filter(|path| !is_artifact(path))
            .collect();
        paths.sort();
        paths.truncate(limit);
        Ok(paths)
    }

    /// Apply a unified diff to the working tree.
    pub fn apply_patch(&self, patch: &str) -> Result<(), RepoError> {
        let diff =
            Diff::from_buffer(patch.as_bytes()).map_err(|e| RepoError::Patch(e.message().to_string()))?;
        self.repo
            .apply(&diff, ApplyLocation::WorkDir, None)
            .map_err(|e| RepoError::Patch(e.message().to_string()))?;
        debug!(files = diff.deltas().len(), "Patch applied");
        Ok(())
    }

    fn baseline_tree(&self) -> Result<Tree<'_>, RepoError> {
        match self.baseline {
            Some(oid) => Ok(self.repo.find_commit(oid)?.tree()?),
            None => Ok(self.repo.head()?.peel_to_tree()?),
        }
    }

    /// Paths changed since the branch was reconciled, artifacts excluded.
    pub fn change_set(&self) -> Result<ChangeSet, RepoError> {
        ChangeSet::compute(&self.repo, &self.baseline_tree()?)
    }

    /// Stage exactly `changes` on top of the baseline and commit on HEAD.
    pub fn commit(
        &self,
        changes: &ChangeSet,
        message: &str,
        author: &Identity<'_>,
    ) -> Result<Oid, RepoError> {
        let mut index = self.repo.index()?;
        index.read_tree(&self.baseline_tree()?)?;
        for path in changes.to_stage() {
            index.add_path(Path::new(path))?;
        }
        for path in &changes.deleted {
            index.remove_path(Path::new(path))?;
        }
        index.write()?;

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let signature = Signature::now(author.name, author.email)?;
        let parent = self.repo.head()?.peel_to_commit()?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])?;
        info!(commit = %oid, files = changes.len(), "Committed changes");
        Ok(oid)
    }

    /// A single push of local `branch` to the remote branch of the same name.
    pub fn push_once(&self, branch: &str) -> Result<(), RepoError> {
        let mut remote = self.repo.find_remote(REMOTE)?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        let mut rejected: Option<String> = None;
        {
            let mut callbacks = remote_callbacks(self.token.clone());
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejected = Some(format!("{} rejected: {}", refname, message));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&[refspec.as_str()], Some(&mut options))?;
        }
        match rejected {
            Some(reason) => Err(RepoError::Git(git2::Error::from_str(&reason))),
            None => Ok(()),
        }
    }

    /// Push with the configured retry policy. Returns the attempt that succeeded.
    pub async fn push(&self, branch: &str, policy: &PushTunables) -> Result<u32, RepoError> {
        let ((), attempt) =
            with_retry(branch, policy.attempts, policy.backoff(), || self.push_once(branch)).await?;
        Ok(attempt)
    }

    /// Unified diff of `target...source` on the remote branches.
    pub fn review_diff(&self, target: &str, source: &str) -> Result<String, RepoError> {
        let target_tip = self.remote_tip(target)?;
        let source_tip = self.remote_tip(source)?;
        let base = self.repo.merge_base(target_tip, source_tip)?;
        let base_tree = self.repo.find_commit(base)?.tree()?;
        let source_tree = self.repo.find_commit(source_tip)?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&source_tree), None)?;
        let mut text = Vec::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                text.push(line.origin() as u8);
            }
            text.extend_from_slice(line.content());
            true
        })?;
        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    /// Revision triple for inline comments on `target...source`.
    pub fn diff_refs(&self, target: &str, source: &str) -> Result<DiffRefs, RepoError> {
        let target_tip = self.remote_tip(target)?;
        let source_tip = self.remote_tip(source)?;
        let merge_base = self.repo.merge_base(target_tip, source_tip)?;
        Ok(DiffRefs {
            base_sha: target_tip.to_string(),
            start_sha: merge_base.to_string(),
            head_sha: source_tip.to_string(),
        })
    }

    /// Current HEAD commit, if any.
    pub fn head_sha(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|c| c.id().to_string())
    }
}
