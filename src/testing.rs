//! In-memory doubles for the platform and agent seams.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use crate::agent::{Agent, AgentOutput, AgentRequest, Tier};
use crate::errors::{AgentError, PlatformError};
use crate::platform::{
    ChangeRequest, DiffPosition, NewChangeRequest, NoteTarget, Outcome, Platform,
};

fn rejected(what: &str, status: u16) -> PlatformError {
    PlatformError::Status {
        url: format!("mock://{}", what),
        status,
        body: format!("{{\"message\":\"{} rejected\"}}", what),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpdate {
    pub iid: u64,
    pub description: String,
    pub reviewer_ids: Option<Vec<u64>>,
}

#[derive(Default)]
struct PlatformState {
    calls: Vec<String>,
    branches: Vec<(String, String)>,
    change_requests: Vec<ChangeRequest>,
    updates: Vec<RecordedUpdate>,
    notes: Vec<(NoteTarget, String)>,
    discussions: Vec<(u64, DiffPosition, String)>,
    existing_branches: HashSet<String>,
    existing_change_request: Option<ChangeRequest>,
    fail_notes: bool,
    fail_branch: bool,
    fail_change_request: bool,
    fail_update: bool,
    fail_inline_paths: HashSet<String>,
}

/// Records every call; failures are injected per operation.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<PlatformState>,
}

impl MockPlatform {
    fn with<R>(&self, f: impl FnOnce(&mut PlatformState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut *state)
    }

    pub fn fail_notes(&self, fail: bool) {
        self.with(|s| s.fail_notes = fail);
    }

    pub fn fail_branch(&self, fail: bool) {
        self.with(|s| s.fail_branch = fail);
    }

    pub fn fail_change_request(&self, fail: bool) {
        self.with(|s| s.fail_change_request = fail);
    }

    pub fn fail_update(&self, fail: bool) {
        self.with(|s| s.fail_update = fail);
    }

    pub fn fail_inline_for(&self, path: &str) {
        self.with(|s| s.fail_inline_paths.insert(path.to_string()));
    }

    pub fn with_existing_branch(&self, name: &str) {
        self.with(|s| s.existing_branches.insert(name.to_string()));
    }

    pub fn with_existing_change_request(&self, cr: ChangeRequest) {
        self.with(|s| s.existing_change_request = Some(cr));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn branches(&self) -> Vec<(String, String)> {
        self.with(|s| s.branches.clone())
    }

    pub fn change_requests(&self) -> Vec<ChangeRequest> {
        self.with(|s| s.change_requests.clone())
    }

    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.with(|s| s.updates.clone())
    }

    pub fn notes(&self) -> Vec<(NoteTarget, String)> {
        self.with(|s| s.notes.clone())
    }

    pub fn discussions(&self) -> Vec<(u64, DiffPosition, String)> {
        self.with(|s| s.discussions.clone())
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn ensure_branch(&self, name: &str, from_ref: &str) -> Result<Outcome, PlatformError> {
        self.with(|s| {
            s.calls.push(format!("ensure_branch {} {}", name, from_ref));
            if s.fail_branch {
                return Err(rejected("branch", 500));
            }
            s.branches.push((name.to_string(), from_ref.to_string()));
            if s.existing_branches.insert(name.to_string()) {
                Ok(Outcome::Created)
            } else {
                Ok(Outcome::Exists)
            }
        })
    }

    async fn create_change_request(
        &self,
        request: &NewChangeRequest<'_>,
    ) -> Result<(Outcome, ChangeRequest), PlatformError> {
        self.with(|s| {
            s.calls
                .push(format!("create_change_request {}", request.source_branch));
            if s.fail_change_request {
                return Err(rejected("merge request", 500));
            }
            if let Some(existing) = s.existing_change_request.clone() {
                return Ok((Outcome::Exists, existing));
            }
            let cr = ChangeRequest {
                iid: 100 + s.change_requests.len() as u64,
                web_url: format!(
                    "https://gitlab.example.com/g/app/-/merge_requests/{}",
                    100 + s.change_requests.len()
                ),
                source_branch: request.source_branch.to_string(),
                target_branch: request.target_branch.to_string(),
                title: request.title.to_string(),
            };
            s.change_requests.push(cr.clone());
            Ok((Outcome::Created, cr))
        })
    }

    async fn update_change_request(
        &self,
        iid: u64,
        description: &str,
        reviewer_ids: Option<&[u64]>,
    ) -> Result<(), PlatformError> {
        self.with(|s| {
            s.calls.push(format!("update_change_request {}", iid));
            if s.fail_update {
                return Err(rejected("update", 500));
            }
            s.updates.push(RecordedUpdate {
                iid,
                description: description.to_string(),
                reviewer_ids: reviewer_ids.map(<[u64]>::to_vec),
            });
            Ok(())
        })
    }

    async fn post_note(&self, target: NoteTarget, body: &str) -> Result<(), PlatformError> {
        self.with(|s| {
            s.calls.push(format!("post_note {:?}", target));
            if s.fail_notes {
                return Err(rejected("note", 500));
            }
            s.notes.push((target, body.to_string()));
            Ok(())
        })
    }

    async fn post_inline_discussion(
        &self,
        mr_iid: u64,
        position: &DiffPosition,
        body: &str,
    ) -> Result<(), PlatformError> {
        self.with(|s| {
            s.calls.push(format!(
                "post_inline_discussion {}:{}",
                position.new_path, position.new_line
            ));
            if s.fail_inline_paths.contains(&position.new_path) {
                return Err(rejected("discussion", 400));
            }
            s.discussions
                .push((mr_iid, position.clone(), body.to_string()));
            Ok(())
        })
    }
}

type Script = Box<dyn FnOnce(&Path) -> Result<AgentOutput, AgentError> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub prompt: String,
    pub tier: Tier,
    pub allow_tools: bool,
    pub cwd: std::path::PathBuf,
}

/// Replays scripted responses in order. Each script may touch the working
/// directory the way a real agent would. Unscripted calls return empty output.
#[derive(Default)]
pub struct ScriptedAgent {
    scripts: Mutex<VecDeque<Script>>,
    invocations: Mutex<Vec<RecordedInvocation>>,
}

impl ScriptedAgent {
    pub fn then(
        self,
        script: impl FnOnce(&Path) -> Result<AgentOutput, AgentError> + Send + 'static,
    ) -> Self {
        self.scripts.lock().unwrap().push_back(Box::new(script));
        self
    }

    pub fn then_output(self, text: &str) -> Self {
        let text = text.to_string();
        self.then(move |_| Ok(AgentOutput::from_raw(text)))
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn invoke(&self, request: &AgentRequest<'_>, cwd: &Path) -> Result<AgentOutput, AgentError> {
        self.invocations.lock().unwrap().push(RecordedInvocation {
            prompt: request.prompt.to_string(),
            tier: request.tier,
            allow_tools: request.allow_tools,
            cwd: cwd.to_path_buf(),
        });
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(script) => script(cwd),
            None => Ok(AgentOutput::default()),
        }
    }
}
