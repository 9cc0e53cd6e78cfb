//! Agent backed by an external CLI process (`claude --print` by default).

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Agent, AgentOutput, AgentRequest};
use crate::config::AgentTunables;
use crate::errors::AgentError;
use crate::repo::artifacts::{AGENT_CLEAN_LOG, AGENT_LOG};

/// How long to wait for the output pipes to drain after the process ended
/// or was killed. A grandchild can keep a pipe open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

pub struct CliAgent {
    tunables: AgentTunables,
}

impl CliAgent {
    pub fn new(tunables: AgentTunables) -> Self {
        Self { tunables }
    }

    fn args(&self, allow_tools: bool) -> Vec<&str> {
        let extra = if allow_tools {
            &self.tunables.tool_args
        } else {
            &self.tunables.readonly_args
        };
        self.tunables
            .args
            .iter()
            .chain(extra.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Copy a pipe into a shared buffer chunk by chunk, so whatever arrived
/// before a timeout is still available.
fn spawn_reader<R>(mut pipe: R, buffer: SharedBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    })
}

/// Write the prompt and close stdin. Dropping the pipe is the agent's EOF.
fn spawn_writer(mut stdin: ChildStdin, prompt: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        // An agent that exits without reading its prompt closes the pipe
        // early; the exit status reports that failure.
        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
            debug!(error = %e, "Agent closed stdin early");
        }
    })
}

async fn drain(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        let abort = reader.abort_handle();
        if timeout(DRAIN_GRACE, reader).await.is_err() {
            abort.abort();
        }
    }
}

fn take(buffer: &SharedBuffer) -> String {
    buffer
        .lock()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn combine(stdout: String, stderr: String) -> String {
    if stderr.trim().is_empty() {
        stdout
    } else if stdout.is_empty() {
        stderr
    } else {
        format!("{}\n{}", stdout.trim_end_matches('\n'), stderr)
    }
}

/// Keep the agent's output next to the work for diagnosis. These files are
/// intermediate artifacts and never staged.
async fn write_logs(cwd: &Path, output: &AgentOutput) {
    for (name, content) in [(AGENT_LOG, &output.raw), (AGENT_CLEAN_LOG, &output.cleaned)] {
        if let Err(e) = tokio::fs::write(cwd.join(name), content).await {
            warn!(file = name, error = %e, "Failed to write agent log");
        }
    }
}

#[async_trait]
impl Agent for CliAgent {
    async fn invoke(&self, request: &AgentRequest<'_>, cwd: &Path) -> Result<AgentOutput, AgentError> {
        let limit = request.tier.timeout(&self.tunables);
        let args = self.args(request.allow_tools);
        info!(
            command = %self.tunables.command,
            tier = ?request.tier,
            timeout_secs = limit.as_secs(),
            allow_tools = request.allow_tools,
            prompt_len = request.prompt.len(),
            "Invoking agent"
        );

        let mut child = Command::new(&self.tunables.command)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AgentError::Spawn {
                command: self.tunables.command.clone(),
                source,
            })?;

        let stdout_buf = SharedBuffer::default();
        let stderr_buf = SharedBuffer::default();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, stdout_buf.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, stderr_buf.clone()));
        }

        // The prompt is fed from its own task: an agent that never reads stdin
        // would otherwise block a large write before the timeout starts.
        let writer = child
            .stdin
            .take()
            .map(|stdin| spawn_writer(stdin, request.prompt.to_owned()));

        let started = Instant::now();
        let waited = timeout(limit, child.wait()).await;
        if let Some(writer) = writer {
            writer.abort();
        }
        let status = match waited {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(timeout_secs = limit.as_secs(), "Agent timed out, terminating");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill agent process");
                }
                None
            }
        };
        drain(readers).await;

        let output = AgentOutput::from_raw(combine(take(&stdout_buf), take(&stderr_buf)));
        write_logs(cwd, &output).await;

        match status {
            None => Err(AgentError::Timeout {
                secs: limit.as_secs(),
                output: output.cleaned,
            }),
            Some(status) if !status.success() => {
                let code = status.code().unwrap_or(-1);
                warn!(code, "Agent exited with failure");
                Err(AgentError::NonZeroExit {
                    code,
                    output: output.cleaned,
                })
            }
            Some(_) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    output_len = output.cleaned.len(),
                    "Agent finished"
                );
                Ok(output)
            }
        }
    }
}
