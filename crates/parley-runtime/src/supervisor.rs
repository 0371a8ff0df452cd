use parley_config::ParleyConfig;
use parley_core::{ExitInfo, ParleyError, Result, ThreadId};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Placeholder in `invoker.args` replaced by the inbound message.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Lifecycle of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Pending,
    Running,
    Completed,
    TimedOut,
    Crashed,
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Crashed => "crashed",
        })
    }
}

/// The reasoning process's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    /// Trimmed stdout.
    pub text: String,
    pub elapsed: Duration,
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed(AgentReply),
    TimedOut { secs: u64 },
    Crashed(ExitInfo),
}

impl InvocationOutcome {
    pub fn state(&self) -> InvocationState {
        match self {
            Self::Completed(_) => InvocationState::Completed,
            Self::TimedOut { .. } => InvocationState::TimedOut,
            Self::Crashed(_) => InvocationState::Crashed,
        }
    }

    pub fn into_result(self) -> Result<AgentReply> {
        match self {
            Self::Completed(reply) => Ok(reply),
            Self::TimedOut { secs } => Err(ParleyError::Timeout { secs }),
            Self::Crashed(exit) => Err(ParleyError::ProcessFailure(exit)),
        }
    }
}

/// Spawns and supervises the external reasoning process.
///
/// The child runs in its own process group with the agent workdir as cwd and
/// the composed context on stdin. On timeout the whole group is killed, so
/// tools the process started do not outlive it.
#[derive(Debug, Clone)]
pub struct InvocationSupervisor {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    env: Vec<(String, String)>,
}

impl InvocationSupervisor {
    pub fn new(program: impl Into<String>, args: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            workdir: workdir.into(),
            env: Vec::new(),
        }
    }

    pub fn from_config(config: &ParleyConfig) -> Self {
        let mut supervisor = Self::new(
            &config.invoker.program,
            config.invoker.args.clone(),
            &config.agent.workdir,
        );
        if let Some(key) = &config.credentials.api_key {
            supervisor = supervisor.with_env(&config.crm.api_key_env, key);
        }
        supervisor
    }

    /// Extra environment for every child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn render_args(&self, message: &str) -> Vec<String> {
        if self.args.iter().any(|a| a.contains(PROMPT_PLACEHOLDER)) {
            self.args
                .iter()
                .map(|a| a.replace(PROMPT_PLACEHOLDER, message))
                .collect()
        } else {
            let mut args = self.args.clone();
            args.push(message.to_string());
            args
        }
    }

    /// Run the reasoning process once for `thread`.
    pub async fn invoke(
        &self,
        thread: &ThreadId,
        context: &str,
        message: &str,
        timeout: Duration,
    ) -> InvocationOutcome {
        debug!(thread_id = %thread, state = %InvocationState::Pending, program = %self.program, "invocation");

        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(message))
            .current_dir(&self.workdir)
            .env("PARLEY_THREAD_ID", thread.as_str())
            .env(
                "PARLEY_CONTEXT_DIR",
                self.workdir.join("dynamic").join(thread.as_str()),
            )
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(thread_id = %thread, program = %self.program, error = %e, "failed to spawn reasoning process");
                return InvocationOutcome::Crashed(ExitInfo::spawn_failed(&e));
            }
        };
        let pid = child.id();
        info!(thread_id = %thread, state = %InvocationState::Running, pid, "invocation");

        if let Some(mut stdin) = child.stdin.take() {
            let context = context.to_string();
            let thread = thread.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(context.as_bytes()).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        debug!(thread_id = %thread, error = %e, "failed to write context to stdin");
                    }
                }
            });
        }

        let stdout = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
        let stderr = child.stderr.take().map(|err| tokio::spawn(read_all(err)));
        let deadline = tokio::time::Instant::now() + timeout;

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(format!("failed to wait for process: {e}")),
            Err(_) => {
                terminate(&mut child, pid, thread).await;
                abort_readers([stdout, stderr]);
                return finish(thread, InvocationOutcome::TimedOut { secs: timeout.as_secs() });
            }
        };

        // Descendants may hold the pipes open after the child exits.
        let output = tokio::time::timeout_at(deadline, async {
            (collect(stdout).await, collect(stderr).await)
        })
        .await;
        let (stdout, stderr) = match output {
            Ok(streams) => streams,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_group(pid);
                }
                return finish(thread, InvocationOutcome::TimedOut { secs: timeout.as_secs() });
            }
        };

        let outcome = match status {
            Err(detail) => InvocationOutcome::Crashed(ExitInfo {
                code: None,
                signal: None,
                detail,
            }),
            Ok(status) if status.success() => InvocationOutcome::Completed(AgentReply {
                text: String::from_utf8_lossy(&stdout).trim().to_string(),
                elapsed: started.elapsed(),
            }),
            Ok(status) => {
                let exit = ExitInfo {
                    code: status.code(),
                    signal: status.signal(),
                    detail: String::new(),
                };
                InvocationOutcome::Crashed(exit.with_detail(&String::from_utf8_lossy(&stderr)))
            }
        };
        finish(thread, outcome)
    }
}

fn finish(thread: &ThreadId, outcome: InvocationOutcome) -> InvocationOutcome {
    match &outcome {
        InvocationOutcome::Completed(reply) => info!(
            thread_id = %thread,
            state = %outcome.state(),
            elapsed_ms = reply.elapsed.as_millis() as u64,
            chars = reply.text.len(),
            "invocation"
        ),
        InvocationOutcome::TimedOut { secs } => {
            warn!(thread_id = %thread, state = %outcome.state(), secs, "invocation")
        }
        InvocationOutcome::Crashed(exit) => {
            warn!(thread_id = %thread, state = %outcome.state(), exit = %exit, "invocation")
        }
    }
    outcome
}

async fn read_all<R: AsyncRead + Unpin>(mut stream: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        debug!(error = %e, "failed to read process output");
    }
    buf
}

async fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

fn abort_readers<const N: usize>(readers: [Option<JoinHandle<Vec<u8>>>; N]) {
    for reader in readers.into_iter().flatten() {
        reader.abort();
    }
}

/// Kill the whole group while `child` is still unreaped, so its pid
/// (and therefore the group id) cannot have been reused.
async fn terminate(child: &mut Child, pid: Option<u32>, thread: &ThreadId) {
    if let Some(pid) = pid {
        kill_group(pid);
    }
    if let Err(e) = child.kill().await {
        debug!(thread_id = %thread, error = %e, "failed to reap timed out process");
    }
}

/// SIGKILL the child's process group. The child leads its own group.
fn kill_group(pid: u32) {
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}
