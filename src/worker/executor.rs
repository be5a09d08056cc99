use std::collections::BTreeMap;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EvaluatorConfig;

/// Signal sent to an evaluator that exceeds its timeout.
pub const TIMEOUT_SIGNAL: Signal = Signal::SIGTERM;

/// Parameters for one evaluator run.
#[derive(Debug, Clone, Copy)]
pub struct ExecRequest<'a> {
    pub job_id: Uuid,
    pub input_path: &'a Path,
    pub charm_power: u32,
    pub weights: &'a BTreeMap<String, String>,
}

/// How the evaluator process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    Exited(i32),
    /// Killed by a signal; `timed_out` is set when we sent it
    Signaled { signal: i32, timed_out: bool },
    /// The process could not be started (or waited on)
    SpawnFailed(String),
}

/// Raw outcome of an evaluator run with captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: ProcessStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn exited(code: i32, stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: ProcessStatus::Exited(code),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::SpawnFailed(message.into()),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// Runs the evaluator for one job. Implementations must always return an
/// outcome; failures are encoded in [`ProcessStatus`].
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(&self, request: ExecRequest<'_>) -> ProcessOutput;
}

/// Command line for the evaluator in bot mode.
pub fn evaluator_args(request: &ExecRequest<'_>) -> Vec<String> {
    let mut args = vec![
        "--bot-mode".to_string(),
        "--in".to_string(),
        request.input_path.to_string_lossy().into_owned(),
        "--config-charm-power".to_string(),
        request.charm_power.to_string(),
    ];

    for (effect, weight) in request.weights {
        args.push(format!("--weight-{}", effect));
        args.push(weight.clone());
    }

    args
}

/// Spawns the external evaluator binary with a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct EvaluatorExecutor {
    config: EvaluatorConfig,
}

impl EvaluatorExecutor {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    async fn wait(&self, job_id: Uuid, child: &mut Child) -> ProcessStatus {
        let waited = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(result) => result.map(|status| (status, false)),
            Err(_) => {
                tracing::warn!(
                    job_id = %job_id,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Evaluator timed out, terminating"
                );
                self.terminate(job_id, child)
                    .await
                    .map(|status| (status, true))
            }
        };

        match waited {
            Ok((status, timed_out)) => classify(status, timed_out),
            Err(e) => ProcessStatus::SpawnFailed(e.to_string()),
        }
    }

    async fn terminate(&self, job_id: Uuid, child: &mut Child) -> std::io::Result<ExitStatus> {
        if let Some(pid) = child.id() {
            match signal::kill(Pid::from_raw(pid as i32), TIMEOUT_SIGNAL) {
                Ok(()) => {
                    if let Ok(status) =
                        tokio::time::timeout(self.config.kill_grace, child.wait()).await
                    {
                        return status;
                    }
                    tracing::warn!(job_id = %job_id, "Evaluator ignored SIGTERM, killing");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to signal evaluator");
                }
            }
        }

        child.kill().await?;
        child.wait().await
    }

    /// Output held open by a stray grandchild is cut off after the grace period.
    async fn collect(&self, reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
        let Some(mut handle) = reader else {
            return Vec::new();
        };
        match tokio::time::timeout(self.config.kill_grace, &mut handle).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Output reader task failed");
                Vec::new()
            }
            Err(_) => {
                handle.abort();
                tracing::warn!("Evaluator output still open after exit, discarding");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Executor for EvaluatorExecutor {
    async fn execute(&self, request: ExecRequest<'_>) -> ProcessOutput {
        let args = evaluator_args(&request);
        tracing::info!(
            target: "audit",
            event = "eval_queue.spawn",
            job_id = %request.job_id,
            binary = %self.config.binary.display(),
            args = ?args,
        );

        let mut child = match Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job_id = %request.job_id, error = %e, "Failed to spawn evaluator");
                return ProcessOutput::spawn_failed(e.to_string());
            }
        };

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = self.wait(request.job_id, &mut child).await;

        ProcessOutput {
            status,
            stdout: self.collect(stdout).await,
            stderr: self.collect(stderr).await,
        }
    }
}

fn spawn_reader<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::warn!(error = %e, "Failed to read evaluator output");
        }
        buf
    })
}

fn classify(status: ExitStatus, timed_out: bool) -> ProcessStatus {
    if let Some(code) = status.code() {
        ProcessStatus::Exited(code)
    } else if let Some(signal) = status.signal() {
        ProcessStatus::Signaled { signal, timed_out }
    } else {
        ProcessStatus::SpawnFailed(format!("unrecognized exit status {}", status))
    }
}

/// Conventional name of a raw signal number, e.g. `SIGKILL`.
pub fn signal_name(signal: i32) -> String {
    Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {}", signal))
}
