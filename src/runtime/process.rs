//! Process boundary: launching the external tool and streaming its output
//!
//! The session layer only talks to [`ProcessLauncher`]. [`TokioLauncher`]
//! is the real implementation; tests swap in a scripted one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::{Config, Error, Result, RunOptions};

/// Which pipe a line arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Output of a running process, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Line { stream: OutputStream, text: String },
    /// Always the last event; `code` is `None` when killed by a signal.
    /// `terminated` is set only when a termination request was delivered.
    Exited { code: Option<i32>, terminated: bool },
}

/// Everything needed to start the tool once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub kill_grace: Duration,
}

impl LaunchRequest {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: HashMap::new(),
            kill_grace: Duration::from_millis(5_000),
        }
    }

    /// Build the request for one run of the configured executable
    pub fn from_options(config: &Config, options: &RunOptions) -> Self {
        Self {
            program: config.executable.clone(),
            args: options.to_args(),
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
            kill_grace: config.kill_grace(),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

/// Handle used to ask a launched process to terminate
///
/// Cloneable; every clone talks to the same process.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

impl ProcessControl {
    /// Create a control handle and the receiving end a launcher must serve
    ///
    /// Each received sender must be answered once the termination signal has
    /// been issued.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<oneshot::Sender<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request termination and wait until the signal has been issued
    ///
    /// Returns `false` when the process was already gone.
    pub async fn terminate(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(ack_tx).is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// A process that has been confirmed to exist
#[derive(Debug)]
pub struct LaunchedProcess {
    pub pid: Option<u32>,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
    pub control: ProcessControl,
}

/// Starts the external tool
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launch the program, resolving once the process exists
    ///
    /// # Errors
    ///
    /// [`Error::ExecutableNotFound`] when the program cannot be resolved and
    /// [`Error::Launch`] when spawning fails.
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedProcess>;
}

/// Launcher backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedProcess> {
        let program = which::which(&request.program)
            .map_err(|_| Error::ExecutableNotFound(request.program.clone()))?;
        debug!(program = %program.display(), args = ?request.args, "launching process");

        let mut command = Command::new(&program);
        command
            .args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::launch(format!("{}: {}", program.display(), e)))?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::launch("stdout pipe was not available"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::launch("stderr pipe was not available"))?;

        let (event_tx, events) = mpsc::unbounded_channel();
        let readers = [
            tokio::spawn(forward_lines(stdout, OutputStream::Stdout, event_tx.clone())),
            tokio::spawn(forward_lines(stderr, OutputStream::Stderr, event_tx.clone())),
        ];
        let (control, requests) = ProcessControl::channel();
        tokio::spawn(supervise(child, requests, readers, event_tx, request.kill_grace));

        Ok(LaunchedProcess {
            pid,
            events,
            control,
        })
    }
}

async fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if tx.send(ProcessEvent::Line { stream, text }).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(?stream, error = %e, "reading process output failed");
                break;
            }
        }
    }
}

/// Wait for exit or a termination request, then report the exit code
///
/// `Exited` is sent only after both readers have drained, so it is always the
/// last event on the channel.
async fn supervise(
    mut child: Child,
    mut requests: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    readers: [JoinHandle<()>; 2],
    tx: mpsc::UnboundedSender<ProcessEvent>,
    grace: Duration,
) {
    let mut terminated = false;
    let status = tokio::select! {
        status = child.wait() => status,
        request = requests.recv() => match request {
            Some(ack) => {
                terminated = true;
                request_termination(&mut child);
                let _ = ack.send(());
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(pid = ?child.id(), "process ignored termination request, killing");
                        let _ = child.start_kill();
                        child.wait().await
                    }
                }
            }
            None => child.wait().await,
        },
    };
    drop(requests);

    for reader in readers {
        if terminated {
            if tokio::time::timeout(grace, reader).await.is_err() {
                warn!("output pipe still open after termination");
            }
        } else {
            let _ = reader.await;
        }
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(error = %e, "waiting for process failed");
            None
        }
    };
    debug!(?code, terminated, "process exited");
    let _ = tx.send(ProcessEvent::Exited { code, terminated });
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: the pid belongs to our child and it has not been reaped yet
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        warn!(pid, "SIGTERM failed, killing");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    let _ = child.start_kill();
}
