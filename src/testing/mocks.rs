//! Mock implementations of the process boundary

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use crate::core::{Error, Result};
use crate::runtime::events::SessionEvent;
use crate::runtime::process::{
    LaunchRequest, LaunchedProcess, OutputStream, ProcessControl, ProcessEvent, ProcessLauncher,
};

/// Launcher that replays a fixed script instead of running anything
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    lines: Vec<(OutputStream, String)>,
    exit_code: Option<i32>,
    launch_error: Option<String>,
    hold_open: bool,
    gate: Option<Arc<Notify>>,
    launches: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<LaunchRequest>>>,
}

impl MockLauncher {
    /// Script that exits 0 without output
    pub fn new() -> Self {
        Self {
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn stdout(mut self, line: impl Into<String>) -> Self {
        self.lines.push((OutputStream::Stdout, line.into()));
        self
    }

    pub fn stderr(mut self, line: impl Into<String>) -> Self {
        self.lines.push((OutputStream::Stderr, line.into()));
        self
    }

    pub fn stdout_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines
            .extend(lines.into_iter().map(|l| (OutputStream::Stdout, l.into())));
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Fail every launch with a launch error
    pub fn fail_launch(mut self, message: impl Into<String>) -> Self {
        self.launch_error = Some(message.into());
        self
    }

    /// Keep the process alive after the script until it is terminated
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Block `launch` until the returned notifier is signalled
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LaunchRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl ProcessLauncher for MockLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedProcess> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = &self.launch_error {
            return Err(Error::launch(message.clone()));
        }

        let (tx, events) = mpsc::unbounded_channel();
        let (control, mut requests) = ProcessControl::channel();
        let lines = self.lines.clone();
        let exit_code = self.exit_code;
        let hold_open = self.hold_open;

        tokio::spawn(async move {
            for (stream, text) in lines {
                let _ = tx.send(ProcessEvent::Line { stream, text });
            }
            let (code, terminated) = if hold_open {
                match requests.recv().await {
                    Some(ack) => {
                        let _ = ack.send(());
                        (None, true)
                    }
                    None => (exit_code, false),
                }
            } else {
                (exit_code, false)
            };
            let _ = tx.send(ProcessEvent::Exited { code, terminated });
        });

        Ok(LaunchedProcess {
            pid: Some(4242),
            events,
            control,
        })
    }
}

/// Drain events until the first terminal one, failing after `timeout`
pub async fn collect_until_terminal(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    timeout: Duration,
) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    let drain = async {
        while let Some(event) = events.recv().await {
            let terminal = event.kind.is_terminal();
            out.push(event);
            if terminal {
                break;
            }
        }
    };
    tokio::time::timeout(timeout, drain)
        .await
        .expect("session did not reach a terminal event in time");
    out
}
