//! Execution sessions: one subprocess lifecycle per handle
//!
//! [`SessionManager::start`] launches the tool and spawns a single pump task
//! per session. The pump is the only place output lines are handled, so the
//! raw log, the parser and subscribers all see lines in the same order.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{
    Config, LogLevel, Result, RunOptions, SessionHandle, SessionId, StepRecord, StopResult,
};
use crate::runtime::events::{EventBus, SessionEvent, SessionEventKind};
use crate::runtime::parser::{ParserOptions, StreamParser};
use crate::runtime::process::{
    LaunchRequest, LaunchedProcess, OutputStream, ProcessEvent, ProcessLauncher, TokioLauncher,
};
use crate::runtime::registry::{CancelFlag, ProcessRegistry, StopTarget};

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Point-in-time copy of a session's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub handle: SessionHandle,
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub raw_log: Vec<String>,
    pub steps: Vec<StepRecord>,
}

/// Starts, stops and observes sessions
///
/// Cheap to clone; clones share the registry, the event bus and the
/// snapshots.
///
/// # Examples
///
/// ```rust,no_run
/// use steprun::{Config, RunOptions, SessionManager};
///
/// # #[tokio::main]
/// # async fn main() -> steprun::Result<()> {
/// let sessions = SessionManager::new(Config::default());
/// let mut events = sessions.subscribe();
///
/// let handle = sessions.start(RunOptions::new("users.yaml")).await?;
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event.kind);
///     if event.kind.is_terminal() {
///         break;
///     }
/// }
/// # let _ = handle;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<Config>,
    launcher: Arc<dyn ProcessLauncher>,
    registry: ProcessRegistry,
    bus: EventBus<SessionEvent>,
    snapshots: Arc<RwLock<HashMap<SessionHandle, SessionSnapshot>>>,
}

impl SessionManager {
    /// Manager that launches real processes with a private registry
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, Arc::new(TokioLauncher::new()), ProcessRegistry::new())
    }

    /// Manager with an injected launcher and registry
    pub fn with_parts(
        config: Config,
        launcher: Arc<dyn ProcessLauncher>,
        registry: ProcessRegistry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            launcher,
            registry,
            bus: EventBus::new(),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Receive every event published from now on, for all handles
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn is_running(&self, handle: &SessionHandle) -> bool {
        self.registry.contains(handle)
    }

    /// Latest state of the most recent session on `handle`
    pub fn snapshot(&self, handle: &SessionHandle) -> Option<SessionSnapshot> {
        self.snapshots.read().get(handle).cloned()
    }

    /// Launch the tool for `options`
    ///
    /// Resolves once the process is confirmed to exist. Output is processed in
    /// the background and reported through [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOptions`](crate::Error::InvalidOptions) or
    ///   [`Error::InvalidConfig`](crate::Error::InvalidConfig) before anything
    ///   is launched
    /// - [`Error::AlreadyRunning`](crate::Error::AlreadyRunning) when the
    ///   handle is busy; no second process is started
    /// - the launcher's error when the process could not be started, after an
    ///   `Errored` event has been published
    pub async fn start(&self, options: RunOptions) -> Result<SessionHandle> {
        self.start_with_id(options, Uuid::new_v4()).await
    }

    /// [`start`](Self::start) with a caller-chosen session id
    ///
    /// Every event of the session, including an `Errored` launch failure,
    /// carries `session_id`, so callers can subscribe first and filter on an
    /// id they already know.
    pub async fn start_with_id(
        &self,
        options: RunOptions,
        session_id: SessionId,
    ) -> Result<SessionHandle> {
        options.validate()?;
        self.config.validate()?;

        let handle = options.handle.clone().unwrap_or_default();
        let cancel = self.registry.try_reserve(&handle, session_id)?;
        self.snapshots.write().insert(
            handle.clone(),
            SessionSnapshot {
                handle: handle.clone(),
                session_id,
                status: SessionStatus::Starting,
                raw_log: Vec::new(),
                steps: Vec::new(),
            },
        );

        let request = LaunchRequest::from_options(&self.config, &options);
        let started_at = Instant::now();
        let LaunchedProcess {
            pid,
            events,
            control,
        } = match self.launcher.launch(request).await {
            Ok(process) => process,
            Err(e) => {
                warn!(%handle, error = %e, "launch failed");
                self.set_status(&handle, session_id, SessionStatus::Failed);
                self.registry.remove(&handle, session_id);
                self.publish(
                    &handle,
                    session_id,
                    SessionEventKind::Errored {
                        message: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        let cancel_pending = self.registry.attach(&handle, session_id, control.clone());
        self.set_status(&handle, session_id, SessionStatus::Running);
        info!(%handle, %session_id, ?pid, "session started");
        self.publish(&handle, session_id, SessionEventKind::Started);

        if cancel_pending {
            debug!(%handle, "stop arrived while starting, terminating");
            control.terminate().await;
        }

        tokio::spawn(self.clone().pump(handle.clone(), session_id, events, cancel, started_at));
        Ok(handle)
    }

    /// Ask the process running on `handle` to terminate
    ///
    /// Returns once the signal has been issued, not once the process has
    /// exited. Unknown or finished handles give `success: false`.
    pub async fn stop(&self, handle: &SessionHandle) -> StopResult {
        match self.registry.request_stop(handle) {
            StopTarget::Missing => StopResult::not_found("No active execution found"),
            StopTarget::Pending(session_id) => {
                info!(%handle, %session_id, "stop requested while starting");
                StopResult::stopped("Execution will be cancelled as soon as it starts")
            }
            StopTarget::Running(session_id, control, cancel) => {
                let signalled = control.terminate().await;
                if signalled {
                    self.registry.remove(handle, session_id);
                    info!(%handle, %session_id, "session stopped");
                    StopResult::stopped("Execution stopped")
                } else {
                    cancel.clear();
                    debug!(%handle, %session_id, "stop arrived after exit");
                    StopResult::not_found("Execution already finished")
                }
            }
        }
    }

    fn publish(&self, handle: &SessionHandle, session_id: SessionId, kind: SessionEventKind) {
        self.bus.publish(SessionEvent {
            handle: handle.clone(),
            session_id,
            kind,
        });
    }

    fn set_status(&self, handle: &SessionHandle, session_id: SessionId, status: SessionStatus) {
        self.registry.set_status(handle, session_id, status);
        self.update_snapshot(handle, session_id, |snapshot| snapshot.status = status);
    }

    fn update_snapshot(
        &self,
        handle: &SessionHandle,
        session_id: SessionId,
        update: impl FnOnce(&mut SessionSnapshot),
    ) {
        if let Some(snapshot) = self.snapshots.write().get_mut(handle) {
            if snapshot.session_id == session_id {
                update(snapshot);
            }
        }
    }

    /// Publish steps finalized since the last call
    fn emit_new_steps(
        &self,
        handle: &SessionHandle,
        session_id: SessionId,
        parser: &StreamParser,
        emitted: &mut usize,
    ) {
        let steps = parser.steps();
        if steps.len() <= *emitted {
            return;
        }
        let declared = parser.declared_total().unwrap_or(0) as usize;
        let total = declared.max(steps.len());

        for (offset, step) in steps[*emitted..].iter().enumerate() {
            self.update_snapshot(handle, session_id, |snapshot| {
                snapshot.steps.push(step.clone())
            });
            self.publish(
                handle,
                session_id,
                SessionEventKind::Step {
                    position: *emitted + offset + 1,
                    total,
                    step: step.clone(),
                },
            );
        }
        *emitted = steps.len();
    }

    async fn pump(
        self,
        handle: SessionHandle,
        session_id: SessionId,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
        cancel: CancelFlag,
        started_at: Instant,
    ) {
        let mut parser = StreamParser::with_options(ParserOptions::from(self.config.as_ref()));
        let mut emitted = 0;
        let mut exit = None;

        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Line { stream, text } => {
                    let level = match stream {
                        OutputStream::Stdout => LogLevel::Info,
                        OutputStream::Stderr => LogLevel::Error,
                    };
                    self.update_snapshot(&handle, session_id, |snapshot| {
                        snapshot.raw_log.push(text.clone())
                    });
                    self.publish(
                        &handle,
                        session_id,
                        SessionEventKind::Log {
                            level,
                            message: text.clone(),
                        },
                    );
                    parser.add_line(&text);
                    self.emit_new_steps(&handle, session_id, &parser, &mut emitted);
                }
                ProcessEvent::Exited { code, terminated } => {
                    exit = Some((code, terminated));
                    break;
                }
            }
        }
        if exit.is_none() {
            warn!(%handle, %session_id, "process output closed without an exit status");
        }

        parser.get_steps();
        self.emit_new_steps(&handle, session_id, &parser, &mut emitted);

        let (exit_code, cancelled) = match exit {
            Some((code, terminated)) => (code, terminated),
            None => (None, cancel.is_set()),
        };
        let success = !cancelled && exit_code == Some(0);
        let duration_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.set_status(
            &handle,
            session_id,
            if cancelled {
                SessionStatus::Cancelled
            } else {
                SessionStatus::Completed
            },
        );
        self.registry.remove(&handle, session_id);
        info!(
            %handle,
            %session_id,
            success,
            ?exit_code,
            steps = emitted,
            cancelled,
            "session finished"
        );
        self.publish(
            &handle,
            session_id,
            SessionEventKind::Completed {
                success,
                exit_code,
                duration_ms,
                cancelled,
            },
        );
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("active", &self.registry.handles())
            .finish()
    }
}
