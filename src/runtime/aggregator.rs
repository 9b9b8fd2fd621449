//! Single-execution view over a [`SessionManager`] with progress and cancellation

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{
    Config, Error, Result, RunOptions, SessionHandle, StepRecord, StopResult, TerminalResult,
};
use crate::runtime::events::{EventBus, SessionEventKind, StepProgress};
use crate::runtime::process::ProcessLauncher;
use crate::runtime::registry::ProcessRegistry;
use crate::runtime::session::SessionManager;

/// Consumer-facing state of the current or last run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedView {
    pub is_running: bool,
    pub logs: Vec<String>,
    pub steps: Vec<StepRecord>,
    /// 1-based position of the latest finished step, 0 before the first
    pub current_step_index: usize,
    pub total_steps: usize,
    pub terminal_result: Option<TerminalResult>,
    pub last_error: Option<String>,
}

impl AggregatedView {
    pub fn passed(&self) -> bool {
        self.terminal_result.as_ref().is_some_and(|r| r.success)
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.is_failed()).count()
    }
}

/// Runs one execution at a time and accumulates its events into a view
///
/// # Examples
///
/// ```rust,no_run
/// use steprun::{Aggregator, RunOptions};
///
/// # #[tokio::main]
/// # async fn main() -> steprun::Result<()> {
/// let aggregator = Aggregator::builder().executable("apitest").build();
/// let mut progress = aggregator.subscribe_progress();
/// tokio::spawn(async move {
///     while let Some(p) = progress.recv().await {
///         println!("[{}/{}] {} {}", p.position, p.total, p.step.name, p.step.status);
///     }
/// });
///
/// let view = aggregator.execute(RunOptions::new("users.yaml")).await?;
/// println!("{} steps, error: {:?}", view.steps.len(), view.last_error);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Aggregator {
    sessions: SessionManager,
    handle: SessionHandle,
    view: Arc<RwLock<AggregatedView>>,
    in_flight: Arc<Mutex<()>>,
    progress: EventBus<StepProgress>,
}

impl Aggregator {
    /// Aggregator over real processes with the given configuration
    pub fn new(config: Config) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
    }

    /// Handle every execution of this aggregator runs on
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Underlying session manager, for additional subscribers
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Copy of the current view
    pub fn view(&self) -> AggregatedView {
        self.view.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.view.read().is_running
    }

    /// One notification per finished step, sent before the view is updated
    pub fn subscribe_progress(&self) -> mpsc::UnboundedReceiver<StepProgress> {
        self.progress.subscribe()
    }

    /// Run the tool and wait for the session to reach a terminal state
    ///
    /// Resets the view first. A launch failure or a failing run still
    /// resolves with the final view; `last_error` says what went wrong.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] when another `execute` on this aggregator is
    /// still in flight (the view is left untouched), and precondition errors
    /// from [`SessionManager::start`].
    pub async fn execute(&self, options: RunOptions) -> Result<AggregatedView> {
        let _in_flight = self
            .in_flight
            .try_lock()
            .map_err(|_| Error::already_running(self.handle.as_str()))?;

        *self.view.write() = AggregatedView {
            is_running: true,
            ..Default::default()
        };

        let mut events = self.sessions.subscribe();
        let options = RunOptions {
            handle: Some(self.handle.clone()),
            ..options
        };
        let session_id = Uuid::new_v4();
        match self.sessions.start_with_id(options, session_id).await {
            Ok(_) => {}
            // an Errored event is already queued for us
            Err(e) if e.is_launch_failure() => debug!(error = %e, "launch failed"),
            Err(e) => {
                let mut view = self.view.write();
                view.is_running = false;
                view.last_error = Some(e.to_string());
                return Err(e);
            }
        }

        while let Some(event) = events.recv().await {
            if event.session_id != session_id {
                continue;
            }
            match event.kind {
                SessionEventKind::Started => debug!(handle = %self.handle, "execution started"),
                SessionEventKind::Log { message, .. } => self.view.write().logs.push(message),
                SessionEventKind::Step {
                    position,
                    total,
                    step,
                } => {
                    self.progress.publish(StepProgress {
                        position,
                        total,
                        step: step.clone(),
                    });
                    let mut view = self.view.write();
                    view.steps.push(step);
                    view.current_step_index = position;
                    view.total_steps = total;
                }
                SessionEventKind::Completed {
                    success,
                    exit_code,
                    duration_ms,
                    cancelled,
                } => {
                    let mut view = self.view.write();
                    view.is_running = false;
                    view.terminal_result = Some(TerminalResult {
                        success,
                        exit_code,
                        duration_ms,
                    });
                    if cancelled {
                        view.last_error = Some("Execution cancelled".to_string());
                    } else if !success {
                        let message = match exit_code {
                            Some(code) => format!("Process exited with code {}", code),
                            None => "Process was terminated by a signal".to_string(),
                        };
                        view.logs.push(format!("Error: {}", message));
                        view.last_error = Some(message);
                    }
                    break;
                }
                SessionEventKind::Errored { message } => {
                    let mut view = self.view.write();
                    view.is_running = false;
                    view.logs.push(format!("Error: {}", message));
                    view.last_error = Some(message);
                    break;
                }
            }
        }

        let mut view = self.view.write();
        if view.is_running {
            warn!(handle = %self.handle, "event stream ended before a terminal event");
            view.is_running = false;
            view.last_error
                .get_or_insert_with(|| "Execution ended unexpectedly".to_string());
        }
        Ok(view.clone())
    }

    /// Stop the running execution
    ///
    /// With nothing running this reports `success: false` and changes nothing.
    pub async fn cancel(&self) -> StopResult {
        let result = self.sessions.stop(&self.handle).await;
        if result.success {
            let mut view = self.view.write();
            view.logs.push("Execution cancelled by user".to_string());
            view.is_running = false;
        }
        result
    }

    pub fn clear_logs(&self) {
        self.view.write().logs.clear();
    }

    /// Forget steps, counters, the terminal result and the last error
    pub fn clear_results(&self) {
        let mut view = self.view.write();
        view.steps.clear();
        view.current_step_index = 0;
        view.total_steps = 0;
        view.terminal_result = None;
        view.last_error = None;
    }
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("handle", &self.handle)
            .field("is_running", &self.is_running())
            .finish()
    }
}

/// Builder for [`Aggregator`]
///
/// ```rust
/// use steprun::Aggregator;
///
/// let aggregator = Aggregator::builder()
///     .executable("newman")
///     .working_dir(std::env::temp_dir())
///     .handle("nightly")
///     .build();
/// assert_eq!(aggregator.handle().as_str(), "nightly");
/// ```
#[derive(Default)]
pub struct AggregatorBuilder {
    config: Config,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    registry: Option<ProcessRegistry>,
    sessions: Option<SessionManager>,
    handle: Option<SessionHandle>,
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.config.executable = executable.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    /// Use a custom process boundary instead of real subprocesses
    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Share a registry with other session managers
    pub fn registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Reuse an existing session manager; config, launcher and registry are
    /// then ignored
    pub fn sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn handle(mut self, handle: impl Into<SessionHandle>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn build(self) -> Aggregator {
        let sessions = match self.sessions {
            Some(sessions) => sessions,
            None => match self.launcher {
                Some(launcher) => SessionManager::with_parts(
                    self.config,
                    launcher,
                    self.registry.unwrap_or_default(),
                ),
                None => SessionManager::with_parts(
                    self.config,
                    Arc::new(crate::runtime::process::TokioLauncher::new()),
                    self.registry.unwrap_or_default(),
                ),
            },
        };

        Aggregator {
            sessions,
            handle: self.handle.unwrap_or_default(),
            view: Arc::new(RwLock::new(AggregatedView::default())),
            in_flight: Arc::new(Mutex::new(())),
            progress: EventBus::new(),
        }
    }
}
