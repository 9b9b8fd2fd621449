//! Map from session handle to the process currently running in it
//!
//! The only mutable state shared between sessions. It is an ordinary value
//! passed into [`SessionManager`](crate::runtime::SessionManager), so tests
//! and embedders can share or isolate it as they like.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::core::{Error, Result, SessionHandle, SessionId};
use crate::runtime::process::ProcessControl;
use crate::runtime::session::SessionStatus;

#[derive(Debug)]
struct ActiveSession {
    session_id: SessionId,
    status: SessionStatus,
    control: Option<ProcessControl>,
    cancel: CancelFlag,
}

/// Set once a stop has been requested for a session
///
/// Shared between the registry entry and the session's output pump, so the
/// pump still sees the request after a stop has removed the entry.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Withdraw a stop that never reached the process
    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What a stop request found in the registry
#[derive(Debug)]
pub(crate) enum StopTarget {
    /// Nothing registered for the handle
    Missing,
    /// Still launching; the cancellation is recorded and honoured on attach
    Pending(SessionId),
    /// Running with a control handle to signal; clear the flag if the
    /// signal cannot be delivered
    Running(SessionId, ProcessControl, CancelFlag),
}

/// Concurrency-safe registry of active sessions
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<RwLock<HashMap<SessionHandle, ActiveSession>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the handle for a new session
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] when another session holds the handle.
    pub fn try_reserve(
        &self,
        handle: &SessionHandle,
        session_id: SessionId,
    ) -> Result<CancelFlag> {
        let mut sessions = self.inner.write();
        if sessions.contains_key(handle) {
            return Err(Error::already_running(handle.as_str()));
        }
        let cancel = CancelFlag::default();
        sessions.insert(
            handle.clone(),
            ActiveSession {
                session_id,
                status: SessionStatus::Starting,
                control: None,
                cancel: cancel.clone(),
            },
        );
        Ok(cancel)
    }

    /// Record the control handle of a confirmed process
    ///
    /// Returns `true` when a stop arrived while the session was starting; the
    /// caller must then terminate the process.
    pub(crate) fn attach(
        &self,
        handle: &SessionHandle,
        session_id: SessionId,
        control: ProcessControl,
    ) -> bool {
        let mut sessions = self.inner.write();
        match sessions.get_mut(handle) {
            Some(entry) if entry.session_id == session_id => {
                entry.control = Some(control);
                entry.status = SessionStatus::Running;
                entry.cancel.is_set()
            }
            _ => false,
        }
    }

    pub(crate) fn set_status(
        &self,
        handle: &SessionHandle,
        session_id: SessionId,
        status: SessionStatus,
    ) {
        if let Some(entry) = self.inner.write().get_mut(handle) {
            if entry.session_id == session_id {
                entry.status = status;
            }
        }
    }

    /// Mark the session as cancelled and hand back what needs signalling
    pub(crate) fn request_stop(&self, handle: &SessionHandle) -> StopTarget {
        let mut sessions = self.inner.write();
        let Some(entry) = sessions.get_mut(handle) else {
            return StopTarget::Missing;
        };
        entry.cancel.set();
        match &entry.control {
            Some(control) => {
                StopTarget::Running(entry.session_id, control.clone(), entry.cancel.clone())
            }
            None => StopTarget::Pending(entry.session_id),
        }
    }

    /// Remove the entry if it still belongs to `session_id`
    ///
    /// Safe to call from both the exit path and a racing stop; only the first
    /// call removes anything and a newer session's entry is never touched.
    pub fn remove(&self, handle: &SessionHandle, session_id: SessionId) -> bool {
        let mut sessions = self.inner.write();
        match sessions.get(handle) {
            Some(entry) if entry.session_id == session_id => {
                sessions.remove(handle);
                debug!(%handle, %session_id, "session removed from registry");
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, handle: &SessionHandle) -> bool {
        self.inner.read().contains_key(handle)
    }

    pub fn session_id(&self, handle: &SessionHandle) -> Option<SessionId> {
        self.inner.read().get(handle).map(|entry| entry.session_id)
    }

    pub fn status(&self, handle: &SessionHandle) -> Option<SessionStatus> {
        self.inner.read().get(handle).map(|entry| entry.status)
    }

    pub fn handles(&self) -> Vec<SessionHandle> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
