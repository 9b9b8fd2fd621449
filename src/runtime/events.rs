//! Session events and the fan-out bus that delivers them

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::core::{LogLevel, SessionHandle, SessionId, StepRecord};

/// One event published by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub handle: SessionHandle,
    pub session_id: SessionId,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEventKind {
    Started,
    /// One raw output line, verbatim
    Log { level: LogLevel, message: String },
    /// A step was finalized; `position` is 1-based
    #[serde(rename_all = "camelCase")]
    Step {
        position: usize,
        total: usize,
        step: StepRecord,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        success: bool,
        exit_code: Option<i32>,
        duration_ms: u64,
        cancelled: bool,
    },
    /// The process could not be run at all
    Errored { message: String },
}

impl SessionEventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Errored { .. })
    }
}

/// Progress notification for one newly finalized step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub position: usize,
    pub total: usize,
    pub step: StepRecord,
}

/// Publish/subscribe fan-out with an unbounded queue per subscriber
///
/// A slow subscriber makes its own queue grow; it never causes events to be
/// dropped for itself or anyone else. Subscribers that hang up are pruned on
/// the next publish.
#[derive(Debug)]
pub struct EventBus<T> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to all live subscribers, returning how many got it
    pub fn publish(&self, event: T) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}
