//! Observable "who is working right now" status.
//!
//! Executors and the orchestrator report transitions through a
//! [`StatusReporter`] they are handed explicitly. [`StatusBoard`] is the
//! process-wide implementation the broker exposes for polling: one slot,
//! last writer wins. Concurrent requests sharing a board will overwrite each
//! other's status; it is display state only and nothing reads it for control
//! flow. Callers that need isolation pass their own reporter.

use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityState {
    Idle,
    Planning,
    Running,
    Completed,
    Failed,
}

/// Snapshot of the most recent activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveStatus {
    pub name: String,
    pub status: ActivityState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

impl ActiveStatus {
    pub fn idle() -> Self {
        Self {
            name: String::new(),
            status: ActivityState::Idle,
            task: None,
        }
    }

    pub fn new(name: impl Into<String>, status: ActivityState, task: Option<&str>) -> Self {
        Self {
            name: name.into(),
            status,
            task: task.map(str::to_string),
        }
    }
}

pub trait StatusReporter: Send + Sync {
    fn report(&self, status: ActiveStatus);
}

/// Discards every report.
pub struct NoopStatus;

impl StatusReporter for NoopStatus {
    fn report(&self, _status: ActiveStatus) {}
}

/// Single-slot, last-writer-wins status backed by a watch channel.
pub struct StatusBoard {
    tx: watch::Sender<ActiveStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ActiveStatus::idle());
        Self { tx }
    }

    pub fn current(&self) -> ActiveStatus {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every change.
    pub fn subscribe(&self) -> watch::Receiver<ActiveStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter for StatusBoard {
    fn report(&self, status: ActiveStatus) {
        // send_replace stores the value even with no receivers attached.
        self.tx.send_replace(status);
    }
}

/// Keeps every report in order.
#[derive(Default)]
pub struct RecordingStatus {
    history: Mutex<Vec<ActiveStatus>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ActiveStatus> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl StatusReporter for RecordingStatus {
    fn report(&self, status: ActiveStatus) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(status);
    }
}
