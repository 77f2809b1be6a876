use crate::error::{CaptureError, ScancamError};
use crate::events::{EventBus, ScannerEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    Photo,
    Video,
}

/// Capture state machine. Jobs only move forward and return to `Idle` when
/// they end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    AwaitingCameraOpen,
    InProgress,
    /// Video only: waiting for the recorder to finalize the file
    Finalizing,
}

impl CaptureState {
    fn rank(&self) -> u8 {
        match self {
            CaptureState::Idle => 0,
            CaptureState::AwaitingCameraOpen => 1,
            CaptureState::InProgress => 2,
            CaptureState::Finalizing => 3,
        }
    }

    pub fn can_advance_to(&self, next: CaptureState, kind: CaptureKind) -> bool {
        match next {
            CaptureState::Idle => *self != CaptureState::Idle,
            CaptureState::Finalizing if kind == CaptureKind::Photo => false,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::AwaitingCameraOpen => "awaiting_camera_open",
            CaptureState::InProgress => "in_progress",
            CaptureState::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureJob {
    pub id: u64,
    pub kind: CaptureKind,
    pub state: CaptureState,
    pub output: Option<PathBuf>,
}

impl CaptureJob {
    pub fn advance(&mut self, next: CaptureState) -> Result<(), CaptureError> {
        if !self.state.can_advance_to(next, self.kind) {
            return Err(CaptureError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("{:?} capture {}: {} -> {}", self.kind, self.id, self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Holds the single capture job a session may run at a time
#[derive(Debug, Default)]
pub struct CaptureSlot {
    job: Mutex<Option<CaptureJob>>,
    next_id: Mutex<u64>,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, failing when a job is already in flight
    pub fn begin(&self, kind: CaptureKind) -> Result<u64, ScancamError> {
        let mut job = self.job.lock();
        if job.is_some() {
            return Err(ScancamError::CaptureInProgress);
        }

        let id = {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            *next_id
        };
        *job = Some(CaptureJob {
            id,
            kind,
            state: CaptureState::Idle,
            output: None,
        });
        Ok(id)
    }

    /// Move job `id` to `next`. Returns `Ok(false)` when the job is no longer
    /// current, so stale completions become no-ops.
    pub fn advance(&self, id: u64, next: CaptureState) -> Result<bool, CaptureError> {
        match self.job.lock().as_mut() {
            Some(job) if job.id == id => job.advance(next).map(|_| true),
            _ => Ok(false),
        }
    }

    pub fn set_output(&self, id: u64, output: PathBuf) {
        if let Some(job) = self.job.lock().as_mut().filter(|job| job.id == id) {
            job.output = Some(output);
        }
    }

    /// Clear job `id` once it ended
    pub fn finish(&self, id: u64) -> Option<CaptureJob> {
        let mut slot = self.job.lock();
        if slot.as_ref().map(|job| job.id) != Some(id) {
            return None;
        }
        slot.take().map(|mut job| {
            job.state = CaptureState::Idle;
            job
        })
    }

    /// Clear whatever job is current, for teardown
    pub fn abandon(&self) -> Option<CaptureJob> {
        self.job.lock().take()
    }

    pub fn is_busy(&self) -> bool {
        self.job.lock().is_some()
    }
}

/// Terminal result of a capture job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Finished { path: PathBuf, rotation_degrees: u16 },
    Failed { reason: String },
}

impl CaptureOutcome {
    pub fn failed(reason: impl fmt::Display) -> Self {
        CaptureOutcome::Failed {
            reason: reason.to_string(),
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            CaptureOutcome::Finished { path, .. } => Some(path),
            CaptureOutcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CaptureOutcome::Finished { .. })
    }
}

/// Caller side of a capture job
#[derive(Debug)]
pub struct CaptureHandle {
    id: u64,
    kind: CaptureKind,
    receiver: oneshot::Receiver<CaptureOutcome>,
}

impl CaptureHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    /// Wait for the single outcome of the job
    pub async fn wait(self) -> CaptureOutcome {
        self.receiver.await.unwrap_or_else(|_| {
            CaptureOutcome::failed(CaptureError::Abandoned {
                reason: "capture task ended without an outcome".to_string(),
            })
        })
    }
}

/// Job side of a capture: delivers the outcome exactly once, to the handle
/// and to the event bus
pub(crate) struct CaptureReporter {
    kind: CaptureKind,
    sender: oneshot::Sender<CaptureOutcome>,
    event_bus: EventBus,
}

impl CaptureReporter {
    pub(crate) fn channel(id: u64, kind: CaptureKind, event_bus: EventBus) -> (Self, CaptureHandle) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                kind,
                sender,
                event_bus,
            },
            CaptureHandle { id, kind, receiver },
        )
    }

    pub(crate) fn report(self, outcome: CaptureOutcome) {
        let event = match &outcome {
            CaptureOutcome::Finished {
                path,
                rotation_degrees,
            } => ScannerEvent::CaptureFinished {
                kind: self.kind,
                path: path.clone(),
                rotation_degrees: *rotation_degrees,
            },
            CaptureOutcome::Failed { reason } => ScannerEvent::CaptureFailed {
                kind: self.kind,
                reason: reason.clone(),
            },
        };
        self.event_bus.publish(event);

        if self.sender.send(outcome).is_err() {
            debug!("{:?} capture handle dropped before the outcome arrived", self.kind);
        }
    }
}
