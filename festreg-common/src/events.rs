//! Session event types and the broadcast EventBus
//!
//! A staged session emits an event for every observable change so a front
//! end can redraw reactively: state transitions, slot status changes,
//! upload progress and countdown ticks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// The four upload-gated submission flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    StudentRegistration,
    AccompanistRegistration,
    ManagerProfile,
    FeePayment,
}

impl FlowKind {
    pub const ALL: [FlowKind; 4] = [
        FlowKind::StudentRegistration,
        FlowKind::AccompanistRegistration,
        FlowKind::ManagerProfile,
        FlowKind::FeePayment,
    ];

    /// Storage key of the persisted session record for this flow
    pub fn key(&self) -> &'static str {
        match self {
            FlowKind::StudentRegistration => "student_registration",
            FlowKind::AccompanistRegistration => "accompanist_registration",
            FlowKind::ManagerProfile => "manager_profile",
            FlowKind::FeePayment => "fee_payment",
        }
    }

    /// Parse a storage key back into a flow
    pub fn from_key(key: &str) -> Option<FlowKind> {
        FlowKind::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Lifecycle state of a staged upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Details step; no session issued
    NotStarted,
    /// Init request in flight
    Initializing,
    /// Session issued and unexpired; slots may be uploaded
    Active,
    /// Finalize request in flight
    Finalizing,
    /// Submission accepted; session cleared
    Completed,
    /// Deadline reached; only restart or cancel are possible
    Expired,
    /// User navigated back to the form; session cleared
    Cancelled,
}

impl SessionState {
    /// Whether a new details submission may start from this state
    pub fn accepts_details(&self) -> bool {
        matches!(self, SessionState::NotStarted | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::NotStarted => "not started",
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Expired => "expired",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Status of one required upload slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Empty,
    Selected,
    Uploading,
    Succeeded,
    Failed,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotStatus::Empty => "empty",
            SlotStatus::Selected => "selected",
            SlotStatus::Uploading => "uploading",
            SlotStatus::Succeeded => "succeeded",
            SlotStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Events emitted by a staged session controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Lifecycle transition
    StateChanged {
        flow: FlowKind,
        old_state: SessionState,
        new_state: SessionState,
        timestamp: DateTime<Utc>,
    },

    /// A slot's status changed
    SlotChanged {
        flow: FlowKind,
        slot: String,
        status: SlotStatus,
        failures: u32,
    },

    /// Bytes handed to the upload transfer
    UploadProgress {
        flow: FlowKind,
        slot: String,
        percent: u8,
        bytes_sent: u64,
        bytes_total: u64,
    },

    /// One redraw tick of the countdown
    CountdownTick {
        flow: FlowKind,
        remaining_seconds: u64,
    },

    /// The session deadline passed (emitted once per session)
    Expired {
        flow: FlowKind,
        session_id: String,
    },

    /// Finalize accepted by the backend
    Completed {
        flow: FlowKind,
        session_id: String,
    },

    /// Backend reported the login token as no longer valid
    AuthExpired { flow: FlowKind },
}

/// Broadcast bus for session events
///
/// Cloning shares the underlying channel.
///
/// # Examples
///
/// ```
/// use festreg_common::events::{EventBus, FlowKind, SessionEvent};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(SessionEvent::AuthExpired { flow: FlowKind::FeePayment });
/// assert!(matches!(rx.try_recv(), Ok(SessionEvent::AuthExpired { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the absence of subscribers
    pub fn emit_lossy(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Session event dropped (no subscribers)");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
