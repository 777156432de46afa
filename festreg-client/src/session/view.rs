//! Render snapshot of a staged session

use festreg_common::events::{FlowKind, SessionState, SlotStatus};
use festreg_common::FieldErrors;
use serde::Serialize;

/// Everything a screen needs to draw one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub name: &'static str,
    pub label: &'static str,
    pub status: SlotStatus,
    pub progress: u8,
    pub failures: u32,
    pub file_name: Option<String>,
    pub has_preview: bool,
    pub error: Option<String>,
    /// Retry ceiling reached; only a restart re-enables the slot
    pub exhausted: bool,
}

/// Everything a screen needs to draw the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub flow: FlowKind,
    pub title: &'static str,
    pub state: SessionState,
    pub session_id: Option<String>,
    pub remaining_seconds: Option<u64>,
    /// "M:SS", or "--:--" without a session
    pub countdown: String,
    pub slots: Vec<SlotView>,
    pub inputs_enabled: bool,
    pub can_finalize: bool,
    pub can_restart: bool,
    pub message: Option<String>,
    pub field_errors: FieldErrors,
    pub locked: bool,
    pub lock_message: Option<String>,
}

impl SessionView {
    pub fn slot(&self, name: &str) -> Option<&SlotView> {
        self.slots.iter().find(|s| s.name == name)
    }
}
