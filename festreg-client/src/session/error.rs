//! Staged session errors
//!
//! Every variant is recoverable. Its `Display` text is what the user sees.

use crate::api::ApiOutcome;
use festreg_common::events::SessionState;
use festreg_common::FieldErrors;
use thiserror::Error;

/// Message shown for transport failures
pub const NETWORK_MESSAGE: &str = "Network error. Check your connection and try again.";

/// Message shown when the backend rejects the login token
pub const AUTH_EXPIRED_MESSAGE: &str = "Your login has expired. Please sign in again.";

/// Why a selected file was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileRejection {
    #[error("File is empty")]
    Empty,

    #[error("File is too large ({size} bytes, maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Unsupported file type{}; allowed: {allowed}", .detected.as_ref().map(|d| format!(" ({})", d)).unwrap_or_default())]
    UnsupportedType {
        detected: Option<String>,
        allowed: String,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Local field validation failed; no request was sent
    #[error("Please correct the highlighted fields ({0})")]
    Validation(FieldErrors),

    #[error("Cannot {operation} while the session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    /// Registration lock is set for this form
    #[error("{0}")]
    Locked(String),

    /// Backend refused the request (message verbatim)
    #[error("{0}")]
    Rejected(String),

    #[error("{}", AUTH_EXPIRED_MESSAGE)]
    AuthExpired,

    /// Transport failure; the detail is logged, not shown
    #[error("{}", NETWORK_MESSAGE)]
    Network(String),

    #[error("The session has expired. Restart to continue.")]
    Expired,

    #[error("{0}")]
    FileRejected(#[from] FileRejection),

    #[error("'{0}' is already uploaded; discard it before choosing another file")]
    SlotBusy(String),

    #[error("Choose a file for '{0}' first")]
    NoFileSelected(String),

    #[error("Upload of '{slot}' failed: {reason}")]
    UploadFailed { slot: String, reason: String },

    #[error("Upload of '{slot}' failed {failures} times. Restart the session to try again.")]
    RetryLimitReached { slot: String, failures: u32 },

    #[error("Upload every required file before submitting (missing: {})", .missing.join(", "))]
    SlotsIncomplete { missing: Vec<String> },

    #[error("Unknown upload slot '{0}'")]
    UnknownSlot(String),

    #[error("Could not save session: {0}")]
    Storage(#[from] festreg_common::Error),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Collapse a backend outcome into a controller result
pub(crate) fn outcome_result<T>(outcome: ApiOutcome<T>) -> SessionResult<T> {
    match outcome {
        ApiOutcome::Ok(value) => Ok(value),
        ApiOutcome::AuthExpired => Err(SessionError::AuthExpired),
        ApiOutcome::Rejected(reason) => Err(SessionError::Rejected(reason)),
        ApiOutcome::NetworkError(detail) => Err(SessionError::Network(detail)),
    }
}
