//! Backend wire types and response classification
//!
//! Every backend call collapses into one [`ApiOutcome`]. Screens never
//! branch on raw `success`/`status` fields or HTTP codes themselves.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status value with which the backend demands a fresh login
pub const FORCE_RESET_STATUS: &str = "FORCE_RESET";

/// Unified result of a backend call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    /// Request accepted; payload decoded
    Ok(T),
    /// Login token rejected (HTTP 401 or `FORCE_RESET`)
    AuthExpired,
    /// Backend refused the request; reason is shown verbatim
    Rejected(String),
    /// Transport failure; detail is for logs, not users
    NetworkError(String),
}

/// Successful `init` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitPayload {
    pub session_id: String,

    /// Absolute deadline; absent on older backends
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// TTL at issue
    pub remaining_seconds: u64,

    /// Slot name → one-time PUT destination
    #[serde(default)]
    pub upload_urls: BTreeMap<String, String>,
}

/// Registration lock flag for one form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockStatus {
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl LockStatus {
    pub fn unlocked() -> Self {
        Self::default()
    }

    /// Message shown while locked
    pub fn reason(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "Registration is currently locked".to_string())
    }
}

/// Fields any backend JSON response may carry alongside its payload
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Envelope {
    fn reason(self, http_status: u16) -> String {
        self.error
            .or(self.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request was rejected (HTTP {})", http_status))
    }
}

/// Classify an HTTP response into an [`ApiOutcome`]
///
/// # Rules
///
/// - HTTP 401 or `status == "FORCE_RESET"` → `AuthExpired`
/// - non-JSON body: 5xx → `NetworkError`, anything else → `Rejected`
/// - `success == false` or a non-2xx code → `Rejected(error | message)`
/// - otherwise the body decodes into `T`
///
/// # Examples
///
/// ```
/// use festreg_client::api::{classify_response, ApiOutcome};
/// use serde_json::Value;
///
/// let outcome: ApiOutcome<Value> =
///     classify_response(200, r#"{"success":false,"error":"session expired"}"#);
/// assert_eq!(outcome, ApiOutcome::Rejected("session expired".to_string()));
/// ```
pub fn classify_response<T: DeserializeOwned>(http_status: u16, body: &str) -> ApiOutcome<T> {
    if http_status == 401 {
        return ApiOutcome::AuthExpired;
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if http_status >= 500 => {
            return ApiOutcome::NetworkError(format!("Server unavailable (HTTP {})", http_status))
        }
        Err(_) if (200..300).contains(&http_status) => {
            return ApiOutcome::Rejected("Unexpected response from server".to_string())
        }
        Err(_) => return ApiOutcome::Rejected(format!("Request failed (HTTP {})", http_status)),
    };

    let envelope: Envelope = serde_json::from_value(value.clone()).unwrap_or_default();

    if envelope.status.as_deref() == Some(FORCE_RESET_STATUS) {
        return ApiOutcome::AuthExpired;
    }

    if envelope.success == Some(false) || !(200..300).contains(&http_status) {
        return ApiOutcome::Rejected(envelope.reason(http_status));
    }

    match serde_json::from_value(value) {
        Ok(payload) => ApiOutcome::Ok(payload),
        Err(e) => ApiOutcome::Rejected(format!("Unexpected response from server: {}", e)),
    }
}
