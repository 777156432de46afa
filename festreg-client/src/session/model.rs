//! Upload session data model

use crate::api::InitPayload;
use chrono::{DateTime, Duration, Utc};
use festreg_common::time::remaining;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One in-progress, time-boxed submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Opaque backend handle, required to finalize
    pub session_id: String,

    /// Server deadline
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Server TTL at issue
    pub remaining_seconds: u64,

    /// Local wall-clock instant the init response was received
    pub issued_at: DateTime<Utc>,

    /// Slot name → one-time destination URL
    #[serde(default)]
    pub upload_urls: BTreeMap<String, String>,

    /// Details as entered, for redrawing the form after reload
    #[serde(rename = "formData")]
    pub form_data: Value,
}

impl UploadSession {
    /// Build from an init response received at `issued_at`
    pub fn from_init(payload: InitPayload, form_data: Value, issued_at: DateTime<Utc>) -> Self {
        Self {
            session_id: payload.session_id,
            expires_at: payload.expires_at,
            remaining_seconds: payload.remaining_seconds,
            issued_at,
            upload_urls: payload.upload_urls,
            form_data,
        }
    }

    /// Effective deadline: the earlier of the server deadline and the
    /// TTL measured on the local clock
    ///
    /// A TTL past the representable range saturates at
    /// `DateTime::<Utc>::MAX_UTC`.
    pub fn deadline(&self) -> DateTime<Utc> {
        let local = i64::try_from(self.remaining_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        match self.expires_at {
            Some(server) => server.min(local),
            None => local,
        }
    }

    /// Seconds left at `now`
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        remaining(now, self.deadline())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_at(now) == 0
    }

    pub fn upload_url(&self, slot: &str) -> Option<&str> {
        self.upload_urls.get(slot).map(String::as_str)
    }
}
