//! Persisted session storage
//!
//! One record per flow, written as soon as a session is issued and
//! deleted on completion, cancel or expiry.

pub mod sqlite;

pub use sqlite::SqliteSessionStore;

use crate::session::model::UploadSession;
use crate::session::slots::PersistedSlot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use festreg_common::events::FlowKind;
use festreg_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Stored form of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(flatten)]
    pub session: UploadSession,

    /// Slot statuses; files are never stored
    #[serde(default)]
    pub slots: BTreeMap<String, PersistedSlot>,

    /// Last write
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
}

/// Key/value storage for session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, flow: FlowKind) -> Result<Option<SessionRecord>>;

    async fn save(&self, flow: FlowKind, record: &SessionRecord) -> Result<()>;

    async fn clear(&self, flow: FlowKind) -> Result<()>;
}

/// In-process store holding serialized records
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<FlowKind, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON of a stored record
    pub fn raw(&self, flow: FlowKind) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&flow)
            .cloned()
    }

    pub fn contains(&self, flow: FlowKind) -> bool {
        self.raw(flow).is_some()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, flow: FlowKind) -> Result<Option<SessionRecord>> {
        match self.raw(flow) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, flow: FlowKind, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(flow, json);
        Ok(())
    }

    async fn clear(&self, flow: FlowKind) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&flow);
        Ok(())
    }
}
