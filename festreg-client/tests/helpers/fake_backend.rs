//! Scripted backend and failing store

use async_trait::async_trait;
use festreg_client::api::{ApiOutcome, Backend, InitPayload, LockStatus, ProgressFn, UploadBody, UploadProgress};
use festreg_client::flows::FlowSpec;
use festreg_client::store::{MemoryStore, SessionRecord, SessionStore};
use festreg_common::events::FlowKind;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Backend returning queued outcomes, falling back to success
///
/// Every call is counted so tests can assert that no request was sent.
pub struct FakeBackend {
    ttl_seconds: u64,
    lock: Mutex<ApiOutcome<LockStatus>>,
    init_script: Mutex<VecDeque<ApiOutcome<InitPayload>>>,
    upload_script: Mutex<VecDeque<ApiOutcome<()>>>,
    finalize_script: Mutex<VecDeque<ApiOutcome<Value>>>,
    finalize_bodies: Mutex<Vec<Value>>,
    upload_destinations: Mutex<Vec<String>>,
    init_forms: Mutex<Vec<Value>>,
    lock_calls: AtomicUsize,
    init_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    finalize_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            lock: Mutex::new(ApiOutcome::Ok(LockStatus::unlocked())),
            init_script: Mutex::new(VecDeque::new()),
            upload_script: Mutex::new(VecDeque::new()),
            finalize_script: Mutex::new(VecDeque::new()),
            finalize_bodies: Mutex::new(Vec::new()),
            upload_destinations: Mutex::new(Vec::new()),
            init_forms: Mutex::new(Vec::new()),
            lock_calls: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            finalize_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_lock(&self, outcome: ApiOutcome<LockStatus>) {
        *self.lock.lock().unwrap() = outcome;
    }

    pub fn push_init(&self, outcome: ApiOutcome<InitPayload>) {
        self.init_script.lock().unwrap().push_back(outcome);
    }

    pub fn push_upload(&self, outcome: ApiOutcome<()>) {
        self.upload_script.lock().unwrap().push_back(outcome);
    }

    pub fn push_finalize(&self, outcome: ApiOutcome<Value>) {
        self.finalize_script.lock().unwrap().push_back(outcome);
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    pub fn finalize_bodies(&self) -> Vec<Value> {
        self.finalize_bodies.lock().unwrap().clone()
    }

    pub fn upload_destinations(&self) -> Vec<String> {
        self.upload_destinations.lock().unwrap().clone()
    }

    pub fn init_forms(&self) -> Vec<Value> {
        self.init_forms.lock().unwrap().clone()
    }

    /// Success payload with one destination per slot of `flow`
    pub fn payload(&self, flow: FlowKind, session_id: &str) -> InitPayload {
        let upload_urls: BTreeMap<String, String> = FlowSpec::for_kind(flow)
            .slots
            .iter()
            .map(|slot| {
                (
                    slot.name.to_string(),
                    format!("https://uploads.test/{}/{}", session_id, slot.name),
                )
            })
            .collect();
        InitPayload {
            session_id: session_id.to_string(),
            expires_at: None,
            remaining_seconds: self.ttl_seconds,
            upload_urls,
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn lock_status(&self, _flow: FlowKind) -> ApiOutcome<LockStatus> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.lock.lock().unwrap().clone()
    }

    async fn init(&self, flow: FlowKind, form: &Value) -> ApiOutcome<InitPayload> {
        let n = self.init_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.init_forms.lock().unwrap().push(form.clone());
        let scripted = self.init_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| ApiOutcome::Ok(self.payload(flow, &format!("sess-{}", n))))
    }

    async fn upload(&self, destination: &str, body: UploadBody, progress: ProgressFn) -> ApiOutcome<()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.upload_destinations
            .lock()
            .unwrap()
            .push(destination.to_string());

        let total = body.len();
        progress(UploadProgress {
            bytes_sent: total / 2,
            bytes_total: total,
        });
        progress(UploadProgress {
            bytes_sent: total,
            bytes_total: total,
        });

        let scripted = self.upload_script.lock().unwrap().pop_front();
        scripted.unwrap_or(ApiOutcome::Ok(()))
    }

    async fn finalize(&self, _flow: FlowKind, body: &Value) -> ApiOutcome<Value> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        self.finalize_bodies.lock().unwrap().push(body.clone());
        let scripted = self.finalize_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            ApiOutcome::Ok(json!({"success": true, "message": "Registration complete"}))
        })
    }
}

/// Store whose writes always fail
#[derive(Default)]
pub struct FailingStore;

#[async_trait]
impl SessionStore for FailingStore {
    async fn load(&self, _flow: FlowKind) -> festreg_common::Result<Option<SessionRecord>> {
        Ok(None)
    }

    async fn save(&self, _flow: FlowKind, _record: &SessionRecord) -> festreg_common::Result<()> {
        Err(festreg_common::Error::Internal("disk full".to_string()))
    }

    async fn clear(&self, _flow: FlowKind) -> festreg_common::Result<()> {
        Ok(())
    }
}

/// In-memory store whose writes can be switched off mid-test
#[derive(Default)]
pub struct SwitchableStore {
    inner: MemoryStore,
    fail_saves: AtomicBool,
}

impl SwitchableStore {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for SwitchableStore {
    async fn load(&self, flow: FlowKind) -> festreg_common::Result<Option<SessionRecord>> {
        self.inner.load(flow).await
    }

    async fn save(&self, flow: FlowKind, record: &SessionRecord) -> festreg_common::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(festreg_common::Error::Internal("disk full".to_string()));
        }
        self.inner.save(flow, record).await
    }

    async fn clear(&self, flow: FlowKind) -> festreg_common::Result<()> {
        self.inner.clear(flow).await
    }
}
