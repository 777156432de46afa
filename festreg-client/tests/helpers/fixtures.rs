//! Form fixtures, sample files and the controller harness

use super::fake_backend::FakeBackend;
use chrono::{DateTime, TimeZone, Utc};
use festreg_client::flows::{
    AccompanistRegistration, AccompanistType, FeePayment, FlowForm, ManagerProfile,
    StudentRegistration,
};
use festreg_client::session::{SelectedFile, SessionContext, SlotPolicy, StagedSession};
use festreg_client::store::MemoryStore;
use festreg_common::events::{EventBus, SessionEvent};
use festreg_common::ManualClock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Server TTL used by the fake backend
pub const TTL_SECONDS: u64 = 600;

/// Minimal PNG signature
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

pub const PDF_BYTES: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj\n";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap()
}

pub fn png_file(name: &str) -> SelectedFile {
    SelectedFile::new(name, PNG_BYTES.to_vec())
}

pub fn pdf_file(name: &str) -> SelectedFile {
    SelectedFile::new(name, PDF_BYTES.to_vec())
}

pub fn student() -> StudentRegistration {
    StudentRegistration {
        full_name: "Asha Rao".to_string(),
        email: "asha@college.edu".to_string(),
        phone: "9876543210".to_string(),
        college_code: "C042".to_string(),
        usn: "1XX22CS001".to_string(),
        gender: Some("female".to_string()),
    }
}

pub fn accompanist() -> AccompanistRegistration {
    AccompanistRegistration {
        full_name: "Ravi Kumar".to_string(),
        phone: "9123456780".to_string(),
        email: None,
        college_code: "C042".to_string(),
        accompanist_type: AccompanistType::Professional,
    }
}

pub fn manager() -> ManagerProfile {
    ManagerProfile {
        full_name: "Meera Iyer".to_string(),
        email: "meera@college.edu".to_string(),
        phone: "9988776655".to_string(),
        designation: "Cultural coordinator".to_string(),
        college_code: "C042".to_string(),
    }
}

pub fn fee_payment() -> FeePayment {
    FeePayment {
        college_code: "C042".to_string(),
        payer_name: "Meera Iyer".to_string(),
        transaction_reference: "UTR0042".to_string(),
        amount: 2500,
    }
}

/// Fake backend, in-memory store, manual clock and event bus shared by
/// every controller a test creates
pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub events: EventBus,
    pub policy: SlotPolicy,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(FakeBackend::new(TTL_SECONDS)),
            store: Arc::new(MemoryStore::new()),
            clock: ManualClock::new(t0()),
            events: EventBus::new(1024),
            policy: SlotPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SlotPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn ctx(&self) -> SessionContext {
        SessionContext::new(self.backend.clone(), self.store.clone())
            .with_clock(Arc::new(self.clock.clone()))
            .with_events(self.events.clone())
            .with_policy(self.policy.clone())
            .without_ticker()
    }

    pub fn controller<F: FlowForm>(&self) -> StagedSession<F> {
        StagedSession::new(self.ctx())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Everything currently buffered on a receiver
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
