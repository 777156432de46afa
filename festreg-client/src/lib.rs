//! festreg client library
//!
//! Staged upload sessions for the festival registration flows: student and
//! accompanist registration, manager profile and fee payment. Each flow
//! starts a time-boxed backend session, uploads its required files straight
//! to one-time destination URLs and then finalizes.

pub mod api;
pub mod flows;
pub mod session;
pub mod store;

pub use api::{ApiOutcome, Backend, HttpBackend};
pub use flows::{
    AccompanistRegistration, FeePayment, FlowForm, FlowSpec, ManagerProfile, NoExtras,
    StudentCredentials, StudentRegistration,
};
pub use session::{
    SelectedFile, SessionContext, SessionError, SessionResult, SessionView, SlotPolicy,
    StagedSession,
};
pub use store::{MemoryStore, SessionRecord, SessionStore, SqliteSessionStore};
