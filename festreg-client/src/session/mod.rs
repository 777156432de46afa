//! Staged upload session controller
//!
//! One [`StagedSession`] drives one flow through
//! `NotStarted → Initializing → Active → Finalizing → Completed`, with
//! `Expired` and `Cancelled` as the other exits from `Active`. The
//! controller owns the upload slots, persists the session record before it
//! reports `Active`, and latches expiry so it fires exactly once.
//!
//! Backend, storage, clock and event bus are injected through
//! [`SessionContext`].

pub mod countdown;
pub mod error;
pub mod model;
pub mod slots;
pub mod view;

pub use countdown::{CountdownTicker, TICK_PERIOD};
pub use error::{FileRejection, SessionError, SessionResult};
pub use model::UploadSession;
pub use slots::{PersistedSlot, ProgressCell, SelectedFile, SlotPolicy, SlotSet, UploadSlot};
pub use view::{SessionView, SlotView};

use crate::api::{ApiOutcome, Backend, LockStatus, ProgressFn, UploadProgress};
use crate::flows::FlowForm;
use crate::store::{SessionRecord, SessionStore};
use error::outcome_result;
use festreg_common::events::{EventBus, FlowKind, SessionEvent, SessionState, SlotStatus};
use festreg_common::human_time::format_countdown_opt;
use festreg_common::{Clock, FieldErrors, SystemClock};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use validator::Validate;

/// Message shown after a successful finalize without a server message
pub const COMPLETED_MESSAGE: &str = "Submitted successfully";

/// Collaborators shared by every controller
#[derive(Clone)]
pub struct SessionContext {
    pub backend: Arc<dyn Backend>,
    pub store: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub policy: SlotPolicy,
    /// Countdown redraw cadence; `None` leaves ticking to the caller
    pub tick_period: Option<Duration>,
}

impl SessionContext {
    /// Context with the system clock and a 1 s countdown ticker
    ///
    /// The ticker is spawned on the ambient tokio runtime. Outside one,
    /// no ticker runs and the caller drives [`StagedSession::tick`].
    pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            backend,
            store,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            policy: SlotPolicy::default(),
            tick_period: Some(TICK_PERIOD),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_policy(mut self, policy: SlotPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn without_ticker(mut self) -> Self {
        self.tick_period = None;
        self
    }
}

/// Client-side lifecycle of one upload-gated submission
pub struct StagedSession<F: FlowForm> {
    ctx: SessionContext,
    state: SessionState,
    session: Option<UploadSession>,
    form: Option<F>,
    slots: SlotSet,
    field_errors: FieldErrors,
    message: Option<String>,
    lock: LockStatus,
    expiry_latched: bool,
    ticker: Option<CountdownTicker>,
    completion: Option<Value>,
}

impl<F: FlowForm> StagedSession<F> {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            state: SessionState::NotStarted,
            session: None,
            form: None,
            slots: SlotSet::for_flow(F::spec()),
            field_errors: FieldErrors::new(),
            message: None,
            lock: LockStatus::unlocked(),
            expiry_latched: false,
            ticker: None,
            completion: None,
        }
    }

    pub fn flow(&self) -> FlowKind {
        F::KIND
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    /// Details as last entered or restored
    pub fn form(&self) -> Option<&F> {
        self.form.as_ref()
    }

    pub fn slots(&self) -> &SlotSet {
        &self.slots
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    pub fn is_locked(&self) -> bool {
        self.lock.locked
    }

    /// Finalize response body after completion
    pub fn completion(&self) -> Option<&Value> {
        self.completion.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    /// Reload re-entry
    ///
    /// Rehydrates a stored, unexpired session into `Active`. An expired
    /// or unreadable record is cleared and the controller stays in
    /// `NotStarted`, with the stored details kept for prefilling.
    pub async fn mount(&mut self) -> SessionResult<SessionState> {
        self.stop_ticker();
        self.session = None;
        self.slots.reset();
        self.expiry_latched = false;
        self.completion = None;
        self.message = None;
        self.field_errors = FieldErrors::new();

        self.refresh_lock().await;

        let record = match self.ctx.store.load(F::KIND).await {
            Ok(record) => record,
            Err(festreg_common::Error::Serialization(e)) => {
                warn!(flow = %F::KIND, error = %e, "Discarding unreadable session record");
                self.ctx.store.clear(F::KIND).await?;
                None
            }
            Err(e) => return Err(e.into()),
        };

        let Some(record) = record else {
            self.transition_to(SessionState::NotStarted);
            return Ok(self.state);
        };

        self.form = serde_json::from_value(record.session.form_data.clone()).ok();
        let now = self.ctx.clock.now();

        if record.session.is_expired_at(now) {
            info!(
                flow = %F::KIND,
                session_id = %record.session.session_id,
                "Stored session already expired, clearing"
            );
            self.ctx.store.clear(F::KIND).await?;
            self.transition_to(SessionState::NotStarted);
            return Ok(self.state);
        }

        self.slots.restore(&record.slots);
        info!(
            flow = %F::KIND,
            session_id = %record.session.session_id,
            remaining_seconds = record.session.remaining_at(now),
            "Rehydrated stored session"
        );
        self.session = Some(record.session);
        self.transition_to(SessionState::Active);
        self.start_ticker();
        Ok(self.state)
    }

    /// Validate details, check the registration lock and start a session
    pub async fn submit_details(&mut self, form: F) -> SessionResult<()> {
        if !self.state.accepts_details() {
            return Err(SessionError::InvalidTransition {
                operation: "submit details",
                state: self.state,
            });
        }
        self.message = None;
        self.field_errors = FieldErrors::new();

        let validation = form.validate();
        self.form = Some(form.clone());
        if let Err(errors) = validation {
            let errors = FieldErrors::from(errors);
            debug!(flow = %F::KIND, fields = %errors, "Details failed validation");
            self.field_errors = errors.clone();
            return Err(self.report(SessionError::Validation(errors)));
        }

        self.refresh_lock().await;
        if self.lock.locked {
            return Err(self.report(SessionError::Locked(self.lock.reason())));
        }

        self.start_session(form).await
    }

    /// Recompute the countdown; expires an `Active` session at zero
    ///
    /// Returns the seconds left (0 without a session).
    pub async fn tick(&mut self) -> u64 {
        let Some(session) = &self.session else {
            return 0;
        };
        let remaining = session.remaining_at(self.ctx.clock.now());

        if self.state == SessionState::Active {
            self.ctx.events.emit_lossy(SessionEvent::CountdownTick {
                flow: F::KIND,
                remaining_seconds: remaining,
            });
            if remaining == 0 && !self.expiry_latched {
                self.expire().await;
            }
        }
        remaining
    }

    /// Wait for the next ticker beat and apply it
    ///
    /// `None` when no ticker is running, i.e. outside `Active`.
    pub async fn next_tick(&mut self) -> Option<u64> {
        let ticker = self.ticker.as_mut()?;
        ticker.tick().await?;
        Some(self.tick().await)
    }

    /// Start over with the retained details
    ///
    /// Allowed once expired, or while `Active` when a slot exhausted its
    /// retry ceiling. Refused while the form is locked.
    pub async fn restart(&mut self) -> SessionResult<()> {
        self.tick().await;
        let exhausted =
            self.state == SessionState::Active && self.slots.any_exhausted(&self.ctx.policy);
        if self.state != SessionState::Expired && !exhausted {
            return Err(SessionError::InvalidTransition {
                operation: "restart",
                state: self.state,
            });
        }
        let Some(form) = self.form.clone() else {
            return Err(SessionError::InvalidTransition {
                operation: "restart without details",
                state: self.state,
            });
        };

        self.refresh_lock().await;
        if self.lock.locked {
            return Err(self.report(SessionError::Locked(self.lock.reason())));
        }

        info!(flow = %F::KIND, from = %self.state, "Restarting session");
        self.message = None;
        self.start_session(form).await
    }

    /// Convert the uploaded session into a permanent record
    ///
    /// Refused locally, without a request, unless every slot succeeded.
    /// Any failure returns to `Active` with the record and slots intact.
    pub async fn finalize(&mut self, extras: F::Finalize) -> SessionResult<Value> {
        self.ensure_active("finalize").await?;

        if !self.slots.all_succeeded() {
            let missing = self.slots.missing();
            return Err(self.report(SessionError::SlotsIncomplete { missing }));
        }

        self.field_errors = FieldErrors::new();
        if let Err(errors) = extras.validate() {
            let errors = FieldErrors::from(errors);
            self.field_errors = errors.clone();
            return Err(self.report(SessionError::Validation(errors)));
        }

        let session_id = match &self.session {
            Some(session) => session.session_id.clone(),
            None => {
                return Err(SessionError::InvalidTransition {
                    operation: "finalize",
                    state: self.state,
                })
            }
        };
        let body = finalize_body(&session_id, &extras)?;

        self.message = None;
        self.transition_to(SessionState::Finalizing);
        let outcome = self.ctx.backend.finalize(F::KIND, &body).await;

        let response = match outcome_result(outcome) {
            Ok(response) => response,
            Err(err) => {
                self.transition_to(SessionState::Active);
                return Err(self.report(err));
            }
        };

        self.stop_ticker();
        if let Err(e) = self.ctx.store.clear(F::KIND).await {
            warn!(flow = %F::KIND, error = %e, "Failed to clear completed session record");
        }
        self.message = Some(
            response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(COMPLETED_MESSAGE)
                .to_string(),
        );
        self.completion = Some(response.clone());
        self.transition_to(SessionState::Completed);
        self.ctx.events.emit_lossy(SessionEvent::Completed {
            flow: F::KIND,
            session_id: session_id.clone(),
        });
        info!(flow = %F::KIND, session_id = %session_id, "Session finalized");
        Ok(response)
    }

    /// Abandon the session; details stay for a fresh submit
    pub async fn cancel(&mut self) -> SessionResult<()> {
        match self.state {
            SessionState::Active | SessionState::Expired => {}
            state => {
                return Err(SessionError::InvalidTransition {
                    operation: "cancel",
                    state,
                })
            }
        }

        self.stop_ticker();
        self.ctx.store.clear(F::KIND).await?;

        if let Some(session) = self.session.take() {
            info!(flow = %F::KIND, session_id = %session.session_id, "Session cancelled");
        }
        self.slots.reset();
        self.emit_all_slots();
        self.message = Some("Session cancelled".to_string());
        self.transition_to(SessionState::Cancelled);
        Ok(())
    }

    /// Validate and hold a file for a slot
    pub async fn select_file(&mut self, slot: &str, file: SelectedFile) -> SessionResult<()> {
        self.ensure_active("select a file").await?;
        let policy = self.ctx.policy.clone();
        let file_name = file.file_name.clone();

        let result = self
            .slots
            .get_mut(slot)
            .and_then(|s| s.select(file, &policy));
        match result {
            Ok(()) => {
                debug!(flow = %F::KIND, slot, file = %file_name, "File selected");
                self.message = None;
                self.emit_slot(slot);
                Ok(())
            }
            Err(err) => Err(self.report(err)),
        }
    }

    /// Drop a slot's file; a discarded upload must be sent again
    pub async fn discard_file(&mut self, slot: &str) -> SessionResult<()> {
        self.ensure_active("discard a file").await?;

        let was_succeeded = match self.slots.get_mut(slot).and_then(|s| {
            let was = s.status() == SlotStatus::Succeeded;
            s.discard().map(|_| was)
        }) {
            Ok(was) => was,
            Err(err) => return Err(self.report(err)),
        };

        self.emit_slot(slot);
        if was_succeeded {
            if let Err(err) = self.persist().await {
                return Err(self.report(err));
            }
        }
        Ok(())
    }

    /// Send a slot's file to its destination URL
    ///
    /// Failures are counted; retries are always manual.
    pub async fn upload_slot(&mut self, slot: &str) -> SessionResult<()> {
        self.ensure_active("upload").await?;
        let policy = self.ctx.policy.clone();

        let destination = match self.slots.get(slot) {
            None => return Err(self.report(SessionError::UnknownSlot(slot.to_string()))),
            Some(_) => self
                .session
                .as_ref()
                .and_then(|s| s.upload_url(slot))
                .map(str::to_string),
        };
        let Some(destination) = destination else {
            return Err(self.report(SessionError::UploadFailed {
                slot: slot.to_string(),
                reason: "no upload destination was issued for this file".to_string(),
            }));
        };

        let started = self.slots.get_mut(slot).and_then(|s| {
            let body = s.begin_upload(&policy)?;
            Ok((body, s.progress_cell()))
        });
        let (body, cell) = match started {
            Ok(started) => started,
            Err(err) => return Err(self.report(err)),
        };
        self.emit_slot(slot);
        info!(flow = %F::KIND, slot, bytes = body.len(), "Upload started");

        let progress = self.progress_reporter(slot, cell);
        let outcome = self.ctx.backend.upload(&destination, body, progress).await;

        let result = match outcome {
            ApiOutcome::Ok(()) => {
                if let Ok(s) = self.slots.get_mut(slot) {
                    s.mark_succeeded();
                }
                info!(flow = %F::KIND, slot, "Upload succeeded");
                self.message = None;
                Ok(())
            }
            failure => {
                let reason = match failure {
                    ApiOutcome::Rejected(reason) => reason,
                    ApiOutcome::NetworkError(detail) => {
                        warn!(flow = %F::KIND, slot, error = %detail, "Upload transport failure");
                        error::NETWORK_MESSAGE.to_string()
                    }
                    _ => error::AUTH_EXPIRED_MESSAGE.to_string(),
                };
                let mut failures = 0;
                if let Ok(s) = self.slots.get_mut(slot) {
                    s.mark_failed(reason.clone());
                    failures = s.failures();
                }
                let exhausted = self
                    .slots
                    .get(slot)
                    .map(|s| s.is_exhausted(&policy))
                    .unwrap_or(false);
                warn!(flow = %F::KIND, slot, failures, reason = %reason, "Upload failed");
                Err(if exhausted {
                    SessionError::RetryLimitReached {
                        slot: slot.to_string(),
                        failures,
                    }
                } else {
                    SessionError::UploadFailed {
                        slot: slot.to_string(),
                        reason,
                    }
                })
            }
        };

        self.emit_slot(slot);
        if let Err(err) = self.persist().await {
            warn!(flow = %F::KIND, slot, error = %err, "Failed to persist slot state");
            return Err(self.report(err));
        }
        result.map_err(|err| self.report(err))
    }

    /// Finalize gate, recomputed from current slot statuses
    pub fn all_slots_succeeded(&self) -> bool {
        self.slots.all_succeeded()
    }

    /// Render snapshot at the current instant
    pub fn view(&self) -> SessionView {
        let now = self.ctx.clock.now();
        let remaining_seconds = match (self.state, &self.session) {
            (SessionState::Active | SessionState::Finalizing, Some(session)) => {
                Some(session.remaining_at(now))
            }
            (SessionState::Expired, _) => Some(0),
            _ => None,
        };
        let locked = self.lock.locked;
        let inputs_enabled =
            !locked && self.state == SessionState::Active && remaining_seconds.unwrap_or(0) > 0;
        let policy = &self.ctx.policy;

        let slots = self
            .slots
            .iter()
            .map(|slot| SlotView {
                name: slot.name(),
                label: slot.spec.label,
                status: slot.status(),
                progress: slot.progress(),
                failures: slot.failures(),
                file_name: slot.file().map(|f| f.file_name.clone()),
                has_preview: slot.preview().is_some(),
                error: slot.last_error().map(str::to_string),
                exhausted: slot.is_exhausted(policy),
            })
            .collect();

        SessionView {
            flow: F::KIND,
            title: F::spec().title,
            state: self.state,
            session_id: self.session.as_ref().map(|s| s.session_id.clone()),
            remaining_seconds,
            countdown: format_countdown_opt(remaining_seconds),
            slots,
            inputs_enabled,
            can_finalize: inputs_enabled && self.slots.all_succeeded(),
            can_restart: !locked
                && (self.state == SessionState::Expired
                    || (self.state == SessionState::Active && self.slots.any_exhausted(policy))),
            message: self.message.clone(),
            field_errors: self.field_errors.clone(),
            locked,
            lock_message: locked.then(|| self.lock.reason()),
        }
    }

    /// Init against the backend and persist before reporting `Active`
    async fn start_session(&mut self, form: F) -> SessionResult<()> {
        let previous = self.state;
        let form_data = serde_json::to_value(&form).map_err(festreg_common::Error::from)?;

        self.transition_to(SessionState::Initializing);
        let outcome = self.ctx.backend.init(F::KIND, &form_data).await;
        let payload = match outcome_result(outcome) {
            Ok(payload) => payload,
            Err(err) => {
                self.transition_to(previous);
                return Err(self.report(err));
            }
        };

        let now = self.ctx.clock.now();
        let session = UploadSession::from_init(payload, form_data, now);
        let slots = SlotSet::for_flow(F::spec());
        let record = SessionRecord {
            session: session.clone(),
            slots: slots.snapshot(),
            saved_at: now,
        };
        if let Err(e) = self.ctx.store.save(F::KIND, &record).await {
            warn!(flow = %F::KIND, error = %e, "Failed to persist new session");
            self.transition_to(previous);
            return Err(self.report(e.into()));
        }

        self.stop_ticker();
        info!(
            flow = %F::KIND,
            session_id = %session.session_id,
            remaining_seconds = session.remaining_at(now),
            "Session started"
        );
        self.slots = slots;
        self.session = Some(session);
        self.expiry_latched = false;
        self.completion = None;
        self.emit_all_slots();
        self.transition_to(SessionState::Active);
        self.start_ticker();
        Ok(())
    }

    async fn expire(&mut self) {
        self.expiry_latched = true;
        self.stop_ticker();
        self.slots.clear_files();

        let session_id = self
            .session
            .as_ref()
            .map(|s| s.session_id.clone())
            .unwrap_or_default();
        if let Err(e) = self.ctx.store.clear(F::KIND).await {
            warn!(flow = %F::KIND, error = %e, "Failed to clear expired session record");
        }

        info!(flow = %F::KIND, session_id = %session_id, "Session expired");
        self.message = Some(SessionError::Expired.to_string());
        self.transition_to(SessionState::Expired);
        self.ctx.events.emit_lossy(SessionEvent::Expired {
            flow: F::KIND,
            session_id,
        });
    }

    /// Apply pending expiry, then require an unlocked `Active` session
    async fn ensure_active(&mut self, operation: &'static str) -> SessionResult<()> {
        self.tick().await;
        match self.state {
            SessionState::Active if self.lock.locked => {
                Err(self.report(SessionError::Locked(self.lock.reason())))
            }
            SessionState::Active => Ok(()),
            SessionState::Expired => Err(self.report(SessionError::Expired)),
            state => Err(SessionError::InvalidTransition { operation, state }),
        }
    }

    /// Lock flag; an unavailable lock endpoint counts as unlocked
    async fn refresh_lock(&mut self) {
        self.lock = match self.ctx.backend.lock_status(F::KIND).await {
            ApiOutcome::Ok(status) => status,
            ApiOutcome::AuthExpired => {
                warn!(flow = %F::KIND, "Lock status refused login token, treating as unlocked");
                LockStatus::unlocked()
            }
            ApiOutcome::Rejected(reason) | ApiOutcome::NetworkError(reason) => {
                warn!(flow = %F::KIND, reason = %reason, "Lock status unavailable, treating as unlocked");
                LockStatus::unlocked()
            }
        };
        if self.lock.locked {
            info!(flow = %F::KIND, "Form is locked");
        }
    }

    async fn persist(&self) -> SessionResult<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let record = SessionRecord {
            session: session.clone(),
            slots: self.slots.snapshot(),
            saved_at: self.ctx.clock.now(),
        };
        self.ctx.store.save(F::KIND, &record).await?;
        Ok(())
    }

    /// Record the user-facing message for an error and pass it on
    fn report(&mut self, err: SessionError) -> SessionError {
        match &err {
            SessionError::AuthExpired => {
                self.ctx
                    .events
                    .emit_lossy(SessionEvent::AuthExpired { flow: F::KIND });
                warn!(flow = %F::KIND, "Login token rejected");
            }
            SessionError::Network(detail) => {
                warn!(flow = %F::KIND, error = %detail, "Backend unreachable");
            }
            SessionError::Rejected(reason) => {
                warn!(flow = %F::KIND, reason = %reason, "Backend rejected request");
            }
            _ => {}
        }
        self.message = Some(err.to_string());
        err
    }

    fn transition_to(&mut self, new_state: SessionState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        debug!(flow = %F::KIND, from = %old_state, to = %new_state, "State transition");
        self.ctx.events.emit_lossy(SessionEvent::StateChanged {
            flow: F::KIND,
            old_state,
            new_state,
            timestamp: self.ctx.clock.now(),
        });
    }

    fn emit_slot(&self, name: &str) {
        if let Some(slot) = self.slots.get(name) {
            self.ctx.events.emit_lossy(SessionEvent::SlotChanged {
                flow: F::KIND,
                slot: slot.name().to_string(),
                status: slot.status(),
                failures: slot.failures(),
            });
        }
    }

    fn emit_all_slots(&self) {
        for slot in self.slots.iter() {
            self.emit_slot(slot.name());
        }
    }

    fn progress_reporter(&self, slot: &str, cell: ProgressCell) -> ProgressFn {
        let events = self.ctx.events.clone();
        let slot = slot.to_string();
        Arc::new(move |progress: UploadProgress| {
            cell.advance(progress.percent());
            events.emit_lossy(SessionEvent::UploadProgress {
                flow: F::KIND,
                slot: slot.clone(),
                percent: cell.get(),
                bytes_sent: progress.bytes_sent,
                bytes_total: progress.bytes_total,
            });
        })
    }

    fn start_ticker(&mut self) {
        let Some(period) = self.ctx.tick_period else {
            return;
        };
        self.ticker = CountdownTicker::spawn(period);
        if self.ticker.is_none() {
            debug!(flow = %F::KIND, "No tokio runtime, countdown left to the caller");
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

/// `{session_id, ...extras}`
fn finalize_body<E: serde::Serialize>(session_id: &str, extras: &E) -> SessionResult<Value> {
    let mut body = serde_json::to_value(extras).map_err(festreg_common::Error::from)?;
    match body.as_object_mut() {
        Some(map) => {
            map.insert("session_id".to_string(), Value::String(session_id.to_string()));
        }
        None => body = serde_json::json!({ "session_id": session_id }),
    }
    Ok(body)
}
