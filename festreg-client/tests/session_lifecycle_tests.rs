//! Session Lifecycle Integration Tests
//!
//! Drives `StagedSession` through init, expiry, rehydration, finalize,
//! cancel and restart against a scripted backend and a manual clock.

mod helpers;

use festreg_client::api::{ApiOutcome, LockStatus};
use festreg_client::flows::{FeePayment, ManagerProfile, NoExtras, StudentCredentials, StudentRegistration};
use festreg_client::session::error::NETWORK_MESSAGE;
use festreg_client::session::{SessionContext, SessionError, StagedSession};
use festreg_client::store::SessionStore;
use festreg_common::events::{FlowKind, SessionEvent, SessionState, SlotStatus};
use helpers::{drain, fee_payment, manager, png_file, student, FailingStore, Harness};
use serde_json::json;
use std::sync::Arc;

async fn upload_all(session: &mut StagedSession<StudentRegistration>) {
    for slot in ["passport_photo", "id_proof_a", "id_proof_b"] {
        session
            .select_file(slot, png_file(&format!("{}.png", slot)))
            .await
            .unwrap();
        session.upload_slot(slot).await.unwrap();
    }
}

#[tokio::test]
async fn test_invalid_details_make_no_network_call() {
    // Given: a student form with a short phone number
    let h = Harness::new();
    let mut session = h.controller::<StudentRegistration>();
    let mut form = student();
    form.phone = "98765".to_string();

    // When: details are submitted
    let err = session.submit_details(form).await.unwrap_err();

    // Then: field errors come back and nothing was sent
    match err {
        SessionError::Validation(errors) => {
            assert_eq!(errors.get("phone"), Some("Phone number must be exactly 10 digits"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(h.backend.lock_calls(), 0);
    assert_eq!(h.backend.init_calls(), 0);
    assert_eq!(session.state(), SessionState::NotStarted);
    assert!(session.view().field_errors.contains("phone"));
}

#[tokio::test]
async fn test_successful_init_persists_and_activates() {
    let h = Harness::new();
    let mut rx = h.subscribe();
    let mut session = h.controller::<StudentRegistration>();

    session.submit_details(student()).await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert!(h.store.contains(FlowKind::StudentRegistration));

    let record = h.store.load(FlowKind::StudentRegistration).await.unwrap().unwrap();
    assert_eq!(record.session.session_id, "sess-1");
    assert_eq!(record.session.form_data["usn"], "1XX22CS001");
    assert_eq!(record.slots.len(), 3);

    let view = session.view();
    assert_eq!(view.countdown, "10:00");
    assert!(view.inputs_enabled);
    assert!(!view.can_finalize);

    let states: Vec<SessionState> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { new_state, .. } => Some(new_state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![SessionState::Initializing, SessionState::Active]);
}

#[tokio::test]
async fn test_failed_persist_never_reports_active() {
    // Given: a store that refuses writes
    let h = Harness::new();
    let ctx = SessionContext::new(h.backend.clone(), Arc::new(FailingStore))
        .with_clock(Arc::new(h.clock.clone()))
        .with_events(h.events.clone())
        .without_ticker();
    let mut rx = h.subscribe();
    let mut session = StagedSession::<ManagerProfile>::new(ctx);

    // When: init succeeds on the backend
    let err = session.submit_details(manager()).await.unwrap_err();

    // Then: the controller is back where it started and never went Active
    assert!(matches!(err, SessionError::Storage(_)));
    assert_eq!(session.state(), SessionState::NotStarted);
    assert!(!drain(&mut rx).iter().any(|e| matches!(
        e,
        SessionEvent::StateChanged {
            new_state: SessionState::Active,
            ..
        }
    )));
}

#[tokio::test]
async fn test_locked_form_rejects_init() {
    let h = Harness::new();
    h.backend.set_lock(ApiOutcome::Ok(LockStatus {
        locked: true,
        message: Some("Registrations are closed".to_string()),
    }));
    let mut session = h.controller::<StudentRegistration>();

    let err = session.submit_details(student()).await.unwrap_err();

    assert!(matches!(err, SessionError::Locked(ref m) if m == "Registrations are closed"));
    assert_eq!(h.backend.init_calls(), 0);
    assert_eq!(session.state(), SessionState::NotStarted);

    let view = session.view();
    assert!(view.locked);
    assert_eq!(view.lock_message.as_deref(), Some("Registrations are closed"));
}

#[tokio::test]
async fn test_unavailable_lock_endpoint_counts_as_unlocked() {
    let h = Harness::new();
    h.backend
        .set_lock(ApiOutcome::NetworkError("connection refused".to_string()));
    let mut session = h.controller::<FeePayment>();

    session.submit_details(fee_payment()).await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert!(!session.is_locked());
}

#[tokio::test]
async fn test_init_rejection_keeps_form_and_message() {
    let h = Harness::new();
    h.backend
        .push_init(ApiOutcome::Rejected("College code not found".to_string()));
    let mut session = h.controller::<StudentRegistration>();

    let err = session.submit_details(student()).await.unwrap_err();

    assert_eq!(err.to_string(), "College code not found");
    assert_eq!(session.state(), SessionState::NotStarted);
    assert_eq!(session.message(), Some("College code not found"));
    assert_eq!(session.form(), Some(&student()));
    assert!(!h.store.contains(FlowKind::StudentRegistration));
}

#[tokio::test]
async fn test_init_network_failure_shows_generic_message() {
    let h = Harness::new();
    h.backend
        .push_init(ApiOutcome::NetworkError("connection reset by peer".to_string()));
    let mut session = h.controller::<ManagerProfile>();

    let err = session.submit_details(manager()).await.unwrap_err();

    assert!(matches!(err, SessionError::Network(_)));
    assert_eq!(session.message(), Some(NETWORK_MESSAGE));
    assert_eq!(session.state(), SessionState::NotStarted);
}

#[tokio::test]
async fn test_auth_expired_emits_event() {
    let h = Harness::new();
    h.backend.push_init(ApiOutcome::AuthExpired);
    let mut rx = h.subscribe();
    let mut session = h.controller::<ManagerProfile>();

    let err = session.submit_details(manager()).await.unwrap_err();

    assert!(matches!(err, SessionError::AuthExpired));
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::AuthExpired { flow: FlowKind::ManagerProfile })));
}

#[tokio::test]
async fn test_expiry_fires_exactly_once() {
    // Given: an active session with a 600 second TTL
    let h = Harness::new();
    let mut session = h.controller::<StudentRegistration>();
    session.submit_details(student()).await.unwrap();
    let mut rx = h.subscribe();

    // When: 605 seconds pass and the countdown ticks repeatedly
    h.clock.advance_secs(605);
    assert_eq!(session.tick().await, 0);
    session.tick().await;
    session.tick().await;

    // Then: one Expired transition, storage cleared, inputs disabled
    assert_eq!(session.state(), SessionState::Expired);
    let expired = drain(&mut rx)
        .iter()
        .filter(|e| matches!(e, SessionEvent::Expired { .. }))
        .count();
    assert_eq!(expired, 1);
    assert!(!h.store.contains(FlowKind::StudentRegistration));

    let view = session.view();
    assert!(!view.inputs_enabled);
    assert!(!view.can_finalize);
    assert!(view.can_restart);
    assert_eq!(view.countdown, "0:00");
}

#[tokio::test]
async fn test_countdown_tracks_wall_clock() {
    let h = Harness::new();
    let mut session = h.controller::<FeePayment>();
    session.submit_details(fee_payment()).await.unwrap();

    h.clock.advance_secs(100);
    assert_eq!(session.tick().await, 500);

    let view = session.view();
    assert_eq!(view.remaining_seconds, Some(500));
    assert_eq!(view.countdown, "8:20");
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn test_operations_refused_after_expiry() {
    let h = Harness::new();
    let mut session = h.controller::<FeePayment>();
    session.submit_details(fee_payment()).await.unwrap();
    session
        .select_file("payment_receipt", png_file("receipt.png"))
        .await
        .unwrap();

    h.clock.advance_secs(601);
    let err = session.upload_slot("payment_receipt").await.unwrap_err();

    assert!(matches!(err, SessionError::Expired));
    assert_eq!(session.state(), SessionState::Expired);
    assert_eq!(h.backend.upload_calls(), 0);
}

#[tokio::test]
async fn test_rehydration_restores_session_and_is_idempotent() {
    // Given: a session with one uploaded and one merely selected file
    let h = Harness::new();
    {
        let mut session = h.controller::<StudentRegistration>();
        session.submit_details(student()).await.unwrap();
        session
            .select_file("passport_photo", png_file("me.png"))
            .await
            .unwrap();
        session.upload_slot("passport_photo").await.unwrap();
        session
            .select_file("id_proof_a", png_file("id.png"))
            .await
            .unwrap();
    }
    h.clock.advance_secs(100);

    // When: a fresh controller mounts
    let mut reloaded = h.controller::<StudentRegistration>();
    assert_eq!(reloaded.mount().await.unwrap(), SessionState::Active);

    // Then: session, countdown, form and slot statuses come back
    let view = reloaded.view();
    assert_eq!(view.session_id.as_deref(), Some("sess-1"));
    assert_eq!(view.remaining_seconds, Some(500));
    assert_eq!(reloaded.form(), Some(&student()));

    let photo = view.slot("passport_photo").unwrap();
    assert_eq!(photo.status, SlotStatus::Succeeded);
    assert!(!photo.has_preview);
    assert_eq!(view.slot("id_proof_a").unwrap().status, SlotStatus::Empty);

    // Mounting again, here or in another controller, changes nothing
    reloaded.mount().await.unwrap();
    assert_eq!(reloaded.view(), view);

    let mut other = h.controller::<StudentRegistration>();
    other.mount().await.unwrap();
    assert_eq!(other.view(), view);
}

#[tokio::test]
async fn test_mount_clears_expired_record() {
    let h = Harness::new();
    {
        let mut session = h.controller::<StudentRegistration>();
        session.submit_details(student()).await.unwrap();
    }
    h.clock.advance_secs(605);

    let mut reloaded = h.controller::<StudentRegistration>();
    assert_eq!(reloaded.mount().await.unwrap(), SessionState::NotStarted);

    assert!(!h.store.contains(FlowKind::StudentRegistration));
    assert!(reloaded.session().is_none());
    // Details stay available for a new submit
    assert_eq!(reloaded.form(), Some(&student()));
}

#[tokio::test]
async fn test_mount_without_record_stays_not_started() {
    let h = Harness::new();
    let mut session = h.controller::<ManagerProfile>();

    assert_eq!(session.mount().await.unwrap(), SessionState::NotStarted);
    assert_eq!(h.backend.lock_calls(), 1);
    assert_eq!(session.view().countdown, "--:--");
}

#[tokio::test]
async fn test_finalize_refused_until_all_slots_succeed() {
    let h = Harness::new();
    let mut session = h.controller::<FeePayment>();
    session.submit_details(fee_payment()).await.unwrap();

    let err = session.finalize(NoExtras {}).await.unwrap_err();

    match err {
        SessionError::SlotsIncomplete { missing } => {
            assert_eq!(missing, vec!["payment_receipt".to_string()]);
        }
        other => panic!("expected missing slots, got {:?}", other),
    }
    assert_eq!(h.backend.finalize_calls(), 0);
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn test_three_slot_gating_scenario() {
    // Given: photo and first id proof upload, second id proof fails
    let h = Harness::new();
    h.backend.push_upload(ApiOutcome::Ok(()));
    h.backend.push_upload(ApiOutcome::Ok(()));
    h.backend
        .push_upload(ApiOutcome::Rejected("Upload failed (HTTP 500)".to_string()));
    let mut rx = h.subscribe();
    let mut session = h.controller::<StudentRegistration>();
    session.submit_details(student()).await.unwrap();

    for slot in ["passport_photo", "id_proof_a", "id_proof_b"] {
        session
            .select_file(slot, png_file(&format!("{}.png", slot)))
            .await
            .unwrap();
    }
    session.upload_slot("passport_photo").await.unwrap();
    session.upload_slot("id_proof_a").await.unwrap();
    let err = session.upload_slot("id_proof_b").await.unwrap_err();
    assert!(matches!(err, SessionError::UploadFailed { ref reason, .. } if reason == "Upload failed (HTTP 500)"));

    // Then: finalize stays disabled and is refused locally
    assert!(!session.all_slots_succeeded());
    assert!(!session.view().can_finalize);
    let credentials = || StudentCredentials::new("longenough", "longenough");
    assert!(matches!(
        session.finalize(credentials()).await,
        Err(SessionError::SlotsIncomplete { .. })
    ));
    assert_eq!(h.backend.finalize_calls(), 0);

    // When: the failed slot is retried manually
    session.upload_slot("id_proof_b").await.unwrap();
    assert!(session.all_slots_succeeded());
    assert!(session.view().can_finalize);

    // Then: finalize goes through
    let response = session.finalize(credentials()).await.unwrap();
    assert_eq!(response["success"], true);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.message(), Some("Registration complete"));
    assert!(!h.store.contains(FlowKind::StudentRegistration));
    assert_eq!(
        h.backend.finalize_bodies(),
        vec![json!({"session_id": "sess-1", "password": "longenough"})]
    );

    let destinations = h.backend.upload_destinations();
    assert_eq!(destinations.len(), 4);
    assert!(destinations[3].ends_with("/sess-1/id_proof_b"));
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::Completed { session_id, .. } if session_id == "sess-1")));
}

#[tokio::test]
async fn test_finalize_expired_rejection_allows_retry() {
    // Given: a fully uploaded fee payment
    let h = Harness::new();
    let mut session = h.controller::<FeePayment>();
    session.submit_details(fee_payment()).await.unwrap();
    session
        .select_file("payment_receipt", png_file("receipt.png"))
        .await
        .unwrap();
    session.upload_slot("payment_receipt").await.unwrap();
    h.backend
        .push_finalize(ApiOutcome::Rejected("session expired".to_string()));

    // When: the backend rejects finalize
    let err = session.finalize(NoExtras {}).await.unwrap_err();

    // Then: the message is shown verbatim and nothing is cleared
    assert_eq!(err.to_string(), "session expired");
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.message(), Some("session expired"));
    let record = h.store.load(FlowKind::FeePayment).await.unwrap().unwrap();
    assert_eq!(record.slots["payment_receipt"].status, SlotStatus::Succeeded);

    // And a retry is allowed
    session.finalize(NoExtras {}).await.unwrap();
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(h.backend.finalize_calls(), 2);
}

#[tokio::test]
async fn test_finalize_network_failure_returns_to_active() {
    let h = Harness::new();
    let mut session = h.controller::<FeePayment>();
    session.submit_details(fee_payment()).await.unwrap();
    session
        .select_file("payment_receipt", png_file("receipt.png"))
        .await
        .unwrap();
    session.upload_slot("payment_receipt").await.unwrap();
    h.backend
        .push_finalize(ApiOutcome::NetworkError("timed out".to_string()));

    assert!(matches!(
        session.finalize(NoExtras {}).await,
        Err(SessionError::Network(_))
    ));
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.message(), Some(NETWORK_MESSAGE));
    assert!(h.store.contains(FlowKind::FeePayment));
}

#[tokio::test]
async fn test_finalize_validates_password_locally() {
    let h = Harness::new();
    let mut session = h.controller::<StudentRegistration>();
    session.submit_details(student()).await.unwrap();
    upload_all(&mut session).await;

    let err = session
        .finalize(StudentCredentials::new("short", "other"))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(h.backend.finalize_calls(), 0);
    assert!(session.field_errors().contains("password"));
    assert!(session.field_errors().contains("confirm_password"));
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn test_cancel_clears_storage_and_selections() {
    let h = Harness::new();
    let mut session = h.controller::<ManagerProfile>();
    session.submit_details(manager()).await.unwrap();
    session
        .select_file("passport_photo", png_file("me.png"))
        .await
        .unwrap();

    session.cancel().await.unwrap();

    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(!h.store.contains(FlowKind::ManagerProfile));
    assert!(session.session().is_none());
    assert_eq!(
        session.view().slot("passport_photo").unwrap().status,
        SlotStatus::Empty
    );

    // Details can be submitted again from Cancelled
    session.submit_details(manager()).await.unwrap();
    assert_eq!(session.session().unwrap().session_id, "sess-2");
}

#[tokio::test]
async fn test_cancel_requires_a_session() {
    let h = Harness::new();
    let mut session = h.controller::<ManagerProfile>();

    let err = session.cancel().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::InvalidTransition {
            state: SessionState::NotStarted,
            ..
        }
    ));
}

#[tokio::test]
async fn test_restart_after_expiry_reuses_details() {
    let h = Harness::new();
    let mut session = h.controller::<StudentRegistration>();
    session.submit_details(student()).await.unwrap();
    h.clock.advance_secs(605);
    session.tick().await;

    session.restart().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.session().unwrap().session_id, "sess-2");
    assert_eq!(session.view().remaining_seconds, Some(600));
    let forms = h.backend.init_forms();
    assert_eq!(forms.len(), 2);
    assert_eq!(forms[0], forms[1]);
    assert!(h.store.contains(FlowKind::StudentRegistration));
}

#[tokio::test]
async fn test_restart_refused_while_healthy() {
    let h = Harness::new();
    let mut session = h.controller::<ManagerProfile>();
    session.submit_details(manager()).await.unwrap();

    assert!(matches!(
        session.restart().await,
        Err(SessionError::InvalidTransition {
            state: SessionState::Active,
            ..
        })
    ));
}

#[tokio::test]
async fn test_details_refused_while_active() {
    let h = Harness::new();
    let mut session = h.controller::<ManagerProfile>();
    session.submit_details(manager()).await.unwrap();

    assert!(matches!(
        session.submit_details(manager()).await,
        Err(SessionError::InvalidTransition { .. })
    ));
    assert_eq!(h.backend.init_calls(), 1);
}

#[tokio::test]
async fn test_oversized_ttl_keeps_session_usable() {
    // Given: a backend granting a TTL far past the calendar range
    let h = Harness::new();
    let mut payload = h.backend.payload(FlowKind::FeePayment, "long-1");
    payload.remaining_seconds = 1_000_000_000_000_000;
    h.backend.push_init(ApiOutcome::Ok(payload));
    let mut session = h.controller::<FeePayment>();

    // When: the session starts, ticks and is reloaded
    session.submit_details(fee_payment()).await.unwrap();
    h.clock.advance_secs(605);
    let remaining = session.tick().await;
    let mut reloaded = h.controller::<FeePayment>();

    // Then: the countdown is capped rather than fatal and the record rehydrates
    assert!(remaining > 0);
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(reloaded.mount().await.unwrap(), SessionState::Active);
    assert_eq!(reloaded.session().unwrap().session_id, "long-1");
}

#[tokio::test]
async fn test_lock_applied_after_mount_blocks_every_mutation() {
    // Given: a fully uploaded payment session
    let h = Harness::new();
    let mut session = h.controller::<FeePayment>();
    session.submit_details(fee_payment()).await.unwrap();
    session
        .select_file("payment_receipt", png_file("receipt.png"))
        .await
        .unwrap();
    session.upload_slot("payment_receipt").await.unwrap();

    // When: the form is locked and the page reloads
    h.backend.set_lock(ApiOutcome::Ok(LockStatus {
        locked: true,
        message: Some("Fee payments are closed".to_string()),
    }));
    let mut reloaded = h.controller::<FeePayment>();
    assert_eq!(reloaded.mount().await.unwrap(), SessionState::Active);

    // Then: the view is read-only and every mutation is refused locally
    let view = reloaded.view();
    assert!(view.locked);
    assert!(!view.inputs_enabled);
    assert!(!view.can_finalize);
    assert!(!view.can_restart);

    assert!(matches!(
        reloaded.discard_file("payment_receipt").await,
        Err(SessionError::Locked(_))
    ));
    assert!(matches!(
        reloaded.select_file("payment_receipt", png_file("again.png")).await,
        Err(SessionError::Locked(_))
    ));
    assert!(matches!(
        reloaded.upload_slot("payment_receipt").await,
        Err(SessionError::Locked(_))
    ));
    let err = reloaded.finalize(NoExtras {}).await.unwrap_err();
    assert!(matches!(err, SessionError::Locked(ref m) if m == "Fee payments are closed"));
    assert_eq!(reloaded.message(), Some(err.to_string().as_str()));

    assert_eq!(h.backend.upload_calls(), 1);
    assert_eq!(h.backend.finalize_calls(), 0);
    assert_eq!(reloaded.state(), SessionState::Active);
}

#[tokio::test]
async fn test_restart_refused_while_locked() {
    let h = Harness::new();
    let mut session = h.controller::<FeePayment>();
    session.submit_details(fee_payment()).await.unwrap();
    h.clock.advance_secs(605);
    session.tick().await;
    assert_eq!(session.state(), SessionState::Expired);

    h.backend.set_lock(ApiOutcome::Ok(LockStatus {
        locked: true,
        message: None,
    }));
    let err = session.restart().await.unwrap_err();

    assert!(matches!(err, SessionError::Locked(_)));
    assert_eq!(h.backend.init_calls(), 1);
    assert_eq!(session.state(), SessionState::Expired);
    assert!(!session.view().can_restart);
}

#[test]
fn test_controller_runs_without_tokio_runtime() {
    // Given: a default context, ticker included, driven by a plain executor
    let h = Harness::new();
    let ctx = SessionContext::new(h.backend.clone(), h.store.clone())
        .with_clock(Arc::new(h.clock.clone()));
    let mut session = StagedSession::<FeePayment>::new(ctx);

    futures::executor::block_on(async {
        // When: a session starts
        session.submit_details(fee_payment()).await.unwrap();

        // Then: it is Active, with ticking left to the caller
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.next_tick().await, None);
        h.clock.advance_secs(605);
        assert_eq!(session.tick().await, 0);
        assert_eq!(session.state(), SessionState::Expired);
    });
}
