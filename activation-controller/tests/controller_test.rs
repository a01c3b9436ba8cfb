mod common;

use activation_controller::models::{
    ActivationState, AuthChangeEvent, CapabilityState, NewEmergencyContact, PermissionState,
    Presentation, RequestOutcome, Session, UserId,
};
use activation_controller::services::permission_probe::{
    DENIED_NOTICE, GRANTED_NOTICE, UNSUPPORTED_NOTICE,
};
use activation_controller::services::{
    CapabilityError, InMemoryContactStore, LocalSessionSource, NoticeLevel,
    ScriptedLocationCapability,
};
use activation_controller::ControllerError;
use common::{contact_count, contacts_for, session, TestController};
use std::time::Duration;

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test]
async fn missing_session_redirects_to_auth() {
    let app = TestController::spawn().await;

    let presentation = app.settled().await;
    assert_eq!(
        presentation,
        Presentation::SignedOut {
            redirect_to: "/auth".to_string()
        }
    );
}

#[tokio::test]
async fn expired_session_is_treated_as_signed_out() {
    let mut expired = session("alice");
    expired.expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
    let app = TestController::spawn_with(
        LocalSessionSource::with_session(expired),
        InMemoryContactStore::new(),
        ScriptedLocationCapability::prompting(),
    )
    .await;

    assert!(matches!(app.settled().await, Presentation::SignedOut { .. }));
}

#[tokio::test]
async fn sign_in_after_start_begins_onboarding() {
    let app = TestController::spawn().await;
    app.settled().await;

    app.seed_contacts("alice", 1).await;
    app.sessions.sign_in(session("alice"));

    let presentation = app.synced().await;
    let progress = presentation.progress().unwrap();
    assert_eq!(progress.permission, PermissionState::Unknown);
    assert_eq!(progress.contact_count, 1);
    assert_eq!(progress.required_contacts, 2);
    assert!(!progress.can_activate);
}

#[tokio::test]
async fn shutdown_releases_the_session_subscription() {
    let app = TestController::spawn_signed_in("alice").await;
    app.settled().await;
    assert_eq!(app.sessions.subscriber_count(), 1);

    let sessions = app.sessions.clone();
    app.handle.shutdown().await;
    assert_eq!(sessions.subscriber_count(), 0);
}

#[tokio::test]
async fn dropping_the_handle_disposes_the_controller() {
    let app = TestController::spawn_signed_in("alice").await;
    app.settled().await;

    let sessions = app.sessions.clone();
    let watch = app.handle.watch();
    drop(app);

    tokio::time::timeout(Duration::from_secs(1), async {
        while sessions.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Subscription was not released");
    assert!(watch.has_changed().is_err());
}

#[tokio::test]
async fn session_expiring_without_a_notification_signs_out() {
    let mut short_lived = session("alice");
    short_lived.expires_at = chrono::Utc::now() + chrono::Duration::milliseconds(500);
    let app = TestController::spawn_with(
        LocalSessionSource::with_session(short_lived),
        InMemoryContactStore::new(),
        ScriptedLocationCapability::prompting(),
    )
    .await;
    app.synced().await;

    let presentation = app
        .wait_until(|p| matches!(p, Presentation::SignedOut { .. }))
        .await;
    assert_eq!(
        presentation,
        Presentation::SignedOut {
            redirect_to: "/auth".to_string()
        }
    );
    assert!(matches!(
        app.handle.refresh_contacts().await,
        Err(ControllerError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn token_refresh_pushes_the_expiry_back() {
    let mut short_lived = session("alice");
    short_lived.expires_at = chrono::Utc::now() + chrono::Duration::milliseconds(300);
    let app = TestController::spawn_with(
        LocalSessionSource::with_session(short_lived),
        InMemoryContactStore::new(),
        ScriptedLocationCapability::prompting(),
    )
    .await;
    app.synced().await;

    app.sessions.refresh(session("alice"));
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(app.handle.presentation().progress().is_some());
}

#[tokio::test]
async fn confirm_without_session_is_rejected() {
    let app = TestController::spawn_signed_in("alice").await;
    app.settled().await;
    app.sessions.sign_out();
    app.wait_until(|p| matches!(p, Presentation::SignedOut { .. }))
        .await;

    let result = app.handle.confirm_activate().await;
    assert!(matches!(result, Err(ControllerError::NotAuthenticated)));
}

// =============================================================================
// Onboarding to active
// =============================================================================

#[tokio::test]
async fn onboarding_scenario_requires_explicit_confirmation() {
    let app = TestController::spawn_signed_in("alice").await;

    let presentation = app.settled().await;
    let progress = presentation.progress().unwrap();
    assert_eq!(progress.permission, PermissionState::Unknown);
    assert_eq!(progress.contact_count, 0);
    assert!(!progress.can_activate);

    let outcome = app.handle.request_permission().await.unwrap();
    assert_eq!(outcome, RequestOutcome::Granted);
    let progress = app.handle.presentation().progress().cloned().unwrap();
    assert!(progress.location_step_done);
    assert!(!progress.can_activate);
    assert_eq!(
        app.handle.confirm_activate().await.unwrap(),
        ActivationState::Onboarding
    );

    app.handle
        .add_contact(NewEmergencyContact::new("Mum", "9810000001"))
        .await
        .unwrap();
    let progress = app.handle.presentation().progress().cloned().unwrap();
    assert_eq!(progress.contact_count, 1);
    assert!(!progress.can_activate);
    assert_eq!(
        app.handle.confirm_activate().await.unwrap(),
        ActivationState::Onboarding
    );

    app.handle
        .add_contact(NewEmergencyContact::new("Dad", "9810000002"))
        .await
        .unwrap();
    let progress = app.handle.presentation().progress().cloned().unwrap();
    assert_eq!(progress.contact_count, 2);
    assert!(progress.contacts_step_done);
    assert!(progress.can_activate);
    // Satisfied is not enough on its own.
    assert!(!app.handle.presentation().is_active());

    assert_eq!(
        app.handle.confirm_activate().await.unwrap(),
        ActivationState::Active
    );
    assert_eq!(
        app.handle.presentation(),
        Presentation::Active {
            user_id: UserId::new("alice")
        }
    );

    let notice = app.notifier.notices().into_iter().next().unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(notice.message, GRANTED_NOTICE);
}

#[tokio::test]
async fn external_contact_changes_need_a_refresh() {
    let app = TestController::spawn_signed_in("alice").await;
    assert_eq!(contact_count(&app.settled().await), 0);

    app.seed_contacts("alice", 2).await;
    assert_eq!(contact_count(&app.handle.presentation()), 0);

    assert_eq!(app.handle.refresh_contacts().await.unwrap(), 2);
    assert_eq!(contact_count(&app.handle.presentation()), 2);
}

#[tokio::test]
async fn removing_a_contact_updates_progress() {
    let app = TestController::spawn_signed_in("alice").await;
    let seeded = app.seed_contacts("alice", 2).await;
    app.handle.refresh_contacts().await.unwrap();

    app.handle.remove_contact(&seeded[0].id).await.unwrap();
    assert_eq!(contact_count(&app.handle.presentation()), 1);
}

#[tokio::test]
async fn invalid_contact_is_rejected_before_reaching_the_store() {
    let app = TestController::spawn_signed_in("alice").await;
    app.settled().await;

    let result = app
        .handle
        .add_contact(NewEmergencyContact::new("", "12"))
        .await;
    assert!(matches!(result, Err(ControllerError::Validation(_))));
    assert_eq!(app.handle.refresh_contacts().await.unwrap(), 0);
}

#[tokio::test]
async fn active_mode_survives_permission_and_contact_updates() {
    let app = TestController::spawn_signed_in("alice").await;
    let seeded = app.seed_contacts("alice", 2).await;
    app.settled().await;
    app.handle.request_permission().await.unwrap();
    app.handle.refresh_contacts().await.unwrap();
    assert_eq!(
        app.handle.confirm_activate().await.unwrap(),
        ActivationState::Active
    );

    app.handle.remove_contact(&seeded[0].id).await.unwrap();
    app.location
        .set_request_result(Err(CapabilityError::PermissionDenied("revoked".to_string())));
    assert_eq!(
        app.handle.request_permission().await.unwrap(),
        RequestOutcome::Denied
    );
    app.sessions.refresh(session("alice"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(app.handle.presentation().is_active());
    assert_eq!(
        app.handle.confirm_activate().await.unwrap(),
        ActivationState::Active
    );
}

#[tokio::test]
async fn session_end_while_active_resets_to_fresh_onboarding() {
    let app = TestController::spawn_signed_in("alice").await;
    app.seed_contacts("alice", 2).await;
    app.settled().await;
    app.handle.request_permission().await.unwrap();
    app.handle.refresh_contacts().await.unwrap();
    app.handle.confirm_activate().await.unwrap();
    assert!(app.handle.presentation().is_active());

    app.sessions.sign_out();
    app.wait_until(|p| matches!(p, Presentation::SignedOut { .. }))
        .await;

    // Hold the store so the pre-sync state of the new session is observable.
    let alice = UserId::new("alice");
    app.store.hold(&alice);
    app.sessions.sign_in(session("alice"));

    let fresh = app.wait_until(|p| p.progress().is_some()).await;
    let progress = fresh.progress().unwrap();
    assert_eq!(progress.permission, PermissionState::Unknown);
    assert_eq!(progress.contact_count, 0);
    assert!(!progress.synced);
    assert!(!progress.can_activate);

    app.store.release(&alice);
    let synced = app.synced().await;
    assert_eq!(contact_count(&synced), 2);
    assert!(!synced.is_active());
}

// =============================================================================
// Stale responses
// =============================================================================

#[tokio::test]
async fn stale_contact_fetch_does_not_leak_into_the_next_session() {
    let store = InMemoryContactStore::new();
    store.seed(contacts_for("alice", 3)).await;
    let alice = UserId::new("alice");
    store.hold(&alice);

    let app = TestController::spawn_with(
        LocalSessionSource::with_session(session("alice")),
        store,
        ScriptedLocationCapability::new(Ok(CapabilityState::Granted)),
    )
    .await;
    app.wait_until(|p| p.progress().is_some()).await;

    app.sessions.sign_out();
    app.sessions.sign_in(session("bob"));
    let bob = app.synced().await;
    assert_eq!(contact_count(&bob), 0);

    app.store.release(&alice);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = app.handle.presentation();
    assert_eq!(contact_count(&after), 0);
    assert!(!after.progress().unwrap().can_activate);
}

#[tokio::test]
async fn permission_answer_after_session_change_is_discarded() {
    let app = TestController::spawn_signed_in("alice").await;
    app.seed_contacts("bob", 1).await;
    app.settled().await;
    app.location.hold_requests();

    let (outcome, _) = tokio::join!(app.handle.request_permission(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        app.sessions.sign_out();
        app.sessions.sign_in(session("bob"));
        app.wait_until(|p| {
            p.progress()
                .is_some_and(|progress| progress.synced && progress.contact_count == 1)
        })
        .await;
        app.location.answer_requests();
    });

    // The user's answer is still reported to the caller...
    assert_eq!(outcome.unwrap(), RequestOutcome::Granted);
    // ...but it belonged to alice's session, not bob's.
    let progress = app.handle.presentation().progress().cloned().unwrap();
    assert_eq!(progress.permission, PermissionState::Unknown);
}

#[tokio::test]
async fn switching_users_without_sign_out_starts_a_new_session() {
    let app = TestController::spawn_signed_in("alice").await;
    app.seed_contacts("alice", 2).await;
    app.settled().await;
    app.handle.request_permission().await.unwrap();
    app.handle.refresh_contacts().await.unwrap();
    app.handle.confirm_activate().await.unwrap();

    app.sessions.emit(AuthChangeEvent::SignedIn, Some(session("bob")));
    let presentation = app.synced().await;
    assert_eq!(contact_count(&presentation), 0);
}

// =============================================================================
// Concurrent requests within one session
// =============================================================================

#[tokio::test]
async fn token_refresh_during_an_open_prompt_keeps_the_users_answer() {
    let app = TestController::spawn_signed_in("alice").await;
    app.settled().await;
    let queries = app.location.query_count();
    app.location.hold_requests();

    let (outcome, _) = tokio::join!(app.handle.request_permission(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        // The refresh re-reads the permission, which still reads as not granted.
        app.sessions.refresh(session("alice"));
        tokio::time::timeout(Duration::from_secs(1), async {
            while app.location.query_count() == queries {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Refresh did not re-read the permission");
        tokio::time::sleep(Duration::from_millis(20)).await;
        app.location.answer_requests();
    });

    assert_eq!(outcome.unwrap(), RequestOutcome::Granted);
    let progress = app.handle.presentation().progress().cloned().unwrap();
    assert_eq!(progress.permission, PermissionState::Granted);
    assert!(progress.location_step_done);
}

#[tokio::test]
async fn refresh_during_a_pending_add_still_shows_the_new_contact() {
    let app = TestController::spawn_signed_in("alice").await;
    app.settled().await;
    app.store.hold_writes();

    let (added, refreshed) = tokio::join!(
        app.handle
            .add_contact(NewEmergencyContact::new("Mum", "9810000001")),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let refreshed = app.handle.refresh_contacts().await;
            app.store.release_writes();
            refreshed
        }
    );

    assert_eq!(refreshed.unwrap(), 0);
    assert_eq!(added.unwrap().name, "Mum");
    assert_eq!(contact_count(&app.handle.presentation()), 1);
}

#[tokio::test]
async fn refresh_during_a_pending_remove_still_drops_the_contact() {
    let app = TestController::spawn_signed_in("alice").await;
    let seeded = app.seed_contacts("alice", 2).await;
    app.settled().await;
    assert_eq!(app.handle.refresh_contacts().await.unwrap(), 2);
    app.store.hold_writes();

    let (removed, refreshed) = tokio::join!(app.handle.remove_contact(&seeded[0].id), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let refreshed = app.handle.refresh_contacts().await;
        app.store.release_writes();
        refreshed
    });

    assert_eq!(refreshed.unwrap(), 2);
    assert!(removed.is_ok());
    assert_eq!(contact_count(&app.handle.presentation()), 1);
}

#[tokio::test]
async fn write_finishing_after_sign_out_is_not_read_back() {
    let app = TestController::spawn_signed_in("alice").await;
    app.settled().await;
    app.store.hold_writes();

    let (added, _) = tokio::join!(
        app.handle
            .add_contact(NewEmergencyContact::new("Mum", "9810000001")),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            app.sessions.sign_out();
            app.wait_until(|p| matches!(p, Presentation::SignedOut { .. }))
                .await;
            app.store.release_writes();
        }
    );

    // The write itself landed, so the caller is told it succeeded.
    assert!(added.is_ok());
    assert!(matches!(
        app.handle.presentation(),
        Presentation::SignedOut { .. }
    ));
}

// =============================================================================
// Store credentials
// =============================================================================

#[tokio::test]
async fn store_calls_run_under_the_session_access_token() {
    let app = TestController::spawn_signed_in("alice").await;
    app.settled().await;
    assert_eq!(app.store.last_access_token().as_deref(), Some("token-alice"));

    let rotated = Session::new(
        "alice",
        "token-alice-2",
        chrono::Utc::now() + chrono::Duration::hours(1),
    );
    app.sessions.refresh(rotated);
    tokio::time::timeout(Duration::from_secs(1), async {
        while app.store.last_access_token().as_deref() != Some("token-alice-2") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Refresh did not re-read contacts with the new token");

    app.handle
        .add_contact(NewEmergencyContact::new("Mum", "9810000001"))
        .await
        .unwrap();
    assert_eq!(
        app.store.last_access_token().as_deref(),
        Some("token-alice-2")
    );
}

// =============================================================================
// Degraded collaborators
// =============================================================================

#[tokio::test]
async fn unreachable_store_degrades_to_zero_contacts() {
    let store = InMemoryContactStore::new();
    store.seed(contacts_for("alice", 2)).await;
    store.set_unreachable(true);

    let app = TestController::spawn_with(
        LocalSessionSource::with_session(session("alice")),
        store,
        ScriptedLocationCapability::new(Ok(CapabilityState::Granted)),
    )
    .await;

    let presentation = app.settled().await;
    let progress = presentation.progress().unwrap();
    assert_eq!(progress.contact_count, 0);
    assert!(progress.synced);
    assert!(!progress.can_activate);

    app.store.set_unreachable(false);
    assert_eq!(app.handle.refresh_contacts().await.unwrap(), 2);
    assert!(app.handle.presentation().progress().unwrap().can_activate);
}

#[tokio::test]
async fn unsupported_location_keeps_permission_unknown() {
    let app = TestController::spawn_with(
        LocalSessionSource::with_session(session("alice")),
        InMemoryContactStore::new(),
        ScriptedLocationCapability::unsupported(),
    )
    .await;
    app.settled().await;

    let outcome = app.handle.request_permission().await.unwrap();
    assert_eq!(outcome, RequestOutcome::Unsupported);
    assert_eq!(
        app.handle.presentation().progress().unwrap().permission,
        PermissionState::Unknown
    );
    let notice = app.notifier.last().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.message, UNSUPPORTED_NOTICE);
}

#[tokio::test]
async fn denied_permission_recovers_only_through_a_later_query() {
    let location = ScriptedLocationCapability::prompting();
    location.set_request_result(Err(CapabilityError::PermissionDenied(
        "user blocked".to_string(),
    )));
    let app = TestController::spawn_with(
        LocalSessionSource::with_session(session("alice")),
        InMemoryContactStore::new(),
        location,
    )
    .await;
    app.settled().await;

    assert_eq!(
        app.handle.request_permission().await.unwrap(),
        RequestOutcome::Denied
    );
    assert_eq!(app.notifier.last().unwrap().message, DENIED_NOTICE);
    assert_eq!(
        app.handle.presentation().progress().unwrap().permission,
        PermissionState::Denied
    );

    // The user changes the device setting outside the app.
    app.location.set_query_result(Ok(CapabilityState::Granted));
    assert_eq!(
        app.handle.refresh_permission().await.unwrap(),
        PermissionState::Granted
    );
    assert!(app.handle.presentation().progress().unwrap().location_step_done);
}
