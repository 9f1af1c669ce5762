//! Login, logout, profile and route guard behaviour

mod common;

use std::sync::atomic::Ordering;

use common::{eventually, setup, signed_in_tab, MockBackend, EMAIL, PASSWORD};
use fixit_client::ClientError;
use fixit_session_core::{
    AccessToken, Capability, Feature, GuardState, GuardView, TabId, PROFILE_KEY,
};

/// Test: valid credentials store a token and authorize protected routes
#[tokio::test]
async fn test_login_authorizes_route() {
    let (backend, browser) = setup().await;
    let tab = browser.open_tab().unwrap();

    let profile = tab.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(profile.email, EMAIL);
    assert_eq!(profile.role.name, "Student");
    assert!(profile.can(Capability::Report));
    assert!(!profile.can(Capability::Fix));
    assert!(profile.features().contains(&Feature::MyReports));
    assert!(tab.is_authenticated());

    let guard = tab.check_route().await;
    assert_eq!(guard.state(), GuardState::Authorized);
    assert_eq!(guard.view(), GuardView::Protected);
    assert_eq!(MockBackend::count(&backend.refresh_calls), 0);
}

/// Test: the profile is fetched when login does not embed it
#[tokio::test]
async fn test_login_fetches_profile_when_not_embedded() {
    let (backend, browser) = setup().await;
    backend.embed_profile.store(false, Ordering::SeqCst);

    let tab = signed_in_tab(&browser).await;
    assert_eq!(MockBackend::count(&backend.profile_calls), 1);
    assert_eq!(tab.profile().unwrap().full_name.as_deref(), Some("Ada Student"));
}

/// Test: wrong credentials are reported as such and store nothing
#[tokio::test]
async fn test_invalid_credentials() {
    let (_backend, browser) = setup().await;
    let tab = browser.open_tab().unwrap();

    let err = tab.login(EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidCredentials));
    assert_eq!(err.user_message(), "Invalid email or password.");
    assert!(!tab.is_authenticated());
}

/// Test: accounts with an unverified email cannot sign in
#[tokio::test]
async fn test_unverified_email_rejected() {
    let (backend, browser) = setup().await;
    backend.email_unverified.store(true, Ordering::SeqCst);
    let other = browser.open_tab().unwrap();
    let tab = browser.open_tab().unwrap();

    let err = tab.login(EMAIL, PASSWORD).await.unwrap_err();
    assert!(matches!(err, ClientError::EmailNotVerified));
    assert!(tab.access_token().is_none());
    assert!(!tab.store().is_expired());

    // The refused token never reached storage and was revoked on the server
    tokio::task::yield_now().await;
    assert!(other.access_token().is_none());
    assert_eq!(MockBackend::count(&backend.logout_calls), 1);
}

/// Test: a tab that never signed in is sent to the login page
#[tokio::test]
async fn test_cold_tab_is_unauthenticated() {
    let (backend, browser) = setup().await;
    let tab = browser.open_tab().unwrap();

    let guard = tab.check_route().await;
    assert_eq!(guard.state(), GuardState::Unauthenticated);
    assert_eq!(guard.view(), GuardView::RedirectToLogin);
    assert_eq!(MockBackend::count(&backend.refresh_calls), 1);
}

/// Test: a lost access token is recovered from the refresh cookie on mount
#[tokio::test]
async fn test_route_recovers_with_refresh_cookie() {
    let (backend, browser) = setup().await;
    let tab = signed_in_tab(&browser).await;
    tab.store().clear().unwrap();

    let guard = tab.check_route().await;
    assert_eq!(guard.state(), GuardState::Authorized);
    assert!(tab.is_authenticated());
    assert_eq!(MockBackend::count(&backend.refresh_calls), 1);
}

/// Test: a session whose refresh cookie died shows the expired screen
#[tokio::test]
async fn test_route_expired_after_failed_refresh() {
    let (backend, browser) = setup().await;
    let tab = signed_in_tab(&browser).await;
    backend.revoke_refresh_tokens();
    tab.store().clear().unwrap();

    let guard = tab.check_route().await;
    assert_eq!(guard.state(), GuardState::Expired);
    assert_eq!(guard.view(), GuardView::SessionExpired);
    assert!(tab.store().is_expired());
}

/// Test: logout clears everything and is not reported as expiry
#[tokio::test]
async fn test_logout_clears_session() {
    let (backend, browser) = setup().await;
    let tab = signed_in_tab(&browser).await;

    tab.logout().await.unwrap();
    assert_eq!(MockBackend::count(&backend.logout_calls), 1);
    assert!(tab.access_token().is_none());
    assert!(tab.profile().is_none());
    assert!(!tab.store().is_expired());
    assert!(!tab.timer_running());

    // The refresh cookie went with it
    let guard = tab.check_route().await;
    assert_eq!(guard.state(), GuardState::Unauthenticated);
}

/// Test: logout still clears locally when the server call fails
#[tokio::test]
async fn test_logout_is_best_effort() {
    let (backend, browser) = setup().await;
    let tab = signed_in_tab(&browser).await;
    backend.revoke_access_tokens();
    backend.refresh_rejects.store(true, Ordering::SeqCst);

    tab.logout().await.unwrap();
    assert!(tab.access_token().is_none());
    assert!(!tab.store().is_expired());
}

/// Test: a second tab restores from shared storage without network calls
#[tokio::test]
async fn test_restore_uses_cached_profile() {
    let (backend, browser) = setup().await;
    let _first = signed_in_tab(&browser).await;
    let second = browser.open_tab().unwrap();

    let profile = second.restore().await.unwrap().unwrap();
    assert_eq!(profile.id, 7);
    assert_eq!(MockBackend::count(&backend.profile_calls), 0);
    assert_eq!(MockBackend::count(&backend.refresh_calls), 0);
}

/// Test: restoring with nothing to restore yields no profile
#[tokio::test]
async fn test_restore_without_session() {
    let (_backend, browser) = setup().await;
    let tab = browser.open_tab().unwrap();

    assert!(tab.restore().await.unwrap().is_none());
    assert!(!tab.store().is_expired());
}

/// Test: a profile fetch that fails during login leaves no session behind
#[tokio::test]
async fn test_login_with_failing_profile_fetch_stores_nothing() {
    let (backend, browser) = setup().await;
    backend.embed_profile.store(false, Ordering::SeqCst);
    backend.profile_fails.store(true, Ordering::SeqCst);
    let other = browser.open_tab().unwrap();
    let tab = browser.open_tab().unwrap();

    let err = tab.login(EMAIL, PASSWORD).await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 503 }));
    assert!(!tab.is_authenticated());
    assert!(tab.profile().is_none());
    assert!(!tab.store().is_expired());
    assert!(!tab.timer_running());

    tokio::task::yield_now().await;
    assert!(other.access_token().is_none());
    assert_eq!(MockBackend::count(&backend.profile_calls), 1);
    assert_eq!(MockBackend::count(&backend.logout_calls), 1);

    // Once the backend recovers the same tab signs in normally
    backend.profile_fails.store(false, Ordering::SeqCst);
    tab.login(EMAIL, PASSWORD).await.unwrap();
    assert!(eventually(|| other.access_token() == tab.access_token()).await);
}

/// Test: a stored token the server no longer accepts is not reported as signed in
#[tokio::test]
async fn test_verified_route_rejects_stale_token() {
    let (_backend, browser) = setup().await;
    let tab = browser.open_tab().unwrap();
    tab.store()
        .set(AccessToken::new("stale-from-last-run"))
        .unwrap();

    let guard = tab.verify_route().await;
    assert_eq!(guard.state(), GuardState::Expired);
    assert_eq!(guard.view(), GuardView::SessionExpired);
    assert!(tab.access_token().is_none());
}

/// Test: a live session passes the verified route check
#[tokio::test]
async fn test_verified_route_accepts_live_token() {
    let (backend, browser) = setup().await;
    let tab = signed_in_tab(&browser).await;

    let guard = tab.verify_route().await;
    assert_eq!(guard.state(), GuardState::Authorized);
    assert_eq!(MockBackend::count(&backend.profile_calls), 1);
    assert_eq!(MockBackend::count(&backend.refresh_calls), 0);
}

/// Test: a tab holding a token but no cached profile fetches it on restore
#[tokio::test]
async fn test_restore_fetches_missing_profile() {
    let (backend, browser) = setup().await;
    let _first = signed_in_tab(&browser).await;
    browser.storage().remove(PROFILE_KEY, TabId::new()).unwrap();

    let second = browser.open_tab().unwrap();
    assert!(second.access_token().is_some());
    assert!(second.profile().is_none());

    let profile = second.restore().await.unwrap().unwrap();
    assert_eq!(profile.id, 7);
    assert_eq!(second.profile(), Some(profile));
    assert_eq!(MockBackend::count(&backend.profile_calls), 1);
    assert!(second.timer_running());
}

/// Test: a request rejected after a forced logout reads as an expired session
#[tokio::test]
async fn test_forced_logout_is_described_as_expiry() {
    let (backend, browser) = setup().await;
    let tab = signed_in_tab(&browser).await;
    backend.revoke_access_tokens();
    backend.refresh_rejects.store(true, Ordering::SeqCst);

    let err = tab.api().tickets().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized));
    assert_eq!(
        tab.describe(&err),
        "Your session has expired. Please log in again to continue."
    );
    assert_eq!(
        tab.describe(&ClientError::InvalidCredentials),
        "Invalid email or password."
    );

    let (_other_backend, other_browser) = setup().await;
    let cold = other_browser.open_tab().unwrap();
    assert_eq!(
        cold.describe(&ClientError::Unauthorized),
        "You need to sign in to continue."
    );
}
