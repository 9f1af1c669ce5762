//! Cross-tab session synchronization
//!
//! Every tab listens to the shared storage area. When another tab removes
//! the access token (logout, or a failed refresh over there) this tab drops
//! its in-memory session and flags it expired; when another tab stores a
//! token or profile, this tab adopts it. Events written by this tab itself
//! are skipped.

use std::sync::Arc;

use fixit_session_core::{AccessToken, StorageEvent, TokenStore, ACCESS_KEY, PROFILE_KEY};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Apply one storage event to a tab's token store
///
/// Returns whether the event changed anything.
pub fn apply(store: &TokenStore, event: &StorageEvent) -> bool {
    let tab = store.storage().tab();
    if event.origin == tab {
        return false;
    }

    match event.key.as_str() {
        ACCESS_KEY => match &event.new_value {
            None => {
                tracing::info!(%tab, from = %event.origin, "Signed out in another tab");
                store.mirror_logout();
            }
            Some(token) => {
                tracing::debug!(%tab, from = %event.origin, "Token updated in another tab");
                store.mirror_token(AccessToken::new(token.clone()));
            }
        },
        PROFILE_KEY => {
            let profile = event
                .new_value
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok());
            store.mirror_profile(profile);
        }
        _ => return false,
    }
    true
}

/// Listen for storage events until the storage area goes away
///
/// The subscription is taken before this returns, so no event written after
/// the call is missed. `on_session` is told whether this tab holds a token
/// after each sign-in or sign-out seen from another tab.
pub fn spawn<F>(store: Arc<TokenStore>, on_session: F) -> JoinHandle<()>
where
    F: Fn(bool) + Send + 'static,
{
    let mut events = store.storage().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if apply(&store, &event) && event.key == ACCESS_KEY {
                        on_session(event.new_value.is_some());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed storage events; reloading session");
                    store.reload();
                    on_session(store.get().is_some());
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
