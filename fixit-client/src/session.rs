//! Per-tab authentication session
//!
//! An [`AuthSession`] owns one tab's token store, its refresh coordinator and
//! API client, plus the background tasks that keep the tab in step: the
//! cross-tab sync listener and the periodic refresh timer.

use std::sync::Arc;
use std::time::Duration;

use fixit_session_core::{AccessToken, MountAction, RouteGuard, TabId, TokenStore, UserProfile};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::ApiClient;
use crate::endpoints;
use crate::error::{ClientError, Result};
use crate::refresh::{RefreshCoordinator, TokenResponse};
use crate::sync;

pub struct AuthSession {
    store: Arc<TokenStore>,
    refresher: Arc<RefreshCoordinator>,
    api: ApiClient,
    timer: Arc<RefreshTimer>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AuthSession {
    pub fn new(
        store: Arc<TokenStore>,
        refresher: Arc<RefreshCoordinator>,
        api: ApiClient,
        refresh_interval: Duration,
    ) -> Self {
        let timer = Arc::new(RefreshTimer::new(
            store.clone(),
            refresher.clone(),
            refresh_interval,
        ));
        Self {
            store,
            refresher,
            api,
            timer,
            listener: Mutex::new(None),
        }
    }

    /// Start listening to other tabs and, if a token is held, the refresh timer
    ///
    /// The timer follows sign-ins and sign-outs made in other tabs.
    pub fn start(&self) {
        {
            let mut listener = self.listener.lock();
            if listener.is_none() {
                let timer = self.timer.clone();
                *listener = Some(sync::spawn(self.store.clone(), move |signed_in| {
                    if signed_in {
                        timer.ensure();
                    } else {
                        timer.stop();
                    }
                }));
            }
        }
        if self.store.get().is_some() {
            self.ensure_timer();
        }
    }

    pub fn tab(&self) -> TabId {
        self.store.storage().tab()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.store.profile()
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.store.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Sign in with email and password
    ///
    /// The token is checked and its profile loaded before anything is
    /// stored, so other tabs only ever see a completed login.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let body = json!({ "email": email, "password": password });
        let response = match self
            .api
            .post_json::<TokenResponse, _>(endpoints::LOGIN, &body)
            .await
        {
            Ok(response) => response,
            Err(ClientError::Unauthorized) => {
                tracing::info!(email, "Login rejected");
                return Err(ClientError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        let token = response.access_token().ok_or_else(|| {
            ClientError::InvalidResponse("login response without access token".into())
        })?;

        let profile = match response.profile() {
            Some(profile) => profile,
            None => match self
                .api
                .get_json_as::<UserProfile>(endpoints::PROFILE, &token)
                .await
            {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!(error = %e, "Profile fetch after login failed");
                    self.revoke(&token).await;
                    return Err(e);
                }
            },
        };

        if !profile.email_verified {
            tracing::info!(user_id = profile.id, "Login refused; email not verified");
            self.revoke(&token).await;
            return Err(ClientError::EmailNotVerified);
        }

        let stored = self
            .store
            .set(token)
            .and_then(|_| self.store.set_profile(profile.clone()));
        if let Err(e) = stored {
            if let Err(cleanup) = self.store.logout() {
                tracing::warn!(error = %cleanup, "Could not clear partial login");
            }
            return Err(e.into());
        }

        self.timer.ensure();
        tracing::info!(user_id = profile.id, role = %profile.role.name, "Logged in");
        Ok(profile)
    }

    /// Drop the server side of a login that will not be kept
    async fn revoke(&self, token: &AccessToken) {
        let outcome = self
            .api
            .request_as(Method::POST, endpoints::LOGOUT, Some(&json!({})), token)
            .await;
        if let Err(e) = outcome {
            tracing::debug!(error = %e, "Could not revoke refused login");
        }
    }

    /// Fetch and cache the signed-in user's profile
    ///
    /// Without a token a silent refresh is attempted first. Auth failures end
    /// the session; transport and server errors leave it as it was.
    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        if self.store.get().is_none() {
            self.refresher.refresh().await?;
        }

        match self.api.get_json::<UserProfile>(endpoints::PROFILE).await {
            Ok(profile) => {
                self.store.set_profile(profile.clone())?;
                Ok(profile)
            }
            Err(e) if e.is_auth_failure() => {
                tracing::warn!(error = %e, "Profile fetch rejected; ending session");
                self.store.expire()?;
                self.stop_timer();
                Err(ClientError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Recover the session a tab starts with
    ///
    /// Returns `None` when there is no session to recover.
    pub async fn restore(&self) -> Result<Option<UserProfile>> {
        if self.store.get().is_some() {
            if let Some(profile) = self.store.profile() {
                self.ensure_timer();
                return Ok(Some(profile));
            }
        }

        match self.fetch_profile().await {
            Ok(profile) => {
                self.ensure_timer();
                Ok(Some(profile))
            }
            Err(ClientError::SessionExpired) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sign out; the server call is best effort
    pub async fn logout(&self) -> Result<()> {
        if self.store.get().is_some() {
            let outcome: Result<serde_json::Value> =
                self.api.post_json(endpoints::LOGOUT, &json!({})).await;
            if let Err(e) = outcome {
                tracing::warn!(error = %e, "Server logout failed; clearing local session anyway");
            }
        }

        self.stop_timer();
        self.store.logout()?;
        tracing::info!(tab = %self.tab(), "Logged out");
        Ok(())
    }

    /// Decide whether a protected view may render
    pub async fn check_route(&self) -> RouteGuard {
        let mut guard = RouteGuard::new();
        if guard.mount(self.store.get().is_some()) == MountAction::AttemptRefresh {
            match self.refresher.refresh().await {
                Ok(_) => {
                    guard.refresh_succeeded();
                    self.ensure_timer();
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Silent refresh failed on protected route");
                    guard.refresh_failed(self.store.is_expired());
                }
            }
        }
        guard
    }

    /// Route check that first confirms a held token with the server
    ///
    /// A token left over from an earlier run is trusted only once the
    /// profile endpoint accepts it. Network and server errors keep the
    /// local verdict.
    pub async fn verify_route(&self) -> RouteGuard {
        if self.store.get().is_some() {
            if let Err(e) = self.fetch_profile().await {
                tracing::debug!(error = %e, "Held token could not be verified");
            }
        }
        self.check_route().await
    }

    /// User-facing text for an error raised in this tab
    ///
    /// A rejected request after a forced logout reads as an expired
    /// session, not as never having signed in.
    pub fn describe(&self, error: &ClientError) -> String {
        let session_lost = matches!(
            error,
            ClientError::Unauthorized | ClientError::SessionExpired
        );
        if session_lost && self.store.is_expired() {
            ClientError::SessionExpired.user_message()
        } else {
            error.user_message()
        }
    }

    /// Whether the periodic refresh task is running
    pub fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    fn ensure_timer(&self) {
        self.timer.ensure();
    }

    fn stop_timer(&self) {
        self.timer.stop();
    }

    /// Stop all background tasks of this tab
    pub fn teardown(&self) {
        self.stop_timer();
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Periodic access-token refresh for one tab
///
/// Runs only while the tab holds a token; the task ends on the first tick
/// that finds none.
pub(crate) struct RefreshTimer {
    store: Arc<TokenStore>,
    refresher: Arc<RefreshCoordinator>,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshTimer {
    pub(crate) fn new(
        store: Arc<TokenStore>,
        refresher: Arc<RefreshCoordinator>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            period,
            task: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub(crate) fn ensure(&self) {
        if self.period.is_zero() {
            return;
        }
        let mut slot = self.task.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let store = self.store.clone();
        let refresher = self.refresher.clone();
        let period = self.period;
        *slot = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if store.get().is_none() {
                    tracing::debug!("No token held; refresh timer stopping");
                    break;
                }
                if let Err(e) = refresher.refresh().await {
                    tracing::warn!(error = %e, "Scheduled token refresh failed");
                }
            }
        }));
    }

    pub(crate) fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}
