//! Silent access-token refresh
//!
//! The refresh cookie set at login is HTTP-only and lives in the cookie jar;
//! exchanging it at `/token/refresh/` yields a new access token. Refreshes
//! are single-flight: callers queue on one gate, and whoever gets the gate
//! after the token has already changed reuses that outcome instead of
//! calling the server again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fixit_session_core::{AccessToken, TokenStore, UserProfile};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{ClientError, Result};

/// Body returned by the login and refresh endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub profile: Option<Value>,
}

impl TokenResponse {
    pub fn access_token(&self) -> Option<AccessToken> {
        self.access
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(AccessToken::new)
    }

    /// Embedded profile, if present and readable
    pub fn profile(&self) -> Option<UserProfile> {
        let value = self.profile.clone()?;
        match UserProfile::from_json(value) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable embedded profile");
                None
            }
        }
    }
}

/// Resets the in-flight flag even if the refresh future is dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct RefreshCoordinator {
    http: reqwest::Client,
    url: Url,
    store: Arc<TokenStore>,
    gate: Mutex<()>,
    in_flight: AtomicBool,
}

impl RefreshCoordinator {
    pub fn new(http: reqwest::Client, url: Url, store: Arc<TokenStore>) -> Self {
        Self {
            http,
            url,
            store,
            gate: Mutex::new(()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a refresh call is on the wire right now
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Refresh the access token, joining any refresh already under way
    pub async fn refresh(&self) -> Result<AccessToken> {
        let observed = self.store.generation();
        self.refresh_after(observed).await
    }

    /// Refresh unless the token changed since generation `observed`
    ///
    /// A request that was rejected passes the generation of the token it
    /// sent, so a refresh finished by someone else in the meantime is reused.
    pub async fn refresh_after(&self, observed: u64) -> Result<AccessToken> {
        let _gate = self.gate.lock().await;

        if self.store.generation() != observed {
            tracing::debug!("Token changed while waiting; reusing outcome");
            return self.store.get().ok_or(ClientError::SessionExpired);
        }

        let outcome = {
            let _in_flight = InFlight::start(&self.in_flight);
            self.exchange().await
        };

        match outcome {
            Ok(response) => {
                let token = response.access_token().ok_or_else(|| {
                    ClientError::InvalidResponse("refresh response without access token".into())
                });
                let token = match token {
                    Ok(token) => token,
                    Err(e) => return self.fail(e),
                };
                self.store.set(token.clone())?;
                if let Some(profile) = response.profile() {
                    self.store.set_profile(profile)?;
                }
                tracing::info!("Access token refreshed");
                Ok(token)
            }
            Err(e) => self.fail(e),
        }
    }

    async fn exchange(&self) -> Result<TokenResponse> {
        tracing::debug!(url = %self.url, "Refreshing access token");
        let response = self
            .http
            .post(self.url.clone())
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            return Err(ClientError::from_status(status, body));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::InvalidResponse(format!("refresh response: {}", e)))
    }

    /// Any refresh failure ends the session
    fn fail(&self, cause: ClientError) -> Result<AccessToken> {
        tracing::warn!(error = %cause, "Token refresh failed; logging out");
        self.store.expire()?;
        Err(ClientError::SessionExpired)
    }
}
