//! Authenticated HTTP client
//!
//! Every page-level fetch goes through [`ApiClient`]. It attaches the bearer
//! token to private endpoints only, and when a private request is rejected
//! with 401 it refreshes the token once and replays the request once.

use std::sync::Arc;

use fixit_session_core::{AccessToken, TokenStore};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::endpoints;
use crate::error::{ClientError, Result};
use crate::refresh::RefreshCoordinator;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    store: Arc<TokenStore>,
    refresher: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        base: impl Into<String>,
        store: Arc<TokenStore>,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            store,
            refresher,
        }
    }

    /// Absolute URL of an API path
    pub fn url(&self, path: &str) -> Result<Url> {
        join_url(&self.base, path)
    }

    /// Token to send with a request to `path`, if any
    pub fn bearer_for(&self, path: &str) -> Option<AccessToken> {
        if endpoints::is_public(path) {
            None
        } else {
            self.store.get()
        }
    }

    /// Send a request, refreshing and retrying once on 401
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        let url = self.url(path)?;
        let public = endpoints::is_public(path);
        let (token, observed) = if public {
            (None, 0)
        } else {
            self.store.current()
        };

        let response = self
            .send(method.clone(), url.clone(), body, token.as_ref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED || public || endpoints::is_refresh(path)
        {
            return check(response).await;
        }

        tracing::debug!(%method, path, "Request unauthorized; refreshing token");
        let fresh = match self.refresher.refresh_after(observed).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(%method, path, error = %e, "Could not recover from 401");
                return Err(ClientError::Unauthorized);
            }
        };

        // The replay is final: a second 401 is returned as is
        let retried = self.send(method, url, body, Some(&fresh)).await?;
        check(retried).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path, None).await?;
        decode(response).await
    }

    /// Send with an explicit token, outside the refresh-and-retry cycle
    ///
    /// Used while a token is checked before it is stored.
    pub async fn request_as(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &AccessToken,
    ) -> Result<Response> {
        let response = self.send(method, self.url(path)?, body, Some(token)).await?;
        check(response).await
    }

    pub async fn get_json_as<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &AccessToken,
    ) -> Result<T> {
        let response = self.request_as(Method::GET, path, None, token).await?;
        decode(response).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self.request(Method::POST, path, Some(&body)).await?;
        decode(response).await
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let response = self.request(Method::PATCH, path, Some(&body)).await?;
        decode(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request(Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        token: Option<&AccessToken>,
    ) -> Result<Response> {
        let mut request = self.http.request(method, url);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token.bearer());
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

/// Join an API base URL and a path
pub fn join_url(base: &str, path: &str) -> Result<Url> {
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{}/{}", base.trim_end_matches('/'), path))
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
}

/// Turn non-success statuses into errors
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let bytes = response.bytes().await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    tracing::debug!(%status, "Request failed");
    Err(ClientError::from_status(status, body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    let slice: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    serde_json::from_slice(slice).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}
