//! Browser context
//!
//! A [`Browser`] is what every tab shares: the durable storage area and the
//! HTTP client whose cookie jar holds the HTTP-only refresh cookie. Tabs are
//! opened from it as independent [`AuthSession`]s.

use std::sync::Arc;

use fixit_session_core::{FileBackend, StorageArea, TabId, TabStorage, TokenStore};

use crate::client::{self, ApiClient};
use crate::config::Config;
use crate::endpoints;
use crate::error::Result;
use crate::refresh::RefreshCoordinator;
use crate::session::AuthSession;

pub struct Browser {
    config: Config,
    area: Arc<StorageArea>,
    http: reqwest::Client,
}

impl Browser {
    pub fn new(config: Config, area: StorageArea) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()?;

        tracing::debug!(api_url = %config.api_url, "Browser context created");
        Ok(Self {
            config,
            area: Arc::new(area),
            http,
        })
    }

    /// Browser whose storage lives only as long as the process
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::new(config, StorageArea::in_memory())
    }

    /// Browser persisting its storage to `config.state_file`
    pub fn with_state_file(config: Config) -> Result<Self> {
        let backend = FileBackend::open(&config.state_file)?;
        Self::new(config, StorageArea::new(backend))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<StorageArea> {
        &self.area
    }

    /// Open a new tab with its own in-memory session over the shared storage
    ///
    /// Must be called from within a tokio runtime; the tab's background
    /// tasks are spawned immediately.
    pub fn open_tab(&self) -> Result<AuthSession> {
        let tab = TabId::new();
        let store = Arc::new(TokenStore::new(TabStorage::new(self.area.clone(), tab)));

        let refresh_url = client::join_url(&self.config.api_url, endpoints::REFRESH)?;

        let refresher = Arc::new(RefreshCoordinator::new(
            self.http.clone(),
            refresh_url,
            store.clone(),
        ));
        let api = ApiClient::new(
            self.http.clone(),
            self.config.api_url.clone(),
            store.clone(),
            refresher.clone(),
        );

        let session = AuthSession::new(store, refresher, api, self.config.refresh_interval());
        session.start();
        tracing::debug!(%tab, "Tab opened");
        Ok(session)
    }
}
