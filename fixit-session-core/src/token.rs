//! Per-tab token store
//!
//! The token store is the single source of truth for "is a user signed in"
//! within a tab. It keeps the access token and the cached profile in memory
//! and mirrors them into the shared durable storage. It never performs
//! network calls.

use std::fmt;

use parking_lot::RwLock;

use crate::storage::TabStorage;
use crate::{Result, UserProfile};

/// Durable key holding the access token
pub const ACCESS_KEY: &str = "access";

/// Durable key holding the cached profile (JSON)
pub const PROFILE_KEY: &str = "profile";

/// Durable key set to "1" when the last session ended by forced logout
pub const EXPIRED_KEY: &str = "session_expired";

/// A short-lived bearer credential
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

#[derive(Default)]
struct TokenState {
    /// Whether durable storage has been consulted since this store was created
    loaded: bool,
    access: Option<AccessToken>,
    profile: Option<UserProfile>,
    expired: bool,
    /// A session has existed in this tab at some point
    seen: bool,
    generation: u64,
}

/// Access token and profile cache for one tab
pub struct TokenStore {
    storage: TabStorage,
    state: RwLock<TokenState>,
}

impl TokenStore {
    pub fn new(storage: TabStorage) -> Self {
        Self {
            storage,
            state: RwLock::new(TokenState::default()),
        }
    }

    pub fn storage(&self) -> &TabStorage {
        &self.storage
    }

    /// Current access token, loading it from durable storage on first read
    pub fn get(&self) -> Option<AccessToken> {
        self.ensure_loaded();
        self.state.read().access.clone()
    }

    /// Cached profile; never returned without an accompanying token
    pub fn profile(&self) -> Option<UserProfile> {
        self.ensure_loaded();
        let state = self.state.read();
        state.access.as_ref().and(state.profile.clone())
    }

    /// Store a new access token and clear the expired flag
    pub fn set(&self, token: AccessToken) -> Result<()> {
        self.storage.set(ACCESS_KEY, token.as_str())?;
        self.storage.remove(EXPIRED_KEY)?;

        let mut state = self.state.write();
        state.loaded = true;
        state.access = Some(token);
        state.expired = false;
        state.seen = true;
        state.generation += 1;
        Ok(())
    }

    pub fn set_profile(&self, profile: UserProfile) -> Result<()> {
        let raw = serde_json::to_string(&profile)?;
        self.storage.set(PROFILE_KEY, &raw)?;
        self.state.write().profile = Some(profile);
        Ok(())
    }

    /// Remove token and profile from memory and durable storage
    pub fn clear(&self) -> Result<()> {
        self.ensure_loaded();
        {
            let mut state = self.state.write();
            state.access = None;
            state.profile = None;
            state.generation += 1;
        }
        self.storage.remove(ACCESS_KEY)?;
        self.storage.remove(PROFILE_KEY)?;
        Ok(())
    }

    /// Forced logout: clear, and flag the session expired if one existed
    pub fn expire(&self) -> Result<()> {
        self.ensure_loaded();
        let had_session = {
            let state = self.state.read();
            state.access.is_some() || state.seen
        };
        self.clear()?;
        if had_session {
            self.state.write().expired = true;
            self.storage.set(EXPIRED_KEY, "1")?;
            tracing::info!(tab = %self.storage.tab(), "Session expired");
        }
        Ok(())
    }

    /// User-initiated logout: clear and reset the expired flag
    pub fn logout(&self) -> Result<()> {
        self.clear()?;
        {
            let mut state = self.state.write();
            state.expired = false;
            state.seen = false;
        }
        self.storage.remove(EXPIRED_KEY)?;
        Ok(())
    }

    /// Whether the last session ended by forced logout
    pub fn is_expired(&self) -> bool {
        self.ensure_loaded();
        if self.state.read().expired {
            return true;
        }
        matches!(self.storage.get(EXPIRED_KEY), Ok(Some(flag)) if flag == "1")
    }

    /// Counter bumped on every token mutation
    pub fn generation(&self) -> u64 {
        self.ensure_loaded();
        self.state.read().generation
    }

    /// Token and generation read together
    pub fn current(&self) -> (Option<AccessToken>, u64) {
        self.ensure_loaded();
        let state = self.state.read();
        (state.access.clone(), state.generation)
    }

    /// Another tab removed the token: drop the in-memory session
    pub fn mirror_logout(&self) {
        let mut state = self.state.write();
        state.loaded = true;
        if state.access.is_some() || state.seen {
            state.expired = true;
        }
        state.access = None;
        state.profile = None;
        state.generation += 1;
    }

    /// Another tab stored a token: adopt it without writing back
    pub fn mirror_token(&self, token: AccessToken) {
        let mut state = self.state.write();
        state.loaded = true;
        if state.access.as_ref() == Some(&token) {
            return;
        }
        state.access = Some(token);
        state.expired = false;
        state.seen = true;
        state.generation += 1;
    }

    /// Another tab changed the cached profile
    pub fn mirror_profile(&self, profile: Option<UserProfile>) {
        self.state.write().profile = profile;
    }

    /// Re-read token and profile from durable storage
    pub fn reload(&self) {
        let access = match self.storage.get(ACCESS_KEY) {
            Ok(value) => value.map(AccessToken::new),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read access token from storage");
                None
            }
        };
        let profile = self.load_profile();

        let mut state = self.state.write();
        state.loaded = true;
        if state.access != access {
            state.generation += 1;
        }
        if access.is_some() {
            state.seen = true;
        }
        state.access = access;
        state.profile = profile;
    }

    /// Read the cached profile from durable storage; corrupt data counts as none
    pub fn load_profile(&self) -> Option<UserProfile> {
        let raw = match self.storage.get(PROFILE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read profile from storage");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable cached profile");
                None
            }
        }
    }

    fn ensure_loaded(&self) {
        if self.state.read().loaded {
            return;
        }
        self.reload();
    }
}
