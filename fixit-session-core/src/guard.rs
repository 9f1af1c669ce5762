//! Route guard state machine
//!
//! A protected view starts in [`GuardState::Checking`]. On mount it is
//! authorized straight away if the tab holds a token; otherwise the caller
//! attempts a silent refresh and reports the outcome. A failed refresh ends
//! in [`GuardState::Expired`] when a session existed before (the user gets a
//! "session expired" screen) and in [`GuardState::Unauthenticated`] when the
//! user never signed in (plain redirect to login).
//!
//! This module only holds the transitions; running the refresh is the
//! client's job.

/// Where a guarded view stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Authorized,
    Expired,
    Unauthenticated,
}

impl GuardState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GuardState::Checking)
    }
}

/// What the guarded view should render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardView {
    /// Still checking; show a spinner
    Loading,
    /// Render the protected children
    Protected,
    /// Offer a re-login instead of silently redirecting
    SessionExpired,
    /// Redirect to the login page
    RedirectToLogin,
}

/// What the caller must do after mounting the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountAction {
    /// Nothing to do; the guard is authorized
    Proceed,
    /// No token is held; attempt a silent refresh
    AttemptRefresh,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    state: GuardState,
}

impl RouteGuard {
    pub fn new() -> Self {
        Self {
            state: GuardState::Checking,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn mount(&mut self, has_token: bool) -> MountAction {
        if self.state.is_terminal() {
            return MountAction::Proceed;
        }
        if has_token {
            self.transition(GuardState::Authorized);
            MountAction::Proceed
        } else {
            MountAction::AttemptRefresh
        }
    }

    pub fn refresh_succeeded(&mut self) {
        self.transition(GuardState::Authorized);
    }

    /// `had_session` tells an expired session apart from never having signed in
    pub fn refresh_failed(&mut self, had_session: bool) {
        if had_session {
            self.transition(GuardState::Expired);
        } else {
            self.transition(GuardState::Unauthenticated);
        }
    }

    pub fn view(&self) -> GuardView {
        match self.state {
            GuardState::Checking => GuardView::Loading,
            GuardState::Authorized => GuardView::Protected,
            GuardState::Expired => GuardView::SessionExpired,
            GuardState::Unauthenticated => GuardView::RedirectToLogin,
        }
    }

    fn transition(&mut self, next: GuardState) {
        if self.state.is_terminal() {
            tracing::debug!(from = ?self.state, to = ?next, "Ignoring transition out of terminal state");
            return;
        }
        tracing::debug!(to = ?next, "Route guard resolved");
        self.state = next;
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new()
    }
}
