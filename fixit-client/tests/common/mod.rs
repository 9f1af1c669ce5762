//! Common test utilities: an in-process mock of the FixIt backend

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fixit_client::{AuthSession, Browser, Config};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};

pub const EMAIL: &str = "student@campus.edu";
pub const PASSWORD: &str = "correct-horse";

const REFRESH_COOKIE: &str = "refresh_token";

/// Backend state plus knobs and counters for assertions
#[derive(Default)]
pub struct MockBackend {
    access_tokens: RwLock<HashSet<String>>,
    refresh_tokens: RwLock<HashSet<String>>,
    issued: AtomicUsize,

    /// (path, Authorization header) of every request received
    pub requests: RwLock<Vec<(String, Option<String>)>>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub ticket_calls: AtomicUsize,
    pub denied_calls: AtomicUsize,

    pub refresh_delay_ms: AtomicU64,
    pub refresh_rejects: AtomicBool,
    pub email_unverified: AtomicBool,
    pub embed_profile: AtomicBool,
    pub profile_fails: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.embed_profile.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    /// Invalidate every access token handed out so far
    pub fn revoke_access_tokens(&self) {
        self.access_tokens.write().unwrap().clear();
    }

    /// Invalidate every refresh cookie handed out so far
    pub fn revoke_refresh_tokens(&self) {
        self.refresh_tokens.write().unwrap().clear();
    }

    /// Authorization headers received on `path`
    pub fn headers_for(&self, path: &str) -> Vec<Option<String>> {
        self.requests
            .read()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, h)| h.clone())
            .collect()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn record(&self, path: &str, headers: &HeaderMap) -> Option<String> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests
            .write()
            .unwrap()
            .push((path.to_string(), header.clone()));
        header
    }

    fn authorized(&self, path: &str, headers: &HeaderMap) -> bool {
        match self.record(path, headers) {
            Some(header) => header
                .strip_prefix("Bearer ")
                .is_some_and(|token| self.access_tokens.read().unwrap().contains(token)),
            None => false,
        }
    }

    fn issue_access(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let token = format!("access-{}", n);
        self.access_tokens.write().unwrap().insert(token.clone());
        token
    }

    fn profile(&self) -> Value {
        json!({
            "id": 7,
            "email": EMAIL,
            "full_name": "Ada Student",
            "role": {"id": 3, "name": "Student", "description": "Reports issues"},
            "is_email_verified": !self.email_unverified.load(Ordering::SeqCst),
            "email_domain": "campus.edu",
            "can_report": true,
            "can_fix": false,
            "can_assign": false,
            "can_manage_users": false,
            "is_admin_level": false,
            "features": ["canReport", "myReports", "notifications"],
            "allowed_categories": []
        })
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Authentication credentials were not provided."})),
    )
        .into_response()
}

async fn login(
    State(backend): State<Arc<MockBackend>>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record("/token/", &headers);
    backend.login_calls.fetch_add(1, Ordering::SeqCst);

    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }

    let refresh = format!("refresh-{}", backend.issued.fetch_add(1, Ordering::SeqCst));
    backend.refresh_tokens.write().unwrap().insert(refresh.clone());
    cookies.add(
        Cookie::build((REFRESH_COOKIE, refresh))
            .path("/")
            .http_only(true)
            .build(),
    );

    let mut response = json!({ "access": backend.issue_access() });
    if backend.embed_profile.load(Ordering::SeqCst) {
        response["profile"] = backend.profile();
    }
    Json(response).into_response()
}

async fn refresh(
    State(backend): State<Arc<MockBackend>>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Response {
    backend.record("/token/refresh/", &headers);
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = backend.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if backend.refresh_rejects.load(Ordering::SeqCst) {
        return unauthorized();
    }
    let valid = cookies
        .get(REFRESH_COOKIE)
        .is_some_and(|c| backend.refresh_tokens.read().unwrap().contains(c.value()));
    if !valid {
        return unauthorized();
    }

    Json(json!({ "access": backend.issue_access() })).into_response()
}

async fn logout(
    State(backend): State<Arc<MockBackend>>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Response {
    if !backend.authorized("/logout/", &headers) {
        return unauthorized();
    }
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(cookie) = cookies.get(REFRESH_COOKIE) {
        backend.refresh_tokens.write().unwrap().remove(cookie.value());
    }
    cookies.add(
        Cookie::build((REFRESH_COOKIE, ""))
            .path("/")
            .http_only(true)
            .max_age(tower_cookies::cookie::time::Duration::ZERO)
            .build(),
    );
    Json(json!({"message": "Logged out"})).into_response()
}

async fn profile(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    if !backend.authorized("/profile/", &headers) {
        return unauthorized();
    }
    backend.profile_calls.fetch_add(1, Ordering::SeqCst);
    if backend.profile_fails.load(Ordering::SeqCst) {
        return unavailable();
    }
    Json(backend.profile()).into_response()
}

async fn tickets(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    if !backend.authorized("/tickets/", &headers) {
        return unauthorized();
    }
    backend.ticket_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "count": 1,
        "results": [{
            "id": 1,
            "title": "Broken projector",
            "description": "Projector in room 204 will not turn on",
            "category": "Electrical",
            "urgency": "Standard",
            "status": "Created",
            "location": 4,
            "location_name": "Science Building - Floor 2 - 204",
            "reporter": 7,
            "created_at": "2025-02-10T09:15:00Z"
        }]
    }))
    .into_response()
}

async fn report_issue(
    State(backend): State<Arc<MockBackend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !backend.authorized("/tickets/report_issue/", &headers) {
        return unauthorized();
    }
    if body["location"] == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"location": ["Select a valid location."]})),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn register(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    backend.record("/auth/register/", &headers);
    (
        StatusCode::CREATED,
        Json(json!({"message": "Registration successful. Check your email for the code."})),
    )
        .into_response()
}

async fn audit_logs(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    backend.record("/audit-logs/", &headers);
    backend.denied_calls.fetch_add(1, Ordering::SeqCst);
    unauthorized()
}

async fn locations(State(backend): State<Arc<MockBackend>>, headers: HeaderMap) -> Response {
    backend.record("/locations/", &headers);
    unavailable()
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"detail": "Database unavailable"})),
    )
        .into_response()
}

pub fn router(backend: Arc<MockBackend>) -> Router {
    Router::new()
        .route("/token/", post(login))
        .route("/token/refresh/", post(refresh))
        .route("/logout/", post(logout))
        .route("/profile/", get(profile))
        .route("/tickets/", get(tickets))
        .route("/tickets/report_issue/", post(report_issue))
        .route("/auth/register/", post(register))
        // Always rejects, even with a fresh token
        .route("/audit-logs/", get(audit_logs))
        // Always fails server-side
        .route("/locations/", get(locations))
        .layer(CookieManagerLayer::new())
        .with_state(backend)
}

/// Serve the mock backend on an ephemeral port and return its base URL
pub async fn spawn_backend(backend: Arc<MockBackend>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock backend");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, router(backend))
            .await
            .expect("Mock backend failed");
    });
    format!("http://{}", addr)
}

/// A fresh backend and an in-memory browser pointed at it
pub async fn setup() -> (Arc<MockBackend>, Browser) {
    let backend = MockBackend::new();
    let base = spawn_backend(backend.clone()).await;
    let browser = Browser::in_memory(Config::with_api_url(base)).expect("Failed to create browser");
    (backend, browser)
}

/// Open a tab and sign in
pub async fn signed_in_tab(browser: &Browser) -> AuthSession {
    let tab = browser.open_tab().expect("Failed to open tab");
    tab.login(EMAIL, PASSWORD).await.expect("Login failed");
    tab
}

/// Poll `check` until it holds or the timeout passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
