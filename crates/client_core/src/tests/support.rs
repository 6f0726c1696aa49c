use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

#[derive(Serialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub(crate) fn mint_token_expiring_in(ttl: Duration) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub: "user:admin".into(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"console-test-secret"),
    )
    .expect("mint token")
}

pub(crate) fn valid_token() -> String {
    mint_token_expiring_in(Duration::hours(1))
}

pub(crate) fn expired_token() -> String {
    mint_token_expiring_in(Duration::hours(-1))
}

pub(crate) fn unique_temp_path(prefix: &str) -> std::path::PathBuf {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{suffix}"))
}

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::protocol::LoginRequest;
use tokio::net::TcpListener;

use crate::config::ClientSettings;

pub(crate) const GOOD_PASSWORD: &str = "correct-horse";

pub(crate) struct FakeState {
    pub profile_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub profile_status: AtomicUsize,
    pub logout_status: AtomicUsize,
    pub profile_delay_ms: AtomicU64,
    pub issued_token: Mutex<String>,
    pub refreshed_token: Mutex<String>,
    pub authorizations: Mutex<Vec<Option<String>>>,
}

#[derive(Clone)]
pub(crate) struct FakeServer {
    pub url: String,
    pub state: Arc<FakeState>,
}

impl FakeServer {
    pub fn settings(&self) -> ClientSettings {
        ClientSettings::for_server(self.url.clone())
    }

    pub fn set_profile_status(&self, status: u16) {
        self.state
            .profile_status
            .store(status as usize, Ordering::SeqCst);
    }

    pub fn set_logout_status(&self, status: u16) {
        self.state
            .logout_status
            .store(status as usize, Ordering::SeqCst);
    }

    pub fn set_profile_delay_ms(&self, delay: u64) {
        self.state.profile_delay_ms.store(delay, Ordering::SeqCst);
    }

    pub fn profile_calls(&self) -> usize {
        self.state.profile_calls.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.state.login_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.state.logout_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn issued_token(&self) -> String {
        self.state.issued_token.lock().expect("lock").clone()
    }

    pub fn refreshed_token(&self) -> String {
        self.state.refreshed_token.lock().expect("lock").clone()
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.state.authorizations.lock().expect("lock").clone()
    }
}

pub(crate) fn admin_user_json() -> Value {
    json!({
        "id": "8864c717-587d-472a-929a-8e5f298024da-0",
        "displayName": "Console Admin",
        "email": "admin@example.com",
        "phoneNumber": "+1 555-123-4567",
        "role": "admin"
    })
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn status_from(raw: &AtomicUsize) -> StatusCode {
    StatusCode::from_u16(raw.load(Ordering::SeqCst) as u16).unwrap_or(StatusCode::OK)
}

async fn fake_login(
    State(server): State<Arc<FakeState>>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    server.login_calls.fetch_add(1, Ordering::SeqCst);
    if request.password != GOOD_PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Invalid email or password"})),
        );
    }
    let token = server.issued_token.lock().expect("lock").clone();
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Login successful",
            "data": { "token": token, "user": admin_user_json() }
        })),
    )
}

async fn fake_profile(State(server): State<Arc<FakeState>>) -> impl IntoResponse {
    server.profile_calls.fetch_add(1, Ordering::SeqCst);
    let delay = server.profile_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    let status = status_from(&server.profile_status);
    if status != StatusCode::OK {
        return (status, Json(json!({"message": "profile unavailable"})));
    }
    (StatusCode::OK, Json(json!({ "user": admin_user_json() })))
}

async fn fake_logout(State(server): State<Arc<FakeState>>) -> impl IntoResponse {
    server.logout_calls.fetch_add(1, Ordering::SeqCst);
    (status_from(&server.logout_status), Json(json!({"success": true})))
}

async fn fake_refresh(
    State(server): State<Arc<FakeState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    server.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if authorization(&headers).is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "missing token"})),
        );
    }
    let token = server.refreshed_token.lock().expect("lock").clone();
    (
        StatusCode::OK,
        Json(json!({"success": true, "data": {"token": token}})),
    )
}

async fn fake_bookings(
    State(server): State<Arc<FakeState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let auth = authorization(&headers);
    server.authorizations.lock().expect("lock").push(auth.clone());
    Json(json!({ "authorization": auth }))
}

async fn fake_expired(headers: HeaderMap) -> impl IntoResponse {
    let _ = authorization(&headers);
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "message": "jwt expired"})),
    )
}

async fn fake_broken() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"message": "boom"})),
    )
}

async fn fake_storage(Query(query): Query<shared::protocol::PageQuery>) -> impl IntoResponse {
    let rows: Vec<Value> = (0..query.limit)
        .map(|i| json!({"id": format!("s-{}-{i}", query.page), "title": format!("Unit {i}")}))
        .collect();
    Json(json!({
        "success": true,
        "data": { "storageSpaces": rows, "pagination": { "total": 42 } }
    }))
}

pub(crate) async fn spawn_fake_server() -> FakeServer {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = Arc::new(FakeState {
        profile_calls: AtomicUsize::new(0),
        login_calls: AtomicUsize::new(0),
        logout_calls: AtomicUsize::new(0),
        refresh_calls: AtomicUsize::new(0),
        profile_status: AtomicUsize::new(200),
        logout_status: AtomicUsize::new(200),
        profile_delay_ms: AtomicU64::new(0),
        issued_token: Mutex::new(valid_token()),
        refreshed_token: Mutex::new(mint_token_expiring_in(Duration::hours(2))),
        authorizations: Mutex::new(Vec::new()),
    });
    let api = Router::new()
        .route("/auth/login", post(fake_login))
        .route("/auth/profile", get(fake_profile))
        .route("/auth/logout", post(fake_logout))
        .route("/auth/refresh", post(fake_refresh))
        .route("/bookings", get(fake_bookings))
        .route(
            "/expired",
            get(fake_expired)
                .post(fake_expired)
                .put(fake_expired)
                .delete(fake_expired),
        )
        .route("/broken", get(fake_broken))
        .route("/storage", get(fake_storage))
        .with_state(Arc::clone(&state));
    let app = Router::new().nest("/api/v1", api);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    FakeServer {
        url: format!("http://{addr}"),
        state,
    }
}
