use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Method, StatusCode};
use shared::{
    domain::UserProfile,
    protocol::{LoginReply, LoginRequest, ProfileReply, RefreshReply},
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::{
    config::ClientSettings,
    error::ClientError,
    pipeline::{base_url, AuthFailureHook, RequestPipeline},
    token_store::{is_valid, TokenStore},
};

const LOGIN_PATH: &str = "/auth/login";
const PROFILE_PATH: &str = "/auth/profile";
const LOGOUT_PATH: &str = "/auth/logout";
const REFRESH_PATH: &str = "/auth/refresh";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Loading,
    Authenticated(UserProfile),
    Unauthenticated,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, SessionState::Unauthenticated)
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<UserProfile>,
    pub authenticated: bool,
    pub unauthenticated: bool,
    pub loading: bool,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            user: state.user().cloned(),
            authenticated: state.is_authenticated(),
            unauthenticated: state.is_unauthenticated(),
            loading: state.is_loading(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    SessionExpired,
    SignInRequired { path: String },
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ClientError::Validation("Email is required!".into()));
        }
        if !looks_like_email(email) {
            return Err(ClientError::Validation(
                "Email must be a valid email address!".into(),
            ));
        }
        if self.password.is_empty() {
            return Err(ClientError::Validation("Password is required!".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClientError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters!"
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn looks_like_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !email.contains(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

enum TokenWrite {
    Keep,
    Save(String),
    Clear,
}

type RestoreFuture = Shared<BoxFuture<'static, SessionState>>;

pub struct SessionController {
    settings: ClientSettings,
    store: Arc<dyn TokenStore>,
    pipeline: RequestPipeline,
    state: watch::Sender<SessionState>,
    epoch: Mutex<u64>,
    restoring: Mutex<Option<RestoreFuture>>,
    events: broadcast::Sender<SessionEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionController {
    pub fn new(
        settings: ClientSettings,
        store: Arc<dyn TokenStore>,
    ) -> Result<Arc<Self>, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Self::with_http_client(settings, store, builder.build()?)
    }

    pub fn with_http_client(
        settings: ClientSettings,
        store: Arc<dyn TokenStore>,
        http: Client,
    ) -> Result<Arc<Self>, ClientError> {
        let base_url = base_url(&settings)?;
        let (state, _) = watch::channel(SessionState::Uninitialized);
        let (events, _) = broadcast::channel(64);
        Ok(Arc::new_cyclic(|weak: &Weak<SessionController>| {
            let hook: Weak<dyn AuthFailureHook> = weak.clone();
            Self {
                pipeline: RequestPipeline::from_parts(http, base_url, Arc::clone(&store), hook),
                settings,
                store,
                state,
                epoch: Mutex::new(0),
                restoring: Mutex::new(None),
                events,
            }
        }))
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn current_state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.borrow().user().cloned()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.state.borrow())
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Concurrent callers share one in-flight restoration.
    pub async fn restore_session(self: &Arc<Self>) -> SessionState {
        let current = self.current_state();
        if current.is_authenticated() {
            debug!("session: already authenticated, nothing to restore");
            return current;
        }

        let restore = {
            let mut slot = lock(&self.restoring);
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("session: joining in-flight restore");
                    in_flight.clone()
                }
                None => {
                    let controller = Arc::clone(self);
                    let restore = async move { controller.run_restore().await }
                        .boxed()
                        .shared();
                    *slot = Some(restore.clone());
                    restore
                }
            }
        };
        restore.await
    }

    async fn run_restore(&self) -> SessionState {
        let epoch = self.begin_loading();

        let user = match self.store.load() {
            None => {
                debug!("session: no stored token");
                None
            }
            Some(token) if !is_valid(Some(token.as_str())) => {
                info!("session: discarding expired or malformed stored token");
                None
            }
            Some(_) => match self.fetch_profile().await {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!(status = ?err.status(), "session: profile fetch failed: {err}");
                    None
                }
            },
        };

        let (next, write) = match user {
            Some(user) => {
                info!(user_id = %user.id, "session: restored");
                (SessionState::Authenticated(user), TokenWrite::Keep)
            }
            None => (SessionState::Unauthenticated, TokenWrite::Clear),
        };
        if !self.commit(Some(epoch), next, write) {
            debug!(epoch, "session: restore superseded, keeping newer state");
        }

        lock(&self.restoring).take();
        self.current_state()
    }

    async fn fetch_profile(&self) -> Result<UserProfile, ClientError> {
        let reply: ProfileReply = self.pipeline.get_json(PROFILE_PATH).await?;
        Ok(reply.into_user())
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, ClientError> {
        credentials.validate()?;

        let request = LoginRequest {
            email: credentials.email.trim().to_string(),
            password: credentials.password.clone(),
        };
        let builder = self.pipeline.request(Method::POST, LOGIN_PATH)?.json(&request);
        let response = self
            .pipeline
            .send_anonymous(builder)
            .await
            .map_err(classify_login_failure)?;
        let bytes = response.bytes().await?;
        let reply: LoginReply = serde_json::from_slice(&bytes)
            .map_err(|err| ClientError::Decode(format!("login response: {err}")))?;
        let data = reply.into_result().map_err(|message| {
            info!("session: login rejected: {message}");
            ClientError::Credentials { message }
        })?;

        if !is_valid(Some(data.token.as_str())) {
            return Err(ClientError::Decode(
                "login returned an expired or malformed token".into(),
            ));
        }

        let user = data.user;
        self.commit(
            None,
            SessionState::Authenticated(user.clone()),
            TokenWrite::Save(data.token),
        );
        info!(user_id = %user.id, "session: signed in");
        Ok(user)
    }

    pub async fn logout(&self) {
        let token = self.store.load();
        self.commit(None, SessionState::Unauthenticated, TokenWrite::Clear);
        info!("session: signed out");

        let Some(token) = token.filter(|token| is_valid(Some(token.as_str()))) else {
            return;
        };
        let builder = match self.pipeline.request(Method::POST, LOGOUT_PATH) {
            Ok(builder) => builder,
            Err(err) => {
                debug!("session: remote logout skipped: {err}");
                return;
            }
        };
        let remote = self.pipeline.send_with_token(builder, token);
        match tokio::time::timeout(self.settings.logout_timeout(), remote).await {
            Ok(Ok(_)) => debug!("session: remote logout acknowledged"),
            Ok(Err(err)) => debug!("session: remote logout failed: {err}"),
            Err(_) => debug!("session: remote logout timed out"),
        }
    }

    pub async fn refresh_token(&self) -> Result<(), ClientError> {
        let epoch = self.active_epoch().ok_or(ClientError::NotAuthenticated)?;
        let builder = self.pipeline.request(Method::POST, REFRESH_PATH)?;
        let response = self.pipeline.send(builder).await?;
        let bytes = response.bytes().await?;
        let reply: RefreshReply = serde_json::from_slice(&bytes)
            .map_err(|err| ClientError::Decode(format!("refresh response: {err}")))?;
        let token = reply.into_token();
        if !is_valid(Some(token.as_str())) {
            return Err(ClientError::Decode(
                "refresh returned an expired or malformed token".into(),
            ));
        }

        let guard = lock(&self.epoch);
        if *guard != epoch || !self.state.borrow().is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        self.store.save(&token);
        drop(guard);
        debug!(epoch, "session: token refreshed");
        Ok(())
    }

    fn begin_loading(&self) -> u64 {
        let mut epoch = lock(&self.epoch);
        *epoch += 1;
        let changed = self.state.send_replace(SessionState::Loading) != SessionState::Loading;
        let current = *epoch;
        drop(epoch);
        if changed {
            let _ = self
                .events
                .send(SessionEvent::StateChanged(SessionState::Loading));
        }
        current
    }

    /// With `expected` set, the transition only happens if no other transition intervened.
    fn commit(&self, expected: Option<u64>, next: SessionState, write: TokenWrite) -> bool {
        let mut epoch = lock(&self.epoch);
        if expected.is_some_and(|expected| expected != *epoch) {
            return false;
        }
        match write {
            TokenWrite::Keep => {}
            TokenWrite::Save(token) => self.store.save(&token),
            TokenWrite::Clear => self.store.clear(),
        }
        *epoch += 1;
        let previous = self.state.send_replace(next.clone());
        drop(epoch);

        if previous != next {
            let _ = self.events.send(SessionEvent::StateChanged(next));
        }
        true
    }
}

impl AuthFailureHook for SessionController {
    fn active_epoch(&self) -> Option<u64> {
        let epoch = lock(&self.epoch);
        self.state.borrow().is_authenticated().then_some(*epoch)
    }

    fn session_rejected(&self, rejected_epoch: u64) {
        let mut epoch = lock(&self.epoch);
        if *epoch != rejected_epoch || !self.state.borrow().is_authenticated() {
            debug!(rejected_epoch, "session: stale unauthorized response ignored");
            return;
        }
        self.store.clear();
        *epoch += 1;
        self.state.send_replace(SessionState::Unauthenticated);
        drop(epoch);

        warn!("session: invalidated after unauthorized response");
        let _ = self
            .events
            .send(SessionEvent::StateChanged(SessionState::Unauthenticated));
        let _ = self.events.send(SessionEvent::SessionExpired);
        let _ = self.events.send(SessionEvent::SignInRequired {
            path: self.settings.sign_in_path.clone(),
        });
    }
}

fn classify_login_failure(err: ClientError) -> ClientError {
    match err {
        ClientError::Unauthorized { payload, .. } => ClientError::Credentials {
            message: payload
                .map(|p| p.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Login failed".into()),
        },
        ClientError::Status { status, payload } if status.is_client_error() => {
            let message = payload
                .map(|p| p.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Login failed ({status})"));
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("session: login rate limited");
            }
            ClientError::Credentials { message }
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
