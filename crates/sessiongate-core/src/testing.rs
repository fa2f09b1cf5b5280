//! Test doubles shared by the unit tests.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use url::Url;

use crate::api::ApiError;
use crate::auth::{AuthEvent, AuthEvents, RemoteSession, SessionProvider, Subscription, TokenPair};
use crate::navigation::{Navigator, Route};

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// An unsigned JWT carrying only an `exp` claim.
pub fn fake_jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

pub fn remote_session(email: &str, access: &str, refresh: &str) -> RemoteSession {
    RemoteSession {
        tokens: TokenPair::new(access, refresh),
        email: Some(email.to_string()),
        expires_at: None,
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

/// In-memory `SessionProvider` with knobs for failure and latency.
#[derive(Default)]
pub struct FakeProvider {
    session: Mutex<Option<RemoteSession>>,
    events: AuthEvents,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub get_delay: Mutex<Option<Duration>>,
    pub get_calls: AtomicUsize,
    pub set_calls: Mutex<Vec<TokenPair>>,
    pub sign_outs: AtomicUsize,
    pub passwords: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: RemoteSession) -> Self {
        let provider = Self::new();
        provider.put_session(Some(session));
        provider
    }

    pub fn put_session(&self, session: Option<RemoteSession>) {
        *self.session.lock().unwrap() = session;
    }

    pub fn emit(&self, event: AuthEvent) {
        self.events.emit(event);
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn get_session(&self) -> Result<Option<RemoteSession>, ApiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(ApiError::ServerError {
                message: None,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn set_session(&self, tokens: &TokenPair) -> Result<RemoteSession, ApiError> {
        self.set_calls.lock().unwrap().push(tokens.clone());
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized(Some("invalid JWT".to_string())));
        }
        let session = RemoteSession {
            tokens: tokens.clone(),
            email: Some("user@example.com".to_string()),
            expires_at: None,
        };
        self.put_session(Some(session.clone()));
        self.events.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ApiError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.put_session(None);
        self.events.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn update_user(&self, password: &str) -> Result<RemoteSession, ApiError> {
        let session = self.session.lock().unwrap().clone().ok_or(ApiError::NoSession)?;
        self.passwords.lock().unwrap().push(password.to_string());
        Ok(session)
    }

    fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse("https://auth.example.com/auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }
}
