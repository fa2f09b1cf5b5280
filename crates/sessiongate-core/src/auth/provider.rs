//! The managed-session API consumed by the reconciler, watcher and flows.
//!
//! A `SessionProvider` owns the remote session (the one the identity
//! platform tracks) and broadcasts `AuthEvent`s whenever it changes.
//! `GoTrueProvider` is the HTTP implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::warn;
use url::Url;

use super::TokenPair;
use crate::api::ApiError;

/// Refresh this long before the access token actually expires
const REFRESH_MARGIN_SECS: i64 = 30;

/// Buffered events per subscriber before the oldest are dropped
const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub tokens: TokenPair,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RemoteSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() >= at).unwrap_or(false)
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        self.expires_at
            .map(|at| Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS) >= at)
            .unwrap_or(false)
    }

    /// An email plus a real access token
    pub fn identity(&self) -> Option<&str> {
        let email = self.email.as_deref().filter(|e| !e.trim().is_empty())?;
        self.tokens.is_well_formed().then_some(email)
    }
}

/// Session change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(RemoteSession),
    SignedOut,
    TokenRefreshed(RemoteSession),
    UserUpdated(RemoteSession),
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated(_) => "USER_UPDATED",
        }
    }
}

/// Fan-out of `AuthEvent`s to any number of subscribers.
#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered auth-state listener. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth event listener fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current remote session, refreshed first if it is about to expire.
    async fn get_session(&self) -> Result<Option<RemoteSession>, ApiError>;

    /// Establish the remote session from a stored token pair.
    async fn set_session(&self, tokens: &TokenPair) -> Result<RemoteSession, ApiError>;

    async fn sign_out(&self) -> Result<(), ApiError>;

    async fn update_user(&self, password: &str) -> Result<RemoteSession, ApiError>;

    fn subscribe(&self) -> Subscription;

    /// Authorization URL that starts an OAuth sign-in with `provider`.
    fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<Url, ApiError>;
}
