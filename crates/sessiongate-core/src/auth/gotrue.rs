//! HTTP client for a GoTrue-compatible managed-session endpoint.
//!
//! The session is held in memory only. Persisting tokens is the job of the
//! `CredentialStore`; this client refreshes the access token when it is
//! about to expire and broadcasts every change to its subscribers.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::provider::{AuthEvent, AuthEvents, RemoteSession, SessionProvider, Subscription};
use super::TokenPair;
use crate::api::{ApiError, ErrorKind};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct UserResponse {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<UserResponse>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct UpdateUserRequest<'a> {
    password: &'a str,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT without verifying it. The server verifies;
/// this is only used to know when to refresh.
fn token_expiry(access_token: &str) -> Option<DateTime<Utc>> {
    let payload = access_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

impl TokenResponse {
    fn into_session(self) -> RemoteSession {
        let expires_at = self
            .expires_at
            .and_then(|at| DateTime::from_timestamp(at, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            })
            .or_else(|| token_expiry(&self.access_token));

        RemoteSession {
            tokens: TokenPair::new(self.access_token, self.refresh_token),
            email: self.user.and_then(|u| u.email),
            expires_at,
        }
    }
}

pub struct GoTrueProvider {
    client: Client,
    base_url: Url,
    anon_key: String,
    session: Mutex<Option<RemoteSession>>,
    events: AuthEvents,
}

impl GoTrueProvider {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        // Url::join drops the last path segment unless it ends with '/'
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            anon_key: anon_key.into(),
            session: Mutex::new(None),
            events: AuthEvents::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
    }

    fn current(&self) -> Option<RemoteSession> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, session: Option<RemoteSession>) {
        *self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_provider_status(status, &body))
        }
    }

    async fn fetch_user(&self, access_token: &str) -> Result<UserResponse, ApiError> {
        let response = self
            .request(Method::GET, self.endpoint("auth/v1/user")?)
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RemoteSession, ApiError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let response = self
            .request(Method::POST, url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let mut session = tokens.into_session();
        if session.email.is_none() {
            session.email = self.current().and_then(|s| s.email);
        }
        Ok(session)
    }

    /// Drop the local session after the server refused it.
    fn invalidate(&self) {
        if self.current().is_some() {
            self.store(None);
            self.events.emit(AuthEvent::SignedOut);
        }
    }
}

#[async_trait]
impl SessionProvider for GoTrueProvider {
    async fn get_session(&self) -> Result<Option<RemoteSession>, ApiError> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if !session.needs_refresh() {
            return Ok(Some(session));
        }

        debug!("Access token near expiry, refreshing");
        match self.refresh(&session.tokens.refresh_token).await {
            Ok(refreshed) => {
                self.store(Some(refreshed.clone()));
                self.events.emit(AuthEvent::TokenRefreshed(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) if e.kind() == ErrorKind::Network => Err(e),
            Err(e) => {
                warn!(error = %e, "Refresh token rejected, dropping session");
                self.invalidate();
                Ok(None)
            }
        }
    }

    async fn set_session(&self, tokens: &TokenPair) -> Result<RemoteSession, ApiError> {
        let candidate = RemoteSession {
            tokens: tokens.clone(),
            email: None,
            expires_at: token_expiry(&tokens.access_token),
        };

        let session = if candidate.is_expired() {
            debug!("Stored access token expired, refreshing");
            self.refresh(&tokens.refresh_token).await?
        } else {
            let user = self.fetch_user(&tokens.access_token).await?;
            RemoteSession {
                email: user.email,
                ..candidate
            }
        };

        self.store(Some(session.clone()));
        self.events.emit(AuthEvent::SignedIn(session.clone()));
        info!("Managed session established");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ApiError> {
        let session = self.current();
        self.store(None);
        self.events.emit(AuthEvent::SignedOut);

        let Some(session) = session else {
            return Ok(());
        };

        let response = self
            .request(Method::POST, self.endpoint("auth/v1/logout")?)
            .bearer_auth(&session.tokens.access_token)
            .send()
            .await?;
        match Self::check_response(response).await {
            Ok(_) => Ok(()),
            // Already gone server side
            Err(ApiError::Unauthorized(_)) => Ok(()),
            Err(ApiError::Rejected { status, .. }) if status.as_u16() == 403 || status.as_u16() == 404 => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn update_user(&self, password: &str) -> Result<RemoteSession, ApiError> {
        let mut session = self.get_session().await?.ok_or(ApiError::NoSession)?;

        let response = self
            .request(Method::PUT, self.endpoint("auth/v1/user")?)
            .bearer_auth(&session.tokens.access_token)
            .json(&UpdateUserRequest { password })
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        if user.email.is_some() {
            session.email = user.email;
        }
        self.store(Some(session.clone()));
        self.events.emit(AuthEvent::UserUpdated(session.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint("auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }
}
