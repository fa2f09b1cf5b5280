//! API client for the identity backend.
//!
//! This module provides the `ApiClient` struct for the login, signup and
//! password-reset endpoints, and for checking who a stored access token
//! belongs to.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::ApiError;
use crate::auth::TokenPair;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct ResetRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    email: Option<String>,
}

/// API client for the identity backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self.client.post(url).json(body).send().await?;
        Self::check_response(response).await
    }

    /// `POST /auth/login` - exchange email and password for a token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .post("auth/login", &Credentials { email, password })
            .await?;
        let tokens: LoginResponse = Self::parse(response).await?;
        Ok(TokenPair::new(tokens.access_token, tokens.refresh_token))
    }

    /// `POST /auth/signup` - register; the backend sends a verification email
    pub async fn signup(&self, email: &str, password: &str) -> Result<(), ApiError> {
        self.post("auth/signup", &Credentials { email, password })
            .await?;
        Ok(())
    }

    /// `POST /auth/reset-password` - send a password reset email
    pub async fn reset_password(&self, email: &str) -> Result<(), ApiError> {
        self.post("auth/reset-password", &ResetRequest { email }).await?;
        Ok(())
    }

    /// `GET /auth/user` - the email the access token belongs to, if any
    pub async fn current_user(&self, access_token: &str) -> Result<Option<String>, ApiError> {
        let url = self.endpoint("auth/user")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let user: UserResponse = Self::parse(response).await?;
        Ok(user.email.filter(|e| !e.trim().is_empty()))
    }
}
