use std::sync::Arc;

use tracing::{error, info, warn};
use url::Url;

use crate::api::{ApiClient, ApiError, ErrorKind};
use crate::auth::{CredentialStore, RestoreState, Scope, SessionProvider};

const DEFAULT_FAILURE_MESSAGE: &str = "Login failed";
const VERIFY_EMAIL_MESSAGE: &str = "Please verify your email before logging in.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success { email: String },
    VerificationRequired,
    Failed { message: String },
}

impl LoginOutcome {
    pub fn title(&self) -> &'static str {
        match self {
            LoginOutcome::Success { .. } => "Login successful",
            LoginOutcome::VerificationRequired => "Email verification required",
            LoginOutcome::Failed { .. } => "Login failed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            LoginOutcome::Success { email } => format!("Signed in as {}", email),
            LoginOutcome::VerificationRequired => VERIFY_EMAIL_MESSAGE.to_string(),
            LoginOutcome::Failed { message } => message.clone(),
        }
    }

    fn from_error(e: &ApiError) -> Self {
        if e.kind() == ErrorKind::EmailNotVerified {
            return LoginOutcome::VerificationRequired;
        }
        let message = e
            .server_message()
            .unwrap_or(DEFAULT_FAILURE_MESSAGE)
            .to_string();
        LoginOutcome::Failed { message }
    }
}

/// Email/password login against the backend, followed by establishing the
/// managed session with the returned tokens.
pub struct LoginFlow {
    api: ApiClient,
    provider: Arc<dyn SessionProvider>,
    store: CredentialStore,
}

impl LoginFlow {
    pub fn new(api: ApiClient, provider: Arc<dyn SessionProvider>, store: CredentialStore) -> Self {
        Self { api, provider, store }
    }

    /// Submit one login attempt. Exactly one request to the backend, no retry.
    pub async fn submit(&self, email: &str, password: &str, remember_me: bool) -> LoginOutcome {
        let tokens = match self.api.login(email, password).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "Login failed");
                return LoginOutcome::from_error(&e);
            }
        };

        if !tokens.is_well_formed() {
            error!("Login response carried an incomplete token pair");
            return LoginOutcome::Failed {
                message: DEFAULT_FAILURE_MESSAGE.to_string(),
            };
        }

        let scope = Scope::from_remember_me(remember_me);
        self.store.replace(scope, &tokens);

        match self.provider.set_session(&tokens).await {
            Ok(_) => self.store.set_restore_state(RestoreState::Restored),
            // Tokens are stored; the next reconcile retries the restore
            Err(e) => warn!(error = %e, "Failed to establish managed session"),
        }

        info!(%scope, "Login successful");
        LoginOutcome::Success {
            email: email.to_string(),
        }
    }

    /// Authorization URL for signing in with an OAuth provider such as "google".
    pub fn oauth_url(&self, provider: &str, redirect_to: &str) -> Result<Url, ApiError> {
        self.provider.sign_in_with_oauth(provider, redirect_to)
    }
}
