use std::sync::Arc;

use tracing::{error, info};

use crate::api::ApiClient;
use crate::auth::SessionProvider;
use crate::navigation::{Navigator, Route};

const DEFAULT_RESET_FAILURE: &str = "Something went wrong.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    Sent,
    Failed { message: String },
}

impl ResetOutcome {
    pub fn message(&self) -> &str {
        match self {
            ResetOutcome::Sent => "Password reset email sent. Check your inbox.",
            ResetOutcome::Failed { message } => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    Failed { message: String },
}

impl UpdateOutcome {
    pub fn message(&self) -> String {
        match self {
            UpdateOutcome::Updated => "Password updated!".to_string(),
            UpdateOutcome::Failed { message } => format!("Update failed: {}", message),
        }
    }
}

/// Forgotten-password and change-password handling.
pub struct PasswordFlow {
    api: ApiClient,
    provider: Arc<dyn SessionProvider>,
    navigator: Arc<dyn Navigator>,
}

impl PasswordFlow {
    pub fn new(api: ApiClient, provider: Arc<dyn SessionProvider>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            api,
            provider,
            navigator,
        }
    }

    pub async fn request_reset(&self, email: &str) -> ResetOutcome {
        match self.api.reset_password(email).await {
            Ok(()) => ResetOutcome::Sent,
            Err(e) => {
                error!(error = %e, "Password reset request failed");
                ResetOutcome::Failed {
                    message: e.server_message().unwrap_or(DEFAULT_RESET_FAILURE).to_string(),
                }
            }
        }
    }

    /// Change the signed-in user's password, then send them to login.
    pub async fn update_password(&self, password: &str) -> UpdateOutcome {
        match self.provider.update_user(password).await {
            Ok(_) => {
                info!("Password updated");
                self.navigator.navigate(Route::Login);
                UpdateOutcome::Updated
            }
            Err(e) => {
                error!(error = %e, "Password update failed");
                let message = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string());
                UpdateOutcome::Failed { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{can_bind_localhost, remote_session, FakeProvider, RecordingNavigator};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn flow(api_url: &str, provider: FakeProvider) -> (PasswordFlow, Arc<FakeProvider>, Arc<RecordingNavigator>) {
        let provider = Arc::new(provider);
        let navigator = Arc::new(RecordingNavigator::default());
        let flow = PasswordFlow::new(
            ApiClient::new(api_url).unwrap(),
            provider.clone(),
            navigator.clone(),
        );
        (flow, provider, navigator)
    }

    #[tokio::test]
    async fn test_request_reset() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/reset-password"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (flow, _, _) = flow(&server.uri(), FakeProvider::new());
        let outcome = flow.request_reset("user@example.com").await;
        assert_eq!(outcome, ResetOutcome::Sent);
        assert!(outcome.message().contains("Check your inbox"));
    }

    #[tokio::test]
    async fn test_request_reset_failure_messages() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/reset-password"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "User not found"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/reset-password"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let (flow, _, _) = flow(&server.uri(), FakeProvider::new());
        assert_eq!(flow.request_reset("ghost@example.com").await.message(), "User not found");
        assert_eq!(flow.request_reset("ghost@example.com").await.message(), "Something went wrong.");
    }

    #[tokio::test]
    async fn test_update_password_redirects_to_login() {
        let (flow, provider, navigator) = flow(
            "http://127.0.0.1:9",
            FakeProvider::with_session(remote_session("user@example.com", "a1", "r1")),
        );

        assert_eq!(flow.update_password("new-password").await, UpdateOutcome::Updated);
        assert_eq!(*provider.passwords.lock().unwrap(), vec!["new-password".to_string()]);
        assert_eq!(navigator.routes(), vec![Route::Login]);
    }

    #[tokio::test]
    async fn test_update_password_without_session() {
        let (flow, _, navigator) = flow("http://127.0.0.1:9", FakeProvider::new());

        let outcome = flow.update_password("new-password").await;
        assert_eq!(outcome.message(), "Update failed: No active session");
        assert!(navigator.routes().is_empty());
    }
}
