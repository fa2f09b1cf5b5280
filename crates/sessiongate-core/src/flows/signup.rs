use tracing::{error, info};

use crate::api::{ApiClient, ErrorKind};

const DEFAULT_FAILURE_MESSAGE: &str = "Signup failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupOutcome {
    VerificationSent,
    AlreadyRegistered,
    Failed { message: String },
}

impl SignupOutcome {
    pub fn title(&self) -> &'static str {
        match self {
            SignupOutcome::VerificationSent => "Signup successful",
            SignupOutcome::AlreadyRegistered | SignupOutcome::Failed { .. } => "Signup failed",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SignupOutcome::VerificationSent => "Please check your email to verify.",
            SignupOutcome::AlreadyRegistered => {
                "This email has already been registered. Please log in instead."
            }
            SignupOutcome::Failed { message } => message,
        }
    }
}

pub struct SignupFlow {
    api: ApiClient,
}

impl SignupFlow {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn submit(&self, email: &str, password: &str) -> SignupOutcome {
        match self.api.signup(email, password).await {
            Ok(()) => {
                info!("Signup accepted, verification email sent");
                SignupOutcome::VerificationSent
            }
            Err(e) if e.kind() == ErrorKind::AlreadyRegistered => SignupOutcome::AlreadyRegistered,
            Err(e) => {
                error!(error = %e, "Signup failed");
                SignupOutcome::Failed {
                    message: e
                        .server_message()
                        .unwrap_or(DEFAULT_FAILURE_MESSAGE)
                        .to_string(),
                }
            }
        }
    }
}
