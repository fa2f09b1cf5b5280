use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Broad classification of auth failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    InvalidCredentials,
    EmailNotVerified,
    AlreadyRegistered,
    ExpiredSession,
    CorruptLocalState,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized(Option<String>),

    #[error("Request rejected ({status}): {}", .message.as_deref().unwrap_or("no message"))]
    Rejected {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("Rate limited - please wait before retrying")]
    RateLimited(Option<String>),

    #[error("Server error: {body}")]
    ServerError {
        message: Option<String>,
        body: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No active session")]
    NoSession,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Who produced an error body. The identity backend puts its message in
/// `error`; the managed-session endpoint uses `error` for an OAuth code and
/// the readable text in `error_description` or `msg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    Backend,
    Provider,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn into_message(self, source: ErrorSource) -> Option<String> {
        let fields = match source {
            ErrorSource::Backend => [self.error, self.error_description, self.msg, self.message],
            ErrorSource::Provider => [self.error_description, self.msg, self.message, self.error],
        };
        fields
            .into_iter()
            .flatten()
            .map(|m| m.trim().to_string())
            .find(|m| !m.is_empty())
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the server-supplied message out of a JSON error body, if any.
    pub fn extract_message(body: &str, source: ErrorSource) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.into_message(source))
    }

    /// Build an error for a non-success response from the identity backend.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        Self::from_response(status, body, ErrorSource::Backend)
    }

    /// Build an error for a non-success response from the managed-session endpoint.
    pub fn from_provider_status(status: StatusCode, body: &str) -> Self {
        Self::from_response(status, body, ErrorSource::Provider)
    }

    fn from_response(status: StatusCode, body: &str, source: ErrorSource) -> Self {
        let message = Self::extract_message(body, source);
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            429 => ApiError::RateLimited(message),
            500..=599 => ApiError::ServerError {
                message,
                body: Self::truncate_body(body),
            },
            _ => ApiError::Rejected { status, message },
        }
    }

    /// The message the server attached to a rejection, if it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized(message)
            | ApiError::RateLimited(message)
            | ApiError::Rejected { message, .. }
            | ApiError::ServerError { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Classify by the server's text first, whatever the status, then by variant.
    pub fn kind(&self) -> ErrorKind {
        match self.server_message() {
            Some(m) if signals_unverified_email(m) => return ErrorKind::EmailNotVerified,
            Some(m) if signals_already_registered(m) => return ErrorKind::AlreadyRegistered,
            _ => {}
        }
        match self {
            ApiError::NetworkError(_)
            | ApiError::RateLimited(_)
            | ApiError::ServerError { .. }
            | ApiError::InvalidUrl(_) => ErrorKind::Network,
            ApiError::InvalidResponse(_) => ErrorKind::CorruptLocalState,
            ApiError::NoSession | ApiError::Unauthorized(_) => ErrorKind::ExpiredSession,
            ApiError::Rejected { .. } => ErrorKind::InvalidCredentials,
        }
    }
}

/// The backend rejects logins for unconfirmed accounts with
/// "Please verify your email before logging in."; the managed-session
/// endpoint says "Email not confirmed".
pub fn signals_unverified_email(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("verify your email") || lower.contains("email not confirmed")
}

pub fn signals_already_registered(message: &str) -> bool {
    message.to_lowercase().contains("already registered")
}
