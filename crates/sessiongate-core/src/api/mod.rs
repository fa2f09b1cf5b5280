//! REST API client module for the identity backend.
//!
//! This module provides the `ApiClient` for the backend's `/auth/*`
//! endpoints and the `ApiError` type shared with the managed-session
//! provider.
//!
//! Stored access tokens are checked against the backend with bearer
//! authentication on `GET /auth/user`.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::{ApiError, ErrorKind, ErrorSource};
