//! sessiongate core - client-side session handling for an identity backend.
//!
//! The user counts as signed in when either the managed session or the
//! token pair in the local `CredentialStore` is vouched for by the server.
//! `SessionReconciler` decides this at startup, `SessionWatcher` keeps the
//! two in step afterwards, and the `flows` module covers login, signup,
//! password reset/update and logout.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod flows;
pub mod navigation;

#[cfg(test)]
mod testing;

pub use app::App;
pub use config::Config;
pub use navigation::{Navigator, Route};
