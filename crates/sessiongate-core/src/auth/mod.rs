//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: token pair storage across a durable and an
//!   ephemeral scope
//! - `SessionProvider`: the managed-session API, with `GoTrueProvider` as
//!   its HTTP implementation
//! - `SessionReconciler`: startup check of both credential sources
//! - `SessionWatcher`: keeps the store in sync with session events and
//!   polls for expiry every 15 minutes by default

pub mod credentials;
pub mod gotrue;
pub mod provider;
pub mod reconciler;
pub mod storage;
pub mod watcher;

pub use credentials::{CredentialStore, RestoreState, Scope, TokenPair};
pub use gotrue::GoTrueProvider;
pub use provider::{AuthEvent, AuthEvents, RemoteSession, SessionProvider, Subscription};
pub use reconciler::{AuthSource, AuthState, SessionReconciler};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, ScopeStorage};
pub use watcher::{SessionWatcher, WatchState, WatcherHandle};
