//! Keeps stored credentials in step with the managed session after login.
//!
//! The watcher is one spawned task that listens for `AuthEvent`s and polls
//! `get_session` on a fixed interval. A sign-out (announced or discovered by
//! the poll) wipes the store, redirects to login once, and ends the task.
//! The returned `WatcherHandle` owns both the listener and the timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::credentials::{CredentialStore, RestoreState, Scope};
use super::provider::{AuthEvent, RemoteSession, SessionProvider, Subscription};
use crate::navigation::{Navigator, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Watching,
    TornDown,
}

pub struct SessionWatcher {
    provider: Arc<dyn SessionProvider>,
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
    check_interval: Duration,
    fallback_scope: Scope,
}

impl SessionWatcher {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
        check_interval: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            navigator,
            check_interval,
            fallback_scope: Scope::Ephemeral,
        }
    }

    /// Scope that receives refreshed tokens when nothing is stored yet.
    pub fn with_fallback_scope(mut self, scope: Scope) -> Self {
        self.fallback_scope = scope;
        self
    }

    /// Start watching. Must be called from within a tokio runtime.
    pub fn spawn(self) -> WatcherHandle {
        let cancel = CancellationToken::new();
        // Subscribe before spawning so no event between now and the first poll is missed
        let subscription = self.provider.subscribe();
        let task = tokio::spawn(self.run(subscription, cancel.clone()));
        WatcherHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, mut subscription: Subscription, cancel: CancellationToken) -> WatchState {
        let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.check_interval.as_secs(), "Session watcher started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = subscription.next() => match event {
                    Some(event) => {
                        if self.handle_event(event, &cancel) == WatchState::TornDown {
                            break;
                        }
                    }
                    None => {
                        debug!("Auth event source closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    // Abandon an in-flight check when torn down; its result is ignored
                    let checked = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        result = self.provider.get_session() => result,
                    };
                    if self.handle_check(checked, &cancel) == WatchState::TornDown {
                        break;
                    }
                }
            }
        }

        debug!("Session watcher stopped");
        WatchState::TornDown
    }

    fn handle_event(&self, event: AuthEvent, cancel: &CancellationToken) -> WatchState {
        debug!(event = event.name(), "Auth state changed");
        match event {
            AuthEvent::SignedOut => {
                info!("Signed out");
                self.sign_out(cancel)
            }
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                self.persist(&session);
                WatchState::Watching
            }
            AuthEvent::UserUpdated(_) => WatchState::Watching,
        }
    }

    fn handle_check(
        &self,
        checked: Result<Option<RemoteSession>, crate::api::ApiError>,
        cancel: &CancellationToken,
    ) -> WatchState {
        match checked {
            Ok(Some(_)) => WatchState::Watching,
            Ok(None) => {
                info!("Session expired");
                self.sign_out(cancel)
            }
            Err(e) => {
                warn!(error = %e, "Session check failed, will retry next interval");
                WatchState::Watching
            }
        }
    }

    fn persist(&self, session: &RemoteSession) {
        if !session.tokens.is_well_formed() {
            warn!("Ignoring session event without a complete token pair");
            return;
        }
        let scope = self.store.resolve_scope().unwrap_or(self.fallback_scope);
        self.store.write(scope, &session.tokens);
        self.store.set_restore_state(RestoreState::Restored);
    }

    fn sign_out(&self, cancel: &CancellationToken) -> WatchState {
        if cancel.is_cancelled() {
            return WatchState::TornDown;
        }
        self.store.clear_all();
        self.navigator.navigate(Route::Login);
        WatchState::TornDown
    }
}

/// Owns the running watcher. Dropping the handle tears the watcher down.
pub struct WatcherHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<WatchState>>,
}

impl WatcherHandle {
    /// Whether the watcher stopped on its own (signed out or source closed)
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Wait until the watcher stops on its own. Cancel-safe: the task is only
    /// released once it has completed.
    pub async fn finished(&mut self) -> WatchState {
        let Some(task) = self.task.as_mut() else {
            return WatchState::TornDown;
        };
        let state = task.await.unwrap_or(WatchState::TornDown);
        self.task = None;
        state
    }

    /// Unregister the listener and stop the timer, whatever state the
    /// watcher is in.
    pub async fn teardown(mut self) -> WatchState {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task.await.unwrap_or(WatchState::TornDown),
            None => WatchState::TornDown,
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
