//! Decides on startup whether the user is signed in.
//!
//! Two independent sources can vouch for the user: the managed session and
//! the token pair in the `CredentialStore`. The managed session is asked
//! first; the stored access token is only checked against `GET /auth/user`
//! when there is no usable managed session. If neither vouches, stored
//! credentials are wiped and the user is sent to the login route.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::credentials::{CredentialStore, RestoreState, Scope, TokenPair};
use super::provider::SessionProvider;
use crate::api::ApiClient;
use crate::navigation::{Navigator, Route};

/// Which source vouched for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    RemoteSession,
    StoredToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Authenticated { email: String, source: AuthSource },
    Unauthenticated,
}

impl AuthState {
    pub fn email(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { email, .. } => Some(email),
            AuthState::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }
}

pub struct SessionReconciler {
    api: ApiClient,
    provider: Arc<dyn SessionProvider>,
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
    fallback_scope: Scope,
}

impl SessionReconciler {
    pub fn new(
        api: ApiClient,
        provider: Arc<dyn SessionProvider>,
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            api,
            provider,
            store,
            navigator,
            fallback_scope: Scope::Ephemeral,
        }
    }

    /// Scope that receives a managed session's tokens when nothing is stored yet.
    pub fn with_fallback_scope(mut self, scope: Scope) -> Self {
        self.fallback_scope = scope;
        self
    }

    pub async fn reconcile(&self) -> AuthState {
        if let Some(email) = self.from_remote_session().await {
            info!("Authenticated from managed session");
            return AuthState::Authenticated {
                email,
                source: AuthSource::RemoteSession,
            };
        }

        if let Some(email) = self.from_stored_token().await {
            info!("Authenticated from stored token");
            return AuthState::Authenticated {
                email,
                source: AuthSource::StoredToken,
            };
        }

        info!("Not authenticated, redirecting to login");
        self.store.clear_all();
        self.navigator.navigate(Route::Login);
        AuthState::Unauthenticated
    }

    async fn from_remote_session(&self) -> Option<String> {
        let session = match self.provider.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("No managed session");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Managed session query failed");
                return None;
            }
        };

        let Some(email) = session.identity() else {
            debug!("Managed session has no usable identity");
            return None;
        };

        let scope = self.store.resolve_scope().unwrap_or(self.fallback_scope);
        self.store.replace(scope, &session.tokens);
        self.store.set_restore_state(RestoreState::Restored);
        Some(email.to_string())
    }

    async fn from_stored_token(&self) -> Option<String> {
        let (scope, tokens) = self.store.current()?;

        match self.api.current_user(&tokens.access_token).await {
            Ok(Some(email)) => {
                self.restore_remote_session(scope, &tokens).await;
                Some(email)
            }
            Ok(None) => {
                debug!(%scope, "Stored token has no identity");
                None
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "Stored token check failed");
                None
            }
        }
    }

    /// Re-establish the managed session from stored tokens, once per process.
    async fn restore_remote_session(&self, scope: Scope, tokens: &TokenPair) {
        if self.store.restore_state() == RestoreState::Restored {
            return;
        }

        match self.provider.set_session(tokens).await {
            Ok(session) => {
                if session.tokens != *tokens && session.tokens.is_well_formed() {
                    self.store.write(scope, &session.tokens);
                }
                self.store.set_restore_state(RestoreState::Restored);
            }
            Err(e) => {
                warn!(error = %e, "Failed to restore managed session");
            }
        }
    }
}
