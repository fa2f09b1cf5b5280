use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::{CredentialStore, SessionProvider};
use crate::navigation::{Navigator, Route};

pub struct LogoutFlow {
    provider: Arc<dyn SessionProvider>,
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
}

impl LogoutFlow {
    pub fn new(provider: Arc<dyn SessionProvider>, store: CredentialStore, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            provider,
            store,
            navigator,
        }
    }

    /// Sign out remotely, wipe every stored credential and go to login.
    /// Local state is cleared even if the remote sign-out fails.
    pub async fn logout(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "Remote sign-out failed");
        }
        self.store.clear_all();
        info!("Logged out");
        self.navigator.navigate(Route::Login);
    }
}
