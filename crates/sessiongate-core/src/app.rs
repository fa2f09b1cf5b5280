//! Wiring of config, storage, API client and managed-session provider.
//!
//! `App` builds every component from a `Config` and hands out the
//! reconciler, watcher and flows sharing one `CredentialStore` and one
//! provider.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::auth::{
    CredentialStore, FileStorage, GoTrueProvider, KeyringStorage, MemoryStorage, ScopeStorage,
    SessionProvider, SessionReconciler, SessionWatcher,
};
use crate::config::{Config, DurableBackend};
use crate::flows::{LoginFlow, LogoutFlow, PasswordFlow, SignupFlow};
use crate::navigation::Navigator;

pub struct App {
    pub config: Config,
    pub api: ApiClient,
    pub provider: Arc<dyn SessionProvider>,
    pub store: CredentialStore,
    pub navigator: Arc<dyn Navigator>,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let api = ApiClient::new(&config.api_base_url)
            .with_context(|| format!("Invalid API base URL: {}", config.api_base_url))?;

        let provider_url = config.provider_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!("Managed session endpoint not configured (set SESSIONGATE_PROVIDER_URL)")
        })?;
        let anon_key = config.provider_anon_key.clone().unwrap_or_default();
        if anon_key.is_empty() {
            warn!("No anon key configured for the managed session endpoint");
        }
        let provider = GoTrueProvider::new(provider_url, anon_key)
            .with_context(|| format!("Invalid managed session URL: {}", provider_url))?;

        let store = CredentialStore::new(Self::durable_storage(&config)?, Arc::new(MemoryStorage::new()));
        debug!(backend = ?config.durable_backend, "Credential store ready");

        Ok(Self::from_parts(config, api, Arc::new(provider), store, navigator))
    }

    pub fn from_parts(
        config: Config,
        api: ApiClient,
        provider: Arc<dyn SessionProvider>,
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config,
            api,
            provider,
            store,
            navigator,
        }
    }

    fn durable_storage(config: &Config) -> Result<Arc<dyn ScopeStorage>> {
        let storage: Arc<dyn ScopeStorage> = match config.durable_backend {
            DurableBackend::Keyring => Arc::new(KeyringStorage::new()),
            DurableBackend::File => Arc::new(FileStorage::open(config.data_dir()?)?),
        };
        Ok(storage)
    }

    pub fn reconciler(&self) -> SessionReconciler {
        SessionReconciler::new(
            self.api.clone(),
            self.provider.clone(),
            self.store.clone(),
            self.navigator.clone(),
        )
        .with_fallback_scope(self.config.default_scope())
    }

    pub fn watcher(&self) -> SessionWatcher {
        SessionWatcher::new(
            self.provider.clone(),
            self.store.clone(),
            self.navigator.clone(),
            self.config.watch_interval(),
        )
        .with_fallback_scope(self.config.default_scope())
    }

    pub fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(self.api.clone(), self.provider.clone(), self.store.clone())
    }

    pub fn signup_flow(&self) -> SignupFlow {
        SignupFlow::new(self.api.clone())
    }

    pub fn password_flow(&self) -> PasswordFlow {
        PasswordFlow::new(self.api.clone(), self.provider.clone(), self.navigator.clone())
    }

    pub fn logout_flow(&self) -> LogoutFlow {
        LogoutFlow::new(self.provider.clone(), self.store.clone(), self.navigator.clone())
    }
}
