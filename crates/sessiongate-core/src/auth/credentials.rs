use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::{MemoryStorage, ScopeStorage};

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const SESSION_RESTORED_KEY: &str = "sessionRestored";
const SESSION_RESTORED_VALUE: &str = "true";

/// Values that mean "nothing stored" even though the key exists.
const ABSENT_SENTINELS: [&str; 2] = ["undefined", "null"];

/// Persistence lifetime for a credential pair, chosen by "remember me".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Survives process restarts
    Durable,
    /// Cleared when the process exits
    Ephemeral,
}

impl Scope {
    pub fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            Scope::Durable
        } else {
            Scope::Ephemeral
        }
    }

    pub fn other(self) -> Self {
        match self {
            Scope::Durable => Scope::Ephemeral,
            Scope::Ephemeral => Scope::Durable,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Durable => f.write_str("durable"),
            Scope::Ephemeral => f.write_str("ephemeral"),
        }
    }
}

/// Whether the managed session has already been re-established from stored
/// credentials during this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Pending,
    Restored,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Both tokens present and neither is a placeholder
    pub fn is_well_formed(&self) -> bool {
        is_real_token(&self.access_token) && is_real_token(&self.refresh_token)
    }
}

// Tokens never end up in logs
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

fn is_real_token(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !ABSENT_SENTINELS.contains(&value)
}

/// Access/refresh token storage across a durable and an ephemeral scope.
///
/// Every operation is best-effort: backend failures are logged and treated
/// as "nothing stored", never returned to the caller.
#[derive(Clone)]
pub struct CredentialStore {
    durable: Arc<dyn ScopeStorage>,
    ephemeral: Arc<dyn ScopeStorage>,
}

impl CredentialStore {
    pub fn new(durable: Arc<dyn ScopeStorage>, ephemeral: Arc<dyn ScopeStorage>) -> Self {
        Self { durable, ephemeral }
    }

    /// Both scopes held in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
    }

    fn storage(&self, scope: Scope) -> &dyn ScopeStorage {
        match scope {
            Scope::Durable => self.durable.as_ref(),
            Scope::Ephemeral => self.ephemeral.as_ref(),
        }
    }

    fn get(&self, scope: Scope, key: &str) -> Option<String> {
        match self.storage(scope).get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, %scope, key, "Failed to read credential");
                None
            }
        }
    }

    fn set(&self, scope: Scope, key: &str, value: &str) {
        if let Err(e) = self.storage(scope).set(key, value) {
            warn!(error = %e, %scope, key, "Failed to write credential");
        }
    }

    fn remove(&self, scope: Scope, key: &str) {
        if let Err(e) = self.storage(scope).remove(key) {
            warn!(error = %e, %scope, key, "Failed to remove credential");
        }
    }

    /// The scope holding a complete pair, checking ephemeral before durable.
    /// A scope holding a partial or placeholder pair is cleared on the way.
    pub fn resolve_scope(&self) -> Option<Scope> {
        self.current().map(|(scope, _)| scope)
    }

    /// Read the pair in `scope`. Anything short of a well-formed pair is
    /// treated as corrupt: the scope's tokens are cleared and `None` returned.
    pub fn read(&self, scope: Scope) -> Option<TokenPair> {
        let access = self.get(scope, ACCESS_TOKEN_KEY);
        let refresh = self.get(scope, REFRESH_TOKEN_KEY);

        match (access, refresh) {
            (None, None) => None,
            (Some(access_token), Some(refresh_token)) => {
                let pair = TokenPair {
                    access_token,
                    refresh_token,
                };
                if pair.is_well_formed() {
                    Some(pair)
                } else {
                    debug!(%scope, "Discarding placeholder credentials");
                    self.clear(scope);
                    None
                }
            }
            _ => {
                debug!(%scope, "Discarding partial credentials");
                self.clear(scope);
                None
            }
        }
    }

    /// The pair from the resolved scope, if any
    pub fn current(&self) -> Option<(Scope, TokenPair)> {
        [Scope::Ephemeral, Scope::Durable]
            .into_iter()
            .find_map(|scope| self.read(scope).map(|pair| (scope, pair)))
    }

    pub fn write(&self, scope: Scope, pair: &TokenPair) {
        self.set(scope, ACCESS_TOKEN_KEY, &pair.access_token);
        self.set(scope, REFRESH_TOKEN_KEY, &pair.refresh_token);
        debug!(%scope, "Credentials stored");
    }

    /// Write `pair` to `scope` and drop whatever the other scope holds, so
    /// only one scope is ever authoritative.
    pub fn replace(&self, scope: Scope, pair: &TokenPair) {
        self.clear(scope.other());
        self.write(scope, pair);
    }

    pub fn clear(&self, scope: Scope) {
        self.remove(scope, ACCESS_TOKEN_KEY);
        self.remove(scope, REFRESH_TOKEN_KEY);
    }

    /// Remove both scopes and the restored flag
    pub fn clear_all(&self) {
        self.clear(Scope::Durable);
        self.clear(Scope::Ephemeral);
        self.set_restore_state(RestoreState::Pending);
    }

    pub fn restore_state(&self) -> RestoreState {
        match self.get(Scope::Ephemeral, SESSION_RESTORED_KEY).as_deref() {
            Some(SESSION_RESTORED_VALUE) => RestoreState::Restored,
            _ => RestoreState::Pending,
        }
    }

    pub fn set_restore_state(&self, state: RestoreState) {
        match state {
            RestoreState::Restored => {
                self.set(Scope::Ephemeral, SESSION_RESTORED_KEY, SESSION_RESTORED_VALUE)
            }
            RestoreState::Pending => self.remove(Scope::Ephemeral, SESSION_RESTORED_KEY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn store_with(durable: Arc<MemoryStorage>, ephemeral: Arc<MemoryStorage>) -> CredentialStore {
        CredentialStore::new(durable, ephemeral)
    }

    #[test]
    fn test_resolve_scope_empty() {
        let store = CredentialStore::in_memory();
        assert_eq!(store.resolve_scope(), None);
        assert!(store.current().is_none());
    }

    #[test]
    fn test_resolve_scope_finds_written_scope() {
        for scope in [Scope::Durable, Scope::Ephemeral] {
            let store = CredentialStore::in_memory();
            store.write(scope, &TokenPair::new("a1", "r1"));
            assert_eq!(store.resolve_scope(), Some(scope));
            assert_eq!(store.read(scope), Some(TokenPair::new("a1", "r1")));
        }
    }

    #[test]
    fn test_placeholder_tokens_are_absent() {
        for (access, refresh) in [("", "r1"), ("a1", "undefined"), ("null", "r1"), ("  ", "  ")] {
            let durable = Arc::new(MemoryStorage::new());
            let store = store_with(durable.clone(), Arc::new(MemoryStorage::new()));
            store.write(Scope::Durable, &TokenPair::new(access, refresh));

            assert_eq!(store.resolve_scope(), None, "{access:?}/{refresh:?}");
            assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap(), None);
            assert_eq!(durable.get(REFRESH_TOKEN_KEY).unwrap(), None);
        }
    }

    #[test]
    fn test_partial_pair_is_cleared() {
        let ephemeral = Arc::new(MemoryStorage::new());
        ephemeral.set(ACCESS_TOKEN_KEY, "a1").unwrap();
        let store = store_with(Arc::new(MemoryStorage::new()), ephemeral.clone());

        assert_eq!(store.resolve_scope(), None);
        assert_eq!(ephemeral.get(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_partial_refresh_only_is_cleared() {
        let durable = Arc::new(MemoryStorage::new());
        durable.set(REFRESH_TOKEN_KEY, "r1").unwrap();
        let store = store_with(durable.clone(), Arc::new(MemoryStorage::new()));

        assert_eq!(store.read(Scope::Durable), None);
        assert_eq!(durable.get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_ephemeral_takes_precedence() {
        let store = CredentialStore::in_memory();
        store.write(Scope::Durable, &TokenPair::new("old", "old-r"));
        store.write(Scope::Ephemeral, &TokenPair::new("new", "new-r"));

        let (scope, pair) = store.current().unwrap();
        assert_eq!(scope, Scope::Ephemeral);
        assert_eq!(pair.access_token, "new");
    }

    #[test]
    fn test_corrupt_ephemeral_falls_back_to_durable() {
        let ephemeral = Arc::new(MemoryStorage::new());
        ephemeral.set(ACCESS_TOKEN_KEY, "dangling").unwrap();
        let store = store_with(Arc::new(MemoryStorage::new()), ephemeral);
        store.write(Scope::Durable, &TokenPair::new("a1", "r1"));

        assert_eq!(store.resolve_scope(), Some(Scope::Durable));
    }

    #[test]
    fn test_replace_clears_other_scope() {
        let store = CredentialStore::in_memory();
        store.write(Scope::Ephemeral, &TokenPair::new("e", "er"));
        store.replace(Scope::Durable, &TokenPair::new("a1", "r1"));

        assert_eq!(store.read(Scope::Ephemeral), None);
        assert_eq!(store.read(Scope::Durable), Some(TokenPair::new("a1", "r1")));
    }

    #[test]
    fn test_clear_all_resets_restore_flag() {
        let store = CredentialStore::in_memory();
        store.write(Scope::Durable, &TokenPair::new("a1", "r1"));
        store.write(Scope::Ephemeral, &TokenPair::new("a2", "r2"));
        store.set_restore_state(RestoreState::Restored);
        assert_eq!(store.restore_state(), RestoreState::Restored);

        store.clear_all();
        assert_eq!(store.resolve_scope(), None);
        assert_eq!(store.restore_state(), RestoreState::Pending);
    }

    #[test]
    fn test_restore_flag_lives_in_ephemeral_scope() {
        let ephemeral = Arc::new(MemoryStorage::new());
        let store = store_with(Arc::new(MemoryStorage::new()), ephemeral.clone());
        store.set_restore_state(RestoreState::Restored);
        assert_eq!(ephemeral.get(SESSION_RESTORED_KEY).unwrap().as_deref(), Some("true"));

        // Anything other than "true" is not a restored session
        ephemeral.set(SESSION_RESTORED_KEY, "yes").unwrap();
        assert_eq!(store.restore_state(), RestoreState::Pending);
    }

    struct FailingStorage;

    impl ScopeStorage for FailingStorage {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Err(anyhow!("keychain locked"))
        }
        fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow!("keychain locked"))
        }
        fn remove(&self, _key: &str) -> anyhow::Result<()> {
            Err(anyhow!("keychain locked"))
        }
    }

    #[test]
    fn test_backend_failures_are_swallowed() {
        let store = CredentialStore::new(Arc::new(FailingStorage), Arc::new(MemoryStorage::new()));
        store.write(Scope::Durable, &TokenPair::new("a1", "r1"));
        store.clear(Scope::Durable);
        assert_eq!(store.read(Scope::Durable), None);
        assert_eq!(store.resolve_scope(), None);
    }

    #[test]
    fn test_token_pair_debug_is_redacted() {
        let debug = format!("{:?}", TokenPair::new("secret-access", "secret-refresh"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_scope_from_remember_me() {
        assert_eq!(Scope::from_remember_me(true), Scope::Durable);
        assert_eq!(Scope::from_remember_me(false), Scope::Ephemeral);
        assert_eq!(Scope::Durable.other(), Scope::Ephemeral);
    }
}
