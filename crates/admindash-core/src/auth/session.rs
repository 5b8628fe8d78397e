use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::{AuthTokens, User, UserUpdate};
use crate::storage::{PersistedStore, TOKEN_KEY, USER_KEY};

/// Authentication state. There is no half-signed-in state: a user without
/// tokens (or tokens without a user) is `Anonymous`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated { user: User, tokens: AuthTokens },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            SessionState::Anonymous => None,
        }
    }

    pub fn tokens(&self) -> Option<&AuthTokens> {
        match self {
            SessionState::Authenticated { tokens, .. } => Some(tokens),
            SessionState::Anonymous => None,
        }
    }
}

/// Process-wide authentication state, written through to persisted storage.
///
/// Clone is cheap - clones share state and subscribers. Consumers observe
/// changes with [`SessionStore::subscribe`].
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<SessionState>,
    storage: PersistedStore,
}

impl SessionStore {
    /// Restore the session persisted by a previous run, if complete.
    pub fn load(storage: PersistedStore) -> Self {
        let user = storage.get::<User>(USER_KEY);
        let tokens = storage.get::<AuthTokens>(TOKEN_KEY);

        let state = match (user, tokens) {
            (Some(user), Some(tokens)) => {
                debug!(user_id = %user.id, "Restored persisted session");
                SessionState::Authenticated { user, tokens }
            }
            (None, None) => SessionState::Anonymous,
            (user, tokens) => {
                warn!(
                    has_user = user.is_some(),
                    has_tokens = tokens.is_some(),
                    "Discarding incomplete persisted session"
                );
                storage.remove(USER_KEY);
                storage.remove(TOKEN_KEY);
                SessionState::Anonymous
            }
        };

        let (tx, _rx) = watch::channel(state);
        Self {
            inner: Arc::new(Inner { state: tx, storage }),
        }
    }

    /// Enter the authenticated state with both user and tokens.
    pub fn login(&self, user: User, tokens: AuthTokens) {
        self.inner.storage.set(USER_KEY, &user);
        self.inner.storage.set(TOKEN_KEY, &tokens);
        info!(user_id = %user.id, "Session started");
        self.inner
            .state
            .send_replace(SessionState::Authenticated { user, tokens });
    }

    /// Clear the session in memory and in storage.
    pub fn logout(&self) {
        self.clear();
        info!("Session ended");
    }

    /// Clear the session because the backend rejected its credentials.
    pub fn force_clear(&self) {
        if self.is_authenticated() {
            warn!("Session rejected by server, clearing");
        }
        self.clear();
    }

    fn clear(&self) {
        self.inner.storage.remove(USER_KEY);
        self.inner.storage.remove(TOKEN_KEY);
        self.inner.state.send_if_modified(|state| {
            let was_authenticated = state.is_authenticated();
            *state = SessionState::Anonymous;
            was_authenticated
        });
    }

    /// Merge `update` into the current user. No-op when anonymous.
    pub fn update_user(&self, update: UserUpdate) {
        let storage = &self.inner.storage;
        self.inner.state.send_if_modified(|state| match state {
            SessionState::Authenticated { user, .. } => {
                user.apply(update);
                storage.set(USER_KEY, &*user);
                true
            }
            SessionState::Anonymous => false,
        });
    }

    /// Swap in a refreshed token pair. No-op when anonymous.
    pub fn replace_tokens(&self, new_tokens: AuthTokens) {
        let storage = &self.inner.storage;
        self.inner.state.send_if_modified(|state| match state {
            SessionState::Authenticated { tokens, .. } => {
                storage.set(TOKEN_KEY, &new_tokens);
                *tokens = new_tokens;
                true
            }
            SessionState::Anonymous => false,
        });
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn tokens(&self) -> Option<AuthTokens> {
        self.inner.state.borrow().tokens().cloned()
    }

    /// Snapshot of the full state.
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn storage(&self) -> &PersistedStore {
        &self.inner.storage
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn user() -> User {
        User {
            id: "1".to_string(),
            email: "admin@example.com".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            role: UserRole::Admin,
            avatar: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn tokens() -> AuthTokens {
        AuthTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    #[test]
    fn test_starts_anonymous_with_empty_storage() {
        let session = SessionStore::load(PersistedStore::in_memory());
        assert!(!session.is_authenticated());
        assert_eq!(session.current_user(), None);
        assert_eq!(session.tokens(), None);
    }

    #[test]
    fn test_login_persists_both_records() {
        let storage = PersistedStore::in_memory();
        let session = SessionStore::load(storage.clone());
        session.login(user(), tokens());

        assert!(session.is_authenticated());
        assert_eq!(storage.get::<User>(USER_KEY), Some(user()));
        assert_eq!(storage.get::<AuthTokens>(TOKEN_KEY), Some(tokens()));
    }

    #[test]
    fn test_restores_from_storage() {
        let storage = PersistedStore::in_memory();
        SessionStore::load(storage.clone()).login(user(), tokens());

        let restored = SessionStore::load(storage);
        assert!(restored.is_authenticated());
        assert_eq!(restored.current_user(), Some(user()));
    }

    #[test]
    fn test_partial_storage_loads_anonymous_and_cleans_up() {
        let storage = PersistedStore::in_memory();
        storage.set(USER_KEY, &user());

        let session = SessionStore::load(storage.clone());
        assert!(!session.is_authenticated());
        assert_eq!(storage.get::<User>(USER_KEY), None);
    }

    #[test]
    fn test_logout_clears_memory_and_storage() {
        let storage = PersistedStore::in_memory();
        let session = SessionStore::load(storage.clone());
        session.login(user(), tokens());
        session.logout();

        assert_eq!(session.state(), SessionState::Anonymous);
        assert_eq!(storage.get::<User>(USER_KEY), None);
        assert_eq!(storage.get::<AuthTokens>(TOKEN_KEY), None);
    }

    #[test]
    fn test_update_user_merges_and_persists() {
        let storage = PersistedStore::in_memory();
        let session = SessionStore::load(storage.clone());
        session.login(user(), tokens());
        session.update_user(UserUpdate {
            first_name: Some("Jane".to_string()),
            ..Default::default()
        });

        assert_eq!(session.current_user().unwrap().first_name, "Jane");
        assert_eq!(storage.get::<User>(USER_KEY).unwrap().first_name, "Jane");
    }

    #[test]
    fn test_update_user_when_anonymous_is_noop() {
        let storage = PersistedStore::in_memory();
        let session = SessionStore::load(storage.clone());
        session.update_user(UserUpdate {
            first_name: Some("Ghost".to_string()),
            ..Default::default()
        });

        assert!(!session.is_authenticated());
        assert_eq!(storage.get::<User>(USER_KEY), None);
    }

    #[test]
    fn test_replace_tokens_keeps_user() {
        let session = SessionStore::load(PersistedStore::in_memory());
        session.login(user(), tokens());
        let fresh = AuthTokens {
            access_token: "new".to_string(),
            refresh_token: "new-refresh".to_string(),
        };
        session.replace_tokens(fresh.clone());

        assert_eq!(session.tokens(), Some(fresh));
        assert_eq!(session.current_user(), Some(user()));
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let session = SessionStore::load(PersistedStore::in_memory());
        let mut rx = session.subscribe();

        session.login(user(), tokens());
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_authenticated());

        session.force_clear();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().is_authenticated());
    }
}
