//! Route surface shared with the presentation layer.
//!
//! The core never renders anything; it only needs to know where the login page
//! lives (for the 401 redirect) and which routes require a session.

use std::sync::Mutex;

use tracing::debug;

use crate::auth::SessionStore;

pub const HOME: &str = "/";
pub const LOGIN: &str = "/login";
pub const DASHBOARD: &str = "/dashboard";
pub const USERS: &str = "/users";
pub const REPORTS: &str = "/reports";
pub const SETTINGS: &str = "/settings";
pub const PROFILE: &str = "/profile";

/// Routes that require an authenticated session.
const PROTECTED: &[&str] = &[DASHBOARD, USERS, REPORTS, SETTINGS, PROFILE];

/// Current-location access and forced navigation.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn navigate(&self, path: &str);
}

/// Navigator that only records the location. Used by the CLI and in tests.
#[derive(Debug)]
pub struct MemoryNavigator {
    path: Mutex<String>,
}

impl MemoryNavigator {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            path: Mutex::new(initial.into()),
        }
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new(HOME)
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn navigate(&self, path: &str) {
        debug!(path = path, "Navigating");
        *self.path.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = path.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(&'static str),
    NotFound,
}

/// Strip query string, fragment and trailing slash.
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Decide whether `path` may be shown for the given session.
pub fn guard(session: &SessionStore, path: &str) -> RouteDecision {
    let authenticated = session.is_authenticated();
    match normalize(path) {
        LOGIN if authenticated => RouteDecision::Redirect(DASHBOARD),
        LOGIN => RouteDecision::Allow,
        HOME if authenticated => RouteDecision::Redirect(DASHBOARD),
        HOME => RouteDecision::Redirect(LOGIN),
        p if PROTECTED.contains(&p) => {
            if authenticated {
                RouteDecision::Allow
            } else {
                RouteDecision::Redirect(LOGIN)
            }
        }
        _ => RouteDecision::NotFound,
    }
}

pub fn is_login_path(path: &str) -> bool {
    normalize(path) == LOGIN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthTokens, User, UserRole};
    use crate::storage::PersistedStore;

    fn signed_in() -> SessionStore {
        let session = SessionStore::load(PersistedStore::in_memory());
        session.login(
            User {
                id: "1".to_string(),
                email: "admin@example.com".to_string(),
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                role: UserRole::Admin,
                avatar: None,
                created_at: String::new(),
                updated_at: String::new(),
            },
            AuthTokens {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
            },
        );
        session
    }

    #[test]
    fn test_anonymous_is_sent_to_login() {
        let session = SessionStore::load(PersistedStore::in_memory());
        assert_eq!(guard(&session, USERS), RouteDecision::Redirect(LOGIN));
        assert_eq!(guard(&session, HOME), RouteDecision::Redirect(LOGIN));
        assert_eq!(guard(&session, LOGIN), RouteDecision::Allow);
    }

    #[test]
    fn test_authenticated_skips_login() {
        let session = signed_in();
        assert_eq!(guard(&session, "/users?page=2"), RouteDecision::Allow);
        assert_eq!(guard(&session, "/dashboard/"), RouteDecision::Allow);
        assert_eq!(guard(&session, LOGIN), RouteDecision::Redirect(DASHBOARD));
        assert_eq!(guard(&session, HOME), RouteDecision::Redirect(DASHBOARD));
    }

    #[test]
    fn test_unknown_route() {
        let session = signed_in();
        assert_eq!(guard(&session, "/nope"), RouteDecision::NotFound);
    }

    #[test]
    fn test_memory_navigator() {
        let nav = MemoryNavigator::default();
        assert_eq!(nav.current_path(), HOME);
        nav.navigate(LOGIN);
        assert!(is_login_path(&nav.current_path()));
    }
}
