//! Request and error hooks run by [`HttpClient`](super::HttpClient).
//!
//! Request interceptors run in registration order before the request is sent
//! and may reject it. Error interceptors observe every normalized failure in
//! registration order; they cannot swallow it.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::SessionStore;
use crate::cache::QueryClient;
use crate::models::AuthTokens;
use crate::routes::{self, Navigator};
use crate::storage::{PersistedStore, TOKEN_KEY, USER_KEY};

/// A request as seen by interceptors, before it is handed to reqwest.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    /// Path relative to the client's base URL, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl OutgoingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

pub trait RequestInterceptor: Send + Sync {
    fn on_request(&self, request: &mut OutgoingRequest) -> Result<(), ApiError>;
}

pub trait ErrorInterceptor: Send + Sync {
    fn on_error(&self, error: &ApiError);
}

/// Attaches `Authorization: Bearer <access token>` when a token pair is stored.
pub struct BearerAuth {
    storage: PersistedStore,
}

impl BearerAuth {
    pub fn new(storage: PersistedStore) -> Self {
        Self { storage }
    }
}

impl RequestInterceptor for BearerAuth {
    fn on_request(&self, request: &mut OutgoingRequest) -> Result<(), ApiError> {
        let Some(tokens) = self.storage.get::<AuthTokens>(TOKEN_KEY) else {
            return Ok(());
        };
        if tokens.access_token.is_empty() {
            return Ok(());
        }

        let value = HeaderValue::from_str(&format!("Bearer {}", tokens.access_token))
            .map_err(|_| ApiError::unexpected("Stored access token is not a valid header value"))?;
        request.headers.insert(header::AUTHORIZATION, value);
        Ok(())
    }
}

/// On 401: drop the stored session, empty the query cache, and send the user
/// to the login route.
///
/// Navigation is skipped when already on the login route so a failed login
/// attempt does not loop.
pub struct UnauthorizedRedirect {
    storage: PersistedStore,
    session: Option<SessionStore>,
    queries: Option<QueryClient>,
    navigator: Arc<dyn Navigator>,
}

impl UnauthorizedRedirect {
    pub fn new(storage: PersistedStore, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            storage,
            session: None,
            queries: None,
            navigator,
        }
    }

    /// Also reset the in-memory session, not just its persisted copy.
    pub fn with_session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    /// Drop every cached query so nothing from the old session is served.
    pub fn with_queries(mut self, queries: QueryClient) -> Self {
        self.queries = Some(queries);
        self
    }
}

impl ErrorInterceptor for UnauthorizedRedirect {
    fn on_error(&self, error: &ApiError) {
        if !error.is_unauthorized() {
            return;
        }

        self.storage.remove(TOKEN_KEY);
        self.storage.remove(USER_KEY);
        if let Some(ref session) = self.session {
            session.force_clear();
        }
        if let Some(ref queries) = self.queries {
            queries.clear();
        }

        let current = self.navigator.current_path();
        if routes::is_login_path(&current) {
            debug!("Unauthorized on login route, not redirecting");
        } else {
            warn!(from = %current, "Unauthorized, redirecting to login");
            self.navigator.navigate(routes::LOGIN);
        }
    }
}
