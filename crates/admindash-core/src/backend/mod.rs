//! Backend capabilities and the facade that hides which one is in use.
//!
//! Each capability (`AuthBackend`, `DashboardBackend`, `UsersBackend`) has two
//! implementations: `MockBackend`, serving in-process fixtures, and
//! `HttpBackend`, going through the HTTP pipeline. [`Api`] picks one set at
//! construction; call sites never branch on it.

pub mod http;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::api::{ApiError, HttpClient};
use crate::config::Config;
use crate::utils::is_valid_email;
use crate::models::{
    ActivityLog, AuthTokens, DashboardStats, LoginCredentials, LoginResponse, PaginatedResponse, User,
    UserFilters, UserListItem,
};

pub use http::HttpBackend;
pub use mock::MockBackend;

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse, ApiError>;
    async fn logout(&self) -> Result<(), ApiError>;
    async fn current_user(&self) -> Result<User, ApiError>;
    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, ApiError>;
}

#[async_trait]
pub trait DashboardBackend: Send + Sync {
    async fn stats(&self) -> Result<DashboardStats, ApiError>;
    async fn activity_logs(&self) -> Result<Vec<ActivityLog>, ApiError>;
}

#[async_trait]
pub trait UsersBackend: Send + Sync {
    async fn users(&self, filters: &UserFilters) -> Result<PaginatedResponse<UserListItem>, ApiError>;
    async fn user_by_id(&self, id: &str) -> Result<UserListItem, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Mock,
    Http,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Mock => write!(f, "mock"),
            BackendKind::Http => write!(f, "http"),
        }
    }
}

/// Facade over the three backend capabilities.
/// Clone is cheap - backends are shared behind `Arc`.
#[derive(Clone)]
pub struct Api {
    auth: Arc<dyn AuthBackend>,
    dashboard: Arc<dyn DashboardBackend>,
    users: Arc<dyn UsersBackend>,
    kind: BackendKind,
}

impl Api {
    /// Use one object for every capability.
    pub fn from_backend<B>(backend: Arc<B>, kind: BackendKind) -> Self
    where
        B: AuthBackend + DashboardBackend + UsersBackend + 'static,
    {
        Self {
            auth: backend.clone(),
            dashboard: backend.clone(),
            users: backend,
            kind,
        }
    }

    pub fn mock(backend: MockBackend) -> Self {
        Self::from_backend(Arc::new(backend), BackendKind::Mock)
    }

    pub fn http(client: HttpClient) -> Self {
        Self::from_backend(Arc::new(HttpBackend::new(client)), BackendKind::Http)
    }

    /// Select mock or HTTP once, from configuration.
    pub fn from_config(config: &Config, client: HttpClient) -> Self {
        let api = if config.use_mock_api {
            Self::mock(MockBackend::new())
        } else {
            Self::http(client)
        };
        info!(backend = %api.kind, base_url = %config.api_base_url, "API backend selected");
        api
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    // ===== Auth =====

    /// Authenticate. Empty fields are rejected before any backend call.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse, ApiError> {
        validate_credentials(credentials)?;
        self.auth.login(credentials).await
    }

    /// End the server-side session. Always succeeds from the caller's view;
    /// backend failures are only logged.
    pub async fn logout(&self) {
        if let Err(e) = self.auth.logout().await {
            warn!(error = %e, "Logout request failed, continuing");
        }
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.auth.current_user().await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        if refresh_token.is_empty() {
            return Err(ApiError::validation("Refresh token is required"));
        }
        self.auth.refresh_token(refresh_token).await
    }

    // ===== Dashboard =====

    pub async fn stats(&self) -> Result<DashboardStats, ApiError> {
        self.dashboard.stats().await
    }

    pub async fn activity_logs(&self) -> Result<Vec<ActivityLog>, ApiError> {
        self.dashboard.activity_logs().await
    }

    // ===== Users =====

    pub async fn users(&self, filters: &UserFilters) -> Result<PaginatedResponse<UserListItem>, ApiError> {
        self.users.users(filters).await
    }

    pub async fn user_by_id(&self, id: &str) -> Result<UserListItem, ApiError> {
        if id.trim().is_empty() {
            return Err(ApiError::validation("User id is required"));
        }
        self.users.user_by_id(id).await
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Both fields must be non-blank and the email must look like an address.
pub fn validate_credentials(credentials: &LoginCredentials) -> Result<(), ApiError> {
    let mut error: Option<ApiError> = None;
    if credentials.email.trim().is_empty() {
        error = Some(
            error
                .unwrap_or_else(|| ApiError::validation("Email and password are required"))
                .with_field_error("email", "Email is required"),
        );
    } else if !is_valid_email(credentials.email.trim()) {
        error = Some(ApiError::validation("Invalid email address").with_field_error("email", "Invalid email address"));
    }
    if credentials.password.is_empty() {
        error = Some(
            error
                .unwrap_or_else(|| ApiError::validation("Email and password are required"))
                .with_field_error("password", "Password is required"),
        );
    }
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
