//! Application object for the dashboard client.
//!
//! `App` owns the API facade, the query cache and the session and theme
//! stores, and exposes every dashboard operation on top of them. Reads go
//! through the cache; login, logout and token refresh are mutations.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use crate::api::{ApiError, BearerAuth, HttpClient, UnauthorizedRedirect};
use crate::auth::SessionStore;
use crate::backend::Api;
use crate::cache::{MutationOptions, QueryClient, QueryObserver, QueryOptions};
use crate::config::Config;
use crate::models::{
    ActivityLog, AuthTokens, DashboardStats, LoginCredentials, PaginatedResponse, User, UserFilters,
    UserListItem, UserUpdate,
};
use crate::routes::{self, Navigator, RouteDecision};
use crate::storage::{PersistedStore, StorageBackend};
use crate::theme::ThemeStore;

// ============================================================================
// Constants
// ============================================================================

/// Background refresh period for the stats cards.
pub const STATS_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

/// Background refresh period for the activity table.
pub const ACTIVITY_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Cache keys for every query the dashboard issues.
pub mod keys {
    use crate::cache::QueryKey;
    use crate::models::UserFilters;

    pub const CURRENT_USER: &str = "auth.currentUser";
    pub const STATS: &str = "dashboard.stats";
    pub const ACTIVITY: &str = "dashboard.activity";
    pub const USERS_LIST: &str = "users.list";
    pub const USER_DETAIL: &str = "users.detail";

    pub fn current_user() -> QueryKey {
        QueryKey::new(CURRENT_USER)
    }

    pub fn stats() -> QueryKey {
        QueryKey::new(STATS)
    }

    pub fn activity() -> QueryKey {
        QueryKey::new(ACTIVITY)
    }

    pub fn users(filters: &UserFilters) -> QueryKey {
        QueryKey::with_params(USERS_LIST, filters)
    }

    pub fn user(id: &str) -> QueryKey {
        QueryKey::with_params(USER_DETAIL, id)
    }
}

type Fetcher<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

pub struct App {
    config: Config,
    api: Api,
    queries: QueryClient,
    session: SessionStore,
    theme: ThemeStore,
    navigator: Arc<dyn Navigator>,
}

impl App {
    /// Wire the application from configuration over the given storage.
    ///
    /// The HTTP pipeline attaches the persisted access token to every request
    /// and, on a 401, clears the session and the query cache and navigates to
    /// the login page.
    pub fn new(
        config: Config,
        backend: Arc<dyn StorageBackend>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let storage = PersistedStore::new(backend);
        let session = SessionStore::load(storage.clone());
        let queries = QueryClient::new();

        let client = HttpClient::new(config.api_base_url.clone())?
            .with_request_interceptor(BearerAuth::new(storage.clone()))
            .with_error_interceptor(
                UnauthorizedRedirect::new(storage.clone(), navigator.clone())
                    .with_session(session.clone())
                    .with_queries(queries.clone()),
            );
        let api = Api::from_config(&config, client);

        Ok(Self::from_parts(config, api, queries, storage, session, navigator))
    }

    /// Build around an already constructed API facade.
    pub fn with_api(config: Config, api: Api, storage: PersistedStore, navigator: Arc<dyn Navigator>) -> Self {
        let session = SessionStore::load(storage.clone());
        Self::from_parts(config, api, QueryClient::new(), storage, session, navigator)
    }

    fn from_parts(
        config: Config,
        api: Api,
        queries: QueryClient,
        storage: PersistedStore,
        session: SessionStore,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let theme = ThemeStore::load(storage);
        debug!(
            backend = %api.kind(),
            authenticated = session.is_authenticated(),
            theme = %theme.theme(),
            "App initialized"
        );
        Self {
            config,
            api,
            queries,
            session,
            theme,
            navigator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn theme(&self) -> &ThemeStore {
        &self.theme
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Apply the route guard and move the navigator accordingly.
    pub fn open(&self, path: &str) -> RouteDecision {
        let decision = routes::guard(&self.session, path);
        match &decision {
            RouteDecision::Allow => self.navigator.navigate(path),
            RouteDecision::Redirect(to) => self.navigator.navigate(to),
            RouteDecision::NotFound => debug!(path = path, "No such route"),
        }
        decision
    }

    // ===== Auth =====

    /// Sign in. On success the session is established and the current-user
    /// query is seeded with the returned user.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, ApiError> {
        let response = self
            .queries
            .mutate(&MutationOptions::default(), move || self.api.login(credentials))
            .await?;

        let user = response.user;
        self.session.login(user.clone(), response.tokens);
        self.queries.set_query_data(keys::current_user(), user.clone());
        info!(user_id = %user.id, "Login successful");
        Ok(user)
    }

    /// Sign out. Local state is cleared whether or not the backend call
    /// succeeds.
    pub async fn logout(&self) {
        self.api.logout().await;
        self.session.logout();
        self.queries.clear();
        info!("Logged out");
    }

    /// Exchange the refresh token for a new pair and store it.
    pub async fn refresh_session(&self) -> Result<AuthTokens, ApiError> {
        let Some(tokens) = self.session.tokens() else {
            return Err(ApiError::authentication("Not authenticated"));
        };
        let refresh_token = tokens.refresh_token.as_str();
        let refreshed = self
            .queries
            .mutate(&MutationOptions::default(), move || self.api.refresh_token(refresh_token))
            .await?;
        self.session.replace_tokens(refreshed.clone());
        Ok(refreshed)
    }

    /// Merge `update` into the signed-in user, locally.
    pub fn update_current_user(&self, update: UserUpdate) -> Option<User> {
        self.session.update_user(update);
        let user = self.session.current_user()?;
        self.queries.set_query_data(keys::current_user(), user.clone());
        Some(user)
    }

    /// The signed-in user as the backend sees it. `None` while anonymous;
    /// no request is made then.
    pub async fn current_user(&self) -> Result<Option<Arc<User>>, ApiError> {
        if !self.session.is_authenticated() {
            return Ok(None);
        }
        let user = self
            .queries
            .fetch_query(keys::current_user(), &current_user_options(), self.current_user_fetcher())
            .await?;
        Ok(Some(user))
    }

    // ===== Dashboard =====

    pub async fn dashboard_stats(&self) -> Result<Arc<DashboardStats>, ApiError> {
        self.queries
            .fetch_query(keys::stats(), &stats_options(), self.stats_fetcher())
            .await
    }

    pub async fn activity_logs(&self) -> Result<Arc<Vec<ActivityLog>>, ApiError> {
        self.queries
            .fetch_query(keys::activity(), &activity_options(), self.activity_fetcher())
            .await
    }

    /// Live stats, refreshed every minute while observed.
    pub fn watch_dashboard_stats(&self) -> QueryObserver<DashboardStats> {
        QueryObserver::new(&self.queries, keys::stats(), stats_options(), self.stats_fetcher())
    }

    /// Live activity feed, refreshed every 30 seconds while observed.
    pub fn watch_activity_logs(&self) -> QueryObserver<Vec<ActivityLog>> {
        QueryObserver::new(&self.queries, keys::activity(), activity_options(), self.activity_fetcher())
    }

    // ===== Users =====

    pub async fn users(&self, filters: &UserFilters) -> Result<Arc<PaginatedResponse<UserListItem>>, ApiError> {
        self.queries
            .fetch_query(keys::users(filters), &users_options(), self.users_fetcher(filters.clone()))
            .await
    }

    /// Live user listing. Changing filters keeps the previous page visible
    /// until the new one arrives.
    pub fn watch_users(&self, filters: &UserFilters) -> QueryObserver<PaginatedResponse<UserListItem>> {
        QueryObserver::new(
            &self.queries,
            keys::users(filters),
            users_options(),
            self.users_fetcher(filters.clone()),
        )
    }

    pub fn set_users_filters(
        &self,
        observer: &mut QueryObserver<PaginatedResponse<UserListItem>>,
        filters: &UserFilters,
    ) {
        observer.set_key(keys::users(filters), self.users_fetcher(filters.clone()));
    }

    pub async fn user(&self, id: &str) -> Result<Arc<UserListItem>, ApiError> {
        if id.trim().is_empty() {
            return Err(ApiError::validation("User id is required"));
        }
        self.queries
            .fetch_query(keys::user(id), &QueryOptions::default(), self.user_fetcher(id.to_string()))
            .await
    }

    /// Drop cached user listings and details so the next read refetches.
    pub fn invalidate_users(&self) -> usize {
        self.queries.invalidate_operation("users")
    }

    // ===== Fetchers =====

    fn current_user_fetcher(&self) -> Fetcher<User> {
        let api = self.api.clone();
        Box::new(move || {
            let api = api.clone();
            async move { api.current_user().await }.boxed()
        })
    }

    fn stats_fetcher(&self) -> Fetcher<DashboardStats> {
        let api = self.api.clone();
        Box::new(move || {
            let api = api.clone();
            async move { api.stats().await }.boxed()
        })
    }

    fn activity_fetcher(&self) -> Fetcher<Vec<ActivityLog>> {
        let api = self.api.clone();
        Box::new(move || {
            let api = api.clone();
            async move { api.activity_logs().await }.boxed()
        })
    }

    fn users_fetcher(&self, filters: UserFilters) -> Fetcher<PaginatedResponse<UserListItem>> {
        let api = self.api.clone();
        Box::new(move || {
            let api = api.clone();
            let filters = filters.clone();
            async move { api.users(&filters).await }.boxed()
        })
    }

    fn user_fetcher(&self, id: String) -> Fetcher<UserListItem> {
        let api = self.api.clone();
        Box::new(move || {
            let api = api.clone();
            let id = id.clone();
            async move { api.user_by_id(&id).await }.boxed()
        })
    }
}

fn current_user_options() -> QueryOptions {
    QueryOptions::default().retry(1)
}

fn stats_options() -> QueryOptions {
    QueryOptions::default().refetch_interval(STATS_REFETCH_INTERVAL)
}

fn activity_options() -> QueryOptions {
    QueryOptions::default().refetch_interval(ACTIVITY_REFETCH_INTERVAL)
}

fn users_options() -> QueryOptions {
    QueryOptions::default().keep_previous_data(true)
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("api", &self.api)
            .field("queries", &self.queries)
            .field("authenticated", &self.session.is_authenticated())
            .finish_non_exhaustive()
    }
}
