//! In-process backend with fixture data and simulated latency.
//!
//! Behavior matters for tests: the search/filter/sort/paginate pipeline in
//! [`query_users`] is what the user table is exercised against, and the
//! sentinel password `"wrong"` is the only credential that is rejected.

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use tracing::debug;

use super::{validate_credentials, AuthBackend, DashboardBackend, UsersBackend};
use crate::api::ApiError;
use crate::models::{
    ActivityLog, ActivityStatus, AuthTokens, DashboardStats, LoginCredentials, LoginResponse,
    PaginatedResponse, Pagination, SortOrder, User, UserFilters, UserListItem, UserRole, UserStatus,
};
use crate::utils::{contains_ignore_case, LocaleOrder};

// ============================================================================
// Constants
// ============================================================================

/// Password the mock backend always rejects.
pub const REJECTED_PASSWORD: &str = "wrong";

const MOCK_USER_COUNT: usize = 50;
const MOCK_ACTIVITY_COUNT: usize = 10;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PAGE_SIZE: u32 = 10;

// Simulated latencies in milliseconds
const LOGIN_DELAY_MS: u64 = 800;
const LOGOUT_DELAY_MS: u64 = 300;
const CURRENT_USER_DELAY_MS: u64 = 500;
const STATS_DELAY_MS: u64 = 600;
const ACTIVITY_DELAY_MS: u64 = 500;
const USERS_DELAY_MS: u64 = 700;

const ACTIONS: [&str; 4] = ["Login", "Updated profile", "Created report", "Deleted item"];

pub struct MockBackend {
    admin: User,
    tokens: AuthTokens,
    users: Vec<UserListItem>,
    activities: Vec<ActivityLog>,
    simulate_latency: bool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Fixture backend with realistic response delays.
    pub fn new() -> Self {
        let now = Utc::now();
        let stamp = now.timestamp_millis();
        let now_iso = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        let admin = User {
            id: "1".to_string(),
            email: "admin@example.com".to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            role: UserRole::Admin,
            avatar: Some("https://api.dicebear.com/7.x/avataaars/svg?seed=John".to_string()),
            created_at: now_iso.clone(),
            updated_at: now_iso,
        };

        Self {
            admin,
            tokens: AuthTokens {
                access_token: format!("mock_access_token_{}", stamp),
                refresh_token: format!("mock_refresh_token_{}", stamp),
            },
            users: generate_users(MOCK_USER_COUNT),
            activities: generate_activities(MOCK_ACTIVITY_COUNT),
            simulate_latency: true,
        }
    }

    /// Same fixtures, no artificial delay.
    pub fn instant() -> Self {
        Self {
            simulate_latency: false,
            ..Self::new()
        }
    }

    pub fn users_fixture(&self) -> &[UserListItem] {
        &self.users
    }

    async fn delay(&self, ms: u64) {
        if self.simulate_latency {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

fn iso_ago(max_ms: i64) -> String {
    let offset = rand::thread_rng().gen_range(0..max_ms.max(1));
    (Utc::now() - chrono::Duration::milliseconds(offset)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn generate_users(count: usize) -> Vec<UserListItem> {
    const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1000;
    const YEAR_MS: i64 = 365 * 24 * 60 * 60 * 1000;

    (0..count)
        .map(|i| UserListItem {
            id: format!("user_{}", i + 1),
            email: format!("user{}@example.com", i + 1),
            first_name: "User".to_string(),
            last_name: (i + 1).to_string(),
            role: if i % 3 == 0 { UserRole::Admin } else { UserRole::User },
            status: if i % 4 == 0 { UserStatus::Inactive } else { UserStatus::Active },
            last_login: Some(iso_ago(WEEK_MS)),
            created_at: iso_ago(YEAR_MS),
        })
        .collect()
}

fn generate_activities(count: usize) -> Vec<ActivityLog> {
    let now = Utc::now();
    (0..count)
        .map(|i| ActivityLog {
            id: format!("activity_{}", i + 1),
            user_id: format!("user_{}", i + 1),
            user_name: format!("User {}", i + 1),
            action: ACTIONS[i % ACTIONS.len()].to_string(),
            timestamp: (now - chrono::Duration::hours(i as i64)).to_rfc3339_opts(SecondsFormat::Millis, true),
            status: match i % 3 {
                0 => ActivityStatus::Success,
                1 => ActivityStatus::Error,
                _ => ActivityStatus::Warning,
            },
        })
        .collect()
}

/// Search, filter, sort and paginate `users` the way the listing endpoint does.
///
/// Sorting only orders string-valued columns; rows whose column is missing (or
/// an unknown column) compare equal and keep their order.
pub fn query_users(users: &[UserListItem], filters: &UserFilters) -> PaginatedResponse<UserListItem> {
    let mut filtered: Vec<&UserListItem> = users.iter().collect();

    if let Some(search) = filters.search.as_deref().filter(|s| !s.is_empty()) {
        filtered.retain(|u| {
            contains_ignore_case(&u.email, search)
                || contains_ignore_case(&u.first_name, search)
                || contains_ignore_case(&u.last_name, search)
        });
    }

    if let Some(role) = filters.role {
        filtered.retain(|u| u.role == role);
    }

    if let Some(status) = filters.status {
        filtered.retain(|u| u.status == status);
    }

    if let Some(ref column) = filters.sort_by {
        let descending = filters.sort_order == Some(SortOrder::Desc);
        let order = LocaleOrder::new();
        filtered.sort_by(|a, b| match (a.sort_value(column), b.sort_value(column)) {
            (Some(a), Some(b)) if descending => order.compare(b, a),
            (Some(a), Some(b)) => order.compare(a, b),
            _ => Ordering::Equal,
        });
    }

    let page = filters.page.filter(|&p| p > 0).unwrap_or(DEFAULT_PAGE);
    let page_size = filters.page_size.filter(|&s| s > 0).unwrap_or(DEFAULT_PAGE_SIZE);
    let start = (page as usize - 1).saturating_mul(page_size as usize);

    let data = filtered
        .iter()
        .skip(start)
        .take(page_size as usize)
        .map(|u| (*u).clone())
        .collect();

    PaginatedResponse {
        data,
        pagination: Pagination::new(page, page_size, filtered.len() as u64),
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse, ApiError> {
        self.delay(LOGIN_DELAY_MS).await;

        validate_credentials(credentials)?;
        if credentials.password == REJECTED_PASSWORD {
            debug!(email = %credentials.email, "Mock login rejected");
            return Err(ApiError::authentication("Invalid credentials"));
        }

        Ok(LoginResponse {
            user: self.admin.clone(),
            tokens: self.tokens.clone(),
        })
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.delay(LOGOUT_DELAY_MS).await;
        Ok(())
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        self.delay(CURRENT_USER_DELAY_MS).await;
        Ok(self.admin.clone())
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<AuthTokens, ApiError> {
        let stamp = Utc::now().timestamp_millis();
        Ok(AuthTokens {
            access_token: format!("new_mock_access_token_{}", stamp),
            refresh_token: format!("new_mock_refresh_token_{}", stamp),
        })
    }
}

#[async_trait]
impl DashboardBackend for MockBackend {
    async fn stats(&self) -> Result<DashboardStats, ApiError> {
        self.delay(STATS_DELAY_MS).await;
        Ok(DashboardStats {
            total_users: 1247,
            active_users: 892,
            total_revenue: 125430.0,
            growth_rate: 12.5,
        })
    }

    async fn activity_logs(&self) -> Result<Vec<ActivityLog>, ApiError> {
        self.delay(ACTIVITY_DELAY_MS).await;
        Ok(self.activities.clone())
    }
}

#[async_trait]
impl UsersBackend for MockBackend {
    async fn users(&self, filters: &UserFilters) -> Result<PaginatedResponse<UserListItem>, ApiError> {
        self.delay(USERS_DELAY_MS).await;
        Ok(query_users(&self.users, filters))
    }

    async fn user_by_id(&self, id: &str) -> Result<UserListItem, ApiError> {
        self.delay(USERS_DELAY_MS).await;
        self.users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("User not found"))
    }
}
