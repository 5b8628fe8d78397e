use async_trait::async_trait;

use super::{AuthBackend, DashboardBackend, UsersBackend};
use crate::api::{ApiError, HttpClient};
use crate::models::auth::RefreshRequest;
use crate::models::{
    ActivityLog, AuthTokens, DashboardStats, LoginCredentials, LoginResponse, PaginatedResponse, User,
    UserFilters, UserListItem,
};

/// Backend talking to the real REST API through the HTTP pipeline.
#[derive(Clone)]
pub struct HttpBackend {
    client: HttpClient,
}

impl HttpBackend {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse, ApiError> {
        self.client.post("/auth/login", credentials).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        // Body, if any, is irrelevant.
        let _: serde_json::Value = self.client.post_empty("/auth/logout").await?;
        Ok(())
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        self.client.get("/auth/me").await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        self.client
            .post("/auth/refresh", &RefreshRequest { refresh_token })
            .await
    }
}

#[async_trait]
impl DashboardBackend for HttpBackend {
    async fn stats(&self) -> Result<DashboardStats, ApiError> {
        self.client.get("/dashboard/stats").await
    }

    async fn activity_logs(&self) -> Result<Vec<ActivityLog>, ApiError> {
        self.client.get("/dashboard/activity").await
    }
}

#[async_trait]
impl UsersBackend for HttpBackend {
    async fn users(&self, filters: &UserFilters) -> Result<PaginatedResponse<UserListItem>, ApiError> {
        self.client.get_with_query("/users", filters).await
    }

    async fn user_by_id(&self, id: &str) -> Result<UserListItem, ApiError> {
        self.client.get(&format!("/users/{}", urlencoding::encode(id))).await
    }
}

