//! Data models shared by the backends, the cache and the stores.
//!
//! This module contains all the wire types exchanged with the dashboard API:
//!
//! - `User`, `UserUpdate`, `AuthTokens`, `LoginCredentials`: authentication
//! - `DashboardStats`, `ActivityLog`: overview page
//! - `UserListItem`, `UserFilters`, `PaginatedResponse`: user management

pub mod auth;
pub mod dashboard;
pub mod page;
pub mod user;

pub use auth::{AuthTokens, LoginCredentials, LoginResponse};
pub use dashboard::{ActivityLog, ActivityStatus, DashboardStats};
pub use page::{PaginatedResponse, Pagination};
pub use user::{SortOrder, User, UserFilters, UserListItem, UserRole, UserStatus, UserUpdate};
