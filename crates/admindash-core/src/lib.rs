//! Admindash core library.
//!
//! Client-side data layer for the admin dashboard: authentication session,
//! dashboard metrics and the user-management listing.
//!
//! - [`storage`]: namespaced, failure-tolerant persisted key/value store
//! - [`api`]: HTTP pipeline with bearer-token and 401 interceptors, `ApiError`
//! - [`backend`]: mock and HTTP implementations behind the [`backend::Api`] facade
//! - [`auth`]: session store restored from storage at startup
//! - [`cache`]: query cache with de-duplication, freshness, retry and observers
//! - [`app`]: [`App`], the operations a front end calls

pub mod api;
pub mod app;
pub mod auth;
pub mod backend;
pub mod cache;
pub mod config;
pub mod models;
pub mod routes;
pub mod storage;
pub mod theme;
pub mod utils;

pub use api::{ApiError, ErrorKind};
pub use app::App;
pub use auth::{SessionState, SessionStore};
pub use backend::{Api, BackendKind};
pub use cache::{QueryClient, QueryKey, QueryObserver, QueryOptions, QueryState, QueryStatus};
pub use config::Config;
pub use theme::{Theme, ThemeStore};
