//! REST API client module for the dashboard backend.
//!
//! This module provides the `HttpClient` pipeline used by the real backend
//! implementations, the interceptors that attach credentials and react to
//! 401 responses, and `ApiError`, the one error shape every call resolves to.
//!
//! The API uses bearer token authentication; tokens are read from persisted
//! storage on every request.

pub mod client;
pub mod error;
pub mod interceptors;

pub use client::HttpClient;
pub use error::{ApiError, ErrorKind};
pub use interceptors::{BearerAuth, ErrorInterceptor, OutgoingRequest, RequestInterceptor, UnauthorizedRedirect};
