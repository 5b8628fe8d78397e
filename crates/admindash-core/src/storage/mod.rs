//! Persisted key/value storage.
//!
//! This module provides:
//! - `StorageBackend`: raw string storage (`MemoryStorage`, `FileStorage`)
//! - `PersistedStore`: namespaced JSON layer that never fails its caller
//!
//! The session and theme stores write through to a `PersistedStore` on every
//! change and read it once at startup.

pub mod backend;
pub mod store;

pub use backend::{FileStorage, MemoryStorage, StorageBackend};
pub use store::PersistedStore;

/// Namespace prefix applied to every key written by the dashboard.
pub const STORAGE_PREFIX: &str = "enterprise_dashboard_";

/// Token pair, JSON `{accessToken, refreshToken}`.
pub const TOKEN_KEY: &str = "auth_tokens";

/// Full user record.
pub const USER_KEY: &str = "user_data";

/// Theme preference, `"light"` or `"dark"`.
pub const THEME_KEY: &str = "theme";
