//! Application configuration management.
//!
//! Configuration is read once from the environment at startup and is fixed for
//! the lifetime of the process:
//!
//! - `ADMINDASH_API_BASE_URL`: base URL of the real backend
//! - `ADMINDASH_ENABLE_MOCK_API`: serve every call from in-process mock data
//! - `ADMINDASH_APP_NAME`: display name
//! - `ADMINDASH_STORAGE_DIR`: where persisted storage lives (defaults to the
//!   platform data directory)

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for data directory paths
const APP_DIR: &str = "admindash";

pub const DEFAULT_API_BASE_URL: &str = "https://api.example.com/v1";

pub const DEFAULT_APP_NAME: &str = "Enterprise Dashboard";

const ENV_API_BASE_URL: &str = "ADMINDASH_API_BASE_URL";
const ENV_ENABLE_MOCK_API: &str = "ADMINDASH_ENABLE_MOCK_API";
const ENV_APP_NAME: &str = "ADMINDASH_APP_NAME";
const ENV_STORAGE_DIR: &str = "ADMINDASH_STORAGE_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub use_mock_api: bool,
    pub app_name: String,
    pub storage_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            use_mock_api: false,
            app_name: DEFAULT_APP_NAME.to_string(),
            storage_dir: None,
        }
    }
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = Self::default();
        Self {
            api_base_url: non_empty(ENV_API_BASE_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            use_mock_api: non_empty(ENV_ENABLE_MOCK_API)
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.use_mock_api),
            app_name: non_empty(ENV_APP_NAME).unwrap_or(defaults.app_name),
            storage_dir: non_empty(ENV_STORAGE_DIR).map(PathBuf::from),
        }
    }

    /// Directory holding the persisted key/value store.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_DIR))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
