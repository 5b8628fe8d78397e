//! Light/dark theme preference, persisted across runs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::storage::{PersistedStore, THEME_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Theme {
    #[default]
    #[serde(rename = "light")]
    Light,
    #[serde(rename = "dark")]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

#[derive(Clone)]
pub struct ThemeStore {
    inner: Arc<Inner>,
}

struct Inner {
    theme: watch::Sender<Theme>,
    storage: PersistedStore,
}

impl ThemeStore {
    pub fn load(storage: PersistedStore) -> Self {
        let theme = storage.get::<Theme>(THEME_KEY).unwrap_or_default();
        let (tx, _rx) = watch::channel(theme);
        Self {
            inner: Arc::new(Inner { theme: tx, storage }),
        }
    }

    pub fn theme(&self) -> Theme {
        *self.inner.theme.borrow()
    }

    pub fn set_theme(&self, theme: Theme) {
        self.inner.storage.set(THEME_KEY, &theme);
        if self.inner.theme.send_replace(theme) != theme {
            debug!(theme = %theme, "Theme changed");
        }
    }

    /// Flip between light and dark, returning the new theme.
    pub fn toggle(&self) -> Theme {
        let next = self.theme().toggled();
        self.set_theme(next);
        next
    }

    pub fn subscribe(&self) -> watch::Receiver<Theme> {
        self.inner.theme.subscribe()
    }
}
