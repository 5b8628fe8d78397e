//! Authentication state.
//!
//! This module provides:
//! - `SessionStore`: current user and token pair, persisted on every change
//! - `SessionState`: the two observable states, `Anonymous` and `Authenticated`
//!
//! The session is restored from persisted storage at startup and cleared on
//! logout or when the backend answers 401.

pub mod session;

pub use session::{SessionState, SessionStore};
