//! Utility functions for string formatting and comparison.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{
    cmp_ignore_case, contains_ignore_case, LocaleOrder, format_currency, format_number, format_percentage, is_valid_email, truncate,
};
