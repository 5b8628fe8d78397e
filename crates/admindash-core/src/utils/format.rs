use std::cmp::Ordering;
use std::sync::LazyLock;

use icu_collator::{Collator, CollatorOptions};
use regex::Regex;
use tracing::warn;

/// local@domain.tld with no whitespace and a single `@`.
static EMAIL_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Loose email shape check.
pub fn is_valid_email(email: &str) -> bool {
    match EMAIL_REGEX.as_ref() {
        Some(re) => re.is_match(email),
        None => email.contains('@'),
    }
}

/// Case-insensitive substring test.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Case-insensitive ordering, falling back to byte order so that strings
/// differing only in case still sort deterministically.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Locale-aware string ordering using the root collation: punctuation sorts
/// before digits, digits before letters, and case only breaks ties.
/// "user1@x" therefore precedes "user10@x".
pub struct LocaleOrder {
    collator: Option<Collator>,
}

impl LocaleOrder {
    pub fn new() -> Self {
        let collator = match Collator::try_new(&Default::default(), CollatorOptions::new()) {
            Ok(collator) => Some(collator),
            Err(e) => {
                warn!(error = ?e, "Collation data unavailable, sorting case-insensitively");
                None
            }
        };
        Self { collator }
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self.collator {
            Some(ref collator) => collator.compare(a, b),
            None => cmp_ignore_case(a, b),
        }
    }
}

impl Default for LocaleOrder {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Group the integer part of a number with thousands separators.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a count with thousands separators: `1247` -> `1,247`
pub fn format_number(n: u64) -> String {
    group_thousands(&n.to_string())
}

/// Format a dollar amount with two decimals: `125430.0` -> `$125,430.00`
pub fn format_currency(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    format!("{}${}.{}", sign, group_thousands(whole), cents)
}

/// Format a percentage with the given number of decimals: `12.5` -> `12.5%`
pub fn format_percentage(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value)
}
