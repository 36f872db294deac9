//! Token value generation and format validation (spec §4.4).
//!
//! New tokens are `<prefix><32 lowercase alphanumerics>`. Tokens issued
//! before a prefix existed are still accepted: any 32+ character run of
//! mixed-case alphanumerics validates under the legacy pattern.

use std::sync::LazyLock;

use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;

const SUFFIX_LEN: usize = 32;
const PREVIEW_LEN: usize = 12;

static LEGACY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{32,}$").expect("legacy token pattern is valid"));

static PREFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{3,20}$").expect("prefix pattern is valid"));

/// Generate a new `<prefix><32 lowercase alphanumerics>` token value.
#[must_use]
pub fn generate(prefix: &str) -> String {
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), SUFFIX_LEN).to_lowercase();
    format!("{prefix}{suffix}")
}

/// Whether `prefix` is a legal `SystemSetting(token_prefix)` value: 3-20
/// alphanumeric-or-underscore characters.
#[must_use]
pub fn is_valid_prefix(prefix: &str) -> bool {
    PREFIX_PATTERN.is_match(prefix)
}

/// Whether `value` matches either the current-prefix format or the legacy
/// unprefixed format.
#[must_use]
pub fn is_valid_format(value: &str, prefix: &str) -> bool {
    if let Some(suffix) = value.strip_prefix(prefix) {
        if suffix.len() == SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return true;
        }
    }
    LEGACY_PATTERN.is_match(value)
}

/// First 12 characters of a token value, safe to log or display.
#[must_use]
pub fn preview(value: &str) -> String {
    value.chars().take(PREVIEW_LEN).collect()
}
