//! # Text Processing Utilities
//!
//! Markup stripping for option labels and redaction of secrets before text
//! reaches the logs.

use once_cell::sync::Lazy;
use regex::Regex;

static MARKUP_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[^>]+(>|$)").expect("valid markup pattern"));

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization:\s*)([^\s,;]+(?:\s+[^\s,;]+)?)",
        r"(?i)(x-jwt-token[\s:=]+)([^\s&,;]+)",
        r"(?i)((?:[a-z0-9_]*?)(?:token|key|secret|password)=)([^\s&]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid redaction pattern"))
    .collect()
});

/// Removes markup tags, keeping their text content.
///
/// # Example
/// ```rust
/// use selectsync_util::strip_markup;
///
/// assert_eq!(strip_markup("<span><b>Alpha</b></span>"), "Alpha");
/// assert_eq!(strip_markup("plain"), "plain");
/// ```
pub fn strip_markup(input: &str) -> String {
    MARKUP_PATTERN.replace_all(input, "").into_owned()
}

/// Redacts values that look like secrets in a string.
///
/// Authorization headers, token headers and `*token=`/`*key=`-style query
/// parameters keep their name and lose their value.
///
/// # Example
/// ```rust
/// use selectsync_util::redact_sensitive;
///
/// assert_eq!(redact_sensitive("x-jwt-token: abc.def"), "x-jwt-token: [REDACTED]");
/// assert_eq!(redact_sensitive("/items?api_key=123&limit=10"), "/items?api_key=[REDACTED]&limit=10");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}[REDACTED]")
            })
            .into_owned();
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_nested_and_unclosed_tags() {
        assert_eq!(strip_markup("<span class=\"x\">A &amp; B</span>"), "A &amp; B");
        assert_eq!(strip_markup("Label <i"), "Label ");
    }

    #[test]
    fn redacts_authorization_values() {
        assert_eq!(redact_sensitive("Authorization: Bearer abc123"), "Authorization: [REDACTED]");
        assert_eq!(redact_sensitive("no secrets here"), "no secrets here");
    }
}
