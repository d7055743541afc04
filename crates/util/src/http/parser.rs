//! # HTTP Utilities
//!
//! Query-string shaping for option requests and normalization of the payloads
//! option endpoints return.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::template::lookup_path;

/// Characters left unescaped in query keys and values, matching the usual
/// URI-component encoding.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Wrapper keys checked, in order, when a payload is an object rather than a
/// bare array.
const RESPONSE_ARRAY_PRIORITY_KEYS: &[&str] = &["items", "results", "data", "values", "entries", "list", "submissions"];

const SERVER_COUNT_KEY: &str = "serverCount";

/// Serializes ordered query pairs into `key=value&key=value` form.
///
/// # Example
/// ```rust
/// use selectsync_util::http::serialize_query;
///
/// let pairs = vec![("limit".to_string(), "10".to_string()), ("data.name__regex".to_string(), "jo hn".to_string())];
/// assert_eq!(serialize_query(&pairs), "limit=10&data.name__regex=jo%20hn");
/// ```
pub fn serialize_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, QUERY_COMPONENT),
                utf8_percent_encode(value, QUERY_COMPONENT)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Appends a query fragment to a URL, choosing `?` or `&` depending on
/// whether the URL already carries a query. Empty fragments are ignored.
///
/// # Example
/// ```rust
/// use selectsync_util::http::append_query;
///
/// assert_eq!(append_query("/items", "limit=10"), "/items?limit=10");
/// assert_eq!(append_query("/items?limit=10", "skip=0"), "/items?limit=10&skip=0");
/// assert_eq!(append_query("/items", ""), "/items");
/// ```
pub fn append_query(url: &str, fragment: &str) -> String {
    if fragment.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{fragment}")
}

/// Parses the total from a `Content-Range` header value such as
/// `items 0-9/25` or `0-9/25`. Unknown totals (`*`) yield `None`.
///
/// # Example
/// ```rust
/// use selectsync_util::http::parse_content_range_total;
///
/// assert_eq!(parse_content_range_total("items 0-9/25"), Some(25));
/// assert_eq!(parse_content_range_total("0-9/*"), None);
/// ```
pub fn parse_content_range_total(header_value: &str) -> Option<usize> {
    let (_, total) = header_value.trim().rsplit_once('/')?;
    total.trim().parse::<usize>().ok()
}

/// Normalizes an option payload into its item list and optional server total.
///
/// Extraction order:
/// 1. Narrow the payload with `select_values` when provided.
/// 2. Use a top-level array directly.
/// 3. Use the first array found under a well-known wrapper key.
/// 4. Fall back to the only array-valued field of a wrapper object.
///
/// The server total is read from a `serverCount` field on the top-level
/// payload, given either as a number or a numeric string. Payloads without a
/// recognizable collection produce an empty item list.
pub fn extract_collection(payload: &Value, select_values: Option<&str>) -> (Vec<Value>, Option<usize>) {
    let server_count = payload.get(SERVER_COUNT_KEY).and_then(count_from_value);

    let selected = match select_values.filter(|path| !path.is_empty()) {
        Some(path) => match lookup_path(payload, path) {
            Some(value) => value,
            None => return (Vec::new(), server_count),
        },
        None => payload,
    };

    (collection_items(selected).unwrap_or_default(), server_count)
}

fn collection_items(payload: &Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => {
            for key in RESPONSE_ARRAY_PRIORITY_KEYS {
                if let Some(Value::Array(items)) = map.get(*key) {
                    return Some(items.clone());
                }
            }

            let mut arrays = map.values().filter_map(Value::as_array);
            let first = arrays.next()?;
            if arrays.next().is_none() {
                return Some(first.clone());
            }
            None
        }
        _ => None,
    }
}

fn count_from_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|count| *count >= 0.0).map(|count| count as u64))
            .and_then(|count| usize::try_from(count).ok()),
        Value::String(text) => text.trim().parse::<usize>().ok(),
        _ => None,
    }
}

/// Parse HTTP response text into JSON, providing detailed errors on failure.
///
/// Any parse error is decorated with the originating HTTP status code and a
/// truncated preview of the response body.
pub fn parse_response_json_strict(text: &str, status: Option<StatusCode>) -> Result<Value, JsonParseError> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        let preview = truncate_response_preview(text, 200);

        JsonParseError::new(status_note, error, preview)
    })
}

fn truncate_response_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}

/// Error returned when strict JSON parsing of an HTTP response fails.
#[derive(Debug, Error)]
#[error("failed to parse JSON response ({status_note}): {source}. body preview: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    /// Truncated response preview captured during parsing.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_query_encodes_reserved_characters() {
        let pairs = vec![
            ("select".to_string(), "data.name,data.email".to_string()),
            ("sort".to_string(), "-created".to_string()),
        ];
        assert_eq!(serialize_query(&pairs), "select=data.name%2Cdata.email&sort=-created");
        assert_eq!(serialize_query(&[]), "");
    }

    #[test]
    fn extract_collection_prefers_bare_arrays_and_wrapper_keys() {
        let (items, count) = extract_collection(&json!([1, 2]), None);
        assert_eq!(items, vec![json!(1), json!(2)]);
        assert_eq!(count, None);

        let (items, count) = extract_collection(&json!({ "items": [1], "other": [2], "serverCount": 25 }), None);
        assert_eq!(items, vec![json!(1)]);
        assert_eq!(count, Some(25));

        let (items, _) = extract_collection(&json!({ "rows": [3] }), None);
        assert_eq!(items, vec![json!(3)]);
    }

    #[test]
    fn extract_collection_uses_select_values_path() {
        let payload = json!({ "response": { "countries": [ { "code": "NL" } ] }, "serverCount": "7" });
        let (items, count) = extract_collection(&payload, Some("response.countries"));
        assert_eq!(items, vec![json!({ "code": "NL" })]);
        assert_eq!(count, Some(7));

        let (items, _) = extract_collection(&payload, Some("response.missing"));
        assert!(items.is_empty());
    }

    #[test]
    fn ambiguous_or_scalar_payloads_are_empty() {
        let (items, _) = extract_collection(&json!({ "a": [1], "b": [2] }), None);
        assert!(items.is_empty());
        let (items, _) = extract_collection(&json!("text"), None);
        assert!(items.is_empty());
    }

    #[test]
    fn strict_parse_reports_status_and_preview() {
        let error = parse_response_json_strict("not\njson", Some(StatusCode::OK)).expect_err("parse error");
        assert_eq!(error.body_preview(), "not json");
        assert!(error.to_string().contains("status 200 OK"));
    }
}
