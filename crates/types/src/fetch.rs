//! Pagination cursor and the request/response pair exchanged with the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HttpMethod;

/// Search input of a sync cycle.
///
/// A scalar term filters with `<field>__regex`, a list of terms with
/// `<field>__in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchTerm {
    Text(String),
    Many(Vec<String>),
}

impl SearchTerm {
    /// Length used for minimum-search gating: characters of a text term,
    /// number of entries of a list.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Many(terms) => terms.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text substituted for the `search` template token.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Many(terms) => terms.join(","),
        }
    }

    /// Builds a search term from a committed value. Strings search as text,
    /// arrays as a list of their rendered entries, other scalars as their JSON
    /// text. Empty values produce no term.
    pub fn from_value(value: &Value) -> Option<Self> {
        let term = match value {
            Value::Null => return None,
            Value::String(text) => Self::Text(text.clone()),
            Value::Array(items) => Self::Many(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| match item {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            other => Self::Text(other.to_string()),
        };
        (!term.is_empty()).then_some(term)
    }
}

impl From<&str> for SearchTerm {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Pagination and search cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub limit: usize,
    pub skip: usize,
    pub search: Option<SearchTerm>,
}

impl FetchWindow {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            skip: 0,
            search: None,
        }
    }

    /// Starts a fresh first page for `search`.
    ///
    /// `skip` goes back to zero whenever the term changes. Returns whether the
    /// term changed.
    pub fn restart(&mut self, search: Option<SearchTerm>) -> bool {
        let changed = self.search != search;
        self.search = search;
        self.skip = 0;
        changed
    }

    /// Moves the cursor forward for an accumulating page. The cursor never
    /// moves backwards.
    pub fn advance_to(&mut self, skip: usize) {
        self.skip = self.skip.max(skip);
    }

    /// Zero-based page index, `floor(skip / limit)`.
    pub fn page(&self) -> usize {
        self.skip.checked_div(self.limit).unwrap_or(0)
    }
}

/// A fully shaped request ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Present only for methods that send a body.
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Attach the auth token when the transport has one.
    pub authenticate: bool,
}

/// Transport response.
///
/// `body` is either a bare item array or an object wrapping one; the server
/// total comes from a `serverCount` field or a `Content-Range` header when the
/// transport can see one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    pub body: Value,
    pub server_count: Option<usize>,
}

impl FetchResponse {
    pub fn new(body: Value) -> Self {
        Self { body, server_count: None }
    }

    pub fn with_server_count(mut self, server_count: usize) -> Self {
        self.server_count = Some(server_count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn restart_resets_skip_and_reports_change() {
        let mut window = FetchWindow::new(10);
        window.advance_to(20);
        assert_eq!(window.page(), 2);

        assert!(window.restart(Some("jo".into())));
        assert_eq!(window.skip, 0);
        window.advance_to(10);
        assert!(!window.restart(Some("jo".into())));
        assert_eq!(window.skip, 0);
    }

    #[test]
    fn cursor_is_monotonic() {
        let mut window = FetchWindow::new(10);
        window.advance_to(30);
        window.advance_to(10);
        assert_eq!(window.skip, 30);
    }

    #[test]
    fn page_with_zero_limit_is_zero() {
        let mut window = FetchWindow::new(0);
        window.advance_to(5);
        assert_eq!(window.page(), 0);
    }

    #[test]
    fn search_terms_from_values() {
        assert_eq!(SearchTerm::from_value(&json!("abc")), Some(SearchTerm::Text("abc".into())));
        assert_eq!(
            SearchTerm::from_value(&json!(["a", 2])),
            Some(SearchTerm::Many(vec!["a".into(), "2".into()]))
        );
        assert_eq!(SearchTerm::from_value(&json!("")), None);
        assert_eq!(SearchTerm::from_value(&json!([])), None);
        assert_eq!(SearchTerm::Many(vec!["a".into(), "b".into()]).as_text(), "a,b");
        assert_eq!(SearchTerm::Text("héllo".into()).len(), 5);
    }
}
