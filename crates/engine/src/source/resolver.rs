//! Turns a data-source configuration and a fetch window into either a ready
//! item list or a shaped request for the transport.

use std::sync::Arc;

use selectsync_types::{DataSourceConfig, FetchRequest, FetchWindow, FieldConfig, HeaderSpec, HttpMethod, SearchTerm, UrlSource};
use selectsync_util::http::{append_query, extract_collection, serialize_query};
use selectsync_util::interpolate_value;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::custom::{CustomEvaluator, ScriptEvaluator};
use crate::{FieldHost, SelectError};

/// Outcome of resolving a data source.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Items available without network access.
    Items(Vec<Value>),
    /// A request the transport must execute.
    Fetch(FetchRequest),
}

/// Resolves the configured source kind into items or a request.
#[derive(Clone)]
pub struct SourceResolver {
    evaluator: Arc<dyn CustomEvaluator>,
}

impl std::fmt::Debug for SourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceResolver").finish_non_exhaustive()
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new(Arc::new(ScriptEvaluator))
    }
}

impl SourceResolver {
    pub fn new(evaluator: Arc<dyn CustomEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Resolves `config` for the given window.
    ///
    /// Local kinds return their items directly. Remote kinds return a request,
    /// except below the minimum search length where they resolve to an empty
    /// list without touching the network.
    ///
    /// # Errors
    /// [`SelectError::Configuration`] when a remote source lacks its resource
    /// or URL, [`SelectError::Evaluation`] when a custom script fails.
    /// Malformed inline JSON is not an error: it is logged and yields no items.
    pub fn resolve(&self, config: &FieldConfig, window: &FetchWindow, host: &dyn FieldHost) -> Result<Resolution, SelectError> {
        let select_values = config.select_values.as_deref();
        match &config.source {
            DataSourceConfig::Values { values } => Ok(Resolution::Items(values.clone())),
            DataSourceConfig::Json { json } => Ok(Resolution::Items(json_items(&config.key, json, select_values))),
            DataSourceConfig::Custom { custom } => {
                let items = self.custom_items(custom, host)?;
                Ok(Resolution::Items(narrow_items(items, select_values)))
            }
            DataSourceConfig::Resource { resource, headers } => {
                if resource.trim().is_empty() {
                    return Err(SelectError::Configuration(format!("field '{}' has no resource configured", config.key)));
                }
                if below_min_search(config, window) {
                    debug!(field = %config.key, min_search = config.min_search, "search below minimum length, skipping request");
                    return Ok(Resolution::Items(Vec::new()));
                }
                let base = host.project_url().unwrap_or_else(|| host.base_url());
                let url = format!("{base}/form/{resource}/submission");
                Ok(Resolution::Fetch(remote_request(
                    config,
                    window,
                    host,
                    RemoteTarget {
                        url,
                        method: HttpMethod::Get,
                        body: None,
                        headers,
                        paginate: true,
                        authenticate: true,
                    },
                )))
            }
            DataSourceConfig::Url(UrlSource {
                url,
                method,
                body,
                headers,
            }) => {
                if url.trim().is_empty() {
                    return Err(SelectError::Configuration(format!("field '{}' has no url configured", config.key)));
                }
                if below_min_search(config, window) {
                    debug!(field = %config.key, min_search = config.min_search, "search below minimum length, skipping request");
                    return Ok(Resolution::Items(Vec::new()));
                }
                let url = if url.starts_with('/') {
                    let base = host.project_url().unwrap_or_else(|| host.base_url());
                    format!("{base}{url}")
                } else {
                    url.clone()
                };
                Ok(Resolution::Fetch(remote_request(
                    config,
                    window,
                    host,
                    RemoteTarget {
                        url,
                        method: *method,
                        body: body.as_ref().filter(|_| method.sends_body()),
                        headers,
                        paginate: false,
                        authenticate: config.authenticate,
                    },
                )))
            }
        }
    }

    /// Items computed by the custom script, without narrowing.
    pub fn custom_items(&self, script: &str, host: &dyn FieldHost) -> Result<Vec<Value>, SelectError> {
        let context = json!({ "values": [], "data": host.form_data() });
        self.evaluator.evaluate(script, &context)
    }
}

struct RemoteTarget<'a> {
    url: String,
    method: HttpMethod,
    body: Option<&'a Value>,
    headers: &'a [HeaderSpec],
    paginate: bool,
    authenticate: bool,
}

fn remote_request(config: &FieldConfig, window: &FetchWindow, host: &dyn FieldHost, target: RemoteTarget<'_>) -> FetchRequest {
    let tokens = template_tokens(window, host);

    let mut query: Vec<(String, String)> = Vec::new();
    if target.paginate {
        query.push(("limit".into(), window.limit.to_string()));
        query.push(("skip".into(), window.skip.to_string()));
    }
    if let Some(field) = config.search_field()
        && let Some(search) = window.search.as_ref().filter(|search| !search.is_empty())
    {
        match search {
            SearchTerm::Many(terms) => query.push((format!("{field}__in"), terms.join(","))),
            SearchTerm::Text(text) => query.push((format!("{field}__regex"), text.clone())),
        }
    }
    if let Some(select) = config.select_fields.as_deref().filter(|select| !select.is_empty()) {
        query.push(("select".into(), host.interpolate(select, &tokens)));
    }
    if let Some(sort) = config.sort.as_deref().filter(|sort| !sort.is_empty()) {
        query.push(("sort".into(), host.interpolate(sort, &tokens)));
    }

    let mut url = append_query(&host.interpolate(&target.url, &tokens), &serialize_query(&query));
    if let Some(filter) = config.filter.as_deref().filter(|filter| !filter.is_empty()) {
        url = append_query(&url, &host.interpolate(filter, &tokens));
    }

    let headers = target
        .headers
        .iter()
        .filter(|header| !header.key.trim().is_empty())
        .map(|header| (header.key.clone(), host.interpolate(&header.value, &tokens)))
        .collect();

    FetchRequest {
        method: target.method,
        url,
        body: target.body.map(|body| interpolate_value(body, &tokens)),
        headers,
        authenticate: target.authenticate,
    }
}

/// Context for `{{ }}` substitution in URLs, query values, filters, headers
/// and bodies.
fn template_tokens(window: &FetchWindow, host: &dyn FieldHost) -> Value {
    let search = match window.search.as_ref() {
        Some(SearchTerm::Text(text)) => Value::String(text.clone()),
        Some(SearchTerm::Many(terms)) => Value::Array(terms.iter().cloned().map(Value::String).collect()),
        None => Value::Null,
    };
    json!({
        "formioBase": host.base_url(),
        "search": search,
        "limit": window.limit,
        "skip": window.skip,
        "page": window.page(),
        "data": host.form_data(),
    })
}

/// Only fields with a dedicated search field are gated; without one no
/// search term can ever arrive.
fn below_min_search(config: &FieldConfig, window: &FetchWindow) -> bool {
    config.search_field().is_some() && config.min_search > 0 && window.search.as_ref().map_or(0, SearchTerm::len) < config.min_search
}

fn json_items(key: &str, json: &Value, select_values: Option<&str>) -> Vec<Value> {
    let parsed;
    let payload = match json {
        Value::String(text) if text.trim().is_empty() => return Vec::new(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(error) => {
                warn!(field = %key, error = %error, "inline JSON options failed to parse");
                return Vec::new();
            }
        },
        other => other,
    };
    extract_collection(payload, select_values).0
}

fn narrow_items(items: Vec<Value>, select_values: Option<&str>) -> Vec<Value> {
    match select_values.filter(|path| !path.is_empty()) {
        Some(path) => extract_collection(&Value::Array(items), Some(path)).0,
        None => items,
    }
}
