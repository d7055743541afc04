//! Field configuration model.
//!
//! The shape mirrors the select-field schema used by form definitions: the
//! data source is an adjacently tagged enum (`dataSrc` + `data`), the remaining
//! options sit next to it in camelCase.
//!
//! ```yaml
//! key: customer
//! lazyLoad: true
//! searchField: data.name
//! minSearch: 2
//! source:
//!   dataSrc: resource
//!   data:
//!     resource: customers
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default page size for paginated sources.
pub const DEFAULT_LIMIT: usize = 100;

/// Default search coalescing window in milliseconds.
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 100;

/// Complete configuration for one select field instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    /// Field key, used to identify the field in logs and error events.
    pub key: String,
    /// Strategy used to obtain options.
    pub source: DataSourceConfig,
    /// Defer the first remote fetch until the field is activated.
    #[serde(default = "default_true")]
    pub lazy_load: bool,
    /// Page size for `resource` and `url` sources.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Server-side field used for search filtering.
    #[serde(default)]
    pub search_field: Option<String>,
    /// Minimum search term length before remote sources are queried.
    #[serde(default)]
    pub min_search: usize,
    /// Field projection forwarded as the `select` query parameter.
    #[serde(default)]
    pub select_fields: Option<String>,
    /// Sort expression forwarded as the `sort` query parameter.
    #[serde(default)]
    pub sort: Option<String>,
    /// Free-form filter string appended to the request URL.
    #[serde(default)]
    pub filter: Option<String>,
    /// Value is a sequence of selections.
    #[serde(default)]
    pub multiple: bool,
    /// Reset the value to empty before re-synchronizing on refresh.
    #[serde(default)]
    pub clear_on_refresh: bool,
    /// Include the auth token on url-sourced requests.
    #[serde(default)]
    pub authenticate: bool,
    /// Dot path extracting the option value from an object item.
    #[serde(default)]
    pub value_property: Option<String>,
    /// Dot path narrowing fetched payloads to their item array.
    #[serde(default)]
    pub select_values: Option<String>,
    /// Label template interpolated against `{ item }`.
    #[serde(default)]
    pub template: Option<String>,
    /// Empty-placeholder text shown by the widget when nothing is selected.
    #[serde(default)]
    pub placeholder: Option<String>,
    /// In read-only mode show the raw extracted value instead of the template.
    #[serde(default)]
    pub read_only_value: bool,
    /// Value committed after the first load when the field has no value.
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Search coalescing window.
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_search_debounce_ms() -> u64 {
    DEFAULT_SEARCH_DEBOUNCE_MS
}

impl FieldConfig {
    /// Configuration with default options for the given key and source.
    pub fn new(key: impl Into<String>, source: DataSourceConfig) -> Self {
        Self {
            key: key.into(),
            source,
            lazy_load: true,
            limit: DEFAULT_LIMIT,
            search_field: None,
            min_search: 0,
            select_fields: None,
            sort: None,
            filter: None,
            multiple: false,
            clear_on_refresh: false,
            authenticate: false,
            value_property: None,
            select_values: None,
            template: None,
            placeholder: None,
            read_only_value: false,
            default_value: None,
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
        }
    }

    /// Value property in effect for the configured source.
    ///
    /// Static `values` lists always extract `value`.
    pub fn effective_value_property(&self) -> Option<&str> {
        match self.source {
            DataSourceConfig::Values { .. } => Some("value"),
            _ => self.value_property.as_deref().filter(|path| !path.is_empty()),
        }
    }

    /// Search field, ignoring empty strings.
    pub fn search_field(&self) -> Option<&str> {
        self.search_field.as_deref().filter(|field| !field.is_empty())
    }
}

/// Where the options of a field come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataSrc", content = "data", rename_all = "lowercase")]
pub enum DataSourceConfig {
    /// Inline list of `{ value, label }` items.
    Values {
        #[serde(default)]
        values: Vec<Value>,
    },
    /// JSON given either as an encoded string or as structured data.
    Json {
        #[serde(default)]
        json: Value,
    },
    /// Script computing the items.
    Custom {
        #[serde(default)]
        custom: String,
    },
    /// Named resource collection served by the project.
    Resource {
        #[serde(default)]
        resource: String,
        #[serde(default)]
        headers: Vec<HeaderSpec>,
    },
    /// Arbitrary URL.
    Url(UrlSource),
}

impl DataSourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Values { .. } => SourceKind::Values,
            Self::Json { .. } => SourceKind::Json,
            Self::Custom { .. } => SourceKind::Custom,
            Self::Resource { .. } => SourceKind::Resource,
            Self::Url(_) => SourceKind::Url,
        }
    }
}

/// Discriminant of [`DataSourceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Values,
    Json,
    Custom,
    Resource,
    Url,
}

impl SourceKind {
    /// Remote kinds are fetched over the network, support server-side search
    /// and wait for activation when lazy loading is on.
    pub fn is_remote(self) -> bool {
        matches!(self, Self::Resource | Self::Url)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Values => "values",
            Self::Json => "json",
            Self::Custom => "custom",
            Self::Resource => "resource",
            Self::Url => "url",
        };
        f.write_str(name)
    }
}

/// Parameters of a `url` data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlSource {
    /// Absolute URL, or a path starting with `/` resolved against the project URL.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Body template, sent for POST only.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: Vec<HeaderSpec>,
}

/// One configured request header; the value is a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSpec {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// HTTP method of a url data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Only POST requests carry the configured body.
    pub fn sends_body(self) -> bool {
        matches!(self, Self::Post)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
