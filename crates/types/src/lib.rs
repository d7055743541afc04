//! Shared data model for select-field option synchronization.
//!
//! - `option`: [`SelectOption`] and the uniqueness rule used to match values
//! - `config`: serde model of a field's configuration and data source
//! - `fetch`: pagination window, search terms and transport request/response

pub mod config;
pub mod fetch;
pub mod option;

pub use config::{
    DEFAULT_LIMIT, DEFAULT_SEARCH_DEBOUNCE_MS, DataSourceConfig, FieldConfig, HeaderSpec, HttpMethod, SourceKind, UrlSource,
};
pub use fetch::{FetchRequest, FetchResponse, FetchWindow, SearchTerm};
pub use option::{ID_FIELD, SelectOption, deep_equal, is_empty_value, values_match};
