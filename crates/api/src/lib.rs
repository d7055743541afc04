//! HTTP client construction for option sources.
//!
//! This crate provides the transport-side collaborators the engine relies on:
//!
//! - Base service URL and base project URL resolution
//! - Auth token discovery from `SELECTSYNC_TOKEN`
//! - Validation of configured base URLs
//! - Request building with consistent User-Agent and Accept headers
//!
//! The primary entry point is [`ApiClient`]. Create one with
//! [`ApiClient::new_from_env`] (or [`ApiClient::new`] with explicit
//! [`ClientSettings`]) and build requests with [`ApiClient::request`].
//!
//! # Example
//!
//! ```ignore
//! use selectsync_api::ApiClient;
//!
//! let client = ApiClient::new_from_env()?;
//! let response = client
//!     .request(reqwest::Method::GET, "/form/customers/submission", true)
//!     .send()
//!     .await?;
//! println!("status: {}", response.status());
//! ```

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, Url, header};
use tracing::debug;

/// Environment variable holding the base service URL.
pub const BASE_URL_ENV: &str = "SELECTSYNC_BASE_URL";
/// Environment variable holding the base project URL.
pub const PROJECT_URL_ENV: &str = "SELECTSYNC_PROJECT_URL";
/// Environment variable holding the auth token.
pub const TOKEN_ENV: &str = "SELECTSYNC_TOKEN";
/// Base service URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";
/// Header carrying the auth token on authenticated requests.
pub const TOKEN_HEADER: &str = "x-jwt-token";

/// Hostnames allowed to use plain http.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Explicit client configuration.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Base service URL.
    pub base_url: String,
    /// Base project URL; relative option URLs and resources prefer it.
    pub project_url: Option<String>,
    /// Auth token attached to authenticated requests.
    pub token: Option<String>,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            project_url: None,
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientSettings {
    /// Reads settings from `SELECTSYNC_BASE_URL`, `SELECTSYNC_PROJECT_URL`
    /// and `SELECTSYNC_TOKEN`. Empty variables count as unset.
    pub fn from_env() -> Self {
        let non_empty = |name: &str| env::var(name).ok().filter(|value| !value.trim().is_empty());
        Self {
            base_url: non_empty(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            project_url: non_empty(PROJECT_URL_ENV),
            token: non_empty(TOKEN_ENV),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client`.
///
/// Relative URLs are resolved against the project URL when one is configured
/// and against the base URL otherwise. The auth token is only attached to
/// requests that ask for it.
pub struct ApiClient {
    base_url: String,
    project_url: Option<String>,
    token: Option<String>,
    pub http: Client,
    pub user_agent: String,
}

impl ApiClient {
    /// Builds a client from explicit settings, validating both URLs.
    pub fn new(settings: ClientSettings) -> Result<Self> {
        validate_base_url(BASE_URL_ENV, &settings.base_url)?;
        if let Some(project_url) = settings.project_url.as_deref() {
            validate_base_url(PROJECT_URL_ENV, project_url)?;
        }

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(settings.timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            project_url: settings.project_url.map(|url| url.trim_end_matches('/').to_string()),
            token: settings.token,
            http,
            user_agent: format!("selectsync/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    /// Builds a client from the environment (see [`ClientSettings::from_env`]).
    pub fn new_from_env() -> Result<Self> {
        Self::new(ClientSettings::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn project_url(&self) -> Option<&str> {
        self.project_url.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Resolves `url` into an absolute URL.
    ///
    /// Absolute URLs pass through. Paths starting with `/` are prefixed with
    /// the project URL, or the base URL when no project URL is configured.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            let base = self.project_url.as_deref().unwrap_or(&self.base_url);
            return format!("{base}{url}");
        }
        url.to_string()
    }

    /// Build a `reqwest::RequestBuilder` for a method and URL.
    ///
    /// The token header is attached only when `authenticate` is set and a
    /// token is configured.
    pub fn request(&self, method: reqwest::Method, url: &str, authenticate: bool) -> RequestBuilder {
        let url = self.resolve_url(url);
        debug!(%url, %method, authenticate, "building request");

        let mut builder = self.http.request(method, url).header(header::USER_AGENT, &self.user_agent);
        if authenticate && let Some(token) = self.token.as_deref() {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder
    }
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS
fn validate_base_url(variable: &str, base: &str) -> Result<()> {
    let parsed_base_url = Url::parse(base).map_err(|e| anyhow!("Invalid {} URL '{}': {}", variable, base, e))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| anyhow!("{} must include a host", variable))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(anyhow!(
            "{} must use https for non-localhost hosts; got '{}://'",
            variable,
            parsed_base_url.scheme()
        ));
    }

    Ok(())
}
