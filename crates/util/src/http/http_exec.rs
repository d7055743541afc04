//! HTTP execution of shaped option requests.
//!
//! Sends a [`FetchRequest`] through an [`ApiClient`], checks the status and
//! parses the JSON body. The server total is lifted from a `Content-Range`
//! header when the endpoint provides one.

use std::time::Instant;

use reqwest::{Method, header};
use selectsync_api::ApiClient;
use selectsync_types::{FetchRequest, FetchResponse};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::parser::{JsonParseError, parse_content_range_total, parse_response_json_strict};
use crate::redact_sensitive;

/// Failure of a single option request.
#[derive(Debug, Error)]
pub enum HttpExecError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status}: {body_preview}")]
    Status { status: u16, body_preview: String },
    #[error(transparent)]
    Parse(#[from] JsonParseError),
}

/// Execute an option request and parse the response payload.
///
/// Empty bodies parse to `null`. Non-success statuses become
/// [`HttpExecError::Status`] with a redacted, truncated body preview.
pub async fn send_option_request(client: &ApiClient, request: &FetchRequest) -> Result<FetchResponse, HttpExecError> {
    let start = Instant::now();
    let method = to_reqwest_method(request);
    let url = redact_sensitive(&request.url);
    debug!(
        method = %method,
        url = %url,
        header_count = request.headers.len(),
        has_body = request.body.is_some(),
        authenticate = request.authenticate,
        "option request started"
    );

    let mut builder = client.request(method.clone(), &request.url, request.authenticate);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body.as_ref() {
        builder = builder.json(body);
    }

    let response = builder.send().await.inspect_err(|error| {
        warn!(
            method = %method,
            url = %url,
            error = %redact_sensitive(&error.to_string()),
            duration_ms = start.elapsed().as_millis(),
            "option request failed"
        );
    })?;

    let status = response.status();
    let range_total = response
        .headers()
        .get(header::CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_range_total);
    let body_text = response.text().await?;

    if !status.is_success() {
        let body_preview = redact_sensitive(&preview(&body_text, 160));
        warn!(
            method = %method,
            url = %url,
            status = %status,
            duration_ms = start.elapsed().as_millis(),
            "option request returned error status"
        );
        return Err(HttpExecError::Status {
            status: status.as_u16(),
            body_preview,
        });
    }

    let body = if body_text.trim().is_empty() {
        Value::Null
    } else {
        parse_response_json_strict(&body_text, Some(status)).inspect_err(|error| {
            warn!(
                method = %method,
                url = %url,
                status = %status,
                body_len = body_text.len(),
                error = %error,
                "option response JSON parse failed"
            );
        })?
    };

    debug!(
        method = %method,
        url = %url,
        status = %status,
        range_total = ?range_total,
        duration_ms = start.elapsed().as_millis(),
        "option request completed"
    );

    Ok(FetchResponse {
        body,
        server_count: range_total,
    })
}

fn to_reqwest_method(request: &FetchRequest) -> Method {
    Method::from_bytes(request.method.as_str().as_bytes()).unwrap_or(Method::GET)
}

fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", truncated.trim_end())
}
