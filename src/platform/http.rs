//! JSON fetch primitive backed by `reqwest`

use std::time::Duration;

use serde_json::Value;

use crate::error::{PassportError, Result};
use crate::platform::JsonFetcher;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`JsonFetcher`] over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    http: reqwest::Client,
}

impl ReqwestFetcher {
    /// Create a fetcher with its own client
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Create a fetcher over an existing client
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl JsonFetcher for ReqwestFetcher {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| PassportError::Transport {
                error: "request_error".to_string(),
                description: format!("HTTP error. Unable to fetch {}: {}", url, e),
            })?;

        let status = resp.status();
        // Error bodies are not always JSON; fall back to an empty object.
        let payload: Value = resp
            .json()
            .await
            .unwrap_or_else(|_| Value::Object(Default::default()));

        split_error_fields(url, status.is_success(), payload)
    }
}

/// Separate the OAuth error fields from a response body
///
/// On failure the `error` and `error_description` fields become a
/// [`PassportError::Transport`]; on success they are stripped and the rest
/// of the body is returned.
pub(crate) fn split_error_fields(url: &str, ok: bool, payload: Value) -> Result<Value> {
    let mut object = match payload {
        Value::Object(map) => map,
        other if ok => return Ok(other),
        _ => Default::default(),
    };

    let error = object.remove("error");
    let description = object.remove("error_description");

    if !ok {
        let description = description
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("HTTP error. Unable to fetch {}", url));
        let error = error
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "request_error".to_string());
        return Err(PassportError::Transport { error, description }.into());
    }

    Ok(Value::Object(object))
}
