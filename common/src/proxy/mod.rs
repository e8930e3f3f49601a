//! Transparent pass-through to the downstream retrieval service.

use std::time::Duration;

use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use reqwest::{
    header::{HeaderMap, HeaderName},
    Method, StatusCode,
};
use tracing::{debug, warn};
use url::Url;

use crate::{error::AppError, utils::config::AppConfig};

/// Path fragments whose POST requests answer with a long-lived byte stream.
pub const STREAMING_PATHS: [&str; 3] = ["query/stream", "api/generate", "api/chat"];

const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "host",
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path below the downstream base URL, without a leading slash.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct ProxyStream {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, Result<Bytes, AppError>>,
}

fn is_false_flag(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(flag) => !flag,
        serde_json::Value::String(flag) => flag.trim().eq_ignore_ascii_case("false"),
        _ => false,
    }
}

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with("proxy-") || HOP_BY_HOP_HEADERS.contains(&name)
}

fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn unreachable_error(target: &str, err: &reqwest::Error) -> AppError {
    let reason = if err.is_timeout() {
        "timed out"
    } else {
        "is unreachable"
    };
    AppError::Gateway {
        status: None,
        message: format!("Downstream service at {target} {reason}: {err}"),
    }
}

fn relayable(status: StatusCode) -> Option<u16> {
    (status.is_client_error() || status.is_server_error()).then(|| status.as_u16())
}

/// Forwards requests to the configured base URL and relays the answer unmodified.
#[derive(Clone)]
pub struct ProxyDispatcher {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: String,
}

impl ProxyDispatcher {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        stream_timeout: Duration,
    ) -> Result<Self, AppError> {
        let parsed = Url::parse(base_url).map_err(|e| {
            AppError::Validation(format!("Invalid downstream base URL '{base_url}': {e}"))
        })?;

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            stream_client: reqwest::Client::builder().timeout(stream_timeout).build()?,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            &config.lightrag_api_url,
            Duration::from_secs(config.lightrag_timeout),
            Duration::from_secs(config.lightrag_stream_timeout),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins the base URL with the raw path suffix and query string.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let mut target = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    /// POSTs to a streaming path stream unless the JSON body sets `"stream"` to `false`
    /// (as a boolean or the string `"false"`).
    pub fn is_streaming_request(request: &ProxyRequest) -> bool {
        if request.method != Method::POST {
            return false;
        }
        if !STREAMING_PATHS
            .iter()
            .any(|fragment| request.path.contains(fragment))
        {
            return false;
        }

        match serde_json::from_slice::<serde_json::Value>(&request.body) {
            Ok(serde_json::Value::Object(body)) => !body.get("stream").is_some_and(is_false_flag),
            _ => true,
        }
    }

    async fn send(
        &self,
        client: &reqwest::Client,
        request: ProxyRequest,
    ) -> Result<(String, reqwest::Response), AppError> {
        let target = self.target_url(&request.path, request.query.as_deref());
        debug!(method = %request.method, url = %target, "Forwarding request downstream");

        let mut builder = client
            .request(request.method, &target)
            .headers(end_to_end_headers(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        match builder.send().await {
            Ok(response) => Ok((target, response)),
            Err(err) => {
                warn!(url = %target, error = %err, "Downstream request failed");
                Err(unreachable_error(&target, &err))
            }
        }
    }

    pub async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, AppError> {
        let (target, response) = self.send(&self.client, request).await?;
        let status = response.status();
        let headers = end_to_end_headers(response.headers());

        let body = response.bytes().await.map_err(|err| {
            warn!(url = %target, %status, error = %err, "Failed to read downstream body");
            AppError::Gateway {
                status: relayable(status),
                message: format!("Failed to read response from {target}: {err}"),
            }
        })?;

        debug!(url = %target, %status, bytes = body.len(), "Downstream responded");
        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }

    pub async fn forward_stream(&self, request: ProxyRequest) -> Result<ProxyStream, AppError> {
        let (target, response) = self.send(&self.stream_client, request).await?;
        let status = response.status();
        let headers = end_to_end_headers(response.headers());

        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|err| AppError::Gateway {
                    status: relayable(status),
                    message: format!("Stream from {target} interrupted: {err}"),
                })
            })
            .boxed();

        Ok(ProxyStream {
            status,
            headers,
            body,
        })
    }
}
