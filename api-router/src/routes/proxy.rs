use axum::{
    body::{Body, Bytes},
    extract::{RawQuery, State},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use common::proxy::{ProxyDispatcher, ProxyRequest};
use tracing::debug;

use crate::{api_state::ApiState, error::ApiError};

const PROXY_PREFIX: &str = "/lightrag/";

/// Path below the proxy prefix, still percent-encoded as the client sent it.
fn downstream_path(uri: &Uri) -> Option<&str> {
    uri.path().strip_prefix(PROXY_PREFIX)
}

/// Relays any request under the proxy prefix to the downstream service unchanged.
pub async fn proxy(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let path = downstream_path(&uri)
        .ok_or_else(|| ApiError::NotFound(format!("No proxy route for '{}'", uri.path())))?
        .to_string();

    let request = ProxyRequest {
        method,
        path,
        query,
        headers,
        body,
    };
    debug!(method = %request.method, path = %request.path, "proxying request");

    if ProxyDispatcher::is_streaming_request(&request) {
        let stream = state.proxy.forward_stream(request).await?;
        return Ok((stream.status, stream.headers, Body::from_stream(stream.body)).into_response());
    }

    let response = state.proxy.forward(request).await?;
    Ok((response.status, response.headers, response.body).into_response())
}
