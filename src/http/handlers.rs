//! Request handlers for the /proxy endpoints.

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use url::Url;

use crate::http::server::AppState;
use crate::proxy::{ProxyError, ProxyRequest, ProxyResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    url: String,
    #[serde(default)]
    no_cache: bool,
    timeout: Option<u64>,
}

/// `GET /proxy/fetch?url=&noCache=&timeout=`
pub async fn fetch(
    State(state): State<AppState>,
    Query(params): Query<FetchParams>,
) -> Response {
    let url = match parse_url(&params.url) {
        Ok(url) => url,
        Err(error) => return error.into_response(),
    };

    let mut request = ProxyRequest::get(url);
    request.no_cache = params.no_cache;
    request.timeout_ms = params.timeout;

    match state.service.fetch_cached(request).await {
        Ok(result) => proxied_response(result),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InvalidateBody {
    url: Option<String>,
}

/// `POST /proxy/invalidate` — body `{url?}`; omitting `url` clears all.
pub async fn invalidate(
    State(state): State<AppState>,
    body: Option<Json<InvalidateBody>>,
) -> Response {
    let Json(body) = body.unwrap_or_default();
    let url = match body.url.as_deref().map(parse_url).transpose() {
        Ok(url) => url,
        Err(error) => return error.into_response(),
    };

    let cleared = state.service.invalidate(url.as_ref());
    tracing::info!(cleared, targeted = url.is_some(), "Cache invalidated");
    Json(json!({ "success": true, "cleared": cleared })).into_response()
}

/// `GET /proxy/health`
pub async fn health(State(state): State<AppState>) -> Response {
    let report = state.service.health();
    Json(json!({
        "success": true,
        "status": "ok",
        "cache": report.cache,
        "circuitBreaker": report.circuit_breaker,
    }))
    .into_response()
}

/// `GET /proxy/stats` — health plus per-origin circuit detail.
pub async fn stats(State(state): State<AppState>) -> Response {
    let report = state.service.stats();
    Json(json!({
        "success": true,
        "status": "ok",
        "cache": report.cache,
        "circuitBreaker": report.circuit_breaker,
        "circuits": report.circuits,
    }))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct CircuitResetBody {
    origin: Option<String>,
}

/// `POST /proxy/circuit/reset` — body `{origin?}`; omitting resets all.
pub async fn circuit_reset(
    State(state): State<AppState>,
    body: Option<Json<CircuitResetBody>>,
) -> Response {
    let Json(body) = body.unwrap_or_default();
    state.service.reset_circuit(body.origin.as_deref());
    Json(json!({ "success": true })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    url: String,
    method: Option<String>,
    headers: Option<HashMap<String, String>>,
    body: Option<serde_json::Value>,
    timeout: Option<u64>,
    retries: Option<u32>,
}

/// `POST /proxy/execute` — one-off pass-through call, never cached.
pub async fn execute(State(state): State<AppState>, Json(body): Json<ExecuteBody>) -> Response {
    let request = match build_execute_request(body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };

    match state.service.execute(request).await {
        Ok(result) => {
            let decoded = decode_body(&result);
            Json(json!({
                "success": true,
                "status": result.status,
                "statusText": result.status_text,
                "body": decoded,
                "duration": result.duration_ms,
                "circuitState": result.circuit_state,
                "attempts": result.attempts,
            }))
            .into_response()
        }
        Err(error) => error.into_response(),
    }
}

fn build_execute_request(body: ExecuteBody) -> Result<ProxyRequest, ProxyError> {
    let url = parse_url(&body.url)?;

    let method = match body.method.as_deref() {
        None => Method::GET,
        Some(m) => Method::from_str(&m.to_uppercase())
            .map_err(|_| ProxyError::validation(format!("invalid HTTP method {m:?}")))?,
    };

    let mut headers = Vec::new();
    if let Some(map) = body.headers {
        for (name, value) in map {
            HeaderName::from_str(&name)
                .map_err(|_| ProxyError::validation(format!("invalid header name {name:?}")))?;
            HeaderValue::from_str(&value)
                .map_err(|_| ProxyError::validation(format!("invalid value for header {name:?}")))?;
            headers.push((name, value));
        }
    }

    let payload = match body.body {
        None => None,
        Some(value) => {
            let has_content_type = headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                headers.push(("content-type".to_string(), "application/json".to_string()));
            }
            let bytes = serde_json::to_vec(&value)
                .map_err(|e| ProxyError::validation(format!("unserializable body: {e}")))?;
            Some(Bytes::from(bytes))
        }
    };

    Ok(ProxyRequest {
        url,
        method,
        headers,
        body: payload,
        timeout_ms: body.timeout,
        max_retries: body.retries,
        no_cache: true,
    })
}

fn parse_url(raw: &str) -> Result<Url, ProxyError> {
    Url::parse(raw).map_err(|e| ProxyError::validation(format!("invalid url {raw:?}: {e}")))
}

/// Raw upstream body with cache/circuit metadata surfaced as headers.
fn proxied_response(result: ProxyResult) -> Response {
    let mut builder = Response::builder()
        .status(result.status)
        .header("x-cache-status", if result.from_cache { "HIT" } else { "MISS" })
        .header("x-circuit-state", result.circuit_state.as_str())
        .header("x-retry-attempts", result.attempts.to_string());
    if let Some(age) = result.cache_age {
        builder = builder.header("x-cache-age", age.as_secs().to_string());
    }
    if let Some(content_type) = &result.content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }

    match builder.body(Body::from(result.body)) {
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build proxied response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Bodies that claim JSON are surfaced as structured JSON; everything else
/// as a string.
fn decode_body(result: &ProxyResult) -> serde_json::Value {
    let is_json = result
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("application/json"));
    if is_json {
        if let Ok(value) = serde_json::from_slice(&result.body) {
            return value;
        }
    }
    serde_json::Value::String(String::from_utf8_lossy(&result.body).into_owned())
}
