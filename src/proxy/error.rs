//! Proxy error taxonomy and its HTTP mapping.
//!
//! # Design Decisions
//! - `ErrorKind` is a closed enum, not free-form strings, so status mapping
//!   and retry policy stay exhaustiveness-checked
//! - Every surfaced error carries a human-readable suggestion
//! - The proxy's own status mirrors the error class; a bare 500 only for
//!   `Unknown`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::resilience::{CircuitState, FetchError};

/// Classification of everything that can go wrong with a proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Timeout,
    Network,
    HttpError,
    ParseError,
    CircuitOpen,
    ValidationError,
    Unknown,
}

impl ErrorKind {
    /// HTTP status the proxy answers with for this error class.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::CircuitOpen | ErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::HttpError | ErrorKind::ParseError => StatusCode::BAD_GATEWAY,
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn suggestion(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "service may be overloaded; retry later or raise the timeout",
            ErrorKind::Network => "upstream appears unreachable; verify the host and port",
            ErrorKind::HttpError => "upstream rejected the request; inspect status and details",
            ErrorKind::ParseError => "upstream returned malformed JSON; check its API version",
            ErrorKind::CircuitOpen => "origin is cooling down after repeated failures; retry after willRetryAt",
            ErrorKind::ValidationError => "check the request parameters",
            ErrorKind::Unknown => "inspect proxy logs for the underlying cause",
        }
    }
}

/// A failed proxy operation, ready to serialize as the error envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProxyError {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: &'static str,
    /// Milliseconds until the origin admits its next probe
    /// (`CircuitOpen` only).
    pub will_retry_in_ms: Option<u64>,
    pub details: Option<serde_json::Value>,
    /// Upstream attempts made before surfacing; 0 when the circuit
    /// rejected the request outright.
    pub attempts: u32,
    pub circuit_state: CircuitState,
}

impl ProxyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: kind.suggestion(),
            will_retry_in_ms: None,
            details: None,
            attempts: 0,
            circuit_state: CircuitState::Closed,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn circuit_open(origin: &str, state: CircuitState, retry_in_ms: u64) -> Self {
        let mut error = Self::new(
            ErrorKind::CircuitOpen,
            format!("circuit for {origin} is {}; request not attempted", state.as_str()),
        );
        error.will_retry_in_ms = Some(retry_in_ms);
        error.circuit_state = state;
        error
    }

    /// Map a terminal fetch failure into the surfaced taxonomy.
    pub fn from_fetch(error: FetchError, attempts: u32, circuit_state: CircuitState) -> Self {
        let (kind, message, details) = match error {
            FetchError::Network(message) => (ErrorKind::Network, message, None),
            FetchError::Timeout(ms) => (
                ErrorKind::Timeout,
                format!("upstream did not respond within {ms} ms"),
                None,
            ),
            FetchError::Http { status, body } => (
                ErrorKind::HttpError,
                format!("upstream returned HTTP {status}"),
                Some(serde_json::json!({ "status": status, "body": body })),
            ),
            FetchError::Parse(message) => (ErrorKind::ParseError, message, None),
            FetchError::TooLarge { limit } => (
                ErrorKind::ValidationError,
                format!("upstream response exceeds the {limit}-byte limit"),
                None,
            ),
        };
        let mut mapped = Self::new(kind, message);
        mapped.details = details;
        mapped.attempts = attempts;
        mapped.circuit_state = circuit_state;
        mapped
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error_type: ErrorKind,
    message: &'a str,
    suggestion: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    will_retry_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope<'a> {
    success: bool,
    error: ErrorBody<'a>,
    circuit_state: CircuitState,
    attempts: u32,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                error_type: self.kind,
                message: &self.message,
                suggestion: self.suggestion,
                will_retry_at: self.will_retry_in_ms,
                details: self.details.as_ref(),
            },
            circuit_state: self.circuit_state,
            attempts: self.attempts,
        };
        (self.kind.status(), Json(&envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_mirrors_error_class() {
        assert_eq!(ErrorKind::CircuitOpen.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorKind::Network.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorKind::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorKind::HttpError.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorKind::ParseError.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorKind::ValidationError.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Unknown.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn retryable_fetch_errors_map_to_their_kinds() {
        let e = ProxyError::from_fetch(FetchError::Timeout(5000), 4, CircuitState::Closed);
        assert_eq!(e.kind, ErrorKind::Timeout);
        assert_eq!(e.attempts, 4);

        let e = ProxyError::from_fetch(
            FetchError::Http { status: 502, body: "bad".into() },
            2,
            CircuitState::Closed,
        );
        assert_eq!(e.kind, ErrorKind::HttpError);
        assert!(e.details.is_some());
    }

    #[test]
    fn circuit_open_carries_retry_hint() {
        let e = ProxyError::circuit_open("http://a", CircuitState::Open, 12_000);
        assert_eq!(e.will_retry_in_ms, Some(12_000));
        assert_eq!(e.attempts, 0);
    }

    #[test]
    fn error_type_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::CircuitOpen).unwrap(),
            "\"CIRCUIT_OPEN\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::ValidationError).unwrap(),
            "\"VALIDATION_ERROR\""
        );
    }
}
