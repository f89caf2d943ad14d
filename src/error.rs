//! Error taxonomy for the bridge (spec §7).
//!
//! One `thiserror`-derived enum covers every row of the error taxonomy, with
//! mapping methods to the two wire surfaces (JSON-RPC error codes and HTTP
//! status codes) so both inbound paths derive their user-visible failure
//! from the same source type.

use thiserror::Error;

/// Comprehensive error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed header, bad Content-Length, or truncated body.
    #[error("framing error: {0}")]
    Framing(String),

    /// The message body was not valid JSON, or not a valid JSON-RPC envelope.
    #[error("parse error: {0}")]
    Parse(String),

    /// An operation was attempted in an illegal lifecycle state.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// An operation that requires the outbound link was attempted before
    /// one was established.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Request-specific validation failed (empty query, negative coordinate,
    /// unknown stream id, out-of-range bound).
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The JSON-RPC method named by the request is not recognized.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The coordinator RPC failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A per-event error surfaced by an in-flight upstream stream, including
    /// cancellation.
    #[error("stream error: {0}")]
    Stream(String),

    /// The caller-supplied callback returned an error; the stream was
    /// aborted in response.
    #[error("callback error: {0}")]
    Callback(String),

    /// A text edit's resolved range falls outside the document.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// A position's line or character component is not representable.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// Underlying I/O failure on the editor transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Standard JSON-RPC 2.0 error codes used by the dispatcher (spec §4.2).
pub mod jsonrpc_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

impl BridgeError {
    /// Map this error to the JSON-RPC error code a dispatcher response
    /// should carry.
    pub fn to_jsonrpc_code(&self) -> i64 {
        use jsonrpc_code::*;
        match self {
            BridgeError::Parse(_) => PARSE_ERROR,
            BridgeError::MethodNotFound(_) => METHOD_NOT_FOUND,
            BridgeError::InvalidParams(_)
            | BridgeError::OutOfBounds(_)
            | BridgeError::InvalidPosition(_) => INVALID_PARAMS,
            BridgeError::Lifecycle(_)
            | BridgeError::NotConnected(_)
            | BridgeError::Upstream(_)
            | BridgeError::Stream(_)
            | BridgeError::Callback(_)
            | BridgeError::Framing(_)
            | BridgeError::Io(_) => INTERNAL_ERROR,
        }
    }

    /// Map this error to the HTTP status code the shim should return.
    pub fn to_http_status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            BridgeError::InvalidParams(_)
            | BridgeError::OutOfBounds(_)
            | BridgeError::InvalidPosition(_)
            | BridgeError::Parse(_) => StatusCode::BAD_REQUEST,
            BridgeError::MethodNotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::Lifecycle(_)
            | BridgeError::NotConnected(_)
            | BridgeError::Upstream(_)
            | BridgeError::Stream(_)
            | BridgeError::Callback(_)
            | BridgeError::Framing(_)
            | BridgeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        BridgeError::InvalidParams(message.into())
    }

    pub fn lifecycle(message: impl Into<String>) -> Self {
        BridgeError::Lifecycle(message.into())
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        BridgeError::NotConnected(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        BridgeError::Upstream(message.into())
    }

    pub fn stream(message: impl Into<String>) -> Self {
        BridgeError::Stream(message.into())
    }

    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        BridgeError::OutOfBounds(message.into())
    }

    pub fn invalid_position(message: impl Into<String>) -> Self {
        BridgeError::InvalidPosition(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_maps_to_dash_32601() {
        let err = BridgeError::MethodNotFound("frobnicate".into());
        assert_eq!(err.to_jsonrpc_code(), jsonrpc_code::METHOD_NOT_FOUND);
    }

    #[test]
    fn invalid_params_maps_to_bad_request() {
        let err = BridgeError::invalid_params("query must not be empty");
        assert_eq!(err.to_http_status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_maps_to_internal_error() {
        let err = BridgeError::upstream("coordinator unreachable");
        assert_eq!(err.to_jsonrpc_code(), jsonrpc_code::INTERNAL_ERROR);
        assert_eq!(
            err.to_http_status(),
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
