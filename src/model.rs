//! Wire-level and domain data types shared by every component (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC 2.0 request id. The spec requires ids to be preserved
/// verbatim and allows integers, strings, or null.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Null => write!(f, "null"),
        }
    }
}

/// A parsed JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// The on-wire JSON-RPC envelope shape, reconstructed from the raw fields
/// actually present (spec §3 "Message envelope"). An envelope is a
/// *request* if it carries both id and method, a *notification* if it
/// carries method without id, a *response* if it carries id without
/// method.
#[derive(Debug, Clone)]
pub enum Envelope {
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    Response {
        id: RequestId,
        result: Option<Value>,
        error: Option<RpcError>,
    },
}

/// Raw on-wire shape used only for serde (de)serialization; [`Envelope`] is
/// reconstructed from this after checking which fields are present.
#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(default = "default_jsonrpc_version")]
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

fn default_jsonrpc_version() -> String {
    "2.0".to_string()
}

impl Envelope {
    /// Parse a raw JSON body into an [`Envelope`], classifying it by which
    /// fields are present.
    pub fn from_json(body: &[u8]) -> Result<Self, crate::error::BridgeError> {
        let raw: RawEnvelope = serde_json::from_slice(body)
            .map_err(|e| crate::error::BridgeError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnvelope) -> Result<Self, crate::error::BridgeError> {
        match (raw.id, raw.method) {
            (Some(id), Some(method)) => Ok(Envelope::Request {
                id,
                method,
                params: raw.params.unwrap_or(Value::Null),
            }),
            (None, Some(method)) => Ok(Envelope::Notification {
                method,
                params: raw.params.unwrap_or(Value::Null),
            }),
            (Some(id), None) => {
                if raw.result.is_some() && raw.error.is_some() {
                    return Err(crate::error::BridgeError::Parse(
                        "response carries both result and error".into(),
                    ));
                }
                Ok(Envelope::Response {
                    id,
                    result: raw.result,
                    error: raw.error,
                })
            }
            (None, None) => Err(crate::error::BridgeError::Parse(
                "envelope has neither id+method (request), method alone (notification), nor id alone (response)".into(),
            )),
        }
    }

    /// Serialize this envelope to its on-wire JSON form, filling in the
    /// default `"2.0"` jsonrpc version.
    pub fn to_json(&self) -> Value {
        let raw = match self {
            Envelope::Request { id, method, params } => RawEnvelope {
                jsonrpc: default_jsonrpc_version(),
                id: Some(id.clone()),
                method: Some(method.clone()),
                params: Some(params.clone()),
                result: None,
                error: None,
            },
            Envelope::Notification { method, params } => RawEnvelope {
                jsonrpc: default_jsonrpc_version(),
                id: None,
                method: Some(method.clone()),
                params: Some(params.clone()),
                result: None,
                error: None,
            },
            Envelope::Response { id, result, error } => RawEnvelope {
                jsonrpc: default_jsonrpc_version(),
                id: Some(id.clone()),
                method: None,
                params: None,
                result: result.clone(),
                error: error.clone(),
            },
        };
        serde_json::to_value(raw).expect("envelope always serializes")
    }

    /// Build a success response envelope for the given request id.
    pub fn response_ok(id: RequestId, result: Value) -> Self {
        Envelope::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response envelope for the given request id.
    pub fn response_err(id: RequestId, error: RpcError) -> Self {
        Envelope::Response {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A document position: zero-based line and Unicode-scalar-value character
/// offset within that line (spec §3 "Document position").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

/// An ordered document range with `start <= end` (spec §3 "Document range").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// A single text edit: a target URI, an optional range (absent means
/// whole-document replacement), and replacement text (spec §3 "Text edit").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    pub new_text: String,
}

/// A document snapshot forwarded opaquely upstream (spec §3 "Editor
/// context").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub uri: String,
    pub language_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Range>,
    #[serde(default)]
    pub version: u32,
}

/// The full bundle passed opaquely to the coordinator: a document snapshot
/// plus optional visible-range hints (spec §3 "Editor context",
/// GLOSSARY).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorContext {
    pub document: Document,
    #[serde(default)]
    pub visible_ranges: Vec<Range>,
}

/// Lifecycle state values (spec §3 "Lifecycle state" / §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Exited,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::ShuttingDown => "shuttingDown",
            LifecycleState::Exited => "exited",
        };
        write!(f, "{s}")
    }
}
