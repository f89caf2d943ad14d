//! Dispatcher (spec §4.2).
//!
//! Given a parsed envelope, decides whether it is a request (reply
//! required) or a notification (no reply), and routes by method. Stateless
//! across requests: correlation is one-to-one between an inbound request
//! envelope and its outbound response envelope.

use serde::Deserialize;
use serde_json::json;

use crate::error::{jsonrpc_code, BridgeError};
use crate::lifecycle::{ClientInfo, LifecycleManager};
use crate::model::{Envelope, RequestId, RpcError};
use crate::proto::coordinator::v1 as pb;

/// The name of the server, advertised in the `initialize` response.
pub const SERVER_NAME: &str = "buckley-bridge";
pub const SERVER_VERSION: &str = "1.0.0";

/// The vendor-namespaced notification method used to deliver
/// `buckley/streamQuery` chunks back to the editor (spec §9 Open
/// Questions, resolved in DESIGN.md).
pub const STREAM_CHUNK_NOTIFICATION: &str = "$/buckley/streamChunk";

#[derive(Debug, Deserialize)]
struct InitializeParams {
    #[serde(default, rename = "processId")]
    process_id: Option<i64>,
    #[serde(default, rename = "rootUri")]
    root_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextQueryParams {
    query: String,
}

/// The outcome of dispatching one inbound envelope.
pub enum DispatchOutcome {
    /// Send this envelope back to the editor.
    Reply(Envelope),
    /// A notification was handled; nothing is sent back.
    NoReply,
    /// The request is `buckley/streamQuery`; the host loop (not the
    /// dispatcher) is responsible for starting the stream and replying
    /// with the async-required error recorded here for the synchronous
    /// JSON-RPC leg, while `query`/`context` are handed to the host loop
    /// out of band by the caller before this variant is produced.
    StreamQueryRequested { id: RequestId, query: String },
    /// `$/cancelRequest` resolved to a stream id via the request-id
    /// mapping; the host loop should call the multiplexer's cancel.
    CancelRequested { stream_id: String },
}

/// The coordinator endpoint the lifecycle manager should connect to on
/// `initialize`. Carried separately from the dispatcher since it comes
/// from process configuration, not from the wire.
pub struct Dispatcher<'a> {
    pub lifecycle: &'a LifecycleManager,
    pub coordinator_endpoint: String,
}

impl<'a> Dispatcher<'a> {
    pub fn new(lifecycle: &'a LifecycleManager, coordinator_endpoint: String) -> Self {
        Self {
            lifecycle,
            coordinator_endpoint,
        }
    }

    /// Dispatch one envelope. `request_id_for_cancel` is a lookup used
    /// only by `$/cancelRequest`, resolving a JSON-RPC request id to the
    /// stream id recorded by the host loop at stream-start time.
    pub async fn dispatch(
        &self,
        envelope: Envelope,
        lookup_stream_id: impl FnOnce(&RequestId) -> Option<String>,
    ) -> DispatchOutcome {
        match envelope {
            Envelope::Request { id, method, params } => {
                self.dispatch_request(id, method, params).await
            }
            Envelope::Notification { method, params } => {
                self.dispatch_notification(method, params, lookup_stream_id)
                    .await
            }
            Envelope::Response { .. } => DispatchOutcome::NoReply,
        }
    }

    async fn dispatch_request(
        &self,
        id: RequestId,
        method: String,
        params: serde_json::Value,
    ) -> DispatchOutcome {
        match method.as_str() {
            "initialize" => self.handle_initialize(id, params).await,
            "shutdown" => self.handle_shutdown(id).await,
            "buckley/textQuery" => self.handle_text_query(id, params).await,
            "buckley/streamQuery" => self.handle_stream_query_request(id, params),
            _ => DispatchOutcome::Reply(Envelope::response_err(
                id,
                RpcError::new(
                    jsonrpc_code::METHOD_NOT_FOUND,
                    format!("method not found: {method}"),
                ),
            )),
        }
    }

    async fn dispatch_notification(
        &self,
        method: String,
        params: serde_json::Value,
        lookup_stream_id: impl FnOnce(&RequestId) -> Option<String>,
    ) -> DispatchOutcome {
        match method.as_str() {
            "initialized" => {
                let _ = self.lifecycle.initialized().await;
                DispatchOutcome::NoReply
            }
            "exit" => {
                self.lifecycle.exit().await;
                DispatchOutcome::NoReply
            }
            "$/cancelRequest" => self.handle_cancel_request(params, lookup_stream_id),
            _ => DispatchOutcome::NoReply,
        }
    }

    async fn handle_initialize(&self, id: RequestId, params: serde_json::Value) -> DispatchOutcome {
        let parsed: InitializeParams = serde_json::from_value(params).unwrap_or(InitializeParams {
            process_id: None,
            root_uri: None,
        });

        let client_info = ClientInfo {
            process_id: parsed.process_id,
            root_uri: parsed.root_uri,
        };

        match self
            .lifecycle
            .initialize(self.coordinator_endpoint.clone(), client_info)
            .await
        {
            Ok(()) => DispatchOutcome::Reply(Envelope::response_ok(
                id,
                json!({
                    "capabilities": {
                        "textDocumentSync": { "openClose": true, "change": 1 }
                    },
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION }
                }),
            )),
            Err(e) => DispatchOutcome::Reply(error_response(id, e)),
        }
    }

    async fn handle_shutdown(&self, id: RequestId) -> DispatchOutcome {
        match self.lifecycle.shutdown().await {
            Ok(()) => DispatchOutcome::Reply(Envelope::response_ok(id, serde_json::Value::Null)),
            Err(e) => DispatchOutcome::Reply(error_response(id, e)),
        }
    }

    async fn handle_text_query(&self, id: RequestId, params: serde_json::Value) -> DispatchOutcome {
        let parsed: Result<TextQueryParams, _> = serde_json::from_value(params);
        let query = match parsed {
            Ok(p) if !p.query.trim().is_empty() => p.query,
            Ok(_) => {
                return DispatchOutcome::Reply(error_response(
                    id,
                    BridgeError::invalid_params("query must not be empty"),
                ));
            }
            Err(e) => {
                return DispatchOutcome::Reply(error_response(
                    id,
                    BridgeError::invalid_params(format!("invalid params: {e}")),
                ));
            }
        };

        let link = match self.lifecycle.snapshot_link().await {
            Ok(link) => link,
            Err(e) => return DispatchOutcome::Reply(error_response(id, e)),
        };

        let mut client = link.client;
        let request = pb::TextQueryRequest {
            query,
            context: None,
        };

        match client.send_message(request).await {
            Ok(response) => {
                let response = response.into_inner();
                DispatchOutcome::Reply(Envelope::response_ok(
                    id,
                    json!({ "response": response.response, "agentId": response.agent_id }),
                ))
            }
            Err(status) => DispatchOutcome::Reply(error_response(
                id,
                BridgeError::upstream(format!("coordinator-error: {status}")),
            )),
        }
    }

    fn handle_stream_query_request(
        &self,
        id: RequestId,
        params: serde_json::Value,
    ) -> DispatchOutcome {
        let parsed: Result<TextQueryParams, _> = serde_json::from_value(params);
        match parsed {
            Ok(p) => DispatchOutcome::StreamQueryRequested { id, query: p.query },
            Err(e) => DispatchOutcome::Reply(error_response(
                id,
                BridgeError::invalid_params(format!("invalid params: {e}")),
            )),
        }
    }

    fn handle_cancel_request(
        &self,
        params: serde_json::Value,
        lookup_stream_id: impl FnOnce(&RequestId) -> Option<String>,
    ) -> DispatchOutcome {
        #[derive(Deserialize)]
        struct CancelParams {
            id: RequestId,
        }

        let Ok(parsed) = serde_json::from_value::<CancelParams>(params) else {
            // Malformed cancel notifications are ignored per JSON-RPC
            // convention for notifications.
            return DispatchOutcome::NoReply;
        };

        match lookup_stream_id(&parsed.id) {
            Some(stream_id) => DispatchOutcome::CancelRequested { stream_id },
            // No recorded mapping: ignored silently (spec §4.2).
            None => DispatchOutcome::NoReply,
        }
    }
}

fn error_response(id: RequestId, error: BridgeError) -> Envelope {
    Envelope::response_err(id, RpcError::new(error.to_jsonrpc_code(), error.to_string()))
}

/// Build the async-required error reply for `buckley/streamQuery`'s
/// synchronous leg (spec §4.2, §6).
pub fn stream_query_async_required_reply(id: RequestId) -> Envelope {
    Envelope::response_err(
        id,
        RpcError::new(
            jsonrpc_code::INTERNAL_ERROR,
            "buckley/streamQuery requires asynchronous handling; chunks are delivered via \
             $/buckley/streamChunk notifications"
                .to_string(),
        ),
    )
}
