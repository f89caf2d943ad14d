//! Stream Multiplexer (spec §4.4) — the heart of the bridge.
//!
//! Maintains the registry of active server-streamed calls, assigns ids,
//! manages per-stream cancellation scopes, pumps upstream events into
//! caller callbacks, and guarantees at-most-one terminal signal per
//! stream.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tonic::Streaming;
use ulid::Ulid;

use crate::error::BridgeError;
use crate::lifecycle::LifecycleManager;
use crate::model::EditorContext;
use crate::proto::coordinator::v1 as pb;

/// A stream id: either a freshly minted 26-character ULID, or — for the
/// inline-completion path — the caller-supplied session id (spec §4.4
/// step 2).
pub type StreamId = String;

/// The payload carried by one event delivered to a stream's callback.
#[derive(Debug, Clone)]
pub enum StreamPayload {
    /// A `buckley/streamQuery` chunk.
    Task { payload: String },
    /// An inline-completion chunk.
    InlineCompletion {
        text: String,
        finish_reason: String,
    },
    /// The empty terminal payload delivered alongside `final = true` for
    /// kinds that don't carry an explicit terminal flag.
    Empty,
}

/// One event delivered to a stream's callback (spec §4.4 step 5).
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub payload: StreamPayload,
    pub is_final: bool,
}

/// The upstream call to initiate, carrying whatever the coordinator needs
/// (spec §4.4 "Two concrete StreamKinds").
pub enum StreamRequest {
    /// Backs `buckley/streamQuery`, upstream `StreamTask`.
    TextQuery {
        query: String,
        context: Option<EditorContext>,
    },
    /// Backs HTTP `/inline_complete`, upstream `StreamInlineCompletions`.
    /// `session_id` doubles as the stream id.
    InlineCompletion {
        agent_id: String,
        session_id: String,
        prompt: String,
        context: EditorContext,
    },
}

/// Caller-supplied callback invoked once per delivered event, in
/// upstream-arrival order. Returning an error aborts the stream.
pub type StreamCallback = Box<dyn FnMut(StreamEvent) -> Result<(), BridgeError> + Send>;

/// One entry in the active-stream registry (spec §3 "Stream record").
struct StreamRecord {
    cancel: CancellationToken,
}

/// Owns the registry of in-flight server-streamed calls.
#[derive(Default)]
pub struct StreamMultiplexer {
    registry: RwLock<HashMap<StreamId, StreamRecord>>,
}

fn validate_request(request: &StreamRequest) -> Result<(), BridgeError> {
    match request {
        StreamRequest::TextQuery { query, .. } => {
            if query.trim().is_empty() {
                return Err(BridgeError::invalid_params("query must not be empty"));
            }
        }
        StreamRequest::InlineCompletion {
            session_id, prompt, ..
        } => {
            if session_id.trim().is_empty() {
                return Err(BridgeError::invalid_params("session_id must not be empty"));
            }
            if prompt.is_empty() {
                return Err(BridgeError::invalid_params("prompt must not be empty"));
            }
        }
    }
    Ok(())
}

impl StreamMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a server-streamed call and drive its receive loop to
    /// completion, delivering events to `callback` as they arrive.
    ///
    /// Always returns a stream id (even on failure past step 2, so the
    /// caller can correlate logs), paired with `Ok(())` on a clean
    /// end-of-stream or `Err` describing why the stream ended early.
    ///
    /// `on_started`, if given, fires with the minted id as soon as the
    /// registry entry exists (before the upstream call is even issued) —
    /// this lets a caller that needs the id early (e.g. to record a
    /// JSON-RPC request-id -> stream-id mapping for `$/cancelRequest`)
    /// learn it without waiting for the whole stream to drain, while
    /// `start` itself keeps running the receive loop to completion.
    pub async fn start(
        &self,
        lifecycle: &LifecycleManager,
        parent_token: &CancellationToken,
        request: StreamRequest,
        callback: StreamCallback,
        on_started: Option<tokio::sync::oneshot::Sender<StreamId>>,
    ) -> (StreamId, Result<(), BridgeError>) {
        if let Err(e) = validate_request(&request) {
            let id = self.mint_id(&request);
            return (id, Err(e));
        }

        let link = match lifecycle.snapshot_link().await {
            Ok(link) => link,
            Err(e) => {
                let id = self.mint_id(&request);
                return (id, Err(e));
            }
        };

        let id = self.mint_id(&request);
        let child_token = parent_token.child_token();

        {
            let mut registry = self.registry.write().await;
            registry.insert(
                id.clone(),
                StreamRecord {
                    cancel: child_token.clone(),
                },
            );
        }

        if let Some(tx) = on_started {
            let _ = tx.send(id.clone());
        }

        let result = match request {
            StreamRequest::TextQuery { query, context } => {
                self.run_text_stream(link, query, context, child_token, callback)
                    .await
            }
            StreamRequest::InlineCompletion {
                agent_id,
                session_id,
                prompt,
                context,
            } => {
                self.run_inline_completion_stream(
                    link,
                    agent_id,
                    session_id,
                    prompt,
                    context,
                    child_token,
                    callback,
                )
                .await
            }
        };

        self.registry.write().await.remove(&id);
        (id, result)
    }

    /// Cancel an in-flight stream by id. Idempotent: a second cancel (or a
    /// cancel racing the stream's own natural completion) returns an
    /// "unknown stream" error rather than acting twice.
    pub async fn cancel(&self, id: &str) -> Result<(), BridgeError> {
        let record = self.registry.write().await.remove(id);
        match record {
            Some(record) => {
                record.cancel.cancel();
                Ok(())
            }
            None => Err(BridgeError::invalid_params(format!(
                "unknown stream: {id}"
            ))),
        }
    }

    /// Number of streams currently registered — exposed for tests
    /// asserting registry conservation (spec §8 property 3).
    pub async fn active_count(&self) -> usize {
        self.registry.read().await.len()
    }

    fn mint_id(&self, request: &StreamRequest) -> StreamId {
        match request {
            StreamRequest::InlineCompletion { session_id, .. } => session_id.clone(),
            StreamRequest::TextQuery { .. } => Ulid::new().to_string(),
        }
    }

    async fn run_text_stream(
        &self,
        link: crate::lifecycle::LinkHandle,
        query: String,
        context: Option<EditorContext>,
        token: CancellationToken,
        mut callback: StreamCallback,
    ) -> Result<(), BridgeError> {
        let mut client = link.client;
        let request = pb::StreamTaskRequest {
            query,
            context: context.map(Into::into),
        };

        let mut upstream: Streaming<pb::TaskEvent> = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(BridgeError::stream("cancelled before start")),
            result = client.stream_task(request) => result
                .map_err(|status| BridgeError::upstream(format!("failed to start StreamTask: {status}")))?
                .into_inner(),
        };

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(BridgeError::stream("stream cancelled"));
                }
                next = upstream.message() => {
                    match next {
                        Ok(None) => {
                            callback(StreamEvent { payload: StreamPayload::Empty, is_final: true })
                                .map_err(|e| BridgeError::Callback(e.to_string()))?;
                            return Ok(());
                        }
                        Ok(Some(event)) => {
                            callback(StreamEvent {
                                payload: StreamPayload::Task { payload: event.payload },
                                is_final: false,
                            })
                            .map_err(|e| BridgeError::Callback(e.to_string()))?;
                        }
                        Err(status) => {
                            return Err(BridgeError::stream(format!("upstream error: {status}")));
                        }
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_inline_completion_stream(
        &self,
        link: crate::lifecycle::LinkHandle,
        agent_id: String,
        session_id: String,
        prompt: String,
        context: EditorContext,
        token: CancellationToken,
        mut callback: StreamCallback,
    ) -> Result<(), BridgeError> {
        let mut client = link.client;
        let request = crate::proto::with_agent_id_header(
            tonic::Request::new(pb::InlineCompletionRequest {
                agent_id: agent_id.clone(),
                session_id,
                prompt,
                context: Some(context.into()),
            }),
            &agent_id,
        );

        let mut upstream: Streaming<pb::InlineCompletionEvent> = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(BridgeError::stream("cancelled before start")),
            result = client.stream_inline_completions(request) => result
                .map_err(|status| BridgeError::upstream(format!(
                    "failed to start StreamInlineCompletions: {status}"
                )))?
                .into_inner(),
        };

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(BridgeError::stream("stream cancelled"));
                }
                next = upstream.message() => {
                    match next {
                        Ok(None) => {
                            callback(StreamEvent { payload: StreamPayload::Empty, is_final: true })
                                .map_err(|e| BridgeError::Callback(e.to_string()))?;
                            return Ok(());
                        }
                        Ok(Some(event)) => {
                            let is_final = event.is_final;
                            callback(StreamEvent {
                                payload: StreamPayload::InlineCompletion {
                                    text: event.text,
                                    finish_reason: event.finish_reason,
                                },
                                is_final,
                            })
                            .map_err(|e| BridgeError::Callback(e.to_string()))?;
                            if is_final {
                                // The event already carried the terminal flag;
                                // don't emit an additional empty terminal event.
                                return Ok(());
                            }
                        }
                        Err(status) => {
                            return Err(BridgeError::stream(format!("upstream error: {status}")));
                        }
                    }
                }
            }
        }
    }
}
