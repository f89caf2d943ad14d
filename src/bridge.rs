//! The Bridge orchestrator: wires Dispatcher, Lifecycle & Link Manager, and
//! Stream Multiplexer into the single in-process object that both the LSP
//! host loop and the HTTP shim drive (spec §2, §5).

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{
    stream_query_async_required_reply, DispatchOutcome, Dispatcher, STREAM_CHUNK_NOTIFICATION,
};
use crate::error::BridgeError;
use crate::lifecycle::LifecycleManager;
use crate::model::{EditorContext, Envelope, RequestId};
use crate::multiplexer::{StreamId, StreamMultiplexer, StreamPayload, StreamRequest};

/// Shared bridge state. One instance per editor connection; the HTTP shim
/// and the LSP reader/writer tasks all hold an `Arc<Bridge>`.
pub struct Bridge {
    lifecycle: LifecycleManager,
    multiplexer: StreamMultiplexer,
    root_cancel: CancellationToken,
    coordinator_endpoint: String,
    pending_cancels: RwLock<HashMap<RequestId, StreamId>>,
}

impl Bridge {
    pub fn new(coordinator_endpoint: String) -> Arc<Self> {
        Arc::new(Self {
            lifecycle: LifecycleManager::new(),
            multiplexer: StreamMultiplexer::new(),
            root_cancel: CancellationToken::new(),
            coordinator_endpoint,
            pending_cancels: RwLock::new(HashMap::new()),
        })
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn multiplexer(&self) -> &StreamMultiplexer {
        &self.multiplexer
    }

    pub fn root_cancel(&self) -> &CancellationToken {
        &self.root_cancel
    }

    /// Handle one inbound editor envelope, sending any synchronous reply
    /// (and, for `buckley/streamQuery`, the async-required error followed
    /// by spawned chunk notifications) over `outbound`.
    pub async fn handle_envelope(
        self: &Arc<Self>,
        envelope: Envelope,
        outbound: mpsc::UnboundedSender<Envelope>,
    ) {
        let dispatcher = Dispatcher::new(&self.lifecycle, self.coordinator_endpoint.clone());

        let pending = &self.pending_cancels;
        let outcome = dispatcher
            .dispatch(envelope, |id| {
                // The dispatcher needs a synchronous lookup; since the map
                // is populated strictly before a cancel notification could
                // reference it in practice, a best-effort try_read is used
                // here rather than blocking the dispatch path.
                pending.try_read().ok().and_then(|m| m.get(id).cloned())
            })
            .await;

        match outcome {
            DispatchOutcome::Reply(reply) => {
                let _ = outbound.send(reply);
            }
            DispatchOutcome::NoReply => {}
            DispatchOutcome::CancelRequested { stream_id } => {
                if let Err(e) = self.multiplexer.cancel(&stream_id).await {
                    debug!("cancel request for unknown stream {stream_id}: {e}");
                }
            }
            DispatchOutcome::StreamQueryRequested { id, query } => {
                let _ = outbound.send(stream_query_async_required_reply(id.clone()));
                self.spawn_text_stream(id, query, outbound);
            }
        }
    }

    fn spawn_text_stream(
        self: &Arc<Self>,
        request_id: RequestId,
        query: String,
        outbound: mpsc::UnboundedSender<Envelope>,
    ) {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let (on_started_tx, on_started_rx) = oneshot::channel();

            // Set as soon as `on_started` fires, well before any chunk can
            // arrive (registration happens before the upstream call is even
            // issued) — read back by the callback below without blocking.
            let known_id = Arc::new(std::sync::Mutex::new(None::<StreamId>));

            let callback_outbound = outbound.clone();
            let callback_known_id = Arc::clone(&known_id);
            let callback: Box<
                dyn FnMut(crate::multiplexer::StreamEvent) -> Result<(), BridgeError> + Send,
            > = Box::new(move |event| {
                let payload = match event.payload {
                    StreamPayload::Task { payload } => payload,
                    StreamPayload::Empty => String::new(),
                    StreamPayload::InlineCompletion { text, .. } => text,
                };
                let stream_id = callback_known_id
                    .lock()
                    .expect("stream id cell poisoned")
                    .clone()
                    .unwrap_or_default();
                let notification = Envelope::Notification {
                    method: STREAM_CHUNK_NOTIFICATION.to_string(),
                    params: serde_json::json!({
                        "streamId": stream_id,
                        "payload": payload,
                        "final": event.is_final,
                    }),
                };
                callback_outbound
                    .send(notification)
                    .map_err(|_| BridgeError::stream("outbound channel closed"))
            });

            let track_mapping = async {
                if let Ok(stream_id) = on_started_rx.await {
                    *known_id.lock().expect("stream id cell poisoned") = Some(stream_id.clone());
                    bridge
                        .pending_cancels
                        .write()
                        .await
                        .insert(request_id.clone(), stream_id);
                }
            };

            let run_stream = bridge.multiplexer.start(
                &bridge.lifecycle,
                &bridge.root_cancel,
                StreamRequest::TextQuery {
                    query,
                    context: None,
                },
                callback,
                Some(on_started_tx),
            );

            let ((stream_id, result), _) = tokio::join!(run_stream, track_mapping);

            bridge.pending_cancels.write().await.remove(&request_id);

            if let Err(e) = result {
                warn!("stream {stream_id} ended with error: {e}");
            }
        });
    }

    /// Run a unary text query for the HTTP-less LSP path. Exposed here so
    /// both the dispatcher and any future callers share one entry point;
    /// currently only used internally by the dispatcher.
    pub async fn snapshot_link(&self) -> Result<crate::lifecycle::LinkHandle, BridgeError> {
        self.lifecycle.snapshot_link().await
    }

    /// Start an inline-completion stream for the HTTP shim, delivering
    /// chunks to `callback` and returning once the stream has fully
    /// drained (the HTTP response is buffered, not chunked transfer).
    pub async fn start_inline_completion(
        &self,
        agent_id: String,
        session_id: String,
        prompt: String,
        context: EditorContext,
        callback: crate::multiplexer::StreamCallback,
    ) -> (StreamId, Result<(), BridgeError>) {
        self.multiplexer
            .start(
                &self.lifecycle,
                &self.root_cancel,
                StreamRequest::InlineCompletion {
                    agent_id,
                    session_id,
                    prompt,
                    context,
                },
                callback,
                None,
            )
            .await
    }
}
