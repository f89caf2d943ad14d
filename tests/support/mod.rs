//! Shared end-to-end test support: a fake coordinator gRPC server plus
//! helpers to bring up a ready [`buckley_bridge::Bridge`] against it.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Mutex;

use buckley_bridge::lifecycle::ClientInfo;
use buckley_bridge::proto::coordinator::v1::coordinator_server::{
    Coordinator, CoordinatorServer,
};
use buckley_bridge::proto::coordinator::v1::{
    ApplyEditsRequest, ApplyEditsResponse, InlineCompletionEvent, InlineCompletionRequest,
    ProposeEditsRequest, ProposeEditsResponse, StreamTaskRequest, TaskEvent, TextQueryRequest,
    TextQueryResponse, UpdateEditorStateRequest, UpdateEditorStateResponse,
};
use buckley_bridge::Bridge;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

type TaskEventResult = Result<TaskEvent, Status>;
type InlineCompletionEventResult = Result<InlineCompletionEvent, Status>;

/// A scriptable stand-in for the coordinator. Each field is consumed (taken)
/// by the matching RPC the first time it's called, so a test configures
/// exactly the behavior it needs and nothing else is left dangling between
/// calls.
#[derive(Default)]
pub struct FakeCoordinator {
    pub text_query_response: Mutex<Option<Result<(String, String), Status>>>,
    pub task_stream: Mutex<Option<mpsc::Receiver<TaskEventResult>>>,
    pub inline_stream: Mutex<Option<mpsc::Receiver<InlineCompletionEventResult>>>,
    /// The `x-buckley-agent-id` metadata value seen on the most recent
    /// `stream_inline_completions` call, if any (spec §6 metadata
    /// propagation).
    pub last_inline_agent_id_header: Mutex<Option<String>>,
}

impl Coordinator for FakeCoordinator {
    async fn send_message(
        &self,
        _request: Request<TextQueryRequest>,
    ) -> Result<Response<TextQueryResponse>, Status> {
        let configured = self
            .text_query_response
            .lock()
            .expect("fake coordinator poisoned")
            .take();
        match configured {
            Some(Ok((response, agent_id))) => {
                Ok(Response::new(TextQueryResponse { response, agent_id }))
            }
            Some(Err(status)) => Err(status),
            None => Ok(Response::new(TextQueryResponse {
                response: String::new(),
                agent_id: String::new(),
            })),
        }
    }

    type StreamTaskStream = Pin<Box<dyn tokio_stream::Stream<Item = TaskEventResult> + Send + 'static>>;

    async fn stream_task(
        &self,
        _request: Request<StreamTaskRequest>,
    ) -> Result<Response<Self::StreamTaskStream>, Status> {
        let rx = self
            .task_stream
            .lock()
            .expect("fake coordinator poisoned")
            .take()
            .expect("test must configure task_stream before calling stream_task");
        let stream: Self::StreamTaskStream = Box::pin(ReceiverStream::new(rx));
        Ok(Response::new(stream))
    }

    type StreamInlineCompletionsStream =
        Pin<Box<dyn tokio_stream::Stream<Item = InlineCompletionEventResult> + Send + 'static>>;

    async fn stream_inline_completions(
        &self,
        request: Request<InlineCompletionRequest>,
    ) -> Result<Response<Self::StreamInlineCompletionsStream>, Status> {
        let header = request
            .metadata()
            .get("x-buckley-agent-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self
            .last_inline_agent_id_header
            .lock()
            .expect("fake coordinator poisoned") = header;

        let rx = self
            .inline_stream
            .lock()
            .expect("fake coordinator poisoned")
            .take()
            .expect("test must configure inline_stream before calling stream_inline_completions");
        let stream: Self::StreamInlineCompletionsStream = Box::pin(ReceiverStream::new(rx));
        Ok(Response::new(stream))
    }

    async fn propose_edits(
        &self,
        _request: Request<ProposeEditsRequest>,
    ) -> Result<Response<ProposeEditsResponse>, Status> {
        Ok(Response::new(ProposeEditsResponse {
            suggestions: vec![],
        }))
    }

    async fn apply_edits(
        &self,
        request: Request<ApplyEditsRequest>,
    ) -> Result<Response<ApplyEditsResponse>, Status> {
        let applied_uris = request
            .into_inner()
            .edits
            .into_iter()
            .map(|e| e.uri)
            .collect();
        Ok(Response::new(ApplyEditsResponse {
            applied: true,
            applied_uris,
        }))
    }

    async fn update_editor_state(
        &self,
        _request: Request<UpdateEditorStateRequest>,
    ) -> Result<Response<UpdateEditorStateResponse>, Status> {
        Ok(Response::new(UpdateEditorStateResponse {}))
    }
}

/// Start a `FakeCoordinator` on a loopback port and return its endpoint URI
/// alongside the handles a test needs to script its behavior.
pub async fn spawn_fake_coordinator() -> (String, std::sync::Arc<FakeCoordinator>) {
    let coordinator = std::sync::Arc::new(FakeCoordinator::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr: SocketAddr = listener.local_addr().expect("local addr");

    let served = std::sync::Arc::clone(&coordinator);
    tokio::spawn(async move {
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
        let service = CoordinatorServer::from_arc(served);
        Server::builder()
            .add_service(service)
            .serve_with_incoming(incoming)
            .await
            .expect("fake coordinator server crashed");
    });

    (format!("http://{addr}"), coordinator)
}

/// Bring up a `Bridge` already connected to and initialized against a fake
/// coordinator, skipping the `initialize`/`initialized` JSON-RPC ceremony
/// for tests that only care about post-handshake behavior.
pub async fn ready_bridge(endpoint: &str) -> std::sync::Arc<Bridge> {
    let bridge = Bridge::new(endpoint.to_string());
    bridge
        .lifecycle()
        .initialize(endpoint.to_string(), ClientInfo::default())
        .await
        .expect("initialize against fake coordinator");
    bridge
        .lifecycle()
        .initialized()
        .await
        .expect("initialized transition");
    bridge
}
