//! S4 — streaming with callback failure on chunk 2, and S5 — cancel in
//! mid-stream (spec §8).

mod support;

use std::sync::{Arc, Mutex};

use buckley_bridge::error::BridgeError;
use buckley_bridge::model::{Document, EditorContext};
use buckley_bridge::multiplexer::{StreamEvent, StreamPayload, StreamRequest};
use buckley_bridge::proto::coordinator::v1::{InlineCompletionEvent, TaskEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn s4_callback_failure_on_second_chunk_aborts_the_stream() {
    let (endpoint, coordinator) = support::spawn_fake_coordinator().await;
    let bridge = support::ready_bridge(&endpoint).await;

    let (tx, rx) = mpsc::channel(8);
    *coordinator.task_stream.lock().unwrap() = Some(rx);
    tx.send(Ok(TaskEvent { payload: "c1".into() })).await.unwrap();
    tx.send(Ok(TaskEvent { payload: "c2".into() })).await.unwrap();
    tx.send(Ok(TaskEvent { payload: "c3".into() })).await.unwrap();
    drop(tx);

    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let received_cb = Arc::clone(&received);
    let callback: buckley_bridge::multiplexer::StreamCallback = Box::new(move |event: StreamEvent| {
        let payload = match event.payload {
            StreamPayload::Task { payload } => payload,
            _ => String::new(),
        };
        let mut seen = received_cb.lock().unwrap();
        seen.push(payload.clone());
        if payload == "c2" {
            return Err(BridgeError::Callback("refusing chunk c2".to_string()));
        }
        Ok(())
    });

    let parent = CancellationToken::new();
    let (stream_id, result) = bridge
        .multiplexer()
        .start(
            bridge.lifecycle(),
            &parent,
            StreamRequest::TextQuery {
                query: "long task".into(),
                context: None,
            },
            callback,
            None,
        )
        .await;

    assert!(!stream_id.is_empty());
    assert!(matches!(result, Err(BridgeError::Callback(_))));
    assert_eq!(*received.lock().unwrap(), vec!["c1".to_string(), "c2".to_string()]);
    assert_eq!(bridge.multiplexer().active_count().await, 0);
}

#[tokio::test]
async fn s5_cancel_mid_stream_unblocks_the_receive_loop() {
    let (endpoint, coordinator) = support::spawn_fake_coordinator().await;
    let bridge = support::ready_bridge(&endpoint).await;

    let (tx, rx) = mpsc::channel(8);
    *coordinator.task_stream.lock().unwrap() = Some(rx);
    tx.send(Ok(TaskEvent { payload: "c1".into() })).await.unwrap();
    // Deliberately leave the channel open with no further sends, so the
    // receive loop blocks until cancellation unblocks it.

    let call_count = Arc::new(Mutex::new(0usize));
    let call_count_cb = Arc::clone(&call_count);
    let callback: buckley_bridge::multiplexer::StreamCallback = Box::new(move |_event| {
        *call_count_cb.lock().unwrap() += 1;
        Ok(())
    });

    let parent = CancellationToken::new();
    let (on_started_tx, on_started_rx) = tokio::sync::oneshot::channel();

    // Run `start` concurrently: `on_started` fires with the minted id as
    // soon as the registry entry exists, well before the stream drains, so
    // the test can cancel by id without guessing at timing.
    let spawned_bridge = Arc::clone(&bridge);
    let started = tokio::spawn(async move {
        spawned_bridge
            .multiplexer()
            .start(
                spawned_bridge.lifecycle(),
                &parent,
                StreamRequest::TextQuery {
                    query: "long task".into(),
                    context: None,
                },
                callback,
                Some(on_started_tx),
            )
            .await
    });

    let id = on_started_rx.await.expect("stream should register an id");
    assert_eq!(bridge.multiplexer().active_count().await, 1);

    // Give the receive loop a moment to pick up c1 before cancelling.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    bridge.multiplexer().cancel(&id).await.unwrap();

    let (stream_id, result) = started.await.unwrap();
    assert_eq!(stream_id, id);
    assert!(matches!(result, Err(BridgeError::Stream(_))));
    assert_eq!(*call_count.lock().unwrap(), 1);

    let err = bridge.multiplexer().cancel(&id).await.unwrap_err();
    assert!(matches!(err, BridgeError::InvalidParams(_)));
}

#[tokio::test]
async fn inline_completion_stream_propagates_the_trimmed_agent_id_header() {
    let (endpoint, coordinator) = support::spawn_fake_coordinator().await;
    let bridge = support::ready_bridge(&endpoint).await;

    let (tx, rx) = mpsc::channel(8);
    *coordinator.inline_stream.lock().unwrap() = Some(rx);
    tx.send(Ok(InlineCompletionEvent {
        text: "fn main".into(),
        is_final: true,
        finish_reason: "stop".into(),
    }))
    .await
    .unwrap();
    drop(tx);

    let callback: buckley_bridge::multiplexer::StreamCallback = Box::new(|_event| Ok(()));

    let (_, result) = bridge
        .start_inline_completion(
            "  agent-42  ".to_string(),
            "session-1".to_string(),
            "complete this".to_string(),
            EditorContext {
                document: Document {
                    uri: "file:///a.rs".into(),
                    language_id: "rust".into(),
                    content: String::new(),
                    selection: None,
                    version: 1,
                },
                visible_ranges: vec![],
            },
            callback,
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(
        *coordinator.last_inline_agent_id_header.lock().unwrap(),
        Some("agent-42".to_string())
    );
}

#[tokio::test]
async fn inline_completion_stream_omits_header_for_blank_agent_id() {
    let (endpoint, coordinator) = support::spawn_fake_coordinator().await;
    let bridge = support::ready_bridge(&endpoint).await;

    let (tx, rx) = mpsc::channel(8);
    *coordinator.inline_stream.lock().unwrap() = Some(rx);
    tx.send(Ok(InlineCompletionEvent {
        text: "fn main".into(),
        is_final: true,
        finish_reason: "stop".into(),
    }))
    .await
    .unwrap();
    drop(tx);

    let callback: buckley_bridge::multiplexer::StreamCallback = Box::new(|_event| Ok(()));

    let (_, result) = bridge
        .start_inline_completion(
            "   ".to_string(),
            "session-2".to_string(),
            "complete this".to_string(),
            EditorContext {
                document: Document {
                    uri: "file:///a.rs".into(),
                    language_id: "rust".into(),
                    content: String::new(),
                    selection: None,
                    version: 1,
                },
                visible_ranges: vec![],
            },
            callback,
        )
        .await;

    assert!(result.is_ok());
    assert_eq!(*coordinator.last_inline_agent_id_header.lock().unwrap(), None);
}
