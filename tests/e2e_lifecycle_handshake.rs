//! S1 — LSP initialize handshake (spec §8).
//!
//! Drives the bridge exactly as the editor would: framed JSON-RPC bytes in,
//! framed JSON-RPC bytes out, over an in-memory duplex stream standing in
//! for stdio.

mod support;

use buckley_bridge::framing::{FramingReader, FramingWriter};
use buckley_bridge::model::Envelope;
use serde_json::json;
use tokio::sync::mpsc;

async fn write_framed(buf: &mut Vec<u8>, json_body: serde_json::Value) {
    let body = serde_json::to_vec(&json_body).unwrap();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(&body);
}

#[tokio::test]
async fn s1_initialize_handshake_over_the_wire() {
    let (endpoint, _coordinator) = support::spawn_fake_coordinator().await;
    let bridge = buckley_bridge::Bridge::new(endpoint);

    let mut input = Vec::new();
    write_framed(
        &mut input,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"processId": 1234, "rootUri": "file:///w"}
        }),
    )
    .await;
    write_framed(
        &mut input,
        json!({"jsonrpc": "2.0", "method": "initialized"}),
    )
    .await;

    let mut reader = FramingReader::new(input.as_slice());
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    // First message: initialize request.
    let envelope = reader.read_message().await.unwrap().unwrap();
    bridge.handle_envelope(envelope, tx.clone()).await;

    let reply = rx.recv().await.expect("initialize should reply");
    let mut out = Vec::new();
    FramingWriter::new(&mut out)
        .write_message(&reply)
        .await
        .unwrap();

    match reply {
        Envelope::Response { id, result: Some(result), error: None } => {
            assert_eq!(id, buckley_bridge::model::RequestId::Number(1));
            assert_eq!(
                result["capabilities"]["textDocumentSync"]["openClose"],
                true
            );
            assert_eq!(result["capabilities"]["textDocumentSync"]["change"], 1);
            assert_eq!(result["serverInfo"]["name"], "buckley-bridge");
            assert_eq!(result["serverInfo"]["version"], "1.0.0");
        }
        other => panic!("expected a successful initialize result, got {other:?}"),
    }

    assert_eq!(
        bridge.lifecycle().state().await,
        buckley_bridge::model::LifecycleState::Initializing
    );

    // Second message: initialized notification -> no reply, ready state.
    let envelope = reader.read_message().await.unwrap().unwrap();
    bridge.handle_envelope(envelope, tx).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(
        bridge.lifecycle().state().await,
        buckley_bridge::model::LifecycleState::Ready
    );
}
