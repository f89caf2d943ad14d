use std::path::PathBuf;
use std::sync::Arc;

use buckley_bridge::bridge::Bridge;
use buckley_bridge::error::jsonrpc_code;
use buckley_bridge::framing::{FramingReader, FramingWriter};
use buckley_bridge::http::{AppState, router};
use buckley_bridge::model::{Envelope, RequestId, RpcError};
use buckley_bridge::BridgeError;
use clap::{Parser, Subcommand};
use log::{error, info};
use tokio::io::{stdin, stdout};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "buckley-bridge")]
#[command(version)]
#[command(about = "Editor-to-coordinator bridge for Buckley agent sessions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge: stdio JSON-RPC loop plus the HTTP shim.
    Serve {
        /// Path to a YAML config file overlaying the built-in defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the bridge's own version (the `serverInfo.version` advertised
    /// over `initialize`).
    Version,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) | None => {
            println!(
                "{} {}",
                buckley_bridge::dispatcher::SERVER_NAME,
                buckley_bridge::dispatcher::SERVER_VERSION
            );
        }
        Some(Commands::Serve { config }) => run_serve(config),
    }
}

#[tokio::main]
async fn run_serve(config_path: Option<PathBuf>) {
    // CRITICAL: stdout carries LSP JSON-RPC traffic; all logging goes to
    // stderr. Configure verbosity via RUST_LOG (e.g. RUST_LOG=buckley_bridge=debug).
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let config = match buckley_bridge::config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let bridge = Bridge::new(config.coordinator.endpoint.clone());

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();

    // Dedicated writer task: the framing layer is not safe for concurrent
    // writers, so every reply and notification is funneled through this one
    // channel and written out in the order it was produced.
    let writer_task = tokio::spawn(async move {
        let mut writer = FramingWriter::new(stdout());
        while let Some(envelope) = outbound_rx.recv().await {
            if let Err(e) = writer.write_message(&envelope).await {
                error!("failed to write framed message: {e}");
                break;
            }
        }
    });

    // Dedicated reader task: reads one framed message at a time and hands
    // each off to the bridge. `buckley/streamQuery` and similar long-running
    // work are spawned onto their own tasks internally by `handle_envelope`
    // so the reader keeps pumping the stdin stream.
    let reader_bridge = Arc::clone(&bridge);
    let reader_tx = outbound_tx.clone();
    let reader_task = tokio::spawn(async move {
        let mut reader = FramingReader::new(stdin());
        loop {
            match reader.read_message().await {
                Ok(Some(envelope)) => {
                    let bridge = Arc::clone(&reader_bridge);
                    let tx = reader_tx.clone();
                    tokio::spawn(async move {
                        bridge.handle_envelope(envelope, tx).await;
                    });
                }
                Ok(None) => {
                    info!("editor closed the input stream");
                    break;
                }
                Err(BridgeError::Parse(e)) => {
                    // The message was fully framed (Content-Length parsed,
                    // body read in full) but the body wasn't valid JSON-RPC,
                    // so the stream itself is still in a readable state.
                    // Spec §7: parse errors "reply with parse-error (-32700)
                    // when possible" rather than tearing down the connection.
                    error!("parse error on editor stream: {e}");
                    let reply = Envelope::response_err(
                        RequestId::Null,
                        RpcError::new(jsonrpc_code::PARSE_ERROR, format!("parse error: {e}")),
                    );
                    let _ = reader_tx.send(reply);
                }
                Err(e) => {
                    error!("framing error on editor stream: {e}");
                    break;
                }
            }
        }
    });
    drop(outbound_tx);

    let http_state = AppState {
        bridge: Arc::clone(&bridge),
        view_state_provider: None,
    };
    let app = router(http_state);

    let bind = config.http.bind.clone();
    let listener = match TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind HTTP shim on {bind}: {e}");
            std::process::exit(1);
        }
    };
    info!("HTTP shim listening on {bind}");

    tokio::select! {
        _ = reader_task => {}
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("HTTP shim exited: {e}");
            }
        }
    }

    writer_task.abort();
}
