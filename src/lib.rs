//! Agent Communication Bridge: LSP lifecycle, HTTP shim, and streaming
//! multiplexer connecting an editor to the coordinator that hosts AI
//! coding agents.

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod framing;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod multiplexer;
pub mod proto;
pub mod text_edit;

pub use bridge::Bridge;
pub use error::{BridgeError, BridgeResult};
