//! Framing Codec (spec §4.1).
//!
//! Reads and writes `Content-Length`-delimited JSON-RPC messages over a
//! caller-provided duplex byte stream. Grounded on the LSP-style
//! `Content-Length` header loop used throughout the retrieval pack's
//! JSON-RPC transports (e.g. `jsonrpc::transport::StdioTransport`).

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::BridgeError;
use crate::model::Envelope;

/// Reads one framed JSON-RPC message at a time from an `AsyncBufRead`
/// source.
pub struct FramingReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FramingReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read one message: header block, blank line, then exactly
    /// `Content-Length` bytes of JSON body.
    ///
    /// Returns `Ok(None)` on a clean EOF before any header line is read
    /// (i.e. the peer closed the stream between messages).
    pub async fn read_message(&mut self) -> Result<Option<Envelope>, BridgeError> {
        let mut content_length: Option<usize> = None;
        let mut saw_any_header = false;

        loop {
            let mut line = String::new();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(BridgeError::Io)?;

            if bytes_read == 0 {
                if saw_any_header {
                    return Err(BridgeError::Framing(
                        "connection closed mid-header".into(),
                    ));
                }
                return Ok(None);
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            saw_any_header = true;

            let (name, value) = line.split_once(':').ok_or_else(|| {
                BridgeError::Framing(format!("malformed header line: {line:?}"))
            })?;
            let name = name.trim();
            let value = value.trim();

            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.parse::<usize>().map_err(|_| {
                    BridgeError::Framing(format!("non-integer Content-Length: {value:?}"))
                })?);
            }
            // Other headers (e.g. Content-Type) are tolerated and discarded.
        }

        let content_length = content_length
            .ok_or_else(|| BridgeError::Framing("missing Content-Length header".into()))?;

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(|e| BridgeError::Framing(format!("short body: {e}")))?;

        Envelope::from_json(&body).map(Some)
    }
}

/// Writes framed JSON-RPC messages to an `AsyncWrite` sink. Not safe for
/// concurrent writers; the caller must serialize writes (spec §4.1, §5).
pub struct FramingWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FramingWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one message: marshal the envelope, default-filling the
    /// version string, then emit `Content-Length: N\r\n\r\n` followed by
    /// the body.
    pub async fn write_message(&mut self, envelope: &Envelope) -> Result<(), BridgeError> {
        let body = serde_json::to_vec(&envelope.to_json())
            .map_err(|e| BridgeError::Parse(e.to_string()))?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer
            .write_all(header.as_bytes())
            .await
            .map_err(BridgeError::Io)?;
        self.writer.write_all(&body).await.map_err(BridgeError::Io)?;
        self.writer.flush().await.map_err(BridgeError::Io)?;
        Ok(())
    }
}
