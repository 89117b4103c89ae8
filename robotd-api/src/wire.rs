//! Newline-delimited JSON framing used on every worker's client
//! socket, plus the small set of envelope shapes the wire protocol
//! mandates.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::Result;

/// The outcome of reading one frame: a decoded value, a closed
/// connection, or a single malformed line that the caller should log
/// and otherwise ignore without treating the connection as closed or
/// dispatching it anywhere.
pub enum Frame {
    Value(Value),
    Closed,
    Malformed(String),
}

/// Reads one newline-delimited JSON frame from `reader`.
///
/// A clean EOF, and a partial final line with no trailing newline
/// (the peer went away mid-write), both report [`Frame::Closed`] —
/// from the multiplexer's point of view the connection is gone
/// either way. A complete line that isn't valid JSON reports
/// [`Frame::Malformed`] instead, so the caller can keep the
/// connection open rather than tearing it down over one bad line.
///
/// `reader` must be a buffered reader (`tokio::io::BufReader` wrapping
/// the connection's read half); this function is called repeatedly on
/// the same reader so that bytes past the first frame in one `read()`
/// stay buffered for the next call instead of being discarded.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;

    if n == 0 || !line.ends_with('\n') {
        return Ok(Frame::Closed);
    }

    match serde_json::from_str(line.trim_end_matches('\n')) {
        Ok(value) => Ok(Frame::Value(value)),
        Err(e) => {
            trace!(reason = %e, "received malformed client frame");
            Ok(Frame::Malformed(e.to_string()))
        }
    }
}

/// Writes one value as a newline-delimited JSON frame to `writer`.
pub async fn write_frame<W>(writer: &mut W, value: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = serde_json::to_vec(value)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    Ok(())
}

/// Wraps a driver's non-empty `command()` reply in the
/// `{"response": <value>}` envelope the wire protocol specifies.
pub fn response_envelope(value: Value) -> Value {
    serde_json::json!({ "response": value })
}

/// Stamps `"broadcast": true` onto a driver-supplied status payload
/// before it goes out to every connected client. The payload is
/// expected to be a JSON object, matching every built-in driver's
/// status shape; non-object values are wrapped so the marker can
/// still be attached.
pub fn broadcast_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert(String::from("broadcast"), Value::Bool(true));
            Value::Object(map)
        }
        other => serde_json::json!({ "value": other, "broadcast": true }),
    }
}

// Re-exported so callers only need `robotd_api::wire::*` plus the
// buffered-reader bound, without a direct `tokio` dependency on the
// marker trait's path.
pub use tokio::io::AsyncBufRead;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_multiple_frames_from_one_buffer() {
        let data = b"{\"a\":1}\n{\"b\":2}\n".to_vec();
        let mut reader = BufReader::new(&data[..]);

        let first = read_frame(&mut reader).await.unwrap();
        let second = read_frame(&mut reader).await.unwrap();
        let third = read_frame(&mut reader).await.unwrap();

        assert!(matches!(first, Frame::Value(v) if v == serde_json::json!({"a": 1})));
        assert!(matches!(second, Frame::Value(v) if v == serde_json::json!({"b": 2})));
        assert!(matches!(third, Frame::Closed));
    }

    #[tokio::test]
    async fn malformed_line_does_not_close_connection() {
        let data = b"not json\n{\"ok\":true}\n".to_vec();
        let mut reader = BufReader::new(&data[..]);

        let first = read_frame(&mut reader).await.unwrap();
        let second = read_frame(&mut reader).await.unwrap();

        assert!(matches!(first, Frame::Malformed(_)));
        assert!(matches!(second, Frame::Value(v) if v == serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn partial_final_line_reports_closed() {
        let data = b"{\"a\":1}".to_vec();
        let mut reader = BufReader::new(&data[..]);

        let frame = read_frame(&mut reader).await.unwrap();

        assert!(matches!(frame, Frame::Closed));
    }

    #[tokio::test]
    async fn write_frame_appends_newline() {
        let mut buf: Vec<u8> = Vec::new();

        write_frame(&mut buf, &serde_json::json!({"x": true}))
            .await
            .unwrap();

        assert_eq!(buf, b"{\"x\":true}\n");
    }

    #[test]
    fn broadcast_envelope_adds_marker() {
        let msg = broadcast_envelope(serde_json::json!({"markers": []}));

        assert_eq!(msg, serde_json::json!({"markers": [], "broadcast": true}));
    }

    #[test]
    fn response_envelope_wraps_value() {
        let msg = response_envelope(serde_json::json!({"m0": 0.5}));

        assert_eq!(msg, serde_json::json!({"response": {"m0": 0.5}}));
    }
}
