use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, trace, warn};

use super::event::{StreamEvent, WireFrame};
use super::transport::{ByteStream, TransportError};

const FRAME_BOUNDARY: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data: ";

pub type EventStream = BoxStream<'static, Result<StreamEvent, TransportError>>;

/// Incremental decoder for the `data: <json>\n\n` framing used by the
/// generation endpoint.
///
/// Bytes are buffered rather than text so that a UTF-8 sequence split across
/// two chunks is decoded whole. One decoder serves one response body.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Offset up to which `buffer` is known to hold no boundary.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the events of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.next_boundary() {
            let frame: Vec<u8> = self.buffer.drain(..end + FRAME_BOUNDARY.len()).collect();
            self.scanned = 0;
            if let Some(event) = parse_frame(&frame[..end]) {
                events.push(event);
            }
        }
        events
    }

    fn next_boundary(&mut self) -> Option<usize> {
        // A boundary may straddle the previous scan end by one byte.
        let start = self.scanned.saturating_sub(FRAME_BOUNDARY.len() - 1);
        let found = self.buffer[start..]
            .windows(FRAME_BOUNDARY.len())
            .position(|w| w == FRAME_BOUNDARY)
            .map(|pos| start + pos);
        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }

    /// End of input. A trailing partial frame is dropped.
    pub fn finish(self) {
        if !self.buffer.iter().all(u8::is_ascii_whitespace) {
            debug!(
                bytes = self.buffer.len(),
                "Discarding incomplete frame at end of stream"
            );
        }
    }
}

fn parse_frame(frame: &[u8]) -> Option<StreamEvent> {
    let text = String::from_utf8_lossy(frame);
    let payload: Vec<&str> = text
        .split('\n')
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .collect();

    if payload.is_empty() {
        trace!(frame = %text, "Frame without data line");
        return None;
    }

    let payload = payload.join("\n");
    match serde_json::from_str::<WireFrame>(&payload) {
        Ok(frame) => Some(frame.into()),
        Err(e) => {
            warn!(error = %e, payload = %payload, "Skipping undecodable stream frame");
            None
        }
    }
}

/// Lift a byte stream into an event stream. A read error is yielded once and
/// ends the stream.
pub fn decode_stream(mut bytes: ByteStream) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.push(&chunk) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        decoder.finish();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn content(text: &str) -> StreamEvent {
        StreamEvent::Content {
            text: text.to_string(),
        }
    }

    fn sample_body() -> String {
        [
            r#"data: {"type":"metadata","conversation_id":"c-9"}"#,
            r#"data: {"type":"content","content":"Hel"}"#,
            r#"data: {"type":"content","content":"lo, wörld"}"#,
            r#"data: {"type":"error","detail":"tool timed out"}"#,
            r#"data: {"type":"content","content":"!"}"#,
        ]
        .iter()
        .map(|f| format!("{}\n\n", f))
        .collect()
    }

    fn expected_events() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Metadata {
                conversation_id: Some("c-9".to_string()),
            },
            content("Hel"),
            content("lo, wörld"),
            StreamEvent::Error {
                detail: "tool timed out".to_string(),
            },
            content("!"),
        ]
    }

    #[test]
    fn test_whole_body_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(sample_body().as_bytes()), expected_events());
    }

    #[test]
    fn test_every_two_way_split_yields_same_events() {
        let body = sample_body().into_bytes();
        for cut in 0..=body.len() {
            let mut decoder = FrameDecoder::new();
            let mut events = decoder.push(&body[..cut]);
            events.extend(decoder.push(&body[cut..]));
            assert_eq!(events, expected_events(), "split at byte {}", cut);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let body = sample_body().into_bytes();
        let mut decoder = FrameDecoder::new();
        let events: Vec<_> = body.iter().flat_map(|b| decoder.push(&[*b])).collect();
        assert_eq!(events, expected_events());
    }

    #[test]
    fn test_uneven_chunks() {
        let body = sample_body().into_bytes();
        for size in [3, 5, 7, 11, 64] {
            let mut decoder = FrameDecoder::new();
            let events: Vec<_> = body.chunks(size).flat_map(|c| decoder.push(c)).collect();
            assert_eq!(events, expected_events(), "chunk size {}", size);
        }
    }

    #[test]
    fn test_malformed_frame_between_valid_frames() {
        let body = concat!(
            "data: {\"type\":\"content\",\"content\":\"a\"}\n\n",
            "data: {\"type\":\"content\",\"content\":\n\n",
            "data: {\"type\":\"content\",\"content\":\"b\"}\n\n",
        );
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec![content("a"), content("b")]);
    }

    #[test]
    fn test_unknown_type_and_comment_frames_are_skipped() {
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"type\":\"usage\",\"tokens\":5}\n\n",
            "event: message\ndata: {\"type\":\"content\",\"content\":\"x\"}\n\n",
        );
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec![content("x")]);
    }

    #[test]
    fn test_trailing_partial_frame_is_held_then_dropped() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"content\",\"content\":\"a\"}\n\ndata: {\"type\":\"con");
        assert_eq!(events, vec![content("a")]);
        decoder.finish();
    }

    #[test]
    fn test_split_multibyte_character() {
        let body = "data: {\"type\":\"content\",\"content\":\"ü\"}\n\n".as_bytes();
        let split = body.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        let mut events = decoder.push(&body[..split]);
        events.extend(decoder.push(&body[split..]));
        assert_eq!(events, vec![content("ü")]);
    }

    #[test]
    fn test_metadata_and_error_shapes() {
        let body = concat!(
            "data: {\"type\":\"metadata\",\"conversation_id\":42}\n\n",
            "data: {\"type\":\"metadata\"}\n\n",
            "data: {\"type\":\"error\",\"detail\":{\"code\":\"rate_limited\"}}\n\n",
        );
        let mut decoder = FrameDecoder::new();
        assert_eq!(
            decoder.push(body.as_bytes()),
            vec![
                StreamEvent::Metadata {
                    conversation_id: Some("42".to_string())
                },
                StreamEvent::Metadata {
                    conversation_id: None
                },
                StreamEvent::Error {
                    detail: r#"{"code":"rate_limited"}"#.to_string()
                },
            ]
        );
    }

    #[test]
    fn test_multiple_data_lines_are_joined() {
        let body = "data: {\"type\":\"content\",\ndata: \"content\":\"joined\"}\n\n";
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(body.as_bytes()), vec![content("joined")]);
    }

    #[tokio::test]
    async fn test_decode_stream_stops_after_read_error() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",\"content\":\"a\"}\n\n")),
            Err(TransportError::Read("connection reset".to_string())),
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",\"content\":\"b\"}\n\n")),
        ];
        let events: Vec<_> = decode_stream(futures::stream::iter(chunks).boxed())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &content("a"));
        assert!(matches!(events[1], Err(TransportError::Read(_))));
    }
}
