//! Server-sent event parsing for streamed chat completions.

use crate::api::ChatResponse;
use crate::core::error::ClientError;
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use std::error::Error as StdError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const DONE_SENTINEL: &str = "[DONE]";

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Outcome of feeding one line to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    Continue,
    Done,
}

/// Running state of one streamed response.
///
/// Text deltas are appended as they arrive. The last frame carrying
/// citations or usage is kept whole and reported once the stream ends.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    trailer: Option<ChatResponse>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn trailer(&self) -> Option<&ChatResponse> {
        self.trailer.as_ref()
    }

    /// Handle one trimmed line. Lines that are blank, carry no `data:`
    /// payload, or do not decode are skipped.
    pub fn process_line(&mut self, line: &str, on_chunk: &mut impl FnMut(&str)) -> LineStatus {
        let line = line.trim();
        if line.is_empty() {
            return LineStatus::Continue;
        }
        let Some(payload) = extract_data_payload(line) else {
            trace!(line, "ignoring non-data line");
            return LineStatus::Continue;
        };
        if payload == DONE_SENTINEL {
            return LineStatus::Done;
        }

        let frame = match serde_json::from_str::<ChatResponse>(payload) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, "skipping malformed stream frame");
                return LineStatus::Continue;
            }
        };

        if let Some(text) = frame.delta_content() {
            on_chunk(text);
            self.content.push_str(text);
        }
        if frame.has_metadata() {
            self.trailer = Some(frame);
        }
        LineStatus::Continue
    }

    pub fn finish(self) -> (String, Option<ChatResponse>) {
        (self.content, self.trailer)
    }
}

/// Split complete lines off the front of `buffer` and feed them to `acc`.
/// Leaves any trailing partial line in place.
fn drain_lines(
    buffer: &mut Vec<u8>,
    acc: &mut StreamAccumulator,
    on_chunk: &mut impl FnMut(&str),
) -> LineStatus {
    while let Some(newline) = memchr(b'\n', buffer) {
        let status = match std::str::from_utf8(&buffer[..newline]) {
            Ok(line) => acc.process_line(line, on_chunk),
            Err(err) => {
                debug!(error = %err, "skipping stream line with invalid UTF-8");
                LineStatus::Continue
            }
        };
        buffer.drain(..=newline);
        if status == LineStatus::Done {
            return LineStatus::Done;
        }
    }
    LineStatus::Continue
}

/// Consume an event stream until `[DONE]`, end of body, an I/O failure, or
/// cancellation.
///
/// `on_chunk` sees each non-empty text delta in order. `on_done` runs once,
/// with the last metadata frame, and only if one arrived. Returns the full
/// accumulated text.
pub async fn read_event_stream<S, B, E>(
    mut body: S,
    cancel: &CancellationToken,
    mut on_chunk: impl FnMut(&str),
    on_done: impl FnOnce(&ChatResponse),
) -> Result<String, ClientError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    let mut acc = StreamAccumulator::new();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            next = body.next() => next,
        };
        match next {
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(bytes.as_ref());
                if drain_lines(&mut buffer, &mut acc, &mut on_chunk) == LineStatus::Done {
                    break;
                }
            }
            Some(Err(err)) => return Err(ClientError::Stream(err.into())),
            None => {
                if !buffer.is_empty() {
                    if let Ok(line) = std::str::from_utf8(&buffer) {
                        acc.process_line(line, &mut on_chunk);
                    }
                }
                break;
            }
        }
    }

    let (content, trailer) = acc.finish();
    if let Some(trailer) = trailer {
        on_done(&trailer);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::io;

    type Frame = Result<Vec<u8>, io::Error>;
    type Outcome = Result<String, ClientError>;

    fn frames(parts: &[&str]) -> Vec<Frame> {
        parts
            .iter()
            .map(|part| Ok(part.as_bytes().to_vec()))
            .collect()
    }

    async fn collect(parts: Vec<Frame>) -> (Outcome, Vec<String>, Option<ChatResponse>) {
        let mut chunks = Vec::new();
        let mut done = None;
        let result = read_event_stream(
            stream::iter(parts),
            &CancellationToken::new(),
            |text| chunks.push(text.to_string()),
            |trailer| done = Some(trailer.clone()),
        )
        .await;
        (result, chunks, done)
    }

    #[tokio::test]
    async fn deltas_and_trailer_are_reported() {
        let (result, chunks, done) = collect(frames(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n",
            "data: {\"citations\":[\"https://example.com\"],\"usage\":{\"total_tokens\":10}}\n",
            "data: [DONE]\n",
        ]))
        .await;

        assert_eq!(result.unwrap(), "Hello world");
        assert_eq!(chunks, vec!["Hello", " world"]);
        let trailer = done.expect("trailer reported");
        assert_eq!(trailer.citations, vec!["https://example.com"]);
        assert_eq!(trailer.usage.total_tokens, 10);
    }

    #[tokio::test]
    async fn frames_split_across_reads_are_reassembled() {
        let (result, chunks, _) = collect(frames(&[
            "data: {\"choices\":[{\"del",
            "ta\":{\"content\":\"Hel\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}",
            "\n\ndata: [DONE]\n\n",
        ]))
        .await;
        assert_eq!(result.unwrap(), "Hello");
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn done_callback_is_skipped_without_metadata() {
        let (result, chunks, done) = collect(frames(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
            "data: [DONE]\n",
        ]))
        .await;
        assert_eq!(result.unwrap(), "Hi");
        assert_eq!(chunks, vec!["Hi"]);
        assert!(done.is_none());
    }

    #[tokio::test]
    async fn last_metadata_frame_wins() {
        let (_, _, done) = collect(frames(&[
            "data: {\"citations\":[\"https://first.example\"]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}],\
             \"citations\":[\"https://second.example\"],\"usage\":{\"total_tokens\":4}}\n",
            "data: [DONE]\n",
        ]))
        .await;
        let trailer = done.unwrap();
        assert_eq!(trailer.citations, vec!["https://second.example"]);
        assert_eq!(trailer.usage.total_tokens, 4);
    }

    #[tokio::test]
    async fn malformed_and_foreign_lines_are_skipped() {
        let (result, chunks, _) = collect(frames(&[
            ": keep-alive\n",
            "event: message\n",
            "data: {not json}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            "data: [DONE]\n",
        ]))
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(chunks, vec!["ok"]);
    }

    #[tokio::test]
    async fn end_of_body_without_sentinel_still_completes() {
        let (result, chunks, done) = collect(frames(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
            "data: {\"usage\":{\"total_tokens\":2}}",
        ]))
        .await;
        assert_eq!(result.unwrap(), "partial");
        assert_eq!(chunks, vec!["partial"]);
        assert_eq!(done.unwrap().usage.total_tokens, 2);
    }

    #[tokio::test]
    async fn read_errors_propagate() {
        let parts: Vec<Frame> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
        ];
        let (result, chunks, done) = collect(parts).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ClientError::Stream(_)));
        assert!(err.to_string().contains("peer reset"));
        assert_eq!(chunks, vec!["a"]);
        assert!(done.is_none());
    }

    #[tokio::test]
    async fn cancellation_stops_reading() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = read_event_stream(
            stream::pending::<Frame>(),
            &cancel,
            |_| {},
            |_| {},
        )
        .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn sentinel_ends_processing() {
        let mut acc = StreamAccumulator::new();
        let mut noop = |_: &str| {};
        assert_eq!(
            acc.process_line("data: [DONE]", &mut noop),
            LineStatus::Done
        );
        assert_eq!(acc.process_line("data:[DONE]", &mut noop), LineStatus::Done);
        assert_eq!(acc.process_line("", &mut noop), LineStatus::Continue);
        assert!(acc.content().is_empty());
        assert!(acc.trailer().is_none());
    }
}
