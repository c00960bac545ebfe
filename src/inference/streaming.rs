//! Response-body decoders for streaming generation.
//!
//! Two wire shapes are accepted:
//! - **SSE** (`Content-Type: text/event-stream`): events separated by a blank
//!   line, `data:` payloads decoded as [`StreamPayload`], `[DONE]` terminator.
//! - **Plain text**: every body chunk is a UTF-8 text delta. A multi-byte
//!   character split across two chunks is carried over to the next one.
//!
//! Both decoders yield text *deltas*; accumulation into the cumulative
//! message text happens in the orchestrator.

use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::StreamPayload;

// ─── SSE ─────────────────────────────────────────────────────────────────────

/// Decode an SSE byte stream into text deltas.
///
/// Keep-alive comments, empty events and payloads without text are skipped.
/// A malformed payload yields one `StreamError` and ends the stream.
pub fn parse_sse_stream<S, B, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<String, InferenceError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(byte_stream),
        buffer: Vec::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            // Drain complete events already buffered
            if let Some(end) = find_event_boundary(&state.buffer) {
                let event: Vec<u8> = state.buffer.drain(..end + 2).collect();
                match process_event(&event[..end]) {
                    EventOutcome::Delta(text) => return Some((Ok(text), state)),
                    EventOutcome::Skip => continue,
                    EventOutcome::Done => {
                        state.done = true;
                        return None;
                    }
                    EventOutcome::Failed(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                }
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state
                        .buffer
                        .extend(chunk.as_ref().iter().copied().filter(|b| *b != b'\r'));
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((
                        Err(InferenceError::StreamError {
                            reason: format!("stream read error: {e}"),
                        }),
                        state,
                    ));
                }
                None => {
                    // Body closed; a trailing event may lack its blank line
                    state.done = true;
                    let rest = std::mem::take(&mut state.buffer);
                    if rest.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    return match process_event(&rest) {
                        EventOutcome::Delta(text) => Some((Ok(text), state)),
                        EventOutcome::Failed(e) => Some((Err(e), state)),
                        EventOutcome::Skip | EventOutcome::Done => None,
                    };
                }
            }
        }
    })
}

struct SseState<B, E> {
    bytes: Pin<Box<dyn Stream<Item = Result<B, E>> + Send>>,
    buffer: Vec<u8>,
    done: bool,
}

enum EventOutcome {
    Delta(String),
    Skip,
    Done,
    Failed(InferenceError),
}

fn find_event_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Process a single SSE event (may contain several `data:` lines).
fn process_event(event: &[u8]) -> EventOutcome {
    let text = match std::str::from_utf8(event) {
        Ok(t) => t,
        Err(e) => {
            return EventOutcome::Failed(InferenceError::StreamError {
                reason: format!("SSE event is not valid UTF-8: {e}"),
            })
        }
    };

    let mut data_lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            if data.trim() == "[DONE]" {
                return EventOutcome::Done;
            }
            data_lines.push(data);
        }
        // Ignore comments, `event:` and `id:` lines
    }

    if data_lines.is_empty() {
        return EventOutcome::Skip;
    }
    let data = data_lines.join("\n");
    if data.trim().is_empty() {
        return EventOutcome::Skip;
    }

    match serde_json::from_str::<StreamPayload>(&data) {
        Ok(payload) => match payload.into_delta() {
            Some(delta) => EventOutcome::Delta(delta),
            None => EventOutcome::Skip,
        },
        Err(e) => EventOutcome::Failed(InferenceError::StreamError {
            reason: format!("failed to parse SSE chunk: {e} (data: {data})"),
        }),
    }
}

// ─── Plain text ──────────────────────────────────────────────────────────────

/// Decode a raw chunked text body into text deltas.
pub fn parse_text_stream<S, B, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<String, InferenceError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = TextState {
        bytes: Box::pin(byte_stream),
        carry: Vec::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.carry.extend_from_slice(chunk.as_ref());
                    if let Some(text) = take_valid_utf8(&mut state.carry) {
                        return Some((Ok(text), state));
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((
                        Err(InferenceError::StreamError {
                            reason: format!("stream read error: {e}"),
                        }),
                        state,
                    ));
                }
                None => {
                    state.done = true;
                    if state.carry.is_empty() {
                        return None;
                    }
                    let rest = String::from_utf8_lossy(&state.carry).into_owned();
                    state.carry.clear();
                    return Some((Ok(rest), state));
                }
            }
        }
    })
}

struct TextState<B, E> {
    bytes: Pin<Box<dyn Stream<Item = Result<B, E>> + Send>>,
    carry: Vec<u8>,
    done: bool,
}

/// Split off the longest valid UTF-8 prefix of `carry`.
///
/// An incomplete trailing sequence stays in `carry`; genuinely invalid bytes
/// are replaced with U+FFFD so the stream keeps moving.
fn take_valid_utf8(carry: &mut Vec<u8>) -> Option<String> {
    let valid_up_to = match std::str::from_utf8(carry) {
        Ok(_) => carry.len(),
        Err(e) if e.error_len().is_some() => {
            let text = String::from_utf8_lossy(carry).into_owned();
            carry.clear();
            return Some(text);
        }
        Err(e) => e.valid_up_to(),
    };
    if valid_up_to == 0 {
        return None;
    }
    let tail = carry.split_off(valid_up_to);
    let head = std::mem::replace(carry, tail);
    String::from_utf8(head).ok()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Vec<u8>, String>> + Send + 'static {
        let owned: Vec<Result<Vec<u8>, String>> = parts.iter().map(|p| Ok(p.to_vec())).collect();
        stream::iter(owned)
    }

    async fn collect_sse(parts: &[&[u8]]) -> Vec<Result<String, InferenceError>> {
        parse_sse_stream(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn test_sse_openai_chunks_and_done() {
        let body: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
data: [DONE]\n\n";
        let out = collect_sse(&[body]).await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_sse_event_split_across_chunks() {
        let out = collect_sse(&[b"data: {\"tex", b"t\":\"abc\"}\n", b"\ndata: {\"text\":\"d\"}\n\n"]).await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["abc", "d"]);
    }

    #[tokio::test]
    async fn test_sse_crlf_and_keepalive() {
        let out = collect_sse(&[b": ping\r\n\r\ndata: {\"delta\":\"x\"}\r\n\r\n"]).await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["x"]);
    }

    #[tokio::test]
    async fn test_sse_trailing_event_without_blank_line() {
        let out = collect_sse(&[b"data: {\"text\":\"tail\"}"]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "tail");
    }

    #[tokio::test]
    async fn test_sse_empty_body_yields_nothing() {
        let out = collect_sse(&[]).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_sse_malformed_payload_ends_stream() {
        let out = collect_sse(&[b"data: {not json}\n\ndata: {\"text\":\"never\"}\n\n"]).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(InferenceError::StreamError { .. })));
    }

    #[tokio::test]
    async fn test_sse_read_error_is_reported() {
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"text\":\"a\"}\n\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        let out: Vec<_> = parse_sse_stream(stream::iter(parts)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "a");
        match &out[1] {
            Err(InferenceError::StreamError { reason }) => assert!(reason.contains("connection reset")),
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_stream_passes_chunks_through() {
        let out: Vec<_> = parse_text_stream(chunks(&[b"Hello, ", b"world"])).collect().await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hello, ", "world"]);
    }

    #[tokio::test]
    async fn test_text_stream_carries_split_multibyte() {
        // '═' is U+2550, encoded as 0xE2 0x95 0x90
        let out: Vec<_> = parse_text_stream(chunks(&[b"a\xE2\x95", b"\x90b"])).collect().await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts.concat(), "a═b");
        assert_eq!(texts[0], "a");
    }

    #[tokio::test]
    async fn test_text_stream_empty_body() {
        let out: Vec<_> = parse_text_stream(chunks(&[])).collect().await;
        assert!(out.is_empty());
    }

    #[test]
    fn test_take_valid_utf8_invalid_bytes_replaced() {
        let mut carry = vec![b'a', 0xFF, b'b'];
        let text = take_valid_utf8(&mut carry).unwrap();
        assert_eq!(text, "a\u{FFFD}b");
        assert!(carry.is_empty());
    }
}
