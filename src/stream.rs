use crate::error::{OculusError, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;

/// One non-empty piece of generated text, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFragment(String);

impl StreamFragment {
    /// Returns `None` for empty text; such deltas carry nothing to render.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() { None } else { Some(Self(text)) }
    }

    /// Returns the fragment text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded server-sent event relevant to chat completions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// The payload of a `data:` line.
    Data(String),
    /// The `[DONE]` terminator.
    Done,
}

/// Incremental decoder for a `text/event-stream` body.
///
/// Bytes are buffered until a full line is available, so events and UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Creates a decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that was not terminated by a newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line)
    }

    fn parse_line(line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);

        // blank lines separate events, ':' starts a comment
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data.trim() == "[DONE]" {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(data.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

/// Decodes one `data:` payload into its text fragment, if it carries one.
pub fn decode_chunk(data: &str) -> Result<Option<StreamFragment>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;

    if let Some(error) = chunk.error {
        return Err(OculusError::Provider {
            status: 200,
            body: error.message,
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .and_then(StreamFragment::new))
}

/// Turns a streamed response body into the sequence of text fragments it
/// carries. The sequence ends at `[DONE]` or at the end of the body, and
/// stops at the first error.
pub fn fragments<S, B, E>(body: S) -> impl Stream<Item = Result<StreamFragment>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    OculusError: From<E>,
{
    try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();
        let mut done = false;

        while !done {
            let Some(chunk) = body.next().await else {
                break;
            };
            let chunk = chunk?;

            for event in decoder.push(chunk.as_ref()) {
                match event {
                    SseEvent::Done => {
                        done = true;
                        break;
                    }
                    SseEvent::Data(data) => {
                        if let Some(fragment) = decode_chunk(&data)? {
                            yield fragment;
                        }
                    }
                }
            }
        }

        if !done {
            if let Some(SseEvent::Data(data)) = decoder.finish() {
                if let Some(fragment) = decode_chunk(&data)? {
                    yield fragment;
                }
            }
        }

        log::debug!("Fragment stream finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": text } }] })
        )
    }

    #[test]
    fn decoder_handles_split_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(
            decoder.push(b":1}\r\n\n: keep-alive\n"),
            vec![SseEvent::Data("{\"a\":1}".to_string())]
        );
        assert_eq!(decoder.push(b"data: [DONE]\n"), vec![SseEvent::Done]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decoder_keeps_multibyte_characters_intact() {
        let mut decoder = SseDecoder::new();
        let line = "data: señal ▌\n".as_bytes();
        let (head, tail) = line.split_at(9);
        assert!(decoder.push(head).is_empty());
        assert_eq!(
            decoder.push(tail),
            vec![SseEvent::Data("señal ▌".to_string())]
        );
    }

    #[test]
    fn decoder_ignores_other_fields() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: message\nid: 7\nretry: 10\n").is_empty());
    }

    #[test]
    fn empty_and_missing_deltas_yield_nothing() {
        assert_eq!(decode_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(), None);
        assert_eq!(decode_chunk(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap(), None);
        assert_eq!(decode_chunk(r#"{"choices":[]}"#).unwrap(), None);
        assert_eq!(
            decode_chunk(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap(),
            StreamFragment::new("hi")
        );
    }

    #[test]
    fn error_payload_is_a_provider_error() {
        let err = decode_chunk(r#"{"error":{"message":"quota exceeded"}}"#).unwrap_err();
        assert!(matches!(err, OculusError::Provider { ref body, .. } if body == "quota exceeded"));
    }

    #[test]
    fn malformed_chunk_is_an_error() {
        assert!(matches!(
            decode_chunk("{not json").unwrap_err(),
            OculusError::MalformedChunk(_)
        ));
    }

    #[tokio::test]
    async fn fragments_preserve_order_and_stop_at_done() {
        let body = format!(
            "{}{}{}data: [DONE]\n\n{}",
            chunk("A "),
            chunk("red "),
            chunk("square."),
            chunk("ignored")
        );
        // split the body at awkward offsets
        let bytes = body.into_bytes();
        let pieces: Vec<std::result::Result<Vec<u8>, OculusError>> =
            bytes.chunks(7).map(|c| Ok(c.to_vec())).collect();

        let collected: Vec<StreamFragment> = fragments(futures::stream::iter(pieces))
            .try_collect()
            .await
            .unwrap();
        let texts: Vec<&str> = collected.iter().map(StreamFragment::as_str).collect();
        assert_eq!(texts, vec!["A ", "red ", "square."]);
    }

    #[tokio::test]
    async fn unterminated_last_line_is_flushed() {
        let body = chunk("tail");
        let body = body.trim_end().to_string();
        let pieces = vec![Ok::<_, OculusError>(body.into_bytes())];
        let collected: Vec<StreamFragment> = fragments(futures::stream::iter(pieces))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(collected, vec![StreamFragment::new("tail").unwrap()]);
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream() {
        let pieces = vec![
            Ok(chunk("partial").into_bytes()),
            Err(OculusError::Cancelled),
            Ok(chunk("never").into_bytes()),
        ];
        let mut stream = Box::pin(fragments(futures::stream::iter(pieces)));
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            StreamFragment::new("partial").unwrap()
        );
        assert!(matches!(stream.next().await, Some(Err(OculusError::Cancelled))));
        assert!(stream.next().await.is_none());
    }
}
