//! Chat-completion chunk streams
//!
//! Two producers share the chunk format: synthetic streams answer slash
//! commands and error messages locally, and the relay forwards a backend
//! SSE stream verbatim before appending the source-attribution chunk and
//! the `[DONE]` sentinel. Relay order is exactly upstream order; the
//! trailer is emitted strictly after the last upstream event.

use axum::response::sse::{Event, Sse};
use bytes::Bytes;
use futures::{future, stream, Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Terminal sentinel line of every stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Model name stamped on locally produced chunks
const SYNTHETIC_MODEL: &str = "generic";

/// Pause between synthetic chunks; observable but not contractual
const INTER_CHUNK_DELAY: Duration = Duration::from_millis(10);

/// Introduces the source attributions appended after a completion
pub const SOURCES_SEPARATOR: &str = "\n\n---\nSources:\n";

/// Fresh `chatcmpl-` id with 24 hex characters
pub fn completion_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..24])
}

/// Build one chat-completion-chunk object
pub fn completion_chunk(id: &str, content: &str, finish_reason: Option<&str>) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": chrono::Utc::now().timestamp(),
        "model": SYNTHETIC_MODEL,
        "choices": [{
            "index": 0,
            "delta": { "content": content },
            "finish_reason": finish_reason,
        }],
    })
}

/// Stream `text` as locally built chat-completion chunks.
///
/// The text is split by lines (line endings kept), one chunk per line with
/// a trailing space, `finish_reason` set to `stop` on the last chunk only,
/// then the `[DONE]` sentinel.
pub fn synthetic_sse(text: &str) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = completion_id();
    let lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    let count = lines.len();

    let chunks: Vec<Value> = lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let finish = if i + 1 == count { Some("stop") } else { None };
            completion_chunk(&id, &format!("{line} "), finish)
        })
        .collect();

    let events = stream::iter(chunks.into_iter().enumerate()).then(|(i, chunk)| async move {
        if i > 0 {
            tokio::time::sleep(INTER_CHUNK_DELAY).await;
        }
        Ok::<_, Infallible>(Event::default().data(chunk.to_string()))
    });

    Sse::new(events.chain(done_event()))
}

/// Relay a backend SSE byte stream to the client.
///
/// Upstream `data:` payloads are forwarded in order; the upstream
/// `[DONE]` marker is swallowed so the gateway can append the sources
/// chunk (when given) before emitting its own sentinel. Dropping the
/// response body drops the upstream stream, cancelling the backend call.
pub fn relay_sse(
    upstream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    sources: Option<Vec<String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let relayed = upstream
        .scan(String::new(), |buffer, chunk| {
            let mut events: Vec<Result<Event, Infallible>> = Vec::new();
            match chunk {
                Ok(bytes) => {
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => buffer.push_str(text),
                        Err(e) => warn!(error = %e, "dropping non-UTF-8 stream chunk"),
                    }
                    while let Some(newline) = buffer.find('\n') {
                        let line: String = buffer.drain(..=newline).collect();
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(data) = line.strip_prefix("data:") {
                            let data = data.trim_start();
                            if data == DONE_SENTINEL {
                                continue;
                            }
                            events.push(Ok(Event::default().data(data.to_string())));
                        }
                    }
                }
                Err(e) => warn!(error = %e, "upstream stream error"),
            }
            future::ready(Some(events))
        })
        .flat_map(stream::iter);

    let trailer = stream::iter(sources.filter(|s| !s.is_empty()).map(|sources| {
        let text = format!("{SOURCES_SEPARATOR}{}", sources.join("\n"));
        let chunk = completion_chunk(&completion_id(), &text, Some("stop"));
        Ok::<_, Infallible>(Event::default().data(chunk.to_string()))
    }));

    Sse::new(relayed.chain(trailer).chain(done_event()))
}

fn done_event() -> impl Stream<Item = Result<Event, Infallible>> {
    stream::once(future::ready(Ok(Event::default().data(DONE_SENTINEL))))
}
