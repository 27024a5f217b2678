//! SSE decoding for the upstream streaming endpoint.
//!
//! Converts a raw byte stream of server-sent events into the domain
//! [`StreamEvent`] sequence. Transport failures, upstream-reported errors,
//! and missing terminal events all surface as `UpstreamError::Interrupted`
//! so the caller can salvage already-relayed fragments.

use async_stream::try_stream;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use convo_core::llm::GenerationStream;
use convo_types::error::UpstreamError;
use convo_types::llm::StreamEvent;

use super::protocol::UpstreamStreamChunk;

/// Decode an SSE byte stream into generation events.
///
/// Stops at the first terminal `complete` chunk; a literal `[DONE]` data
/// line or end-of-stream before that counts as an interruption.
pub(crate) fn decode_sse<S, B, E>(bytes: S) -> GenerationStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(try_stream! {
        let mut events = Box::pin(bytes.eventsource());
        let mut finished = false;

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| UpstreamError::Interrupted(e.to_string()))?;
            if event.data == "[DONE]" {
                break;
            }
            match serde_json::from_str::<UpstreamStreamChunk>(&event.data) {
                Ok(UpstreamStreamChunk::Chunk { text }) => {
                    yield StreamEvent::Fragment { text };
                }
                Ok(UpstreamStreamChunk::Complete {
                    full_response,
                    usage,
                }) => {
                    finished = true;
                    yield StreamEvent::Completed {
                        content: full_response,
                        usage: usage.map(Into::into),
                    };
                    break;
                }
                Ok(UpstreamStreamChunk::Error { message }) => {
                    Err(UpstreamError::Interrupted(message))?;
                }
                Err(e) => {
                    // Keep-alive comments and malformed lines are skipped,
                    // matching lenient SSE consumers.
                    debug!(error = %e, data = %event.data, "skipping undecodable stream line");
                }
            }
        }

        if !finished {
            Err(UpstreamError::Interrupted(
                "stream closed before terminal event".to_string(),
            ))?;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::convert::Infallible;

    async fn decode(chunks: Vec<&'static str>) -> Vec<Result<StreamEvent, UpstreamError>> {
        let bytes = stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
        decode_sse(bytes).collect().await
    }

    #[tokio::test]
    async fn test_fragments_then_complete() {
        let events = decode(vec![
            "data: {\"type\":\"chunk\",\"text\":\"Hel\"}\n\n",
            "data: {\"type\":\"chunk\",\"text\":\"lo\"}\n\n",
            "data: {\"type\":\"complete\",\"full_response\":\"Hello\",\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":1}}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        assert_eq!(events.len(), 3);
        assert!(
            matches!(&events[0], Ok(StreamEvent::Fragment { text }) if text == "Hel")
        );
        assert!(
            matches!(&events[1], Ok(StreamEvent::Fragment { text }) if text == "lo")
        );
        let Ok(StreamEvent::Completed { content, usage }) = &events[2] else {
            panic!("expected Completed, got {:?}", events[2]);
        };
        assert_eq!(content, "Hello");
        assert_eq!(usage.unwrap().prompt_tokens, 2);
    }

    #[tokio::test]
    async fn test_event_split_across_byte_chunks() {
        let events = decode(vec![
            "data: {\"type\":\"chunk\",",
            "\"text\":\"joined\"}\n\n",
            "data: {\"type\":\"complete\",\"full_response\":\"joined\"}\n\n",
        ])
        .await;

        assert!(
            matches!(&events[0], Ok(StreamEvent::Fragment { text }) if text == "joined")
        );
        assert!(matches!(&events[1], Ok(StreamEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn test_upstream_error_chunk() {
        let events = decode(vec![
            "data: {\"type\":\"chunk\",\"text\":\"par\"}\n\n",
            "data: {\"type\":\"error\",\"message\":\"model crashed\"}\n\n",
        ])
        .await;

        assert_eq!(events.len(), 2);
        assert!(
            matches!(&events[1], Err(UpstreamError::Interrupted(msg)) if msg == "model crashed")
        );
    }

    #[tokio::test]
    async fn test_done_without_complete_is_interruption() {
        let events = decode(vec![
            "data: {\"type\":\"chunk\",\"text\":\"par\"}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        assert!(matches!(&events[1], Err(UpstreamError::Interrupted(_))));
    }

    #[tokio::test]
    async fn test_truncated_stream_is_interruption() {
        let events = decode(vec!["data: {\"type\":\"chunk\",\"text\":\"par\"}\n\n"]).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Err(UpstreamError::Interrupted(_))));
    }

    #[tokio::test]
    async fn test_undecodable_lines_skipped() {
        let events = decode(vec![
            "data: not json\n\n",
            "data: {\"type\":\"complete\",\"full_response\":\"ok\"}\n\n",
        ])
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Ok(StreamEvent::Completed { .. })));
    }
}
