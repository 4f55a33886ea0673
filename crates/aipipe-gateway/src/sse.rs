// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost extraction from `text/event-stream` responses.
//!
//! [`CostTap`] wraps the upstream byte stream and forwards every chunk to the
//! caller unchanged as soon as it arrives. On the side it scans `data:` lines
//! for the first `model` and the first `usage` it can find, and reports them
//! once the stream ends or is dropped by a disconnecting caller.

use std::pin::Pin;
use std::task::{Context, Poll};

use aipipe_core::UsageCounters;
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use serde_json::Value;
use tokio::sync::oneshot;

/// What was observed in a stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capture {
    pub model: Option<String>,
    pub usage: Option<UsageCounters>,
}

impl Capture {
    fn is_complete(&self) -> bool {
        self.model.is_some() && self.usage.is_some()
    }

    /// Record `model` and `usage` from an event, keeping earlier values.
    pub fn observe(&mut self, event: &Value) {
        // The responses API nests the payload under `response`.
        let event = match event.get("response") {
            Some(inner) if inner.is_object() => inner,
            _ => event,
        };
        if self.model.is_none() {
            self.model = event
                .get("model")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_string);
        }
        if self.usage.is_none() {
            self.usage = event.get("usage").and_then(UsageCounters::from_json);
        }
    }
}

/// Splits bytes into lines and scans `data:` payloads.
#[derive(Debug, Default)]
struct LineScanner {
    pending: Vec<u8>,
    capture: Capture,
}

impl LineScanner {
    fn feed(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            if self.pending.is_empty() {
                self.scan_line(&rest[..pos]);
            } else {
                self.pending.extend_from_slice(&rest[..pos]);
                let line = std::mem::take(&mut self.pending);
                self.scan_line(&line);
            }
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
    }

    fn finish(&mut self) -> Capture {
        let last = std::mem::take(&mut self.pending);
        if !last.is_empty() {
            self.scan_line(&last);
        }
        std::mem::take(&mut self.capture)
    }

    fn scan_line(&mut self, line: &[u8]) {
        if self.capture.is_complete() {
            return;
        }
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(data) = line.strip_prefix(b"data:") else {
            return;
        };
        if let Ok(event) = serde_json::from_slice::<Value>(data) {
            self.capture.observe(&event);
        }
    }
}

/// Fires the completion channel at most once, at the latest on drop.
#[derive(Debug)]
struct Completion {
    scanner: LineScanner,
    tx: Option<oneshot::Sender<Capture>>,
}

impl Completion {
    fn fire(&mut self) {
        if let Some(tx) = self.tx.take() {
            // A closed receiver means nobody is charging; nothing to do.
            let _ = tx.send(self.scanner.finish());
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.fire();
    }
}

pin_project! {
    /// Transparent stream adapter reporting a [`Capture`] on completion.
    pub struct CostTap<S> {
        #[pin]
        inner: S,
        completion: Completion,
    }
}

impl<S> CostTap<S> {
    /// Wrap `inner`. The receiver resolves once, when the stream ends or is dropped.
    pub fn new(inner: S) -> (Self, oneshot::Receiver<Capture>) {
        let (tx, rx) = oneshot::channel();
        let tap = Self {
            inner,
            completion: Completion {
                scanner: LineScanner::default(),
                tx: Some(tx),
            },
        };
        (tap, rx)
    }
}

impl<S, E> Stream for CostTap<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.completion.scanner.feed(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                this.completion.fire();
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::{stream, StreamExt};
    use proptest::prelude::*;
    use std::convert::Infallible;

    const CHAT_STREAM: &str = concat!(
        "data: {\"id\":\"gen-1\",\"model\":\"openai/gpt-4o-mini\",\"choices\":[{\"delta\":{\"content\":\"4\"}}]}\n\n",
        ": keep-alive\r\n\r\n",
        "data: {\"id\":\"gen-1\",\"model\":\"ignored/later\",\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3}}\n\n",
        "data: [DONE]\n\n",
    );

    fn expected_chat() -> Capture {
        Capture {
            model: Some("openai/gpt-4o-mini".into()),
            usage: Some(UsageCounters {
                prompt_units: 12,
                completion_units: 3,
            }),
        }
    }

    fn run(chunks: Vec<Bytes>) -> (Vec<u8>, Capture) {
        let source = stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
        let (tap, rx) = CostTap::new(source);
        let forwarded: Vec<Bytes> = block_on(tap.map(|c| c.unwrap()).collect());
        let capture = block_on(rx).unwrap();
        (forwarded.concat(), capture)
    }

    fn split_at(input: &[u8], mut cuts: Vec<usize>) -> Vec<Bytes> {
        cuts.iter_mut().for_each(|c| *c %= input.len() + 1);
        cuts.sort_unstable();
        cuts.dedup();
        let mut chunks = Vec::new();
        let mut start = 0;
        for cut in cuts.into_iter().chain([input.len()]) {
            chunks.push(Bytes::copy_from_slice(&input[start..cut]));
            start = cut;
        }
        chunks
    }

    #[test]
    fn chat_stream_captures_first_model_and_usage() {
        let (bytes, capture) = run(vec![Bytes::from_static(CHAT_STREAM.as_bytes())]);
        assert_eq!(bytes, CHAT_STREAM.as_bytes());
        assert_eq!(capture, expected_chat());
    }

    #[test]
    fn responses_api_events_are_unwrapped() {
        let body = concat!(
            "event: response.created\n",
            "data: {\"type\":\"response.created\",\"response\":{\"model\":\"gpt-4.1-nano\",\"usage\":null}}\n\n",
            "event: response.completed\n",
            "data: {\"type\":\"response.completed\",\"response\":{\"model\":\"gpt-4.1-nano\",\"usage\":{\"input_tokens\":9,\"output_tokens\":4}}}\n\n",
        );
        let (_, capture) = run(vec![Bytes::from_static(body.as_bytes())]);
        assert_eq!(capture.model.as_deref(), Some("gpt-4.1-nano"));
        assert_eq!(
            capture.usage,
            Some(UsageCounters {
                prompt_units: 9,
                completion_units: 4
            })
        );
    }

    #[test]
    fn unterminated_final_line_is_scanned() {
        let body = "data: {\"model\":\"m\",\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":2}}";
        let (_, capture) = run(vec![Bytes::from_static(body.as_bytes())]);
        assert_eq!(capture.model.as_deref(), Some("m"));
        assert!(capture.usage.is_some());
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let body = "data: {not json\ndata:\nretry: 10\ndata: {\"model\":\"m\"}\n";
        let (_, capture) = run(vec![Bytes::from_static(body.as_bytes())]);
        assert_eq!(capture.model.as_deref(), Some("m"));
        assert_eq!(capture.usage, None);
    }

    #[test]
    fn dropped_stream_reports_partial_capture() {
        let chunks = vec![
            Ok::<_, Infallible>(Bytes::from_static(b"data: {\"model\":\"m\"}\n\n")),
            Ok(Bytes::from_static(b"data: {\"usage\":{\"prompt_tokens\":5}}\n\n")),
        ];
        let (mut tap, rx) = CostTap::new(stream::iter(chunks));
        let first = block_on(tap.next());
        assert!(first.is_some());
        drop(tap);

        let capture = block_on(rx).unwrap();
        assert_eq!(capture.model.as_deref(), Some("m"));
        assert_eq!(capture.usage, None);
    }

    #[test]
    fn completion_fires_once() {
        let (tap, rx) = CostTap::new(stream::iter(Vec::<Result<Bytes, Infallible>>::new()));
        let forwarded: Vec<_> = block_on(tap.collect());
        assert!(forwarded.is_empty());
        assert_eq!(block_on(rx).unwrap(), Capture::default());
    }

    proptest! {
        #[test]
        fn any_chunking_is_transparent(cuts in proptest::collection::vec(any::<usize>(), 0..24)) {
            let input = CHAT_STREAM.as_bytes();
            let (bytes, capture) = run(split_at(input, cuts));
            prop_assert_eq!(bytes, input.to_vec());
            prop_assert_eq!(capture, expected_chat());
        }
    }
}
