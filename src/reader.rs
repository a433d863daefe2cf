//! Pull-based reader that turns an SSE byte stream into [`StreamEvent`]s.

use crate::classify::{StreamKind, classify_frame};
use crate::error::ClientError;
use crate::protocol::StreamEvent;
use crate::sse::SseDecoder;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Events from one chat or resume request.
///
/// Transport failures arrive as a final `Err` item; protocol failures are
/// `Ok(StreamEvent::Error(..))`. Cancellation ends the stream with no item.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ClientError>>;

type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Owns the decoder state for exactly one response body.
pub struct StreamEventReader {
    bytes: ByteStream,
    decoder: SseDecoder,
    kind: StreamKind,
    cancel: Option<CancellationToken>,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

enum Pull {
    Chunk(Bytes),
    Failed(ClientError),
    Exhausted,
    Cancelled,
}

impl StreamEventReader {
    pub fn new<S, E>(bytes: S, kind: StreamKind, cancel: Option<CancellationToken>) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            bytes: bytes.map(|chunk| chunk.map_err(ClientError::stream)).boxed(),
            decoder: SseDecoder::new(),
            kind,
            cancel,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Consume the reader as a lazy stream of events. Polling again after
    /// the end keeps returning `None`.
    pub fn into_stream(self) -> EventStream {
        stream::unfold(self, |mut reader| async move {
            let item = reader.next_event().await?;
            Some((item, reader))
        })
        .fuse()
        .boxed()
    }

    /// Next event, or `None` once the stream has ended for any reason.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, ClientError>> {
        loop {
            if self.finished {
                return None;
            }
            if self.is_cancelled() {
                return self.cancelled();
            }

            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    debug!(kind = event.kind(), "stream reached terminal event");
                    self.finish();
                }
                return Some(Ok(event));
            }

            match self.pull().await {
                Pull::Chunk(chunk) => {
                    trace!(len = chunk.len(), "received chunk");
                    self.absorb(&chunk);
                }
                Pull::Failed(err) => {
                    debug!(error = %err, "byte stream failed");
                    self.finish();
                    return Some(Err(err));
                }
                Pull::Exhausted => {
                    let dropped = self.decoder.buffered();
                    if dropped > 0 {
                        debug!(dropped, "discarding unterminated tail");
                    }
                    debug!("byte stream closed");
                    self.finish();
                    return None;
                }
                Pull::Cancelled => return self.cancelled(),
            }
        }
    }

    async fn pull(&mut self) -> Pull {
        let next = match &self.cancel {
            Some(cancel) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Pull::Cancelled,
                    next = self.bytes.next() => next,
                }
            }
            None => self.bytes.next().await,
        };

        match next {
            Some(Ok(chunk)) => Pull::Chunk(chunk),
            Some(Err(err)) => Pull::Failed(err),
            None => Pull::Exhausted,
        }
    }

    /// Decode a chunk and queue its events, stopping at the first terminal
    /// one so nothing after `done`/`error` is ever surfaced.
    fn absorb(&mut self, chunk: &[u8]) {
        for frame in self.decoder.feed(chunk) {
            if self.pending.back().is_some_and(StreamEvent::is_terminal) {
                break;
            }
            if let Some(event) = classify_frame(self.kind, &frame) {
                self.pending.push_back(event);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn cancelled(&mut self) -> Option<Result<StreamEvent, ClientError>> {
        debug!(discarded = self.pending.len(), "stream cancelled");
        self.finish();
        None
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending.clear();
        self.decoder = SseDecoder::new();
        self.bytes = stream::empty().boxed();
    }
}
