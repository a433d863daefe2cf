//! One cancellation scope per logical UI slot.
//!
//! Starting a stream in a slot cancels whatever reader was already running
//! there, so tokens from two conversations never interleave.

use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A claim on a slot. Hand `token` to the reader; give the lease back via
/// [`StreamSlot::finish`] when the reader ends.
#[derive(Debug, Clone)]
pub struct Lease {
    generation: u64,
    pub token: CancellationToken,
}

struct Active {
    generation: u64,
    conversation_id: Option<String>,
    token: CancellationToken,
}

#[derive(Default)]
struct SlotState {
    next_generation: u64,
    active: Option<Active>,
}

#[derive(Default)]
pub struct StreamSlot {
    state: Mutex<SlotState>,
}

impl StreamSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for a new reader, cancelling the previous one.
    ///
    /// `conversation_id` is `None` for a chat that has not been assigned an
    /// id yet.
    pub fn begin(&self, conversation_id: Option<&str>) -> Lease {
        let token = CancellationToken::new();
        let mut state = self.lock();
        let generation = state.next_generation;
        state.next_generation += 1;

        let previous = state.active.replace(Active {
            generation,
            conversation_id: conversation_id.map(str::to_string),
            token: token.clone(),
        });
        drop(state);

        if let Some(previous) = previous {
            debug!(
                previous = previous.conversation_id.as_deref().unwrap_or("<new>"),
                next = conversation_id.unwrap_or("<new>"),
                "superseding in-flight stream"
            );
            previous.token.cancel();
        }

        Lease { generation, token }
    }

    /// Cancel the current reader, if any, and leave the slot empty.
    pub fn cancel(&self) {
        if let Some(active) = self.lock().active.take() {
            active.token.cancel();
        }
    }

    /// Release the slot after a reader ended on its own. A lease from a
    /// superseded reader leaves the current one alone.
    pub fn finish(&self, lease: &Lease) {
        let mut state = self.lock();
        if state
            .active
            .as_ref()
            .is_some_and(|active| active.generation == lease.generation)
        {
            state.active = None;
        }
    }

    pub fn active_conversation(&self) -> Option<String> {
        self.lock()
            .active
            .as_ref()
            .and_then(|active| active.conversation_id.clone())
    }

    pub fn is_busy(&self) -> bool {
        self.lock().active.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stream_cancels_previous_one() {
        let slot = StreamSlot::new();
        let first = slot.begin(Some("c1"));
        assert_eq!(slot.active_conversation().as_deref(), Some("c1"));

        let second = slot.begin(Some("c2"));
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert_eq!(slot.active_conversation().as_deref(), Some("c2"));
    }

    #[test]
    fn stale_finish_keeps_current_reader() {
        let slot = StreamSlot::new();
        let first = slot.begin(Some("c1"));
        let second = slot.begin(None);

        slot.finish(&first);
        assert!(slot.is_busy());
        assert_eq!(slot.active_conversation(), None);

        slot.finish(&second);
        assert!(!slot.is_busy());
        assert!(!second.token.is_cancelled());
    }

    #[test]
    fn cancel_empties_the_slot() {
        let slot = StreamSlot::new();
        let lease = slot.begin(Some("c1"));
        slot.cancel();
        assert!(lease.token.is_cancelled());
        assert!(!slot.is_busy());

        // Nothing to cancel is fine.
        slot.cancel();
    }

    #[test]
    fn slots_are_independent() {
        let left = StreamSlot::new();
        let right = StreamSlot::new();
        let a = left.begin(Some("c1"));
        let _b = right.begin(Some("c2"));
        assert!(!a.token.is_cancelled());
    }

    #[tokio::test]
    async fn superseded_reader_stops_mid_stream() {
        use crate::classify::StreamKind;
        use crate::protocol::StreamEvent;
        use crate::reader::StreamEventReader;
        use bytes::Bytes;
        use futures::StreamExt;
        use tokio::sync::mpsc;
        use tokio_stream::wrappers::ReceiverStream;

        let slot = StreamSlot::new();
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(4);
        let lease = slot.begin(Some("c1"));
        let mut events =
            StreamEventReader::new(ReceiverStream::new(rx), StreamKind::Chat, Some(lease.token))
                .into_stream();

        tx.send(Ok(Bytes::from_static(b"data: {\"token\":\"from c1\"}\n")))
            .await
            .unwrap();
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            StreamEvent::Token("from c1".to_string())
        );

        let _next = slot.begin(Some("c2"));
        tx.send(Ok(Bytes::from_static(b"data: {\"token\":\"late\"}\n")))
            .await
            .unwrap();
        assert!(events.next().await.is_none());
    }
}
