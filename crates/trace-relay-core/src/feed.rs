//! Ordered consumer feed: broadcast plus bounded history.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::{RelayEvent, SessionState, TraceRecord};

/// Default history size limit (16 MB).
const HISTORY_BYTES: usize = 16 * 1024 * 1024;

/// Default broadcast buffer.
const CHANNEL_CAPACITY: usize = 10_000;

struct StoredEvent {
    event: RelayEvent,
    bytes: usize,
}

struct Inner {
    history: VecDeque<StoredEvent>,
    total_bytes: usize,
}

/// Append-only feed of relay events.
///
/// Records and state transitions share one channel, so consumers see them in
/// the order they were published. Late subscribers receive the retained
/// history first and then switch to live updates.
pub struct RecordFeed {
    inner: Mutex<Inner>,
    sender: broadcast::Sender<RelayEvent>,
    history_limit: usize,
}

impl Default for RecordFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordFeed {
    /// Create a feed with the default history limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(HISTORY_BYTES)
    }

    /// Create a feed retaining at most `history_limit` bytes of events.
    #[must_use]
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self::with_limits(history_limit, CHANNEL_CAPACITY)
    }

    /// Create a feed with explicit history and live buffer limits.
    ///
    /// A live subscriber more than `capacity` events behind loses the oldest
    /// ones and is told so with [`RelayEvent::Lagged`].
    #[must_use]
    pub fn with_limits(history_limit: usize, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Mutex::new(Inner {
                history: VecDeque::with_capacity(32),
                total_bytes: 0,
            }),
            sender,
            history_limit,
        }
    }

    /// Publish an event to history and live listeners.
    ///
    /// History and broadcast are updated under one lock so concurrent
    /// publishers cannot interleave differently in the two.
    pub fn push(&self, event: RelayEvent) {
        let bytes = event.approx_bytes();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let _ = self.sender.send(event.clone());

        while inner.total_bytes.saturating_add(bytes) > self.history_limit {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
        }
        inner.history.push_back(StoredEvent { event, bytes });
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Publish the records decoded from one frame. Empty batches are skipped.
    pub fn push_records(&self, records: Vec<TraceRecord>) {
        if !records.is_empty() {
            self.push(RelayEvent::Records(records));
        }
    }

    /// Publish a state transition.
    pub fn push_state(&self, state: SessionState) {
        self.push(RelayEvent::State(state));
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn history(&self) -> Vec<RelayEvent> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .map(|s| s.event.clone())
            .collect()
    }

    /// All records currently retained, in arrival order.
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.history()
            .into_iter()
            .filter_map(|event| match event {
                RelayEvent::Records(records) => Some(records),
                RelayEvent::State(_) | RelayEvent::Lagged(_) => None,
            })
            .flatten()
            .collect()
    }

    /// Stream that yields history first, then live updates.
    ///
    /// A consumer that falls more than the live buffer behind misses events;
    /// the gap is reported in place as [`RelayEvent::Lagged`] with the number
    /// of events skipped, and the stream continues with the oldest event
    /// still buffered.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, RelayEvent> {
        // Snapshot and subscribe under the lock so nothing falls in between.
        let (history, rx) = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let history: Vec<RelayEvent> =
                inner.history.iter().map(|s| s.event.clone()).collect();
            (history, self.sender.subscribe())
        };

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).map(|res| match res {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Feed subscriber lagged");
                RelayEvent::Lagged(skipped)
            }
        });

        Box::pin(hist.chain(live))
    }

    /// Stream of individual records (history, then live). Records lost to
    /// lag are skipped; use [`Self::history_plus_stream`] to observe gaps.
    #[must_use]
    pub fn record_stream(&self) -> futures::stream::BoxStream<'static, TraceRecord> {
        self.history_plus_stream()
            .flat_map(|event| {
                let records = match event {
                    RelayEvent::Records(records) => records,
                    RelayEvent::State(_) | RelayEvent::Lagged(_) => Vec::new(),
                };
                futures::stream::iter(records)
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::TraceLevel;

    fn record(msg: &str) -> TraceRecord {
        TraceRecord::new(DateTime::<Utc>::UNIX_EPOCH, TraceLevel::Info, msg)
    }

    #[tokio::test]
    async fn test_history_then_live() {
        let feed = RecordFeed::new();
        feed.push_records(vec![record("a"), record("b")]);
        feed.push_state(SessionState::Connected);

        let mut stream = feed.history_plus_stream();
        feed.push_records(vec![record("c")]);

        assert_eq!(
            stream.next().await,
            Some(RelayEvent::Records(vec![record("a"), record("b")]))
        );
        assert_eq!(
            stream.next().await,
            Some(RelayEvent::State(SessionState::Connected))
        );
        assert_eq!(
            stream.next().await,
            Some(RelayEvent::Records(vec![record("c")]))
        );
    }

    #[tokio::test]
    async fn test_record_stream_flattens_in_order() {
        let feed = RecordFeed::new();
        feed.push_records(vec![record("1"), record("2")]);
        feed.push_state(SessionState::Connecting);
        feed.push_records(vec![record("3")]);

        let records: Vec<_> = feed.record_stream().take(3).collect().await;
        let messages: Vec<_> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["1", "2", "3"]);
    }

    #[test]
    fn test_empty_batches_not_published() {
        let feed = RecordFeed::new();
        feed.push_records(Vec::new());
        assert!(feed.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let one = RelayEvent::Records(vec![record("x")]).approx_bytes();
        let feed = RecordFeed::with_history_limit(one * 3);
        for i in 0..10 {
            feed.push_records(vec![record("x")]);
            assert!(feed.history().len() <= 3, "iteration {i}");
        }
        assert_eq!(feed.records().len(), 3);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_sees_gap() {
        let feed = RecordFeed::with_limits(HISTORY_BYTES, 2);
        let mut stream = feed.history_plus_stream();
        for i in 0..5 {
            feed.push_records(vec![record(&i.to_string())]);
        }

        // History was empty at subscription; events 0..3 overflowed the buffer.
        assert_eq!(stream.next().await, Some(RelayEvent::Lagged(3)));
        assert_eq!(
            stream.next().await,
            Some(RelayEvent::Records(vec![record("3")]))
        );
        assert_eq!(
            stream.next().await,
            Some(RelayEvent::Records(vec![record("4")]))
        );
        assert_eq!(feed.records().len(), 5);
    }

    #[test]
    fn test_live_receiver() {
        let feed = RecordFeed::new();
        let mut rx = feed.subscribe();
        feed.push_state(SessionState::Failed("boom".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            RelayEvent::State(SessionState::Failed("boom".to_string()))
        );
    }
}
