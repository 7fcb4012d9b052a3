// ── Reactive alarm stream ──
//
// Subscription type for consuming alarm list changes from the repository.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Alarm;

type Snapshot = Arc<Vec<Arc<Alarm>>>;

/// A subscription to the alarm list.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via [`changed`](Self::changed) or by converting into a
/// `Stream`.
pub struct AlarmStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl AlarmStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation time or at the last `changed()`.
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the repository has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> AlarmWatchStream {
        AlarmWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a new snapshot each time the list changes.
/// The first item is the snapshot current at conversion time.
pub struct AlarmWatchStream {
    inner: WatchStream<Snapshot>,
}

impl Stream for AlarmWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_stream::StreamExt;

    use crate::model::{Alarm, AlarmDraft, Coordinate, TimeOfDay};
    use crate::store::AlarmRepository;

    fn alarm(name: &str) -> Alarm {
        Alarm::from_draft(AlarmDraft::new(
            name,
            TimeOfDay::new(8, 30).unwrap(),
            Coordinate::new(0.0, 0.0).unwrap(),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn changed_tracks_latest_snapshot() {
        let repo = AlarmRepository::new();
        let mut stream = repo.stream();
        assert!(stream.current().is_empty());

        repo.insert(alarm("a")).unwrap();
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(stream.current().len(), 1);
    }

    #[tokio::test]
    async fn into_stream_yields_current_then_updates() {
        let repo = AlarmRepository::new();
        repo.insert(alarm("a")).unwrap();
        let mut s = repo.stream().into_stream();

        assert_eq!(s.next().await.unwrap().len(), 1);
        repo.insert(alarm("b")).unwrap();
        assert_eq!(s.next().await.unwrap().len(), 2);
    }
}
