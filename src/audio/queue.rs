use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, info};

use crate::sources::Track;

/// Result of waiting on the queue.
#[derive(Debug)]
pub enum Dequeued {
    Track(Track),
    /// Nothing arrived before the wait elapsed.
    TimedOut,
    /// The queue was closed because the player is being destroyed.
    Closed,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<Track>,
    closed: bool,
}

/// FIFO of pending tracks for one guild.
///
/// The lock is only taken for the duration of a single mutation and never
/// across an `.await`, so commands always observe a whole queue.
#[derive(Debug, Default)]
pub struct TrackQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one track. Returns `false` if the queue is closed.
    pub fn push(&self, track: Track) -> bool {
        self.extend(std::iter::once(track)) == 1
    }

    /// Appends tracks in order and returns how many were added.
    pub fn extend(&self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let added = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return 0;
            }
            let before = inner.items.len();
            inner.items.extend(tracks);
            inner.items.len() - before
        };

        if added > 0 {
            debug!("➕ {} track(s) queued", added);
            self.notify.notify_one();
        }
        added
    }

    /// Takes the front track, waiting up to `wait` for one to arrive.
    pub async fn pop(&self, wait: Duration) -> Dequeued {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a push in between is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Dequeued::Closed;
                }
                if let Some(track) = inner.items.pop_front() {
                    return Dequeued::Track(track);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Dequeued::Closed;
                }
                return match inner.items.pop_front() {
                    Some(track) => Dequeued::Track(track),
                    None => Dequeued::TimedOut,
                };
            }
        }
    }

    /// Randomizes pending order. Returns the number of tracks shuffled.
    pub fn shuffle(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut rng = rand::thread_rng();
        inner.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Queue shuffled ({} tracks)", inner.items.len());
        inner.items.len()
    }

    pub fn snapshot(&self) -> Vec<Track> {
        self.inner.lock().items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Empties the queue, refuses further pushes and wakes the waiting loop.
    /// Returns how many tracks were dropped.
    pub fn close(&self) -> usize {
        let dropped = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            let dropped = inner.items.len();
            inner.items.clear();
            dropped
        };
        self.notify.notify_waiters();
        self.notify.notify_one();
        info!("🗑️ Queue closed, {} pending track(s) dropped", dropped);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::track;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn titles(queue: &TrackQueue) -> Vec<String> {
        queue.snapshot().iter().map(|t| t.title().to_string()).collect()
    }

    #[test]
    fn extend_preserves_order_within_a_call() {
        let queue = TrackQueue::new();
        queue.extend(vec![track("a"), track("b"), track("c")]);
        queue.extend(vec![track("d")]);
        assert_eq!(titles(&queue), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn n_single_pushes_give_length_n() {
        let queue = TrackQueue::new();
        for i in 0..7 {
            assert!(queue.push(track(&format!("t{}", i))));
        }
        assert_eq!(queue.len(), 7);
    }

    #[test]
    fn shuffle_keeps_the_same_tracks() {
        let queue = TrackQueue::new();
        queue.extend((0..20).map(|i| track(&i.to_string())));
        assert_eq!(queue.shuffle(), 20);

        let mut after = titles(&queue);
        after.sort();
        let mut expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn pop_returns_front_first() {
        let queue = TrackQueue::new();
        queue.extend(vec![track("first"), track("second")]);

        match queue.pop(Duration::from_secs(1)).await {
            Dequeued::Track(t) => assert_eq!(t.title(), "first"),
            other => panic!("expected a track, got {:?}", other),
        }
        assert_eq!(titles(&queue), vec!["second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out_when_empty() {
        let queue = TrackQueue::new();
        let started = Instant::now();
        assert!(matches!(
            queue.pop(Duration::from_secs(60)).await,
            Dequeued::TimedOut
        ));
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_pop_wakes_on_push() {
        let queue = Arc::new(TrackQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(300)).await })
        };

        tokio::time::sleep(Duration::from_secs(10)).await;
        queue.push(track("late"));

        match waiter.await.unwrap() {
            Dequeued::Track(t) => assert_eq!(t.title(), "late"),
            other => panic!("expected a track, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_wakes_the_waiter_and_rejects_pushes() {
        let queue = Arc::new(TrackQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(300)).await })
        };

        tokio::task::yield_now().await;
        queue.push(track("pending"));
        tokio::task::yield_now().await;
        queue.close();

        // The waiter either took the pending track or saw the close
        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, Dequeued::Track(_) | Dequeued::Closed));
        assert!(!queue.push(track("too late")));
        assert!(queue.is_empty());
        assert!(matches!(
            queue.pop(Duration::from_secs(1)).await,
            Dequeued::Closed
        ));
    }
}
