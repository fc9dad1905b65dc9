//! Outbound update queue.
//!
//! Producers enqueue from anywhere on the session task without blocking. The
//! channel's send loop waits on the queue with a bounded timeout and drains
//! everything queued so far in one go.

use crate::protocol::Update;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct BatchQueue {
    pending: RefCell<Vec<Update>>,
    // Set by the first enqueue after an idle period; cleared once the release
    // has fired or the queue has been drained.
    armed: Cell<bool>,
    release: Notify,
}

/// Cloneable handle to the session's outbound queue.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Rc<BatchQueue>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, update: Update) {
        self.enqueue_all([update]);
    }

    pub fn enqueue_all(&self, updates: impl IntoIterator<Item = Update>) {
        let queue = &self.queue;
        let before = queue.pending.borrow().len();
        queue.pending.borrow_mut().extend(updates);

        if queue.pending.borrow().len() == before {
            return;
        }

        // Only a parked waiter is woken. No permit is stored for later, so an
        // enqueue that was drained without waiting leaves nothing behind.
        if !queue.armed.replace(true) {
            queue.release.notify_waiters();
        }
    }

    pub fn len(&self) -> usize {
        self.queue.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.pending.borrow().is_empty()
    }

    /// Waits until at least one update is queued or `timeout` elapses.
    ///
    /// Returns immediately when updates are already queued. Otherwise the
    /// wake-up from the first enqueue is deferred by one scheduler tick so
    /// that producers firing at nearly the same moment land in one batch.
    pub async fn wait_for_messages(&self, timeout: Duration) {
        if !self.is_empty() {
            return;
        }

        let released = tokio::time::timeout(timeout, self.queue.release.notified())
            .await
            .is_ok();

        if released {
            tokio::task::yield_now().await;
            self.queue.armed.set(false);
        }
    }

    /// Atomically takes every queued update, in enqueue order.
    pub fn drain(&self) -> Vec<Update> {
        self.queue.armed.set(false);
        std::mem::take(&mut *self.queue.pending.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::task::{LocalSet, spawn_local};
    use tokio::time::Instant;

    #[test]
    fn frame_preserves_enqueue_order() {
        let outbox = Outbox::new();
        outbox.enqueue(Update::new("btn", "clicked", true));
        outbox.enqueue_all([
            Update::new("location", "path", "/next"),
            Update::new("btn", "clicked", false),
        ]);
        outbox.enqueue(Update::new("theme", "changed", true));

        let updates = outbox.drain();
        let order: Vec<(&str, &str)> = updates
            .iter()
            .map(|update| (update.key(), update.property()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("btn", "clicked"),
                ("location", "path"),
                ("btn", "clicked"),
                ("theme", "changed"),
            ]
        );
        assert_eq!(updates[2].value(), &json!(false));
        assert!(outbox.is_empty());
        assert!(outbox.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_without_updates() {
        let outbox = Outbox::new();
        let started = Instant::now();

        outbox.wait_for_messages(Duration::from_millis(50)).await;

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(outbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drained_enqueue_does_not_wake_the_next_wait() {
        let outbox = Outbox::new();
        outbox.enqueue(Update::new("k", "v", 1));
        assert_eq!(outbox.drain().len(), 1);
        let started = Instant::now();

        outbox.wait_for_messages(Duration::from_millis(50)).await;

        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_immediately_when_queue_is_non_empty() {
        let outbox = Outbox::new();
        outbox.enqueue(Update::new("k", "v", 1));
        let started = Instant::now();

        outbox.wait_for_messages(Duration::from_millis(50)).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn near_simultaneous_producers_share_one_release() {
        LocalSet::new()
            .run_until(async {
                let outbox = Outbox::new();
                let waiter = {
                    let outbox = outbox.clone();
                    spawn_local(async move {
                        let started = Instant::now();
                        outbox.wait_for_messages(Duration::from_millis(50)).await;
                        (started.elapsed(), outbox.drain())
                    })
                };

                // Let the waiter park on the queue first.
                tokio::task::yield_now().await;

                outbox.enqueue(Update::new("link", "clicked", true));
                let second = outbox.clone();
                spawn_local(async move {
                    second.enqueue(Update::new("location", "path", "/docs"));
                });

                let (elapsed, drained) = waiter.await.expect("waiter task");
                assert!(elapsed < Duration::from_millis(50));
                assert_eq!(
                    drained,
                    vec![
                        Update::new("link", "clicked", true),
                        Update::new("location", "path", "/docs"),
                    ]
                );
            })
            .await;
    }
}
