//! In-memory publish/subscribe fan-out of decoded events.
//!
//! Publishing never blocks the sync loop: each subscriber has a bounded
//! buffer, and a full buffer drops the event for that subscriber only.
//! There is no replay — the store is the canonical log; the broadcaster
//! exists for live consumers (GraphQL subscriptions) that tolerate gaps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use chainsync_core::event::DecodedEvent;

/// Default per-subscriber buffer, in events.
pub const DEFAULT_BUFFER: usize = 256;

struct BroadcasterInner {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<DecodedEvent>>>,
    next_id: AtomicU64,
    buffer: usize,
}

/// Fan-out of decoded events to live subscribers.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

/// RAII subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    inner: Weak<BroadcasterInner>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl Broadcaster {
    /// Create a broadcaster with the given per-subscriber buffer size.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Subscribe to the live event stream. Events published after this
    /// call are delivered in publish order; missed events are not
    /// replayed.
    pub fn subscribe(&self) -> (mpsc::Receiver<DecodedEvent>, Subscription) {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().unwrap().insert(id, tx);
        (rx, Subscription { id, inner: Arc::downgrade(&self.inner) })
    }

    /// Publish one event to every subscriber. Returns the number of
    /// subscribers that received it.
    pub fn publish(&self, event: &DecodedEvent) -> usize {
        // Copy the sender list under the lock, send outside it.
        let senders: Vec<(u64, mpsc::Sender<DecodedEvent>)> = self
            .inner
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut stale = Vec::new();
        for (id, tx) in senders {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow subscriber: drop this event for them only.
                    debug!(subscriber = id, event_id = %event.event_id, "subscriber buffer full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => stale.push(id),
            }
        }

        if !stale.is_empty() {
            let mut subs = self.inner.subscribers.lock().unwrap();
            for id in stale {
                subs.remove(&id);
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().unwrap().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use std::collections::BTreeMap;

    fn event(n: u64) -> DecodedEvent {
        DecodedEvent {
            contract_name: "usdc".into(),
            event_name: "Transfer".into(),
            event_id: "usdc:Transfer".into(),
            signature: B256::ZERO,
            data: BTreeMap::from([(
                "value".to_string(),
                chainsync_core::event::EventValue::Uint(n.to_string()),
            )]),
        }
    }

    #[tokio::test]
    async fn publish_reaches_subscribers_in_order() {
        let broadcaster = Broadcaster::new(16);
        let (mut rx, _sub) = broadcaster.subscribe();

        assert_eq!(broadcaster.publish(&event(1)), 1);
        assert_eq!(broadcaster.publish(&event(2)), 1);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.data["value"], chainsync_core::event::EventValue::Uint("1".into()));
        assert_eq!(second.data["value"], chainsync_core::event::EventValue::Uint("2".into()));
    }

    #[tokio::test]
    async fn full_buffer_drops_for_that_subscriber_only() {
        let broadcaster = Broadcaster::new(1);
        let (mut slow_rx, _slow) = broadcaster.subscribe();
        let (mut fast_rx, _fast) = broadcaster.subscribe();

        // First event fills both buffers.
        assert_eq!(broadcaster.publish(&event(1)), 2);
        // Drain only the fast subscriber.
        fast_rx.recv().await.unwrap();
        // Second event: slow subscriber's buffer is full, dropped for it.
        assert_eq!(broadcaster.publish(&event(2)), 1);

        assert_eq!(
            slow_rx.recv().await.unwrap().data["value"],
            chainsync_core::event::EventValue::Uint("1".into())
        );
        assert_eq!(
            fast_rx.recv().await.unwrap().data["value"],
            chainsync_core::event::EventValue::Uint("2".into())
        );
    }

    #[tokio::test]
    async fn drop_subscription_unsubscribes() {
        let broadcaster = Broadcaster::new(16);
        let (rx, sub) = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
        drop(rx);
        assert_eq!(broadcaster.publish(&event(1)), 0);
    }

    #[tokio::test]
    async fn closed_receiver_is_pruned_on_publish() {
        let broadcaster = Broadcaster::new(16);
        let (rx, sub) = broadcaster.subscribe();
        drop(rx); // receiver gone, guard still alive

        assert_eq!(broadcaster.publish(&event(1)), 0);
        assert_eq!(broadcaster.subscriber_count(), 0);
        drop(sub);
    }
}
