// =============================================================================
// Broadcast Fabric — topic-partitioned subscriber fan-out
// =============================================================================
//
// Ported from `original_source/websocket_manager.py::ConnectionManager`'s six
// connection pools, but fan-out is channel-based rather than a direct
// `await websocket.send_text(...)` per subscriber: each subscriber is a
// bounded `mpsc::Sender<String>` feeding an Axum WebSocket sink task (see
// `api/ws.rs`), matching the Design Note in §9 ("a typed publisher with a
// register/unregister contract ... bounded message channel per subscriber").
//
// Per §4.G: the subscriber set is snapshotted under the lock, then sends
// happen outside it; any send failure marks that subscriber for removal,
// applied after the fan-out completes.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::Topic;

pub type SubscriberId = u64;

struct TopicSet {
    subscribers: HashMap<SubscriberId, mpsc::Sender<String>>,
}

impl TopicSet {
    fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }
}

/// Channel-based topic fan-out. One `TopicSet` per `Topic`, each guarded by
/// its own lock (per §5: no cross-component or cross-topic lock).
pub struct BroadcastFabric {
    topics: HashMap<Topic, RwLock<TopicSet>>,
    next_id: AtomicU64,
    /// Bound on each subscriber's outgoing channel; a full channel counts as
    /// a send failure and the subscriber is dropped.
    channel_capacity: usize,
}

impl BroadcastFabric {
    pub fn new(channel_capacity: usize) -> Self {
        let topics = Topic::ALL.iter().map(|&t| (t, RwLock::new(TopicSet::new()))).collect();
        Self {
            topics,
            next_id: AtomicU64::new(1),
            channel_capacity,
        }
    }

    /// Register a new subscriber on `topic`, returning its id and the
    /// receiving half of its outgoing channel.
    pub fn register(&self, topic: Topic) -> (SubscriberId, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        self.topics[&topic].write().subscribers.insert(id, tx);
        debug!(topic = %topic, subscriber = id, "subscriber registered");
        (id, rx)
    }

    pub fn unregister(&self, topic: Topic, id: SubscriberId) {
        self.topics[&topic].write().subscribers.remove(&id);
    }

    /// Serialize `message` once and fan it out to every subscriber on
    /// `topic`. Subscribers whose channel is closed or full are dropped
    /// after the fan-out, never blocking delivery to the rest.
    pub fn publish<T: Serialize>(&self, topic: Topic, message: &T) {
        let frame = match serde_json::to_string(message) {
            Ok(s) => s,
            Err(e) => {
                warn!(topic = %topic, error = %e, "failed to serialize broadcast message");
                return;
            }
        };

        let snapshot: Vec<(SubscriberId, mpsc::Sender<String>)> = {
            let set = self.topics[&topic].read();
            set.subscribers.iter().map(|(&id, tx)| (id, tx.clone())).collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let mut failed = Vec::new();
        for (id, tx) in &snapshot {
            if tx.try_send(frame.clone()).is_err() {
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            let mut set = self.topics[&topic].write();
            for id in failed {
                set.subscribers.remove(&id);
                debug!(topic = %topic, subscriber = id, "subscriber dropped on send failure");
            }
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics[&topic].read().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_delivers_to_all_subscribers() {
        let fabric = BroadcastFabric::new(8);
        let (_, mut rx1) = fabric.register(Topic::Analytics);
        let (_, mut rx2) = fabric.register(Topic::Analytics);

        fabric.publish(Topic::Analytics, &json!({"spread": 1.0}));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn failed_send_drops_only_that_subscriber() {
        let fabric = BroadcastFabric::new(1);
        let (id1, rx1) = fabric.register(Topic::Alerts);
        let (_id2, mut rx2) = fabric.register(Topic::Alerts);
        drop(rx1); // closes the channel, simulating a dead subscriber

        fabric.publish(Topic::Alerts, &json!({"n": 1}));

        assert_eq!(fabric.subscriber_count(Topic::Alerts), 1);
        assert!(rx2.try_recv().is_ok());
        let _ = id1;
    }

    #[test]
    fn unregister_removes_subscriber() {
        let fabric = BroadcastFabric::new(8);
        let (id, _rx) = fabric.register(Topic::Prices);
        assert_eq!(fabric.subscriber_count(Topic::Prices), 1);
        fabric.unregister(Topic::Prices, id);
        assert_eq!(fabric.subscriber_count(Topic::Prices), 0);
    }

    #[test]
    fn topics_are_isolated() {
        let fabric = BroadcastFabric::new(8);
        let (_, mut rx) = fabric.register(Topic::Prices);
        fabric.publish(Topic::Spread, &json!({"spread": 1.0}));
        assert!(rx.try_recv().is_err());
    }
}
