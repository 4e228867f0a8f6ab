//! Topology monitoring events and the subscriber registry.
//!
//! Subscribers are registered on the manager as `Arc<dyn Subscriber>` and
//! compared by pointer identity, so registering the same subscriber twice is
//! a no-op and removing it takes the same `Arc`.

use std::sync::Arc;

use bson::oid::ObjectId;
use nodelink_core::{Map, Value};
use parking_lot::RwLock;

/// Published once, when a manager's topology is first used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyOpeningEvent {
    topology_id: ObjectId,
}

impl TopologyOpeningEvent {
    #[must_use]
    pub fn new(topology_id: ObjectId) -> Self {
        Self { topology_id }
    }

    #[must_use]
    pub fn topology_id(&self) -> ObjectId {
        self.topology_id
    }

    /// Debug view: `{topologyId: ObjectId}`.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let mut out = Map::new();
        out.insert("topologyId", self.topology_id);
        Value::Map(out)
    }
}

/// Receives monitoring events. Every method defaults to a no-op.
pub trait Subscriber: Send + Sync {
    fn topology_opening(&self, _event: &TopologyOpeningEvent) {}
}

#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

fn same(a: &Arc<dyn Subscriber>, b: &Arc<dyn Subscriber>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl SubscriberRegistry {
    /// Registers a subscriber. Returns `false` if it was already registered.
    pub fn add(&self, subscriber: Arc<dyn Subscriber>) -> bool {
        let mut subscribers = self.subscribers.write();
        if subscribers.iter().any(|s| same(s, &subscriber)) {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    /// Unregisters a subscriber. Returns `false` if it was not registered.
    pub fn remove(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| !same(s, subscriber));
        subscribers.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Fans the event out to a snapshot of the current subscribers. The lock
    /// is not held while subscribers run, so they may (un)register others.
    pub fn topology_opening(&self, event: &TopologyOpeningEvent) {
        let subscribers = self.subscribers.read().clone();
        for subscriber in &subscribers {
            subscriber.topology_opening(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl Subscriber for Counting {
        fn topology_opening(&self, _event: &TopologyOpeningEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Silent;

    impl Subscriber for Silent {}

    #[test]
    fn fan_out_and_identity() {
        let registry = SubscriberRegistry::default();
        let counting = Arc::new(Counting::default());
        let as_dyn: Arc<dyn Subscriber> = counting.clone();

        assert!(registry.add(as_dyn.clone()));
        assert!(!registry.add(as_dyn.clone()));
        assert!(registry.add(Arc::new(Silent)));
        assert_eq!(registry.len(), 2);

        registry.topology_opening(&TopologyOpeningEvent::new(ObjectId::new()));
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);

        assert!(registry.remove(&as_dyn));
        assert!(!registry.remove(&as_dyn));
        registry.topology_opening(&TopologyOpeningEvent::new(ObjectId::new()));
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_debug_view() {
        let id = ObjectId::new();
        let event = TopologyOpeningEvent::new(id);
        assert_eq!(event.topology_id(), id);
        assert_eq!(event.to_document().get("topologyId"), Some(&Value::ObjectId(id)));
    }
}
