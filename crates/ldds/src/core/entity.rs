// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Entity graph: handles, nodes, and the generational arena.
//!
//! Every entity (participant, publisher, subscriber, topic, writer, reader)
//! lives in one [`EntityGraph`] slot. Handles carry a slot index plus a
//! generation counter; deleting an entity bumps the slot generation, so a
//! stale handle resolves to `None` instead of aliasing a newer entity.

use crate::core::cache::{HistoryCache, InstanceHandle};
use crate::core::status::StatusRecorder;
use crate::dds::condition::StatusCondition;
use crate::dds::listener::Listener;
use crate::qos::Qos;
use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Opaque entity identifier: arena slot index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

impl EntityHandle {
    /// The nil handle; never resolves.
    #[must_use]
    pub const fn nil() -> Self {
        Self {
            index: u32::MAX,
            generation: 0,
        }
    }

    /// Whether this is the nil handle.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        self.index == u32::MAX
    }

    /// Packed 64-bit form (generation high, index low).
    #[must_use]
    pub const fn raw(&self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Rebuild from [`EntityHandle::raw`].
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: (raw & 0xFFFF_FFFF) as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl Default for EntityHandle {
    fn default() -> Self {
        Self::nil()
    }
}

/// Entity kind, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Participant,
    Publisher,
    Subscriber,
    Topic,
    Writer,
    Reader,
}

/// Observer notified when a reader cache changes (read conditions).
pub trait CacheObserver: Send + Sync {
    /// Called after every cache mutation on the observed reader.
    fn on_cache_change(&self);
}

/// A sample retained in the writer history for late-joiner replay.
#[derive(Clone)]
pub struct RetainedSample {
    /// Payload bytes.
    pub data: Arc<[u8]>,
    /// Writer sequence number.
    pub seq: u64,
    /// Source timestamp (nanoseconds).
    pub source_timestamp: u64,
    /// Instance the sample belongs to.
    pub instance: InstanceHandle,
}

/// Writer-side endpoint state.
pub struct WriterState {
    /// Topic this writer publishes.
    pub topic: EntityHandle,
    /// Creation stamp, breaks exclusive-ownership strength ties.
    pub registration: u64,
    /// Next sequence number.
    pub seq: AtomicU64,
    /// History retained for TransientLocal replay, bounded by the writer's
    /// History policy.
    pub retained: Mutex<VecDeque<RetainedSample>>,
    /// Instances this writer has registered.
    pub instances: Mutex<HashSet<InstanceHandle>>,
    /// Currently matched readers.
    pub matched: Mutex<Vec<EntityHandle>>,
    /// Last write time per instance, for deadline checks.
    pub last_write: Mutex<HashMap<InstanceHandle, Instant>>,
    /// Last liveliness assertion (writes count as assertions).
    pub last_assert: Mutex<Instant>,
    /// Whether liveliness is currently considered lost.
    pub liveliness_lost: Mutex<bool>,
}

impl WriterState {
    /// Fresh state for a new writer.
    #[must_use]
    pub fn new(topic: EntityHandle, registration: u64) -> Self {
        Self {
            topic,
            registration,
            seq: AtomicU64::new(0),
            retained: Mutex::new(VecDeque::new()),
            instances: Mutex::new(HashSet::new()),
            matched: Mutex::new(Vec::new()),
            last_write: Mutex::new(HashMap::new()),
            last_assert: Mutex::new(Instant::now()),
            liveliness_lost: Mutex::new(false),
        }
    }
}

/// Gate a reader blocks on until historical (durable) data has been
/// replayed into its cache.
#[derive(Default)]
pub struct HistoricalGate {
    done: Mutex<bool>,
    cv: Condvar,
}

impl HistoricalGate {
    /// Mark replay complete and wake waiters.
    pub fn mark_done(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cv.notify_all();
    }

    /// Block until replay completes or `timeout` elapses.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut done = self.done.lock();
        if *done {
            return true;
        }
        self.cv.wait_for(&mut done, timeout);
        *done
    }
}

/// Reader-side endpoint state.
pub struct ReaderState {
    /// Topic this reader subscribes to.
    pub topic: EntityHandle,
    /// The bounded sample store.
    pub cache: HistoryCache,
    /// Currently matched writers.
    pub matched: Mutex<Vec<EntityHandle>>,
    /// Read/query conditions observing the cache.
    pub observers: Mutex<Vec<Weak<dyn CacheObserver>>>,
    /// Historical-data replay gate.
    pub historical: HistoricalGate,
    /// Last arrival time per instance, for deadline checks.
    pub last_arrival: Mutex<HashMap<InstanceHandle, Instant>>,
}

impl ReaderState {
    /// Fresh state for a new reader with the given effective QoS.
    #[must_use]
    pub fn new(topic: EntityHandle, qos: &Qos) -> Self {
        Self {
            topic,
            cache: HistoryCache::new(qos),
            matched: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            historical: HistoricalGate::default(),
            last_arrival: Mutex::new(HashMap::new()),
        }
    }

    /// Register a cache observer (read condition).
    pub fn add_observer(&self, observer: Weak<dyn CacheObserver>) {
        let mut observers = self.observers.lock();
        observers.retain(|o| o.upgrade().is_some());
        observers.push(observer);
    }

    /// Notify observers after a cache mutation.
    pub fn notify_observers(&self) {
        let mut observers = self.observers.lock();
        observers.retain(|o| {
            if let Some(observer) = o.upgrade() {
                observer.on_cache_change();
                true
            } else {
                false
            }
        });
    }
}

/// Kind-specific payload of an entity node.
pub enum Role {
    /// Domain participant root.
    Participant,
    /// Writer group.
    Publisher,
    /// Reader group.
    Subscriber,
    /// Named, typed data channel.
    Topic {
        /// Topic name, unique per participant.
        name: String,
        /// Registered type name.
        type_name: String,
    },
    /// Data writer endpoint.
    Writer(Arc<WriterState>),
    /// Data reader endpoint.
    Reader(Arc<ReaderState>),
}

impl Role {
    /// The entity kind this role implies.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Role::Participant => EntityKind::Participant,
            Role::Publisher => EntityKind::Publisher,
            Role::Subscriber => EntityKind::Subscriber,
            Role::Topic { .. } => EntityKind::Topic,
            Role::Writer(_) => EntityKind::Writer,
            Role::Reader(_) => EntityKind::Reader,
        }
    }
}

/// One live entity: identity, ownership link, QoS snapshot, notification
/// surface, and the kind-specific payload.
pub struct EntityNode {
    /// This entity's handle.
    pub handle: EntityHandle,
    /// Owning entity (nil for participants).
    pub parent: EntityHandle,
    /// Effective QoS, immutable after creation.
    pub qos: Qos,
    /// Optional listener table; swapped atomically.
    pub listener: ArcSwapOption<Listener>,
    /// The entity's status condition.
    pub status_condition: Arc<StatusCondition>,
    /// Typed status counters.
    pub statuses: StatusRecorder,
    /// Kind-specific payload.
    pub role: Role,
}

impl EntityNode {
    /// The entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.role.kind()
    }

    /// Writer payload, if this is a writer.
    #[must_use]
    pub fn writer(&self) -> Option<&Arc<WriterState>> {
        match &self.role {
            Role::Writer(state) => Some(state),
            _ => None,
        }
    }

    /// Reader payload, if this is a reader.
    #[must_use]
    pub fn reader(&self) -> Option<&Arc<ReaderState>> {
        match &self.role {
            Role::Reader(state) => Some(state),
            _ => None,
        }
    }

    /// Replace (or clear) the listener table.
    pub fn set_listener(&self, listener: Option<Listener>) {
        self.listener.store(listener.map(Arc::new));
    }
}

struct Slot {
    generation: u32,
    node: Option<Arc<EntityNode>>,
}

/// Generational arena holding every entity of one runtime.
#[derive(Default)]
pub struct EntityGraph {
    slots: RwLock<Vec<Slot>>,
}

impl EntityGraph {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, reusing the first free slot. The builder receives the
    /// handle so the node can carry its own identity.
    pub fn insert<F>(&self, build: F) -> EntityHandle
    where
        F: FnOnce(EntityHandle) -> EntityNode,
    {
        let mut slots = self.slots.write();
        let index = slots.iter().position(|s| s.node.is_none());
        match index {
            Some(index) => {
                let handle = EntityHandle {
                    index: index as u32,
                    generation: slots[index].generation,
                };
                slots[index].node = Some(Arc::new(build(handle)));
                handle
            }
            None => {
                let handle = EntityHandle {
                    index: slots.len() as u32,
                    generation: 1,
                };
                slots.push(Slot {
                    generation: 1,
                    node: Some(Arc::new(build(handle))),
                });
                handle
            }
        }
    }

    /// Resolve a handle to its live node. Stale and nil handles yield `None`.
    #[must_use]
    pub fn resolve(&self, handle: EntityHandle) -> Option<Arc<EntityNode>> {
        let slots = self.slots.read();
        let slot = slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.clone()
    }

    /// Remove a node, bumping the slot generation so the handle goes stale.
    pub fn remove(&self, handle: EntityHandle) -> Option<Arc<EntityNode>> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let node = slot.node.take();
        if node.is_some() {
            slot.generation = slot.generation.wrapping_add(1);
        }
        node
    }

    /// Direct children of `parent`, in slot order.
    #[must_use]
    pub fn children(&self, parent: EntityHandle) -> Vec<Arc<EntityNode>> {
        self.slots
            .read()
            .iter()
            .filter_map(|s| s.node.clone())
            .filter(|n| n.parent == parent)
            .collect()
    }

    /// Whether a handle points at a slot whose generation has moved on
    /// (the entity existed and was deleted).
    #[must_use]
    pub fn is_stale(&self, handle: EntityHandle) -> bool {
        if handle.is_nil() {
            return false;
        }
        let slots = self.slots.read();
        match slots.get(handle.index as usize) {
            Some(slot) => slot.generation != handle.generation,
            None => false,
        }
    }

    /// Every live node of the given kind.
    #[must_use]
    pub fn of_kind(&self, kind: EntityKind) -> Vec<Arc<EntityNode>> {
        self.slots
            .read()
            .iter()
            .filter_map(|s| s.node.clone())
            .filter(|n| n.kind() == kind)
            .collect()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|s| s.node.is_some())
            .count()
    }

    /// Whether the graph holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(handle: EntityHandle, parent: EntityHandle, role: Role) -> EntityNode {
        EntityNode {
            handle,
            parent,
            qos: Qos::default(),
            listener: ArcSwapOption::empty(),
            status_condition: Arc::new(StatusCondition::new()),
            statuses: StatusRecorder::new(),
            role,
        }
    }

    #[test]
    fn test_insert_and_resolve() {
        let graph = EntityGraph::new();
        let handle = graph.insert(|h| node(h, EntityHandle::nil(), Role::Participant));
        let resolved = graph.resolve(handle).expect("live handle");
        assert_eq!(resolved.handle, handle);
        assert_eq!(resolved.kind(), EntityKind::Participant);
    }

    #[test]
    fn test_stale_handle_after_remove() {
        let graph = EntityGraph::new();
        let handle = graph.insert(|h| node(h, EntityHandle::nil(), Role::Participant));
        assert!(graph.remove(handle).is_some());
        assert!(graph.resolve(handle).is_none(), "stale handle must miss");
        assert!(graph.remove(handle).is_none(), "double delete must miss");
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let graph = EntityGraph::new();
        let first = graph.insert(|h| node(h, EntityHandle::nil(), Role::Participant));
        graph.remove(first);
        let second = graph.insert(|h| node(h, EntityHandle::nil(), Role::Participant));

        assert_ne!(first, second, "reused slot must not alias the old handle");
        assert!(graph.resolve(first).is_none());
        assert!(graph.resolve(second).is_some());
    }

    #[test]
    fn test_children_listing() {
        let graph = EntityGraph::new();
        let participant = graph.insert(|h| node(h, EntityHandle::nil(), Role::Participant));
        let publisher = graph.insert(|h| node(h, participant, Role::Publisher));
        let subscriber = graph.insert(|h| node(h, participant, Role::Subscriber));
        graph.insert(|h| node(h, publisher, Role::Writer(Arc::new(WriterState::new(
            EntityHandle::nil(),
            0,
        )))));

        let kids: Vec<EntityHandle> = graph
            .children(participant)
            .iter()
            .map(|n| n.handle)
            .collect();
        assert_eq!(kids, vec![publisher, subscriber]);
    }

    #[test]
    fn test_raw_round_trip() {
        let graph = EntityGraph::new();
        let handle = graph.insert(|h| node(h, EntityHandle::nil(), Role::Participant));
        assert_eq!(EntityHandle::from_raw(handle.raw()), handle);
        assert!(EntityHandle::nil().is_nil());
        assert!(!handle.is_nil());
    }

    #[test]
    fn test_historical_gate() {
        let gate = Arc::new(HistoricalGate::default());
        assert!(!gate.wait(Duration::from_millis(1)));

        let waiter = Arc::clone(&gate);
        let thread = std::thread::spawn(move || waiter.wait(Duration::from_secs(5)));
        gate.mark_done();
        assert!(thread.join().expect("no panic"));
        // Done is sticky.
        assert!(gate.wait(Duration::ZERO));
    }
}
