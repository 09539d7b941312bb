// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Read and query conditions over a reader's history cache.
//!
//! A `ReadCondition` triggers while at least one cached sample matches its
//! state masks. A `QueryCondition` additionally runs an application
//! predicate over the candidate sample; a predicate that panics is treated
//! as `false` at this single isolation point, so application bugs degrade
//! to "no match" instead of poisoning the runtime.

pub use crate::core::cache::{
    InstanceState, InstanceStateMask, ReadMask, SampleState, SampleStateMask, ViewState,
    ViewStateMask,
};

use crate::core::cache::SampleRecord;
use crate::core::entity::{CacheObserver, EntityHandle, ReaderState};
use crate::dds::condition::{next_condition_id, Condition, HookList, WaitsetSignal};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Condition over a reader's cache, triggered by state-mask membership.
pub struct ReadCondition {
    id: u64,
    reader: EntityHandle,
    state: Arc<ReaderState>,
    mask: ReadMask,
    hooks: HookList,
}

impl ReadCondition {
    pub(crate) fn new(
        reader: EntityHandle,
        state: Arc<ReaderState>,
        mask: ReadMask,
    ) -> Arc<Self> {
        let condition = Arc::new(Self {
            id: next_condition_id(),
            reader,
            state,
            mask,
            hooks: HookList::default(),
        });
        let observer: Arc<dyn CacheObserver> = Arc::clone(&condition) as _;
        condition.state.add_observer(Arc::downgrade(&observer));
        condition
    }

    /// The reader this condition observes.
    #[must_use]
    pub fn reader(&self) -> EntityHandle {
        self.reader
    }

    /// The state masks this condition selects on.
    #[must_use]
    pub fn mask(&self) -> ReadMask {
        self.mask
    }
}

impl Condition for ReadCondition {
    fn trigger_value(&self) -> bool {
        self.state.cache.any_matching(self.mask)
    }

    fn condition_id(&self) -> u64 {
        self.id
    }

    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>) {
        self.hooks.add(&signal, self.trigger_value());
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.hooks.remove(signal_id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CacheObserver for ReadCondition {
    fn on_cache_change(&self) {
        if self.trigger_value() {
            self.hooks.notify();
        }
    }
}

/// Predicate over a candidate sample. Sees payload bytes and metadata.
pub type QueryPredicate = Arc<dyn Fn(&SampleRecord) -> bool + Send + Sync>;

/// Read condition with an application predicate on top of the masks.
pub struct QueryCondition {
    id: u64,
    reader: EntityHandle,
    state: Arc<ReaderState>,
    mask: ReadMask,
    predicate: QueryPredicate,
    hooks: HookList,
}

impl QueryCondition {
    pub(crate) fn new(
        reader: EntityHandle,
        state: Arc<ReaderState>,
        mask: ReadMask,
        predicate: QueryPredicate,
    ) -> Arc<Self> {
        let condition = Arc::new(Self {
            id: next_condition_id(),
            reader,
            state,
            mask,
            predicate,
            hooks: HookList::default(),
        });
        let observer: Arc<dyn CacheObserver> = Arc::clone(&condition) as _;
        condition.state.add_observer(Arc::downgrade(&observer));
        condition
    }

    /// The reader this condition observes.
    #[must_use]
    pub fn reader(&self) -> EntityHandle {
        self.reader
    }

    fn evaluate(&self) -> bool {
        let predicate = &self.predicate;
        self.state.cache.any_matching_with(self.mask, |record| {
            // Isolation point: a panicking predicate counts as no match.
            catch_unwind(AssertUnwindSafe(|| predicate(record))).unwrap_or_else(|_| {
                log::warn!("[CONDITION] query predicate panicked, treating as false");
                false
            })
        })
    }
}

impl Condition for QueryCondition {
    fn trigger_value(&self) -> bool {
        self.evaluate()
    }

    fn condition_id(&self) -> u64 {
        self.id
    }

    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>) {
        self.hooks.add(&signal, self.trigger_value());
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.hooks.remove(signal_id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CacheObserver for QueryCondition {
    fn on_cache_change(&self) {
        if self.evaluate() {
            self.hooks.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::Qos;

    fn reader_state() -> Arc<ReaderState> {
        Arc::new(ReaderState::new(EntityHandle::nil(), &Qos::default()))
    }

    fn insert(state: &ReaderState, payload: &[u8], seq: u64) {
        let mut key = [0u8; 16];
        key[0] = 1;
        let outcome = state.cache.insert(
            1,
            0,
            0,
            seq,
            Arc::from(payload),
            seq,
            crate::core::cache::InstanceHandle::new(key),
        );
        assert_eq!(outcome, crate::core::cache::InsertOutcome::Stored);
    }

    #[test]
    fn test_read_condition_triggers_on_data() {
        let state = reader_state();
        let condition = ReadCondition::new(
            EntityHandle::nil(),
            Arc::clone(&state),
            ReadMask::not_read(),
        );
        assert!(!condition.trigger_value());

        insert(&state, b"x", 0);
        assert!(condition.trigger_value());

        let _ = state.cache.take(ReadMask::any(), usize::MAX);
        assert!(!condition.trigger_value());
    }

    #[test]
    fn test_read_condition_not_read_mask_untriggers_after_read() {
        let state = reader_state();
        let condition = ReadCondition::new(
            EntityHandle::nil(),
            Arc::clone(&state),
            ReadMask::not_read(),
        );
        insert(&state, b"x", 0);
        assert!(condition.trigger_value());

        let _ = state.cache.read(ReadMask::any(), usize::MAX);
        assert!(!condition.trigger_value(), "read samples leave the mask");
    }

    #[test]
    fn test_query_condition_predicate() {
        let state = reader_state();
        let condition = QueryCondition::new(
            EntityHandle::nil(),
            Arc::clone(&state),
            ReadMask::any(),
            Arc::new(|record| record.data.as_ref() == b"wanted"),
        );
        insert(&state, b"other", 0);
        assert!(!condition.trigger_value());

        insert(&state, b"wanted", 1);
        assert!(condition.trigger_value());
    }

    #[test]
    fn test_query_predicate_panic_is_false() {
        let state = reader_state();
        let condition = QueryCondition::new(
            EntityHandle::nil(),
            Arc::clone(&state),
            ReadMask::any(),
            Arc::new(|_| panic!("application bug")),
        );
        insert(&state, b"x", 0);
        assert!(!condition.trigger_value());
    }

    #[test]
    fn test_observer_notified_on_insert() {
        use crate::dds::condition::WaitsetSignal;
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingSignal(AtomicU32);
        impl WaitsetSignal for CountingSignal {
            fn id(&self) -> u64 {
                99
            }
            fn signal(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let state = reader_state();
        let condition =
            ReadCondition::new(EntityHandle::nil(), Arc::clone(&state), ReadMask::any());
        let signal = Arc::new(CountingSignal(AtomicU32::new(0)));
        condition.add_waitset_signal(Arc::clone(&signal) as Arc<dyn WaitsetSignal>);
        assert_eq!(signal.0.load(Ordering::SeqCst), 0, "not triggered at attach");

        insert(&state, b"x", 0);
        state.notify_observers();
        assert_eq!(signal.0.load(Ordering::SeqCst), 1);
    }
}
