// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conditions - boolean predicates attachable to WaitSets.
//!
//! A Condition exposes a trigger value that a [`crate::dds::WaitSet`] can
//! block on. Conditions register waitset signals when attached so a trigger
//! flip wakes blocked waiters immediately instead of being polled.

use super::listener::StatusKind;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Wake-up hook handed to a condition when it is attached to a WaitSet.
pub trait WaitsetSignal: Send + Sync {
    /// Unique id of this signal (for removal).
    fn id(&self) -> u64;

    /// Wake the owning WaitSet.
    fn signal(&self);
}

/// Base interface for all conditions.
pub trait Condition: Send + Sync {
    /// Current trigger value.
    fn trigger_value(&self) -> bool;

    /// Unique identifier for this condition.
    fn condition_id(&self) -> u64;

    /// Register a waitset signal so this condition can wake blocked waiters.
    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>);

    /// Remove a previously registered waitset signal.
    fn remove_waitset_signal(&self, signal_id: u64);

    /// Downcast support for dynamic condition handling.
    fn as_any(&self) -> &dyn Any;
}

pub(crate) fn next_condition_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

struct WaitsetHook {
    id: u64,
    signal: Weak<dyn WaitsetSignal>,
}

/// Shared hook list with the signal-on-attach contract.
#[derive(Default)]
pub(crate) struct HookList {
    hooks: Mutex<Vec<WaitsetHook>>,
}

impl HookList {
    pub(crate) fn add(&self, signal: &Arc<dyn WaitsetSignal>, triggered: bool) {
        let mut hooks = self.hooks.lock();
        hooks.retain(|hook| hook.signal.upgrade().is_some());
        hooks.push(WaitsetHook {
            id: signal.id(),
            signal: Arc::downgrade(signal),
        });
        drop(hooks);
        // A condition already true at attach time must not be missed.
        if triggered {
            signal.signal();
        }
    }

    pub(crate) fn remove(&self, signal_id: u64) {
        self.hooks.lock().retain(|hook| hook.id != signal_id);
    }

    pub(crate) fn notify(&self) {
        let mut hooks = self.hooks.lock();
        hooks.retain(|hook| {
            if let Some(signal) = hook.signal.upgrade() {
                signal.signal();
                true
            } else {
                false
            }
        });
    }
}

/// Status mask bits, one per [`StatusKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusMask(u32);

impl StatusMask {
    /// No status enabled.
    pub const NONE: StatusMask = StatusMask(0);

    /// All statuses enabled.
    pub const ALL: StatusMask = StatusMask(u32::MAX);

    /// Mask bit for a single status kind.
    #[must_use]
    pub const fn of(kind: StatusKind) -> Self {
        StatusMask(1 << kind.index())
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(&self, other: StatusMask) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Bitwise OR.
    #[must_use]
    pub const fn or(self, other: StatusMask) -> Self {
        StatusMask(self.0 | other.0)
    }

    /// Bitwise AND.
    #[must_use]
    pub const fn and(self, other: StatusMask) -> Self {
        StatusMask(self.0 & other.0)
    }
}

impl std::ops::BitOr for StatusMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl std::ops::BitAnd for StatusMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

/// Condition tied to an entity's communication statuses.
///
/// The trigger value is true when any enabled status is active. The owning
/// entity sets status bits as events are recorded and clears them when the
/// application reads the corresponding status.
pub struct StatusCondition {
    id: u64,
    enabled: Mutex<StatusMask>,
    active: Mutex<StatusMask>,
    hooks: HookList,
}

impl StatusCondition {
    /// New condition with all statuses enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_condition_id(),
            enabled: Mutex::new(StatusMask::ALL),
            active: Mutex::new(StatusMask::NONE),
            hooks: HookList::default(),
        }
    }

    /// Restrict which statuses drive the trigger.
    pub fn set_enabled_statuses(&self, mask: StatusMask) {
        *self.enabled.lock() = mask;
        if self.trigger_value() {
            self.hooks.notify();
        }
    }

    /// Currently enabled statuses.
    #[must_use]
    pub fn enabled_statuses(&self) -> StatusMask {
        *self.enabled.lock()
    }

    /// Currently active statuses.
    #[must_use]
    pub fn active_statuses(&self) -> StatusMask {
        *self.active.lock()
    }

    /// Mark one status active (called when the entity records an event).
    pub(crate) fn raise(&self, kind: StatusKind) {
        let bit = StatusMask::of(kind);
        {
            let mut active = self.active.lock();
            *active = active.or(bit);
        }
        if self.enabled_statuses().contains(bit) {
            self.hooks.notify();
        }
    }

    /// Clear one status (called when the application reads the status).
    pub(crate) fn lower(&self, kind: StatusKind) {
        let mut active = self.active.lock();
        *active = active.and(StatusMask(!StatusMask::of(kind).bits()));
    }
}

impl Default for StatusCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition for StatusCondition {
    fn trigger_value(&self) -> bool {
        self.enabled_statuses().and(self.active_statuses()).bits() != 0
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

/// Manually triggered condition, fully under application control.
pub struct GuardCondition {
    id: u64,
    trigger: AtomicBool,
    hooks: HookList,
}

impl GuardCondition {
    /// New guard with trigger value `false`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_condition_id(),
            trigger: AtomicBool::new(false),
            hooks: HookList::default(),
        }
    }

    /// Set the trigger value; `true` wakes any waiting WaitSet.
    pub fn set_trigger_value(&self, value: bool) {
        self.trigger.store(value, Ordering::Release);
        if value {
            self.hooks.notify();
        }
    }
}

impl Default for GuardCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition for GuardCondition {
    fn trigger_value(&self) -> bool {
        self.trigger.load(Ordering::Acquire)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_condition_trigger() {
        let guard = GuardCondition::new();
        assert!(!guard.trigger_value());
        guard.set_trigger_value(true);
        assert!(guard.trigger_value());
        guard.set_trigger_value(false);
        assert!(!guard.trigger_value());
    }

    #[test]
    fn test_condition_ids_unique() {
        let a = GuardCondition::new();
        let b = GuardCondition::new();
        let c = StatusCondition::new();
        assert_ne!(a.condition_id(), b.condition_id());
        assert_ne!(b.condition_id(), c.condition_id());
    }

    #[test]
    fn test_status_condition_raise_lower() {
        let cond = StatusCondition::new();
        assert!(!cond.trigger_value());

        cond.raise(StatusKind::DataAvailable);
        assert!(cond.trigger_value());
        assert!(cond
            .active_statuses()
            .contains(StatusMask::of(StatusKind::DataAvailable)));

        cond.lower(StatusKind::DataAvailable);
        assert!(!cond.trigger_value());
    }

    #[test]
    fn test_status_condition_enabled_mask_filters() {
        let cond = StatusCondition::new();
        cond.set_enabled_statuses(StatusMask::of(StatusKind::SampleLost));

        cond.raise(StatusKind::DataAvailable);
        assert!(!cond.trigger_value(), "disabled status must not trigger");

        cond.raise(StatusKind::SampleLost);
        assert!(cond.trigger_value());
    }

    #[test]
    fn test_mask_bit_ops() {
        let mask = StatusMask::of(StatusKind::DataAvailable) | StatusMask::of(StatusKind::SampleLost);
        assert!(mask.contains(StatusMask::of(StatusKind::DataAvailable)));
        assert!(!mask.contains(StatusMask::of(StatusKind::SampleRejected)));
        assert_eq!(
            (mask & StatusMask::of(StatusKind::SampleLost)).bits(),
            StatusMask::of(StatusKind::SampleLost).bits()
        );
    }

    struct CountingSignal {
        id: u64,
        count: std::sync::atomic::AtomicU32,
    }

    impl WaitsetSignal for CountingSignal {
        fn id(&self) -> u64 {
            self.id
        }
        fn signal(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_signal_on_attach_when_already_triggered() {
        let guard = GuardCondition::new();
        guard.set_trigger_value(true);

        let signal = Arc::new(CountingSignal {
            id: 7,
            count: std::sync::atomic::AtomicU32::new(0),
        });
        guard.add_waitset_signal(signal.clone() as Arc<dyn WaitsetSignal>);
        assert_eq!(signal.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_removed_not_notified() {
        let guard = GuardCondition::new();
        let signal = Arc::new(CountingSignal {
            id: 9,
            count: std::sync::atomic::AtomicU32::new(0),
        });
        guard.add_waitset_signal(signal.clone() as Arc<dyn WaitsetSignal>);
        guard.remove_waitset_signal(9);
        guard.set_trigger_value(true);
        assert_eq!(signal.count.load(Ordering::SeqCst), 0);
    }
}
