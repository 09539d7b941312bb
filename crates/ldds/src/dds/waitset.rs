// SPDX-License-Identifier: Apache-2.0 OR MIT

//! WaitSet: block until an attached condition triggers.
//!
//! Conditions are polled at wait entry, so a condition that is already true
//! when `wait` is called returns immediately and no trigger is ever missed.
//! While blocked, attached conditions wake the waitset through the signal
//! they received at attach time.

use crate::dds::condition::{next_condition_id, Condition, WaitsetSignal};
use crate::dds::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

struct WakeState {
    signaled: Mutex<bool>,
    cv: Condvar,
}

struct Signal {
    id: u64,
    wake: Weak<WakeState>,
}

impl WaitsetSignal for Signal {
    fn id(&self) -> u64 {
        self.id
    }

    fn signal(&self) {
        if let Some(wake) = self.wake.upgrade() {
            let mut signaled = wake.signaled.lock();
            *signaled = true;
            wake.cv.notify_all();
        }
    }
}

/// Blocks a thread until one of its attached conditions triggers.
pub struct WaitSet {
    wake: Arc<WakeState>,
    signal: Arc<dyn WaitsetSignal>,
    conditions: Mutex<Vec<Arc<dyn Condition>>>,
}

impl WaitSet {
    /// Empty waitset.
    #[must_use]
    pub fn new() -> Self {
        let wake = Arc::new(WakeState {
            signaled: Mutex::new(false),
            cv: Condvar::new(),
        });
        let signal: Arc<dyn WaitsetSignal> = Arc::new(Signal {
            id: next_condition_id(),
            wake: Arc::downgrade(&wake),
        });
        Self {
            wake,
            signal,
            conditions: Mutex::new(Vec::new()),
        }
    }

    /// Attach a condition.
    ///
    /// # Errors
    ///
    /// `PreconditionNotMet` when the condition is already attached.
    pub fn attach(&self, condition: Arc<dyn Condition>) -> Result<()> {
        {
            let mut conditions = self.conditions.lock();
            if conditions
                .iter()
                .any(|c| c.condition_id() == condition.condition_id())
            {
                return Err(Error::PreconditionNotMet);
            }
            conditions.push(Arc::clone(&condition));
        }
        // Registered outside the conditions lock: an already-true condition
        // signals at registration, and the signal path takes the wake lock
        // that a concurrent `wait` holds while it polls this list.
        condition.add_waitset_signal(Arc::clone(&self.signal));
        Ok(())
    }

    /// Detach a condition.
    ///
    /// # Errors
    ///
    /// `PreconditionNotMet` when the condition is not attached.
    pub fn detach(&self, condition: &Arc<dyn Condition>) -> Result<()> {
        let mut conditions = self.conditions.lock();
        let before = conditions.len();
        conditions.retain(|c| c.condition_id() != condition.condition_id());
        if conditions.len() == before {
            return Err(Error::PreconditionNotMet);
        }
        condition.remove_waitset_signal(self.signal.id());
        Ok(())
    }

    /// Number of attached conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.lock().len()
    }

    /// Whether no conditions are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.lock().is_empty()
    }

    fn triggered(&self) -> Vec<Arc<dyn Condition>> {
        self.conditions
            .lock()
            .iter()
            .filter(|c| c.trigger_value())
            .cloned()
            .collect()
    }

    /// Block until at least one attached condition triggers, returning the
    /// triggered set.
    ///
    /// # Errors
    ///
    /// `Timeout` when `timeout` elapses with nothing triggered.
    pub fn wait(&self, timeout: Duration) -> Result<Vec<Arc<dyn Condition>>> {
        // `None` means the timeout is past any representable instant:
        // block until signaled, with no deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut signaled = self.wake.signaled.lock();
        loop {
            *signaled = false;
            // Poll with the wake lock held: a signal arriving during the
            // poll sets the flag and is seen before the next sleep.
            let triggered = self.triggered();
            if !triggered.is_empty() {
                return Ok(triggered);
            }
            if *signaled {
                continue;
            }
            let Some(deadline) = deadline else {
                self.wake.cv.wait(&mut signaled);
                continue;
            };
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            if self.wake.cv.wait_until(&mut signaled, deadline).timed_out() && !*signaled {
                // Final poll so a trigger racing the timeout still wins.
                let triggered = self.triggered();
                if triggered.is_empty() {
                    return Err(Error::Timeout);
                }
                return Ok(triggered);
            }
        }
    }

    /// Wake a blocked `wait` without any condition triggering. The woken
    /// call re-polls and, with nothing triggered, keeps waiting.
    pub fn notify(&self) {
        self.signal.signal();
    }
}

impl Default for WaitSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dds::condition::GuardCondition;

    #[test]
    fn test_wait_returns_already_triggered_condition() {
        let waitset = WaitSet::new();
        let guard = Arc::new(GuardCondition::new());
        guard.set_trigger_value(true);
        waitset
            .attach(Arc::clone(&guard) as Arc<dyn Condition>)
            .expect("attach");

        let triggered = waitset.wait(Duration::from_millis(10)).expect("no wait");
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].condition_id(), guard.condition_id());
    }

    #[test]
    fn test_wait_times_out() {
        let waitset = WaitSet::new();
        let guard = Arc::new(GuardCondition::new());
        waitset
            .attach(guard as Arc<dyn Condition>)
            .expect("attach");

        let start = Instant::now();
        let result = waitset.wait(Duration::from_millis(20));
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wake_from_other_thread() {
        let waitset = Arc::new(WaitSet::new());
        let guard = Arc::new(GuardCondition::new());
        waitset
            .attach(Arc::clone(&guard) as Arc<dyn Condition>)
            .expect("attach");

        let trigger = Arc::clone(&guard);
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.set_trigger_value(true);
        });

        let triggered = waitset.wait(Duration::from_secs(5)).expect("woken");
        assert_eq!(triggered.len(), 1);
        thread.join().expect("no panic");
    }

    #[test]
    fn test_wait_with_unbounded_timeout_wakes_on_trigger() {
        let waitset = Arc::new(WaitSet::new());
        let guard = Arc::new(GuardCondition::new());
        waitset
            .attach(Arc::clone(&guard) as Arc<dyn Condition>)
            .expect("attach");

        let trigger = Arc::clone(&guard);
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.set_trigger_value(true);
        });

        // Duration::MAX has no representable deadline; the wait must block
        // until the trigger instead of overflowing.
        let triggered = waitset.wait(Duration::MAX).expect("woken");
        assert_eq!(triggered.len(), 1);
        thread.join().expect("no panic");
    }

    #[test]
    fn test_attach_already_triggered_wakes_blocked_wait() {
        let waitset = Arc::new(WaitSet::new());
        let idle = Arc::new(GuardCondition::new());
        waitset
            .attach(Arc::clone(&idle) as Arc<dyn Condition>)
            .expect("attach");

        let attacher = Arc::clone(&waitset);
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let guard = Arc::new(GuardCondition::new());
            guard.set_trigger_value(true);
            attacher
                .attach(guard as Arc<dyn Condition>)
                .expect("attach while waiting");
        });

        // The attach-time signal fires while this thread is inside `wait`,
        // alternating between the wake lock and the conditions list.
        let triggered = waitset.wait(Duration::from_secs(5)).expect("woken by attach");
        assert_eq!(triggered.len(), 1);
        thread.join().expect("no panic");
    }

    #[test]
    fn test_duplicate_attach_rejected() {
        let waitset = WaitSet::new();
        let guard = Arc::new(GuardCondition::new());
        waitset
            .attach(Arc::clone(&guard) as Arc<dyn Condition>)
            .expect("first attach");
        assert!(matches!(
            waitset.attach(Arc::clone(&guard) as Arc<dyn Condition>),
            Err(Error::PreconditionNotMet)
        ));
        assert_eq!(waitset.len(), 1);
    }

    #[test]
    fn test_detach_unknown_condition() {
        let waitset = WaitSet::new();
        let guard = Arc::new(GuardCondition::new()) as Arc<dyn Condition>;
        assert!(matches!(
            waitset.detach(&guard),
            Err(Error::PreconditionNotMet)
        ));
    }

    #[test]
    fn test_detached_condition_no_longer_returned() {
        let waitset = WaitSet::new();
        let guard = Arc::new(GuardCondition::new());
        let condition = Arc::clone(&guard) as Arc<dyn Condition>;
        waitset.attach(Arc::clone(&condition)).expect("attach");
        waitset.detach(&condition).expect("detach");

        guard.set_trigger_value(true);
        assert!(matches!(
            waitset.wait(Duration::from_millis(10)),
            Err(Error::Timeout)
        ));
    }

    #[test]
    fn test_notify_wakes_without_trigger() {
        let waitset = Arc::new(WaitSet::new());
        let guard = Arc::new(GuardCondition::new());
        waitset
            .attach(guard as Arc<dyn Condition>)
            .expect("attach");

        let woken = Arc::clone(&waitset);
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            woken.notify();
        });

        // Nothing triggers; the notify only causes a re-poll, so the wait
        // still ends in a timeout, just without sleeping the full span
        // un-interrupted.
        let result = waitset.wait(Duration::from_millis(100));
        assert!(matches!(result, Err(Error::Timeout)));
        thread.join().expect("no panic");
    }
}
