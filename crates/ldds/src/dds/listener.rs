// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Listener tables for callback-based status notification.
//!
//! A [`Listener`] is a table of per-status-kind callback slots. Every entity
//! may carry one; resolution walks up the entity ownership chain, so a
//! Participant-level listener acts as a catch-all for its children.
//!
//! Callbacks are invoked from the runtime's dispatch thread. They must be
//! `Send + Sync` and should not block; a slow callback delays other
//! callbacks but never sample delivery into caches.

use crate::core::cache::InstanceHandle;
use crate::core::entity::EntityHandle;
use crate::qos::PolicyId;
use std::sync::Arc;

/// Communication status kinds an entity can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// New data is available in a reader's cache.
    DataAvailable,
    /// A writer matched or unmatched a reader.
    PublicationMatched,
    /// A reader matched or unmatched a writer.
    SubscriptionMatched,
    /// A writer failed to honor its offered deadline.
    OfferedDeadlineMissed,
    /// A reader did not receive data within its requested deadline.
    RequestedDeadlineMissed,
    /// A writer lost its asserted liveliness.
    LivelinessLost,
    /// The liveliness of a matched writer changed.
    LivelinessChanged,
    /// A writer's offered QoS was incompatible with a discovered reader.
    OfferedIncompatibleQos,
    /// A reader's requested QoS was incompatible with a discovered writer.
    RequestedIncompatibleQos,
    /// A sample was lost before reaching the reader cache.
    SampleLost,
    /// A sample was rejected by cache resource limits.
    SampleRejected,
    /// A topic was created twice with conflicting types.
    InconsistentTopic,
}

impl StatusKind {
    /// Number of status kinds (listener slot table size).
    pub const COUNT: usize = 12;

    /// Stable slot index for the listener table.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            StatusKind::DataAvailable => 0,
            StatusKind::PublicationMatched => 1,
            StatusKind::SubscriptionMatched => 2,
            StatusKind::OfferedDeadlineMissed => 3,
            StatusKind::RequestedDeadlineMissed => 4,
            StatusKind::LivelinessLost => 5,
            StatusKind::LivelinessChanged => 6,
            StatusKind::OfferedIncompatibleQos => 7,
            StatusKind::RequestedIncompatibleQos => 8,
            StatusKind::SampleLost => 9,
            StatusKind::SampleRejected => 10,
            StatusKind::InconsistentTopic => 11,
        }
    }
}

/// Status payload for subscription matching events.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionMatchedStatus {
    /// Cumulative count of matched publications.
    pub total_count: u32,
    /// Change in `total_count` since last read.
    pub total_count_change: i32,
    /// Current number of matched publications.
    pub current_count: u32,
    /// Change in `current_count` since last read.
    pub current_count_change: i32,
    /// Handle of the last matched/unmatched publication.
    pub last_publication_handle: Option<EntityHandle>,
}

/// Status payload for publication matching events.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicationMatchedStatus {
    /// Cumulative count of matched subscriptions.
    pub total_count: u32,
    /// Change in `total_count` since last read.
    pub total_count_change: i32,
    /// Current number of matched subscriptions.
    pub current_count: u32,
    /// Change in `current_count` since last read.
    pub current_count_change: i32,
    /// Handle of the last matched/unmatched subscription.
    pub last_subscription_handle: Option<EntityHandle>,
}

/// Status payload for liveliness changes observed by a reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct LivelinessChangedStatus {
    /// Publications currently asserting liveliness.
    pub alive_count: u32,
    /// Change in `alive_count` since last read.
    pub alive_count_change: i32,
    /// Publications that lost liveliness.
    pub not_alive_count: u32,
    /// Change in `not_alive_count` since last read.
    pub not_alive_count_change: i32,
    /// Last publication to change liveliness.
    pub last_publication_handle: Option<EntityHandle>,
}

/// Status payload for writer-side liveliness loss.
#[derive(Debug, Clone, Copy, Default)]
pub struct LivelinessLostStatus {
    /// Cumulative count of liveliness losses.
    pub total_count: u32,
    /// Change in `total_count` since last read.
    pub total_count_change: i32,
}

/// Status payload for lost samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleLostStatus {
    /// Cumulative count of lost samples.
    pub total_count: u32,
    /// Change in `total_count` since last read.
    pub total_count_change: i32,
}

/// Why a sample was rejected by the reader cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleRejectedReason {
    /// No rejection recorded yet.
    #[default]
    NotRejected,
    /// `ResourceLimits.max_samples` exceeded.
    ResourceLimit,
    /// `ResourceLimits.max_instances` exceeded.
    InstanceLimit,
    /// `ResourceLimits.max_samples_per_instance` exceeded.
    SamplesPerInstanceLimit,
}

/// Status payload for rejected samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleRejectedStatus {
    /// Cumulative count of rejected samples.
    pub total_count: u32,
    /// Change in `total_count` since last read.
    pub total_count_change: i32,
    /// Reason for the last rejection.
    pub last_reason: SampleRejectedReason,
    /// Instance of the last rejected sample.
    pub last_instance_handle: Option<InstanceHandle>,
}

/// Status payload for missed deadlines (offered or requested).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineMissedStatus {
    /// Cumulative count of missed deadlines.
    pub total_count: u32,
    /// Change in `total_count` since last read.
    pub total_count_change: i32,
    /// Instance that missed the deadline.
    pub last_instance_handle: Option<InstanceHandle>,
}

/// Status payload for incompatible QoS events (offered or requested side).
#[derive(Debug, Clone, Copy, Default)]
pub struct IncompatibleQosStatus {
    /// Cumulative count of incompatible matches attempted.
    pub total_count: u32,
    /// Change in `total_count` since last read.
    pub total_count_change: i32,
    /// Scope of the last offending policy.
    pub last_policy_id: Option<PolicyId>,
}

/// Status payload for inconsistent topic definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct InconsistentTopicStatus {
    /// Cumulative count of conflicting definitions seen.
    pub total_count: u32,
    /// Change in `total_count` since last read.
    pub total_count_change: i32,
}

/// A status change delivered to listeners, tagged with the source entity.
#[derive(Debug, Clone, Copy)]
pub enum StatusEvent {
    /// New data is available on a reader.
    DataAvailable,
    /// Publication matched/unmatched.
    PublicationMatched(PublicationMatchedStatus),
    /// Subscription matched/unmatched.
    SubscriptionMatched(SubscriptionMatchedStatus),
    /// Offered deadline missed.
    OfferedDeadlineMissed(DeadlineMissedStatus),
    /// Requested deadline missed.
    RequestedDeadlineMissed(DeadlineMissedStatus),
    /// Writer liveliness lost.
    LivelinessLost(LivelinessLostStatus),
    /// Matched-writer liveliness changed.
    LivelinessChanged(LivelinessChangedStatus),
    /// Offered QoS incompatible.
    OfferedIncompatibleQos(IncompatibleQosStatus),
    /// Requested QoS incompatible.
    RequestedIncompatibleQos(IncompatibleQosStatus),
    /// Sample lost.
    SampleLost(SampleLostStatus),
    /// Sample rejected.
    SampleRejected(SampleRejectedStatus),
    /// Inconsistent topic definition.
    InconsistentTopic(InconsistentTopicStatus),
}

impl StatusEvent {
    /// The status kind this event reports.
    #[must_use]
    pub const fn kind(&self) -> StatusKind {
        match self {
            StatusEvent::DataAvailable => StatusKind::DataAvailable,
            StatusEvent::PublicationMatched(_) => StatusKind::PublicationMatched,
            StatusEvent::SubscriptionMatched(_) => StatusKind::SubscriptionMatched,
            StatusEvent::OfferedDeadlineMissed(_) => StatusKind::OfferedDeadlineMissed,
            StatusEvent::RequestedDeadlineMissed(_) => StatusKind::RequestedDeadlineMissed,
            StatusEvent::LivelinessLost(_) => StatusKind::LivelinessLost,
            StatusEvent::LivelinessChanged(_) => StatusKind::LivelinessChanged,
            StatusEvent::OfferedIncompatibleQos(_) => StatusKind::OfferedIncompatibleQos,
            StatusEvent::RequestedIncompatibleQos(_) => StatusKind::RequestedIncompatibleQos,
            StatusEvent::SampleLost(_) => StatusKind::SampleLost,
            StatusEvent::SampleRejected(_) => StatusKind::SampleRejected,
            StatusEvent::InconsistentTopic(_) => StatusKind::InconsistentTopic,
        }
    }
}

/// Callback slot signature: receives the source entity and the event.
pub type StatusCallback = Arc<dyn Fn(EntityHandle, &StatusEvent) + Send + Sync>;

/// Per-status-kind callback table.
///
/// Unset slots fall back to the parent entity's listener (up to the
/// Participant). Built fluently:
///
/// ```
/// use ldds::dds::listener::{Listener, StatusKind};
///
/// let listener = Listener::new()
///     .on(StatusKind::DataAvailable, |entity, _event| {
///         println!("data available on {entity:?}");
///     });
/// assert!(listener.get(StatusKind::DataAvailable).is_some());
/// assert!(listener.get(StatusKind::SampleLost).is_none());
/// ```
#[derive(Clone, Default)]
pub struct Listener {
    slots: [Option<StatusCallback>; StatusKind::COUNT],
}

impl Listener {
    /// Empty table (all slots fall back to the parent).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback slot for `kind`.
    #[must_use]
    pub fn on<F>(mut self, kind: StatusKind, callback: F) -> Self
    where
        F: Fn(EntityHandle, &StatusEvent) + Send + Sync + 'static,
    {
        self.slots[kind.index()] = Some(Arc::new(callback));
        self
    }

    /// Look up the callback slot for `kind`.
    #[must_use]
    pub fn get(&self, kind: StatusKind) -> Option<&StatusCallback> {
        self.slots[kind.index()].as_ref()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set: Vec<usize> = (0..StatusKind::COUNT)
            .filter(|&i| self.slots[i].is_some())
            .collect();
        f.debug_struct("Listener").field("set_slots", &set).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_listener_slot_set_and_get() {
        let hits = Arc::new(AtomicU32::new(0));
        let hits2 = Arc::clone(&hits);
        let listener = Listener::new().on(StatusKind::DataAvailable, move |_, _| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        let cb = listener
            .get(StatusKind::DataAvailable)
            .expect("slot must be set");
        cb(EntityHandle::nil(), &StatusEvent::DataAvailable);
        cb(EntityHandle::nil(), &StatusEvent::DataAvailable);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_unset_slot_is_none() {
        let listener = Listener::new();
        for kind in [
            StatusKind::DataAvailable,
            StatusKind::SampleLost,
            StatusKind::InconsistentTopic,
        ] {
            assert!(listener.get(kind).is_none());
        }
    }

    #[test]
    fn test_status_kind_indices_unique() {
        let kinds = [
            StatusKind::DataAvailable,
            StatusKind::PublicationMatched,
            StatusKind::SubscriptionMatched,
            StatusKind::OfferedDeadlineMissed,
            StatusKind::RequestedDeadlineMissed,
            StatusKind::LivelinessLost,
            StatusKind::LivelinessChanged,
            StatusKind::OfferedIncompatibleQos,
            StatusKind::RequestedIncompatibleQos,
            StatusKind::SampleLost,
            StatusKind::SampleRejected,
            StatusKind::InconsistentTopic,
        ];
        let mut seen = [false; StatusKind::COUNT];
        for kind in kinds {
            assert!(!seen[kind.index()], "duplicate index for {kind:?}");
            seen[kind.index()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_status_event_kind_mapping() {
        let event = StatusEvent::SampleRejected(SampleRejectedStatus::default());
        assert_eq!(event.kind(), StatusKind::SampleRejected);
        assert_eq!(StatusEvent::DataAvailable.kind(), StatusKind::DataAvailable);
    }
}
