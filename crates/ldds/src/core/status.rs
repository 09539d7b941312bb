// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-entity communication status counters.
//!
//! Each entity carries a [`StatusRecorder`]. Recording an event updates the
//! typed counters and returns a snapshot for listener dispatch; taking a
//! status returns the current value and zeroes its `*_change` fields. The
//! caller pairs record/take with raise/lower on the entity's
//! [`crate::dds::condition::StatusCondition`].

use crate::core::cache::InstanceHandle;
use crate::core::entity::EntityHandle;
use crate::dds::listener::{
    DeadlineMissedStatus, InconsistentTopicStatus, IncompatibleQosStatus, LivelinessChangedStatus,
    LivelinessLostStatus, PublicationMatchedStatus, SampleLostStatus, SampleRejectedReason,
    SampleRejectedStatus, SubscriptionMatchedStatus,
};
use crate::qos::PolicyId;
use parking_lot::Mutex;

/// Typed status counters for one entity.
#[derive(Default)]
pub struct StatusRecorder {
    publication_matched: Mutex<PublicationMatchedStatus>,
    subscription_matched: Mutex<SubscriptionMatchedStatus>,
    liveliness_changed: Mutex<LivelinessChangedStatus>,
    liveliness_lost: Mutex<LivelinessLostStatus>,
    sample_lost: Mutex<SampleLostStatus>,
    sample_rejected: Mutex<SampleRejectedStatus>,
    offered_deadline_missed: Mutex<DeadlineMissedStatus>,
    requested_deadline_missed: Mutex<DeadlineMissedStatus>,
    offered_incompatible_qos: Mutex<IncompatibleQosStatus>,
    requested_incompatible_qos: Mutex<IncompatibleQosStatus>,
    inconsistent_topic: Mutex<InconsistentTopicStatus>,
}

impl StatusRecorder {
    /// All counters zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer matched (`delta = 1`) or unmatched (`delta = -1`) a reader.
    pub fn record_publication_match(
        &self,
        delta: i32,
        last: EntityHandle,
    ) -> PublicationMatchedStatus {
        let mut status = self.publication_matched.lock();
        if delta > 0 {
            status.total_count += 1;
            status.total_count_change += 1;
        }
        status.current_count = status.current_count.saturating_add_signed(delta);
        status.current_count_change += delta;
        status.last_subscription_handle = Some(last);
        *status
    }

    /// Take the publication-matched status, clearing the change fields.
    pub fn take_publication_matched(&self) -> PublicationMatchedStatus {
        let mut status = self.publication_matched.lock();
        let snapshot = *status;
        status.total_count_change = 0;
        status.current_count_change = 0;
        snapshot
    }

    /// Reader matched (`delta = 1`) or unmatched (`delta = -1`) a writer.
    pub fn record_subscription_match(
        &self,
        delta: i32,
        last: EntityHandle,
    ) -> SubscriptionMatchedStatus {
        let mut status = self.subscription_matched.lock();
        if delta > 0 {
            status.total_count += 1;
            status.total_count_change += 1;
        }
        status.current_count = status.current_count.saturating_add_signed(delta);
        status.current_count_change += delta;
        status.last_publication_handle = Some(last);
        *status
    }

    /// Take the subscription-matched status, clearing the change fields.
    pub fn take_subscription_matched(&self) -> SubscriptionMatchedStatus {
        let mut status = self.subscription_matched.lock();
        let snapshot = *status;
        status.total_count_change = 0;
        status.current_count_change = 0;
        snapshot
    }

    /// A matched writer became alive (`alive_delta = 1`) or not alive
    /// (`alive_delta = -1, not_alive_delta = 1`).
    pub fn record_liveliness_changed(
        &self,
        alive_delta: i32,
        not_alive_delta: i32,
        last: EntityHandle,
    ) -> LivelinessChangedStatus {
        let mut status = self.liveliness_changed.lock();
        status.alive_count = status.alive_count.saturating_add_signed(alive_delta);
        status.alive_count_change += alive_delta;
        status.not_alive_count = status.not_alive_count.saturating_add_signed(not_alive_delta);
        status.not_alive_count_change += not_alive_delta;
        status.last_publication_handle = Some(last);
        *status
    }

    /// Take the liveliness-changed status, clearing the change fields.
    pub fn take_liveliness_changed(&self) -> LivelinessChangedStatus {
        let mut status = self.liveliness_changed.lock();
        let snapshot = *status;
        status.alive_count_change = 0;
        status.not_alive_count_change = 0;
        snapshot
    }

    /// The writer failed to assert liveliness within its lease.
    pub fn record_liveliness_lost(&self) -> LivelinessLostStatus {
        let mut status = self.liveliness_lost.lock();
        status.total_count += 1;
        status.total_count_change += 1;
        *status
    }

    /// Take the liveliness-lost status, clearing the change field.
    pub fn take_liveliness_lost(&self) -> LivelinessLostStatus {
        let mut status = self.liveliness_lost.lock();
        let snapshot = *status;
        status.total_count_change = 0;
        snapshot
    }

    /// A sample was dropped before reaching the reader cache.
    pub fn record_sample_lost(&self) -> SampleLostStatus {
        let mut status = self.sample_lost.lock();
        status.total_count += 1;
        status.total_count_change += 1;
        *status
    }

    /// Take the sample-lost status, clearing the change field.
    pub fn take_sample_lost(&self) -> SampleLostStatus {
        let mut status = self.sample_lost.lock();
        let snapshot = *status;
        status.total_count_change = 0;
        snapshot
    }

    /// A sample was rejected by cache resource limits.
    pub fn record_sample_rejected(
        &self,
        reason: SampleRejectedReason,
        instance: InstanceHandle,
    ) -> SampleRejectedStatus {
        let mut status = self.sample_rejected.lock();
        status.total_count += 1;
        status.total_count_change += 1;
        status.last_reason = reason;
        status.last_instance_handle = Some(instance);
        *status
    }

    /// Take the sample-rejected status, clearing the change field.
    pub fn take_sample_rejected(&self) -> SampleRejectedStatus {
        let mut status = self.sample_rejected.lock();
        let snapshot = *status;
        status.total_count_change = 0;
        snapshot
    }

    /// The writer missed its offered deadline for `instance`.
    pub fn record_offered_deadline_missed(&self, instance: InstanceHandle) -> DeadlineMissedStatus {
        Self::record_deadline(&self.offered_deadline_missed, instance)
    }

    /// Take the offered-deadline-missed status, clearing the change field.
    pub fn take_offered_deadline_missed(&self) -> DeadlineMissedStatus {
        Self::take_deadline(&self.offered_deadline_missed)
    }

    /// The reader missed its requested deadline for `instance`.
    pub fn record_requested_deadline_missed(
        &self,
        instance: InstanceHandle,
    ) -> DeadlineMissedStatus {
        Self::record_deadline(&self.requested_deadline_missed, instance)
    }

    /// Take the requested-deadline-missed status, clearing the change field.
    pub fn take_requested_deadline_missed(&self) -> DeadlineMissedStatus {
        Self::take_deadline(&self.requested_deadline_missed)
    }

    fn record_deadline(
        slot: &Mutex<DeadlineMissedStatus>,
        instance: InstanceHandle,
    ) -> DeadlineMissedStatus {
        let mut status = slot.lock();
        status.total_count += 1;
        status.total_count_change += 1;
        status.last_instance_handle = Some(instance);
        *status
    }

    fn take_deadline(slot: &Mutex<DeadlineMissedStatus>) -> DeadlineMissedStatus {
        let mut status = slot.lock();
        let snapshot = *status;
        status.total_count_change = 0;
        snapshot
    }

    /// The writer's offer failed compatibility on `policy`.
    pub fn record_offered_incompatible_qos(&self, policy: PolicyId) -> IncompatibleQosStatus {
        Self::record_incompatible(&self.offered_incompatible_qos, policy)
    }

    /// Take the offered-incompatible-QoS status, clearing the change field.
    pub fn take_offered_incompatible_qos(&self) -> IncompatibleQosStatus {
        Self::take_incompatible(&self.offered_incompatible_qos)
    }

    /// The reader's request failed compatibility on `policy`.
    pub fn record_requested_incompatible_qos(&self, policy: PolicyId) -> IncompatibleQosStatus {
        Self::record_incompatible(&self.requested_incompatible_qos, policy)
    }

    /// Take the requested-incompatible-QoS status, clearing the change field.
    pub fn take_requested_incompatible_qos(&self) -> IncompatibleQosStatus {
        Self::take_incompatible(&self.requested_incompatible_qos)
    }

    fn record_incompatible(
        slot: &Mutex<IncompatibleQosStatus>,
        policy: PolicyId,
    ) -> IncompatibleQosStatus {
        let mut status = slot.lock();
        status.total_count += 1;
        status.total_count_change += 1;
        status.last_policy_id = Some(policy);
        *status
    }

    fn take_incompatible(slot: &Mutex<IncompatibleQosStatus>) -> IncompatibleQosStatus {
        let mut status = slot.lock();
        let snapshot = *status;
        status.total_count_change = 0;
        snapshot
    }

    /// A conflicting definition was seen for this topic.
    pub fn record_inconsistent_topic(&self) -> InconsistentTopicStatus {
        let mut status = self.inconsistent_topic.lock();
        status.total_count += 1;
        status.total_count_change += 1;
        *status
    }

    /// Take the inconsistent-topic status, clearing the change field.
    pub fn take_inconsistent_topic(&self) -> InconsistentTopicStatus {
        let mut status = self.inconsistent_topic.lock();
        let snapshot = *status;
        status.total_count_change = 0;
        snapshot
    }
}
