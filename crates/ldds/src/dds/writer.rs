// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data writer: publishes samples to a topic.

use crate::core::cache::InstanceHandle;
use crate::core::entity::EntityHandle;
use crate::core::runtime::DomainRuntime;
use crate::dds::condition::StatusCondition;
use crate::dds::listener::{
    DeadlineMissedStatus, IncompatibleQosStatus, Listener, LivelinessLostStatus,
    PublicationMatchedStatus,
};
use crate::dds::{Result, StatusKind};
use crate::qos::Qos;
use std::sync::Arc;
use std::time::Duration;

/// Writing endpoint of a topic. QoS is fixed at creation.
pub struct DataWriter {
    runtime: Arc<DomainRuntime>,
    handle: EntityHandle,
}

impl DataWriter {
    pub(crate) fn new(runtime: Arc<DomainRuntime>, handle: EntityHandle) -> Self {
        Self { runtime, handle }
    }

    /// This writer's handle.
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// This writer's effective QoS.
    pub fn qos(&self) -> Result<Qos> {
        Ok(self.runtime.node(self.handle)?.qos.clone())
    }

    /// Publish a sample with the current time as source timestamp. Returns
    /// the instance handle the payload keys to.
    ///
    /// # Errors
    ///
    /// `OutOfResources` when the writer's own `max_instances` is exhausted.
    pub fn write(&self, payload: &[u8]) -> Result<InstanceHandle> {
        self.runtime.write(self.handle, payload, None)
    }

    /// Publish a sample with an explicit source timestamp (nanoseconds).
    pub fn write_with_timestamp(&self, payload: &[u8], timestamp: u64) -> Result<InstanceHandle> {
        self.runtime.write(self.handle, payload, Some(timestamp))
    }

    /// Dispose the instance the payload keys to. Matched readers observe
    /// `NotAliveDisposed` plus a zero-data marker sample.
    pub fn dispose(&self, payload: &[u8]) -> Result<InstanceHandle> {
        self.runtime.dispose(self.handle, payload, None)
    }

    /// Unregister the instance the payload keys to. With the default
    /// `WriterDataLifecycle` the instance is disposed first.
    pub fn unregister_instance(&self, payload: &[u8]) -> Result<InstanceHandle> {
        self.runtime.unregister_instance(self.handle, payload, None)
    }

    /// Resolve a payload's key against this writer's registered instances.
    pub fn lookup_instance(&self, payload: &[u8]) -> Result<Option<InstanceHandle>> {
        self.runtime.lookup_instance(self.handle, payload)
    }

    /// Block until everything written so far has been delivered and its
    /// callbacks dispatched.
    pub fn wait_for_acks(&self, timeout: Duration) -> Result<()> {
        self.runtime.wait_for_acks(self.handle, timeout)
    }

    /// Manually assert liveliness (relevant for the manual kinds).
    pub fn assert_liveliness(&self) -> Result<()> {
        self.runtime.assert_liveliness(self.handle)
    }

    /// Read the publication-matched status, clearing its change fields.
    pub fn publication_matched_status(&self) -> Result<PublicationMatchedStatus> {
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_publication_matched();
        self.runtime
            .settle_status(self.handle, StatusKind::PublicationMatched);
        Ok(status)
    }

    /// Read the offered-incompatible-QoS status, clearing its change field.
    pub fn offered_incompatible_qos_status(&self) -> Result<IncompatibleQosStatus> {
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_offered_incompatible_qos();
        self.runtime
            .settle_status(self.handle, StatusKind::OfferedIncompatibleQos);
        Ok(status)
    }

    /// Read the offered-deadline-missed status, clearing its change field.
    /// Deadline periods are evaluated lazily on this call.
    pub fn offered_deadline_missed_status(&self) -> Result<DeadlineMissedStatus> {
        self.runtime.process_timers();
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_offered_deadline_missed();
        self.runtime
            .settle_status(self.handle, StatusKind::OfferedDeadlineMissed);
        Ok(status)
    }

    /// Read the liveliness-lost status, clearing its change field. Leases
    /// are evaluated lazily on this call.
    pub fn liveliness_lost_status(&self) -> Result<LivelinessLostStatus> {
        self.runtime.process_timers();
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_liveliness_lost();
        self.runtime
            .settle_status(self.handle, StatusKind::LivelinessLost);
        Ok(status)
    }

    /// This writer's status condition.
    pub fn status_condition(&self) -> Result<Arc<StatusCondition>> {
        Ok(Arc::clone(&self.runtime.node(self.handle)?.status_condition))
    }

    /// Replace (or clear) this writer's listener.
    pub fn set_listener(&self, listener: Option<Listener>) -> Result<()> {
        self.runtime.node(self.handle)?.set_listener(listener);
        Ok(())
    }

    /// Delete this writer, unwinding its matches. Registered instances are
    /// disposed per `WriterDataLifecycle`.
    pub fn delete(&self) -> Result<()> {
        self.runtime.delete(self.handle)
    }
}

impl std::fmt::Debug for DataWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataWriter")
            .field("handle", &self.handle)
            .finish()
    }
}
