// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data reader: accesses a topic's samples through its history cache.

use crate::core::cache::{InstanceHandle, ReadMask, SampleRecord};
use crate::core::entity::EntityHandle;
use crate::core::runtime::DomainRuntime;
use crate::dds::condition::StatusCondition;
use crate::dds::listener::{
    DeadlineMissedStatus, IncompatibleQosStatus, Listener, LivelinessChangedStatus,
    SampleLostStatus, SampleRejectedStatus, SubscriptionMatchedStatus,
};
use crate::dds::read_condition::{QueryCondition, QueryPredicate, ReadCondition};
use crate::dds::{Error, Result, StatusKind};
use crate::qos::Qos;
use std::sync::Arc;
use std::time::Duration;

/// Reading endpoint of a topic. QoS is fixed at creation; samples land in
/// the reader's bounded history cache.
pub struct DataReader {
    runtime: Arc<DomainRuntime>,
    handle: EntityHandle,
}

impl DataReader {
    pub(crate) fn new(runtime: Arc<DomainRuntime>, handle: EntityHandle) -> Self {
        Self { runtime, handle }
    }

    /// This reader's handle.
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// This reader's effective QoS.
    pub fn qos(&self) -> Result<Qos> {
        Ok(self.runtime.node(self.handle)?.qos.clone())
    }

    /// Non-destructive access: returns up to `max_count` samples matching
    /// `mask`, in reception order, marking them read.
    pub fn read(&self, mask: ReadMask, max_count: usize) -> Result<Vec<SampleRecord>> {
        self.runtime.read(self.handle, mask, max_count)
    }

    /// Destructive access: like [`DataReader::read`] but removes the
    /// returned samples from the cache.
    pub fn take(&self, mask: ReadMask, max_count: usize) -> Result<Vec<SampleRecord>> {
        self.runtime.take(self.handle, mask, max_count)
    }

    /// Take everything.
    pub fn take_all(&self) -> Result<Vec<SampleRecord>> {
        self.take(ReadMask::any(), usize::MAX)
    }

    /// Read everything without consuming.
    pub fn read_all(&self) -> Result<Vec<SampleRecord>> {
        self.read(ReadMask::any(), usize::MAX)
    }

    /// Resolve a payload's key against the instances tracked in the cache.
    pub fn lookup_instance(&self, payload: &[u8]) -> Result<Option<InstanceHandle>> {
        self.runtime.lookup_instance(self.handle, payload)
    }

    /// Create a read condition over this reader's cache.
    pub fn create_read_condition(&self, mask: ReadMask) -> Result<Arc<ReadCondition>> {
        let node = self.runtime.node(self.handle)?;
        let state = node
            .reader()
            .cloned()
            .ok_or_else(|| Error::BadParameter("reader role missing".into()))?;
        Ok(ReadCondition::new(self.handle, state, mask))
    }

    /// Create a query condition: masks plus an application predicate. A
    /// panicking predicate evaluates as `false`.
    pub fn create_query_condition(
        &self,
        mask: ReadMask,
        predicate: QueryPredicate,
    ) -> Result<Arc<QueryCondition>> {
        let node = self.runtime.node(self.handle)?;
        let state = node
            .reader()
            .cloned()
            .ok_or_else(|| Error::BadParameter("reader role missing".into()))?;
        Ok(QueryCondition::new(self.handle, state, mask, predicate))
    }

    /// Block until historical (durable) data has been replayed into the
    /// cache.
    pub fn wait_for_historical_data(&self, timeout: Duration) -> Result<()> {
        self.runtime.wait_for_historical_data(self.handle, timeout)
    }

    /// Read the subscription-matched status, clearing its change fields.
    pub fn subscription_matched_status(&self) -> Result<SubscriptionMatchedStatus> {
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_subscription_matched();
        self.runtime
            .settle_status(self.handle, StatusKind::SubscriptionMatched);
        Ok(status)
    }

    /// Read the requested-incompatible-QoS status, clearing its change
    /// field.
    pub fn requested_incompatible_qos_status(&self) -> Result<IncompatibleQosStatus> {
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_requested_incompatible_qos();
        self.runtime
            .settle_status(self.handle, StatusKind::RequestedIncompatibleQos);
        Ok(status)
    }

    /// Read the sample-lost status, clearing its change field.
    pub fn sample_lost_status(&self) -> Result<SampleLostStatus> {
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_sample_lost();
        self.runtime.settle_status(self.handle, StatusKind::SampleLost);
        Ok(status)
    }

    /// Read the sample-rejected status, clearing its change field.
    pub fn sample_rejected_status(&self) -> Result<SampleRejectedStatus> {
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_sample_rejected();
        self.runtime
            .settle_status(self.handle, StatusKind::SampleRejected);
        Ok(status)
    }

    /// Read the liveliness-changed status, clearing its change fields.
    /// Leases are evaluated lazily on this call.
    pub fn liveliness_changed_status(&self) -> Result<LivelinessChangedStatus> {
        self.runtime.process_timers();
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_liveliness_changed();
        self.runtime
            .settle_status(self.handle, StatusKind::LivelinessChanged);
        Ok(status)
    }

    /// Read the requested-deadline-missed status, clearing its change
    /// field. Deadline periods are evaluated lazily on this call.
    pub fn requested_deadline_missed_status(&self) -> Result<DeadlineMissedStatus> {
        self.runtime.process_timers();
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_requested_deadline_missed();
        self.runtime
            .settle_status(self.handle, StatusKind::RequestedDeadlineMissed);
        Ok(status)
    }

    /// This reader's status condition.
    pub fn status_condition(&self) -> Result<Arc<StatusCondition>> {
        Ok(Arc::clone(&self.runtime.node(self.handle)?.status_condition))
    }

    /// Replace (or clear) this reader's listener.
    pub fn set_listener(&self, listener: Option<Listener>) -> Result<()> {
        self.runtime.node(self.handle)?.set_listener(listener);
        Ok(())
    }

    /// Delete this reader, unwinding its matches and discarding its cache.
    pub fn delete(&self) -> Result<()> {
        self.runtime.delete(self.handle)
    }
}

impl std::fmt::Debug for DataReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("handle", &self.handle)
            .finish()
    }
}
