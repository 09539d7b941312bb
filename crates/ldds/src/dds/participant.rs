// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Domain participant: root of an entity tree.

use crate::core::entity::EntityHandle;
use crate::core::runtime::DomainRuntime;
use crate::core::wire::SampleCodec;
use crate::dds::condition::StatusCondition;
use crate::dds::listener::Listener;
use crate::dds::publisher::Publisher;
use crate::dds::subscriber::Subscriber;
use crate::dds::topic::Topic;
use crate::dds::Result;
use crate::qos::Qos;
use std::sync::Arc;

/// Entry point into a domain. Owns publishers, subscribers, and topics;
/// deleting the participant tears the whole tree down.
pub struct DomainParticipant {
    runtime: Arc<DomainRuntime>,
    handle: EntityHandle,
}

impl DomainParticipant {
    /// Create a participant on a fresh single-process runtime for
    /// `domain_id`.
    pub fn new(domain_id: u32) -> Result<Self> {
        Self::with_runtime(&DomainRuntime::new(domain_id), Qos::default(), None)
    }

    /// Create a participant on an existing runtime. Participants sharing a
    /// runtime communicate with each other.
    pub fn with_runtime(
        runtime: &Arc<DomainRuntime>,
        qos: Qos,
        listener: Option<Listener>,
    ) -> Result<Self> {
        let handle = runtime.create_participant(qos, listener)?;
        Ok(Self {
            runtime: Arc::clone(runtime),
            handle,
        })
    }

    /// This participant's handle.
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// The runtime this participant lives on.
    #[must_use]
    pub fn runtime(&self) -> &Arc<DomainRuntime> {
        &self.runtime
    }

    /// Create a publisher owned by this participant.
    pub fn create_publisher(&self, qos: Qos, listener: Option<Listener>) -> Result<Publisher> {
        let handle = self.runtime.create_publisher(self.handle, qos, listener)?;
        Ok(Publisher::new(Arc::clone(&self.runtime), handle))
    }

    /// Create a subscriber owned by this participant.
    pub fn create_subscriber(&self, qos: Qos, listener: Option<Listener>) -> Result<Subscriber> {
        let handle = self.runtime.create_subscriber(self.handle, qos, listener)?;
        Ok(Subscriber::new(Arc::clone(&self.runtime), handle))
    }

    /// Create (or find) a topic. Re-creating an existing name with the same
    /// type yields the existing topic; a conflicting type fails with
    /// `PreconditionNotMet` and raises `InconsistentTopic`.
    pub fn create_topic(
        &self,
        name: &str,
        type_name: &str,
        qos: Qos,
        codec: Arc<dyn SampleCodec>,
    ) -> Result<Topic> {
        let handle = self
            .runtime
            .create_topic(self.handle, name, type_name, qos, codec)?;
        Ok(Topic::new(
            Arc::clone(&self.runtime),
            handle,
            name.to_string(),
            type_name.to_string(),
        ))
    }

    /// Replace (or clear) this participant's listener. Participant-level
    /// slots are the fallback for every entity in the tree.
    pub fn set_listener(&self, listener: Option<Listener>) -> Result<()> {
        self.runtime.node(self.handle)?.set_listener(listener);
        Ok(())
    }

    /// This participant's status condition.
    pub fn status_condition(&self) -> Result<Arc<StatusCondition>> {
        Ok(Arc::clone(&self.runtime.node(self.handle)?.status_condition))
    }

    /// Delete this participant and everything it owns.
    pub fn delete(&self) -> Result<()> {
        self.runtime.delete(self.handle)
    }
}

impl std::fmt::Debug for DomainParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainParticipant")
            .field("handle", &self.handle)
            .field("domain_id", &self.runtime.domain_id())
            .finish()
    }
}
