// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Publisher: factory and group for data writers.

use crate::core::entity::EntityHandle;
use crate::core::runtime::DomainRuntime;
use crate::dds::listener::Listener;
use crate::dds::topic::Topic;
use crate::dds::writer::DataWriter;
use crate::dds::Result;
use crate::qos::Qos;
use std::sync::Arc;

/// Groups data writers under one participant.
pub struct Publisher {
    runtime: Arc<DomainRuntime>,
    handle: EntityHandle,
}

impl Publisher {
    pub(crate) fn new(runtime: Arc<DomainRuntime>, handle: EntityHandle) -> Self {
        Self { runtime, handle }
    }

    /// This publisher's handle.
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// Create a data writer for `topic`. The writer QoS is fixed at
    /// creation; matching runs immediately.
    pub fn create_writer(
        &self,
        topic: &Topic,
        qos: Qos,
        listener: Option<Listener>,
    ) -> Result<DataWriter> {
        let handle = self
            .runtime
            .create_writer(self.handle, topic.handle(), qos, listener)?;
        Ok(DataWriter::new(Arc::clone(&self.runtime), handle))
    }

    /// Replace (or clear) this publisher's listener.
    pub fn set_listener(&self, listener: Option<Listener>) -> Result<()> {
        self.runtime.node(self.handle)?.set_listener(listener);
        Ok(())
    }

    /// Delete this publisher and its writers.
    pub fn delete(&self) -> Result<()> {
        self.runtime.delete(self.handle)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("handle", &self.handle)
            .finish()
    }
}
