// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subscriber: factory and group for data readers.

use crate::core::entity::EntityHandle;
use crate::core::runtime::DomainRuntime;
use crate::dds::listener::Listener;
use crate::dds::reader::DataReader;
use crate::dds::topic::Topic;
use crate::dds::Result;
use crate::qos::Qos;
use std::sync::Arc;

/// Groups data readers under one participant.
pub struct Subscriber {
    runtime: Arc<DomainRuntime>,
    handle: EntityHandle,
}

impl Subscriber {
    pub(crate) fn new(runtime: Arc<DomainRuntime>, handle: EntityHandle) -> Self {
        Self { runtime, handle }
    }

    /// This subscriber's handle.
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// Create a data reader for `topic`. Matching (and TransientLocal
    /// replay from matched writers) runs before this returns.
    pub fn create_reader(
        &self,
        topic: &Topic,
        qos: Qos,
        listener: Option<Listener>,
    ) -> Result<DataReader> {
        let handle = self
            .runtime
            .create_reader(self.handle, topic.handle(), qos, listener)?;
        Ok(DataReader::new(Arc::clone(&self.runtime), handle))
    }

    /// Replace (or clear) this subscriber's listener.
    pub fn set_listener(&self, listener: Option<Listener>) -> Result<()> {
        self.runtime.node(self.handle)?.set_listener(listener);
        Ok(())
    }

    /// Delete this subscriber and its readers.
    pub fn delete(&self) -> Result<()> {
        self.runtime.delete(self.handle)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("handle", &self.handle)
            .finish()
    }
}
