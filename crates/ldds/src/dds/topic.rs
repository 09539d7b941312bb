// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Topic: a named, typed data channel.

use crate::core::entity::EntityHandle;
use crate::core::runtime::DomainRuntime;
use crate::dds::listener::InconsistentTopicStatus;
use crate::dds::{Result, StatusKind};
use std::sync::Arc;

/// Named channel writers publish to and readers subscribe from. Referenced,
/// not owned, by its endpoints; deleting a topic with live endpoints fails
/// with `PreconditionNotMet`.
pub struct Topic {
    runtime: Arc<DomainRuntime>,
    handle: EntityHandle,
    name: String,
    type_name: String,
}

impl Topic {
    pub(crate) fn new(
        runtime: Arc<DomainRuntime>,
        handle: EntityHandle,
        name: String,
        type_name: String,
    ) -> Self {
        Self {
            runtime,
            handle,
            name,
            type_name,
        }
    }

    /// This topic's handle.
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// Topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Read the inconsistent-topic status, clearing its change flag.
    pub fn inconsistent_topic_status(&self) -> Result<InconsistentTopicStatus> {
        let node = self.runtime.node(self.handle)?;
        let status = node.statuses.take_inconsistent_topic();
        self.runtime
            .settle_status(self.handle, StatusKind::InconsistentTopic);
        Ok(status)
    }

    /// Delete this topic.
    pub fn delete(&self) -> Result<()> {
        self.runtime.delete(self.handle)
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}
