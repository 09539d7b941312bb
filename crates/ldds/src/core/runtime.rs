// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Domain runtime: entity lifecycle, matching, and sample delivery.
//!
//! One [`DomainRuntime`] owns the entity graph, the topic index, the
//! listener dispatch thread, and the wire sink. Application calls run on the
//! caller's thread; sample delivery into reader caches is synchronous, only
//! listener callbacks are deferred to the dispatch thread.
//!
//! Lock order: entity graph before any reader cache, parent entity before
//! child, writer state before reader state.

use crate::core::cache::{InsertOutcome, InstanceHandle, ReadMask, SampleRecord};
use crate::core::dispatch::Dispatcher;
use crate::core::entity::{
    EntityGraph, EntityHandle, EntityKind, EntityNode, ReaderState, RetainedSample, Role,
    WriterState,
};
use crate::core::matcher::{self, MatchFailure};
use crate::core::status::StatusRecorder;
use crate::core::wire::{NullWireSink, SampleCodec, WireSink};
use crate::dds::condition::StatusCondition;
use crate::dds::listener::{Listener, StatusEvent, StatusKind};
use crate::qos::{Durability, History, LivelinessKind, Qos};
use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::dds::{Error, Result};

/// The per-domain runtime core.
pub struct DomainRuntime {
    domain_id: u32,
    graph: Arc<EntityGraph>,
    dispatcher: Dispatcher,
    /// (participant raw handle, topic name) -> topic handle.
    topics: DashMap<(u64, String), EntityHandle>,
    /// topic raw handle -> codec.
    codecs: DashMap<u64, Arc<dyn SampleCodec>>,
    sink: Arc<dyn WireSink>,
    registrations: AtomicU64,
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

impl DomainRuntime {
    /// Runtime for `domain_id` with no transport (intra-process only).
    #[must_use]
    pub fn new(domain_id: u32) -> Arc<Self> {
        Self::with_sink(domain_id, Arc::new(NullWireSink))
    }

    /// Runtime with an outbound wire sink.
    #[must_use]
    pub fn with_sink(domain_id: u32, sink: Arc<dyn WireSink>) -> Arc<Self> {
        let graph = Arc::new(EntityGraph::new());
        let dispatcher = Dispatcher::spawn(Arc::clone(&graph));
        log::debug!("[RUNTIME] domain {domain_id} up");
        Arc::new(Self {
            domain_id,
            graph,
            dispatcher,
            topics: DashMap::new(),
            codecs: DashMap::new(),
            sink,
            registrations: AtomicU64::new(1),
        })
    }

    /// The domain id this runtime serves.
    #[must_use]
    pub fn domain_id(&self) -> u32 {
        self.domain_id
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.graph.len()
    }

    // ------------------------------------------------------------------
    // Handle resolution
    // ------------------------------------------------------------------

    fn resolve(&self, handle: EntityHandle) -> Result<Arc<EntityNode>> {
        self.graph.resolve(handle).ok_or_else(|| {
            if self.graph.is_stale(handle) {
                Error::AlreadyDeleted
            } else {
                Error::InvalidHandle
            }
        })
    }

    fn resolve_kind(&self, handle: EntityHandle, kind: EntityKind) -> Result<Arc<EntityNode>> {
        let node = self.resolve(handle)?;
        if node.kind() != kind {
            return Err(Error::BadParameter(format!(
                "expected {kind:?}, handle points at {:?}",
                node.kind()
            )));
        }
        Ok(node)
    }

    /// Resolve any live entity node.
    pub(crate) fn node(&self, handle: EntityHandle) -> Result<Arc<EntityNode>> {
        self.resolve(handle)
    }

    fn participant_of(&self, mut handle: EntityHandle) -> EntityHandle {
        while let Some(node) = self.graph.resolve(handle) {
            if node.kind() == EntityKind::Participant {
                return handle;
            }
            handle = node.parent;
        }
        EntityHandle::nil()
    }

    // ------------------------------------------------------------------
    // Entity creation
    // ------------------------------------------------------------------

    fn new_node(
        handle: EntityHandle,
        parent: EntityHandle,
        qos: Qos,
        listener: Option<Listener>,
        role: Role,
    ) -> EntityNode {
        EntityNode {
            handle,
            parent,
            qos,
            listener: ArcSwapOption::from(listener.map(Arc::new)),
            status_condition: Arc::new(StatusCondition::new()),
            statuses: StatusRecorder::new(),
            role,
        }
    }

    /// Create a participant, the root of an entity tree.
    pub fn create_participant(
        &self,
        qos: Qos,
        listener: Option<Listener>,
    ) -> Result<EntityHandle> {
        let handle = self
            .graph
            .insert(|h| Self::new_node(h, EntityHandle::nil(), qos, listener, Role::Participant));
        log::debug!("[RUNTIME] participant {handle:?} created");
        Ok(handle)
    }

    /// Create a publisher under `participant`.
    pub fn create_publisher(
        &self,
        participant: EntityHandle,
        qos: Qos,
        listener: Option<Listener>,
    ) -> Result<EntityHandle> {
        self.resolve_kind(participant, EntityKind::Participant)?;
        Ok(self
            .graph
            .insert(|h| Self::new_node(h, participant, qos, listener, Role::Publisher)))
    }

    /// Create a subscriber under `participant`.
    pub fn create_subscriber(
        &self,
        participant: EntityHandle,
        qos: Qos,
        listener: Option<Listener>,
    ) -> Result<EntityHandle> {
        self.resolve_kind(participant, EntityKind::Participant)?;
        Ok(self
            .graph
            .insert(|h| Self::new_node(h, participant, qos, listener, Role::Subscriber)))
    }

    /// Create (or find) a topic under `participant`.
    ///
    /// Re-creating an existing name with the same type returns the existing
    /// handle. A conflicting type records `InconsistentTopic` on the
    /// existing topic and fails with `PreconditionNotMet`.
    pub fn create_topic(
        &self,
        participant: EntityHandle,
        name: &str,
        type_name: &str,
        qos: Qos,
        codec: Arc<dyn SampleCodec>,
    ) -> Result<EntityHandle> {
        self.resolve_kind(participant, EntityKind::Participant)?;
        if name.is_empty() {
            return Err(Error::BadParameter("topic name must not be empty".into()));
        }
        let key = (participant.raw(), name.to_string());
        if let Some(existing) = self.topics.get(&key) {
            let existing = *existing;
            if let Some(node) = self.graph.resolve(existing) {
                if let Role::Topic {
                    type_name: existing_type,
                    ..
                } = &node.role
                {
                    if existing_type == type_name {
                        return Ok(existing);
                    }
                    log::warn!(
                        "[RUNTIME] inconsistent topic {name}: {existing_type} vs {type_name}"
                    );
                    let status = node.statuses.record_inconsistent_topic();
                    self.emit(&node, StatusEvent::InconsistentTopic(status));
                    return Err(Error::PreconditionNotMet);
                }
            }
        }
        let handle = self.graph.insert(|h| {
            Self::new_node(
                h,
                participant,
                qos,
                None,
                Role::Topic {
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                },
            )
        });
        self.topics.insert(key, handle);
        self.codecs.insert(handle.raw(), codec);
        Ok(handle)
    }

    /// Create a data writer under `publisher` for `topic`.
    pub fn create_writer(
        &self,
        publisher: EntityHandle,
        topic: EntityHandle,
        qos: Qos,
        listener: Option<Listener>,
    ) -> Result<EntityHandle> {
        self.resolve_kind(publisher, EntityKind::Publisher)?;
        self.resolve_kind(topic, EntityKind::Topic)?;
        let registration = self.registrations.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(WriterState::new(topic, registration));
        let handle = self.graph.insert(|h| {
            Self::new_node(h, publisher, qos, listener, Role::Writer(Arc::clone(&state)))
        });
        self.match_endpoint(handle);
        Ok(handle)
    }

    /// Create a data reader under `subscriber` for `topic`.
    pub fn create_reader(
        &self,
        subscriber: EntityHandle,
        topic: EntityHandle,
        qos: Qos,
        listener: Option<Listener>,
    ) -> Result<EntityHandle> {
        self.resolve_kind(subscriber, EntityKind::Subscriber)?;
        self.resolve_kind(topic, EntityKind::Topic)?;
        let state = Arc::new(ReaderState::new(topic, &qos));
        let handle = self.graph.insert(|h| {
            Self::new_node(h, subscriber, qos, listener, Role::Reader(Arc::clone(&state)))
        });
        self.match_endpoint(handle);
        // Replay from already-matched durable writers happened synchronously
        // during the match pass above.
        state.historical.mark_done();
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete an entity and, depth-first, everything it owns.
    ///
    /// Child failures are logged and skipped; the cascade continues.
    pub fn delete(&self, handle: EntityHandle) -> Result<()> {
        let node = self.resolve(handle)?;

        // Topics go last so endpoint teardown never sees a dangling topic.
        let mut children = self.graph.children(handle);
        children.sort_by_key(|c| c.kind() == EntityKind::Topic);
        for child in children {
            if let Err(e) = self.delete(child.handle) {
                log::warn!("[RUNTIME] cascade delete of {:?} failed: {e}", child.handle);
            }
        }

        match &node.role {
            Role::Writer(state) => self.detach_writer(&node, state),
            Role::Reader(state) => self.detach_reader(&node, state),
            Role::Topic { name, .. } => {
                if self.topic_in_use(handle) {
                    return Err(Error::PreconditionNotMet);
                }
                let participant = node.parent;
                self.topics.remove(&(participant.raw(), name.clone()));
                self.codecs.remove(&handle.raw());
            }
            _ => {}
        }

        self.graph
            .remove(handle)
            .map(|_| log::debug!("[RUNTIME] {handle:?} deleted"))
            .ok_or(Error::AlreadyDeleted)
    }

    fn topic_in_use(&self, topic: EntityHandle) -> bool {
        let writers = self.graph.of_kind(EntityKind::Writer);
        let readers = self.graph.of_kind(EntityKind::Reader);
        writers
            .iter()
            .filter_map(|n| n.writer().cloned())
            .any(|s| s.topic == topic)
            || readers
                .iter()
                .filter_map(|n| n.reader().cloned())
                .any(|s| s.topic == topic)
    }

    fn detach_writer(&self, node: &EntityNode, state: &Arc<WriterState>) {
        let autodispose = node
            .qos
            .writer_data_lifecycle()
            .autodispose_unregistered_instances;
        let writer_raw = node.handle.raw();
        let timestamp = now_nanos();
        let matched: Vec<EntityHandle> = state.matched.lock().drain(..).collect();
        let instances: Vec<InstanceHandle> = state.instances.lock().iter().copied().collect();

        for reader_handle in matched {
            let Some(reader_node) = self.graph.resolve(reader_handle) else {
                continue;
            };
            let Some(reader_state) = reader_node.reader() else {
                continue;
            };
            reader_state.matched.lock().retain(|&w| w != node.handle);

            let mut cache_changed = false;
            if autodispose {
                for instance in &instances {
                    cache_changed |= reader_state.cache.dispose(writer_raw, *instance, timestamp);
                }
            }
            cache_changed |= !reader_state
                .cache
                .release_writer(writer_raw, timestamp)
                .is_empty();

            let status = reader_node
                .statuses
                .record_subscription_match(-1, node.handle);
            self.emit(&reader_node, StatusEvent::SubscriptionMatched(status));
            let status = reader_node
                .statuses
                .record_liveliness_changed(-1, 0, node.handle);
            self.emit(&reader_node, StatusEvent::LivelinessChanged(status));
            if cache_changed {
                self.data_available(&reader_node, reader_state);
            }
        }
    }

    fn detach_reader(&self, node: &EntityNode, state: &Arc<ReaderState>) {
        let matched: Vec<EntityHandle> = state.matched.lock().drain(..).collect();
        for writer_handle in matched {
            let Some(writer_node) = self.graph.resolve(writer_handle) else {
                continue;
            };
            if let Some(writer_state) = writer_node.writer() {
                writer_state.matched.lock().retain(|&r| r != node.handle);
            }
            let status = writer_node
                .statuses
                .record_publication_match(-1, node.handle);
            self.emit(&writer_node, StatusEvent::PublicationMatched(status));
        }
        state.cache.clear();
    }

    // ------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------

    fn topic_identity(&self, topic: EntityHandle) -> Option<(String, String)> {
        let node = self.graph.resolve(topic)?;
        match &node.role {
            Role::Topic { name, type_name } => Some((name.clone(), type_name.clone())),
            _ => None,
        }
    }

    /// Run the match pass for a freshly created endpoint against every live
    /// counterpart on the same topic name and type.
    fn match_endpoint(&self, endpoint: EntityHandle) {
        let Some(node) = self.graph.resolve(endpoint) else {
            return;
        };
        match &node.role {
            Role::Writer(state) => {
                let Some(identity) = self.topic_identity(state.topic) else {
                    return;
                };
                for reader_node in self.graph.of_kind(EntityKind::Reader) {
                    let Some(reader_state) = reader_node.reader() else {
                        continue;
                    };
                    if self.topic_identity(reader_state.topic).as_ref() != Some(&identity) {
                        continue;
                    }
                    self.try_match(&node, state, &reader_node, reader_state);
                }
            }
            Role::Reader(state) => {
                let Some(identity) = self.topic_identity(state.topic) else {
                    return;
                };
                for writer_node in self.graph.of_kind(EntityKind::Writer) {
                    let Some(writer_state) = writer_node.writer() else {
                        continue;
                    };
                    if self.topic_identity(writer_state.topic).as_ref() != Some(&identity) {
                        continue;
                    }
                    self.try_match(&writer_node, writer_state, &node, state);
                }
            }
            _ => {}
        }
    }

    fn try_match(
        &self,
        writer_node: &Arc<EntityNode>,
        writer_state: &Arc<WriterState>,
        reader_node: &Arc<EntityNode>,
        reader_state: &Arc<ReaderState>,
    ) {
        let same_participant = self.participant_of(writer_node.parent)
            == self.participant_of(reader_node.parent);
        match matcher::evaluate(&writer_node.qos, &reader_node.qos, same_participant) {
            Ok(()) => {
                writer_state.matched.lock().push(reader_node.handle);
                reader_state.matched.lock().push(writer_node.handle);
                log::debug!(
                    "[RUNTIME] matched writer {:?} <-> reader {:?}",
                    writer_node.handle,
                    reader_node.handle
                );

                let status = writer_node
                    .statuses
                    .record_publication_match(1, reader_node.handle);
                self.emit(writer_node, StatusEvent::PublicationMatched(status));
                let status = reader_node
                    .statuses
                    .record_subscription_match(1, writer_node.handle);
                self.emit(reader_node, StatusEvent::SubscriptionMatched(status));
                let status = reader_node
                    .statuses
                    .record_liveliness_changed(1, 0, writer_node.handle);
                self.emit(reader_node, StatusEvent::LivelinessChanged(status));

                self.replay_durable(writer_node, writer_state, reader_node, reader_state);
            }
            Err(MatchFailure::IncompatibleQos(policy)) => {
                log::debug!(
                    "[RUNTIME] incompatible qos ({}) writer {:?} vs reader {:?}",
                    policy.name(),
                    writer_node.handle,
                    reader_node.handle
                );
                let status = writer_node.statuses.record_offered_incompatible_qos(policy);
                self.emit(writer_node, StatusEvent::OfferedIncompatibleQos(status));
                let status = reader_node
                    .statuses
                    .record_requested_incompatible_qos(policy);
                self.emit(reader_node, StatusEvent::RequestedIncompatibleQos(status));
            }
            // Silent no-match.
            Err(MatchFailure::PartitionMismatch | MatchFailure::IgnoredLocal) => {}
        }
    }

    /// Replay the writer's retained history into a late-joining durable
    /// reader. Dedup in the cache makes replay safe against overlap.
    fn replay_durable(
        &self,
        writer_node: &Arc<EntityNode>,
        writer_state: &Arc<WriterState>,
        reader_node: &Arc<EntityNode>,
        reader_state: &Arc<ReaderState>,
    ) {
        if writer_node.qos.durability().rank() < Durability::TransientLocal.rank()
            || reader_node.qos.durability().rank() < Durability::TransientLocal.rank()
        {
            return;
        }
        let retained: Vec<RetainedSample> =
            writer_state.retained.lock().iter().cloned().collect();
        if retained.is_empty() {
            return;
        }
        let strength = writer_node.qos.ownership_strength();
        let mut stored = false;
        for sample in retained {
            let outcome = reader_state.cache.insert(
                writer_node.handle.raw(),
                strength,
                writer_state.registration,
                sample.seq,
                sample.data,
                sample.source_timestamp,
                sample.instance,
            );
            stored |= outcome == InsertOutcome::Stored;
        }
        if stored {
            self.data_available(reader_node, reader_state);
        }
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    fn writer_pair(
        &self,
        writer: EntityHandle,
    ) -> Result<(Arc<EntityNode>, Arc<WriterState>)> {
        let node = self.resolve_kind(writer, EntityKind::Writer)?;
        let state = node
            .writer()
            .cloned()
            .ok_or_else(|| Error::BadParameter("writer role missing".into()))?;
        Ok((node, state))
    }

    fn reader_pair(
        &self,
        reader: EntityHandle,
    ) -> Result<(Arc<EntityNode>, Arc<ReaderState>)> {
        let node = self.resolve_kind(reader, EntityKind::Reader)?;
        let state = node
            .reader()
            .cloned()
            .ok_or_else(|| Error::BadParameter("reader role missing".into()))?;
        Ok((node, state))
    }

    fn codec_of(&self, topic: EntityHandle) -> Result<Arc<dyn SampleCodec>> {
        self.codecs
            .get(&topic.raw())
            .map(|c| Arc::clone(&c))
            .ok_or(Error::AlreadyDeleted)
    }

    /// Publish a sample. Returns the instance handle the payload keys to.
    ///
    /// # Errors
    ///
    /// `OutOfResources` when the write would exceed the writer's own
    /// `max_instances`; handle errors as usual.
    pub fn write(
        &self,
        writer: EntityHandle,
        payload: &[u8],
        timestamp: Option<u64>,
    ) -> Result<InstanceHandle> {
        let (node, state) = self.writer_pair(writer)?;
        let codec = self.codec_of(state.topic)?;
        let instance = InstanceHandle::new(codec.key_hash(payload));
        let timestamp = timestamp.unwrap_or_else(now_nanos);

        // The writer's own resource limits bound its instance set; this is
        // the one case where a limit is a call failure, not a status.
        {
            let mut instances = state.instances.lock();
            if !instances.contains(&instance) {
                if let Some(max) = node.qos.resource_limits().max_instances {
                    if instances.len() >= max as usize {
                        return Err(Error::OutOfResources);
                    }
                }
                instances.insert(instance);
            }
        }

        let seq = state.seq.fetch_add(1, Ordering::Relaxed);
        let data: Arc<[u8]> = Arc::from(payload);
        state.last_write.lock().insert(instance, Instant::now());
        *state.last_assert.lock() = Instant::now();

        if node.qos.durability().rank() >= Durability::TransientLocal.rank() {
            self.retain_for_replay(&node, &state, &data, seq, timestamp, instance);
        }

        let matched: Vec<EntityHandle> = state.matched.lock().clone();
        for reader_handle in matched {
            let Some(reader_node) = self.graph.resolve(reader_handle) else {
                continue;
            };
            let Some(reader_state) = reader_node.reader() else {
                continue;
            };
            self.deliver_to_reader(
                &node,
                &state,
                &reader_node,
                reader_state,
                Arc::clone(&data),
                seq,
                timestamp,
                instance,
            );
        }

        let (topic_name, _) = self
            .topic_identity(state.topic)
            .ok_or(Error::AlreadyDeleted)?;
        self.sink.send(&topic_name, writer, payload, timestamp);
        Ok(instance)
    }

    fn retain_for_replay(
        &self,
        node: &Arc<EntityNode>,
        state: &Arc<WriterState>,
        data: &Arc<[u8]>,
        seq: u64,
        timestamp: u64,
        instance: InstanceHandle,
    ) {
        let mut retained = state.retained.lock();
        if let History::KeepLast { depth } = node.qos.history() {
            let per_instance = retained.iter().filter(|s| s.instance == instance).count();
            if per_instance >= depth as usize {
                if let Some(pos) = retained.iter().position(|s| s.instance == instance) {
                    retained.remove(pos);
                }
            }
        }
        retained.push_back(RetainedSample {
            data: Arc::clone(data),
            seq,
            source_timestamp: timestamp,
            instance,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn deliver_to_reader(
        &self,
        writer_node: &Arc<EntityNode>,
        writer_state: &Arc<WriterState>,
        reader_node: &Arc<EntityNode>,
        reader_state: &Arc<ReaderState>,
        data: Arc<[u8]>,
        seq: u64,
        timestamp: u64,
        instance: InstanceHandle,
    ) {
        let outcome = reader_state.cache.insert(
            writer_node.handle.raw(),
            writer_node.qos.ownership_strength(),
            writer_state.registration,
            seq,
            data,
            timestamp,
            instance,
        );
        match outcome {
            InsertOutcome::Stored => {
                reader_state
                    .last_arrival
                    .lock()
                    .insert(instance, Instant::now());
                self.data_available(reader_node, reader_state);
            }
            InsertOutcome::Rejected(reason) => {
                let status = reader_node.statuses.record_sample_rejected(reason, instance);
                self.emit(reader_node, StatusEvent::SampleRejected(status));
            }
            InsertOutcome::LostStaleTimestamp => {
                let status = reader_node.statuses.record_sample_lost();
                self.emit(reader_node, StatusEvent::SampleLost(status));
            }
            InsertOutcome::IgnoredNotOwner | InsertOutcome::DuplicateSequence => {}
        }
    }

    fn data_available(&self, reader_node: &Arc<EntityNode>, reader_state: &Arc<ReaderState>) {
        reader_state.notify_observers();
        reader_node.status_condition.raise(StatusKind::DataAvailable);
        self.dispatcher
            .post(reader_node.handle, StatusEvent::DataAvailable);
    }

    /// Dispose an instance: readers see `NotAliveDisposed` plus a zero-data
    /// marker sample.
    pub fn dispose(
        &self,
        writer: EntityHandle,
        payload: &[u8],
        timestamp: Option<u64>,
    ) -> Result<InstanceHandle> {
        let (node, state) = self.writer_pair(writer)?;
        let codec = self.codec_of(state.topic)?;
        let instance = InstanceHandle::new(codec.key_hash(payload));
        if !state.instances.lock().contains(&instance) {
            return Err(Error::PreconditionNotMet);
        }
        let timestamp = timestamp.unwrap_or_else(now_nanos);
        self.for_each_matched_reader(&node, &state, |reader_node, reader_state| {
            if reader_state
                .cache
                .dispose(node.handle.raw(), instance, timestamp)
            {
                self.data_available(reader_node, reader_state);
            }
        });
        Ok(instance)
    }

    /// Unregister an instance. With `autodispose_unregistered_instances` the
    /// instance is disposed first.
    pub fn unregister_instance(
        &self,
        writer: EntityHandle,
        payload: &[u8],
        timestamp: Option<u64>,
    ) -> Result<InstanceHandle> {
        let (node, state) = self.writer_pair(writer)?;
        let codec = self.codec_of(state.topic)?;
        let instance = InstanceHandle::new(codec.key_hash(payload));
        if !state.instances.lock().remove(&instance) {
            return Err(Error::PreconditionNotMet);
        }
        state.last_write.lock().remove(&instance);
        let timestamp = timestamp.unwrap_or_else(now_nanos);
        let autodispose = node
            .qos
            .writer_data_lifecycle()
            .autodispose_unregistered_instances;
        self.for_each_matched_reader(&node, &state, |reader_node, reader_state| {
            let mut changed = false;
            if autodispose {
                changed |= reader_state
                    .cache
                    .dispose(node.handle.raw(), instance, timestamp);
            }
            changed |= reader_state
                .cache
                .unregister(node.handle.raw(), instance, timestamp);
            if changed {
                self.data_available(reader_node, reader_state);
            }
        });
        Ok(instance)
    }

    fn for_each_matched_reader<F>(
        &self,
        _writer_node: &Arc<EntityNode>,
        writer_state: &Arc<WriterState>,
        mut f: F,
    ) where
        F: FnMut(&Arc<EntityNode>, &Arc<ReaderState>),
    {
        let matched: Vec<EntityHandle> = writer_state.matched.lock().clone();
        for reader_handle in matched {
            let Some(reader_node) = self.graph.resolve(reader_handle) else {
                continue;
            };
            if let Some(reader_state) = reader_node.reader() {
                let reader_state = Arc::clone(reader_state);
                f(&reader_node, &reader_state);
            }
        }
    }

    /// Resolve a payload's key to a known instance on a writer or reader.
    pub fn lookup_instance(
        &self,
        entity: EntityHandle,
        payload: &[u8],
    ) -> Result<Option<InstanceHandle>> {
        let node = self.resolve(entity)?;
        match &node.role {
            Role::Writer(state) => {
                let codec = self.codec_of(state.topic)?;
                let instance = InstanceHandle::new(codec.key_hash(payload));
                Ok(state.instances.lock().contains(&instance).then_some(instance))
            }
            Role::Reader(state) => {
                let codec = self.codec_of(state.topic)?;
                Ok(state.cache.lookup_instance(codec.key_hash(payload)))
            }
            _ => Err(Error::BadParameter(
                "lookup_instance needs a writer or reader".into(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Non-destructive access to a reader's cache.
    pub fn read(
        &self,
        reader: EntityHandle,
        mask: ReadMask,
        max_count: usize,
    ) -> Result<Vec<SampleRecord>> {
        let (node, state) = self.reader_pair(reader)?;
        let records = state.cache.read(mask, max_count);
        self.settle_data_available(&node, &state);
        Ok(records)
    }

    /// Destructive access to a reader's cache.
    pub fn take(
        &self,
        reader: EntityHandle,
        mask: ReadMask,
        max_count: usize,
    ) -> Result<Vec<SampleRecord>> {
        let (node, state) = self.reader_pair(reader)?;
        let records = state.cache.take(mask, max_count);
        self.settle_data_available(&node, &state);
        Ok(records)
    }

    fn settle_data_available(&self, node: &Arc<EntityNode>, state: &Arc<ReaderState>) {
        if !state.cache.any_matching(ReadMask::not_read()) {
            node.status_condition.lower(StatusKind::DataAvailable);
        }
    }

    // ------------------------------------------------------------------
    // Blocking operations
    // ------------------------------------------------------------------

    /// Wait until every sample written before this call has been delivered
    /// and its callbacks dispatched.
    pub fn wait_for_acks(&self, writer: EntityHandle, timeout: Duration) -> Result<()> {
        self.writer_pair(writer)?;
        if self.dispatcher.flush(timeout) {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    /// Wait until historical (durable) data has been replayed into the
    /// reader's cache.
    pub fn wait_for_historical_data(
        &self,
        reader: EntityHandle,
        timeout: Duration,
    ) -> Result<()> {
        let (_, state) = self.reader_pair(reader)?;
        if state.historical.wait(timeout) {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    // ------------------------------------------------------------------
    // Liveliness and deadlines (lazy checks)
    // ------------------------------------------------------------------

    /// Manually assert a writer's liveliness.
    pub fn assert_liveliness(&self, writer: EntityHandle) -> Result<()> {
        let (node, state) = self.writer_pair(writer)?;
        *state.last_assert.lock() = Instant::now();
        let mut lost = state.liveliness_lost.lock();
        if *lost {
            *lost = false;
            drop(lost);
            self.for_each_matched_reader(&node, &state, |reader_node, _| {
                let status = reader_node
                    .statuses
                    .record_liveliness_changed(1, -1, node.handle);
                self.emit(reader_node, StatusEvent::LivelinessChanged(status));
            });
        }
        Ok(())
    }

    /// Evaluate manual-liveliness leases and deadline periods. Called
    /// lazily before status reads; there is no timer thread.
    pub fn process_timers(&self) {
        let now = Instant::now();
        self.process_liveliness(now);
        self.process_deadlines(now);
    }

    fn process_liveliness(&self, now: Instant) {
        for node in self.graph.of_kind(EntityKind::Writer) {
            let liveliness = node.qos.liveliness();
            if liveliness.kind == LivelinessKind::Automatic {
                continue;
            }
            let Some(state) = node.writer().cloned() else {
                continue;
            };
            let expired =
                now.duration_since(*state.last_assert.lock()) >= liveliness.lease_duration;
            let mut lost = state.liveliness_lost.lock();
            if expired && !*lost {
                *lost = true;
                drop(lost);
                let status = node.statuses.record_liveliness_lost();
                self.emit(&node, StatusEvent::LivelinessLost(status));
                self.for_each_matched_reader(&node, &state, |reader_node, _| {
                    let status = reader_node
                        .statuses
                        .record_liveliness_changed(-1, 1, node.handle);
                    self.emit(reader_node, StatusEvent::LivelinessChanged(status));
                });
            }
        }
    }

    fn process_deadlines(&self, now: Instant) {
        for node in self.graph.of_kind(EntityKind::Writer) {
            let Some(period) = node.qos.deadline() else {
                continue;
            };
            let Some(state) = node.writer().cloned() else {
                continue;
            };
            let mut missed = Vec::new();
            {
                let mut last_write = state.last_write.lock();
                for (instance, stamp) in last_write.iter_mut() {
                    if now.duration_since(*stamp) >= period {
                        // One miss per elapsed period; restart the clock.
                        *stamp = now;
                        missed.push(*instance);
                    }
                }
            }
            for instance in missed {
                let status = node.statuses.record_offered_deadline_missed(instance);
                self.emit(&node, StatusEvent::OfferedDeadlineMissed(status));
            }
        }
        for node in self.graph.of_kind(EntityKind::Reader) {
            let Some(period) = node.qos.deadline() else {
                continue;
            };
            let Some(state) = node.reader().cloned() else {
                continue;
            };
            let mut missed = Vec::new();
            {
                let mut last_arrival = state.last_arrival.lock();
                for (instance, stamp) in last_arrival.iter_mut() {
                    if now.duration_since(*stamp) >= period {
                        *stamp = now;
                        missed.push(*instance);
                    }
                }
            }
            for instance in missed {
                let status = node.statuses.record_requested_deadline_missed(instance);
                self.emit(&node, StatusEvent::RequestedDeadlineMissed(status));
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound wire delivery
    // ------------------------------------------------------------------

    /// Deliver a sample received from a transport binding into every local
    /// reader of `topic_name`. `source` identifies the remote writer and
    /// must be stable per writer for dedup to work.
    pub fn deliver(
        &self,
        topic_name: &str,
        source: u64,
        seq: u64,
        payload: &[u8],
        timestamp: u64,
    ) {
        let data: Arc<[u8]> = Arc::from(payload);
        for reader_node in self.graph.of_kind(EntityKind::Reader) {
            let Some(reader_state) = reader_node.reader() else {
                continue;
            };
            let Some((name, _)) = self.topic_identity(reader_state.topic) else {
                continue;
            };
            if name != topic_name {
                continue;
            }
            let Ok(codec) = self.codec_of(reader_state.topic) else {
                continue;
            };
            let instance = InstanceHandle::new(codec.key_hash(payload));
            let outcome = reader_state.cache.insert(
                source,
                0,
                0,
                seq,
                Arc::clone(&data),
                timestamp,
                instance,
            );
            let reader_state = Arc::clone(reader_state);
            match outcome {
                InsertOutcome::Stored => self.data_available(&reader_node, &reader_state),
                InsertOutcome::Rejected(reason) => {
                    let status = reader_node.statuses.record_sample_rejected(reason, instance);
                    self.emit(&reader_node, StatusEvent::SampleRejected(status));
                }
                InsertOutcome::LostStaleTimestamp => {
                    let status = reader_node.statuses.record_sample_lost();
                    self.emit(&reader_node, StatusEvent::SampleLost(status));
                }
                InsertOutcome::IgnoredNotOwner | InsertOutcome::DuplicateSequence => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Status plumbing
    // ------------------------------------------------------------------

    fn emit(&self, node: &EntityNode, event: StatusEvent) {
        node.status_condition.raise(event.kind());
        self.dispatcher.post(node.handle, event);
    }

    /// Clear a status-condition bit after the application read the status.
    pub(crate) fn settle_status(&self, entity: EntityHandle, kind: StatusKind) {
        if let Some(node) = self.graph.resolve(entity) {
            node.status_condition.lower(kind);
        }
    }
}

impl std::fmt::Debug for DomainRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRuntime")
            .field("domain_id", &self.domain_id)
            .field("entities", &self.graph.len())
            .finish()
    }
}
