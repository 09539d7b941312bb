// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reader-side history cache with read/take semantics.
//!
//! Samples arrive in reception order and are grouped into keyed instances.
//! `read()` is non-destructive (marks samples READ under a shared lock,
//! sample state lives in atomics), `take()` removes matched samples under
//! the exclusive lock. Eviction follows the History and ResourceLimits
//! policies; instance lifecycle (alive / disposed / no-writers) is tracked
//! per key, and dispose/unregister insert zero-data marker samples.

use crate::dds::listener::SampleRejectedReason;
use crate::qos::{DestinationOrder, History, Ownership, Qos, ReaderDataLifecycle, ResourceLimits};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Instance handle: 16-byte key hash computed by the codec collaborator.
///
/// All zeros for keyless topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstanceHandle(pub [u8; 16]);

impl InstanceHandle {
    /// Handle from a codec key hash.
    #[must_use]
    pub const fn new(key_hash: [u8; 16]) -> Self {
        Self(key_hash)
    }

    /// Nil handle for keyless topics.
    #[must_use]
    pub const fn nil() -> Self {
        Self([0u8; 16])
    }

    /// Whether this is the nil handle.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

/// Sample state: read at least once or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleState {
    /// Accessed via `read()` or returned by a previous access.
    Read,
    /// Never accessed.
    NotRead,
}

/// View state of the instance a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// Instance never accessed by the application before.
    New,
    /// Instance seen in an earlier access.
    Old,
}

/// Instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// At least one writer has the instance registered.
    Alive,
    /// A writer explicitly disposed the instance.
    NotAliveDisposed,
    /// Every writer unregistered (or was deleted).
    NotAliveNoWriters,
}

/// Bit mask over [`SampleState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleStateMask(u32);

impl SampleStateMask {
    /// Match READ samples.
    pub const READ: SampleStateMask = SampleStateMask(1 << 0);
    /// Match NOT_READ samples.
    pub const NOT_READ: SampleStateMask = SampleStateMask(1 << 1);
    /// Match any sample state.
    pub const ANY: SampleStateMask = SampleStateMask(Self::READ.0 | Self::NOT_READ.0);

    /// Whether `state` is selected by this mask.
    #[must_use]
    pub const fn matches(&self, state: SampleState) -> bool {
        match state {
            SampleState::Read => self.0 & Self::READ.0 != 0,
            SampleState::NotRead => self.0 & Self::NOT_READ.0 != 0,
        }
    }
}

/// Bit mask over [`ViewState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewStateMask(u32);

impl ViewStateMask {
    /// Match NEW instances.
    pub const NEW: ViewStateMask = ViewStateMask(1 << 0);
    /// Match instances seen before.
    pub const NOT_NEW: ViewStateMask = ViewStateMask(1 << 1);
    /// Match any view state.
    pub const ANY: ViewStateMask = ViewStateMask(Self::NEW.0 | Self::NOT_NEW.0);

    /// Whether `state` is selected by this mask.
    #[must_use]
    pub const fn matches(&self, state: ViewState) -> bool {
        match state {
            ViewState::New => self.0 & Self::NEW.0 != 0,
            ViewState::Old => self.0 & Self::NOT_NEW.0 != 0,
        }
    }
}

/// Bit mask over [`InstanceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceStateMask(u32);

impl InstanceStateMask {
    /// Match ALIVE instances.
    pub const ALIVE: InstanceStateMask = InstanceStateMask(1 << 0);
    /// Match disposed instances.
    pub const NOT_ALIVE_DISPOSED: InstanceStateMask = InstanceStateMask(1 << 1);
    /// Match instances with no writers.
    pub const NOT_ALIVE_NO_WRITERS: InstanceStateMask = InstanceStateMask(1 << 2);
    /// Match any instance state.
    pub const ANY: InstanceStateMask = InstanceStateMask(
        Self::ALIVE.0 | Self::NOT_ALIVE_DISPOSED.0 | Self::NOT_ALIVE_NO_WRITERS.0,
    );

    /// Whether `state` is selected by this mask.
    #[must_use]
    pub const fn matches(&self, state: InstanceState) -> bool {
        match state {
            InstanceState::Alive => self.0 & Self::ALIVE.0 != 0,
            InstanceState::NotAliveDisposed => self.0 & Self::NOT_ALIVE_DISPOSED.0 != 0,
            InstanceState::NotAliveNoWriters => self.0 & Self::NOT_ALIVE_NO_WRITERS.0 != 0,
        }
    }
}

/// Combined sample/view/instance state selector for read/take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMask {
    /// Sample state selector.
    pub sample: SampleStateMask,
    /// View state selector.
    pub view: ViewStateMask,
    /// Instance state selector.
    pub instance: InstanceStateMask,
}

impl ReadMask {
    /// Match everything.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            sample: SampleStateMask::ANY,
            view: ViewStateMask::ANY,
            instance: InstanceStateMask::ANY,
        }
    }

    /// Match unread samples of alive instances (the common poll).
    #[must_use]
    pub const fn not_read() -> Self {
        Self {
            sample: SampleStateMask::NOT_READ,
            view: ViewStateMask::ANY,
            instance: InstanceStateMask::ANY,
        }
    }
}

impl Default for ReadMask {
    fn default() -> Self {
        Self::any()
    }
}

/// Metadata accompanying every sample returned by read/take.
#[derive(Debug, Clone, Copy)]
pub struct SampleInfo {
    /// Writer-assigned source timestamp (nanoseconds since epoch).
    pub source_timestamp: u64,
    /// Instance the sample belongs to.
    pub instance_handle: InstanceHandle,
    /// Raw handle of the source writer.
    pub writer: u64,
    /// Sample state at access time.
    pub sample_state: SampleState,
    /// View state of the instance at access time.
    pub view_state: ViewState,
    /// Instance state at access time.
    pub instance_state: InstanceState,
    /// Times the instance returned to ALIVE after a dispose.
    pub disposed_generation: u32,
    /// Times the instance returned to ALIVE after losing all writers.
    pub no_writers_generation: u32,
    /// False for dispose/unregister marker samples (zero data).
    pub valid_data: bool,
}

/// A sample handed to the application: payload bytes plus metadata.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    /// Payload bytes (empty for marker samples).
    pub data: Arc<[u8]>,
    /// Sample metadata.
    pub info: SampleInfo,
}

/// Outcome of inserting a sample into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored; data is now visible to read/take and conditions.
    Stored,
    /// Rejected by resource limits; reported as a SampleRejected status.
    Rejected(SampleRejectedReason),
    /// Dropped because an equal-or-newer source timestamp is cached for the
    /// instance (DestinationOrder::BySourceTimestamp). Reported as SampleLost.
    LostStaleTimestamp,
    /// Silently ignored: a stronger writer owns the instance (Exclusive).
    IgnoredNotOwner,
    /// Silently ignored: duplicate (writer, sequence) pair.
    DuplicateSequence,
}

struct StoredSample {
    data: Arc<[u8]>,
    source_timestamp: u64,
    instance: InstanceHandle,
    writer: u64,
    seq: u64,
    valid: bool,
    disposed_generation: u32,
    no_writers_generation: u32,
    read: AtomicBool,
}

impl StoredSample {
    fn sample_state(&self) -> SampleState {
        if self.read.load(Ordering::Relaxed) {
            SampleState::Read
        } else {
            SampleState::NotRead
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InstanceOwner {
    writer: u64,
    strength: i32,
    registration: u64,
}

struct InstanceRec {
    state: InstanceState,
    viewed: AtomicBool,
    disposed_generation: u32,
    no_writers_generation: u32,
    writers: Vec<u64>,
    owner: Option<InstanceOwner>,
    newest_source_ts: u64,
    not_alive_since: Option<Instant>,
}

impl InstanceRec {
    fn new() -> Self {
        Self {
            state: InstanceState::Alive,
            viewed: AtomicBool::new(false),
            disposed_generation: 0,
            no_writers_generation: 0,
            writers: Vec::new(),
            owner: None,
            newest_source_ts: 0,
            not_alive_since: None,
        }
    }

    fn view_state(&self) -> ViewState {
        if self.viewed.load(Ordering::Relaxed) {
            ViewState::Old
        } else {
            ViewState::New
        }
    }

    fn register_writer(&mut self, writer: u64) {
        if !self.writers.contains(&writer) {
            self.writers.push(writer);
        }
    }

    /// Sample arrival revives a not-alive instance, bumping the matching
    /// generation counter.
    fn revive(&mut self) {
        match self.state {
            InstanceState::Alive => {}
            InstanceState::NotAliveDisposed => {
                self.disposed_generation += 1;
                self.state = InstanceState::Alive;
                self.not_alive_since = None;
            }
            InstanceState::NotAliveNoWriters => {
                self.no_writers_generation += 1;
                self.state = InstanceState::Alive;
                self.not_alive_since = None;
            }
        }
    }
}

struct CacheInner {
    samples: VecDeque<StoredSample>,
    instances: HashMap<InstanceHandle, InstanceRec>,
}

impl CacheInner {
    fn instance_sample_count(&self, instance: InstanceHandle) -> usize {
        self.samples
            .iter()
            .filter(|s| s.instance == instance && s.valid)
            .count()
    }

    fn evict_oldest_of(&mut self, instance: InstanceHandle) {
        if let Some(pos) = self
            .samples
            .iter()
            .position(|s| s.instance == instance && s.valid)
        {
            self.samples.remove(pos);
        }
    }
}

/// Per-reader bounded sample store.
pub struct HistoryCache {
    history: History,
    limits: ResourceLimits,
    destination_order: DestinationOrder,
    exclusive: bool,
    lifecycle: ReaderDataLifecycle,
    inner: RwLock<CacheInner>,
}

impl HistoryCache {
    /// Build a cache from the reader's QoS snapshot.
    #[must_use]
    pub fn new(qos: &Qos) -> Self {
        Self {
            history: qos.history(),
            limits: qos.resource_limits(),
            destination_order: qos.destination_order(),
            exclusive: qos.ownership() == Ownership::Exclusive,
            lifecycle: qos.reader_data_lifecycle(),
            inner: RwLock::new(CacheInner {
                samples: VecDeque::new(),
                instances: HashMap::new(),
            }),
        }
    }

    /// Insert an incoming data sample.
    ///
    /// `strength` and `registration` drive exclusive-ownership arbitration;
    /// `seq` is the writer's sequence number, used for dedup.
    pub fn insert(
        &self,
        writer: u64,
        strength: i32,
        registration: u64,
        seq: u64,
        data: Arc<[u8]>,
        source_timestamp: u64,
        instance: InstanceHandle,
    ) -> InsertOutcome {
        let mut inner = self.inner.write();
        self.purge_expired_locked(&mut inner, Instant::now());

        if inner
            .samples
            .iter()
            .any(|s| s.writer == writer && s.seq == seq)
        {
            log::debug!("[CACHE] dedup: dropping duplicate writer={writer} seq={seq}");
            return InsertOutcome::DuplicateSequence;
        }

        // New keys are bounded by max_instances before anything is allocated.
        if !inner.instances.contains_key(&instance) {
            if let Some(max) = self.limits.max_instances {
                if inner.instances.len() >= max as usize {
                    log::debug!("[CACHE] max_instances={max} exceeded, rejecting new key");
                    return InsertOutcome::Rejected(SampleRejectedReason::InstanceLimit);
                }
            }
            inner.instances.insert(instance, InstanceRec::new());
        }

        // Exclusive ownership: only the strongest alive writer gets through,
        // ties broken by most-recent registration.
        if self.exclusive {
            let rec = inner
                .instances
                .get_mut(&instance)
                .unwrap_or_else(|| unreachable!("instance inserted above"));
            let candidate = InstanceOwner {
                writer,
                strength,
                registration,
            };
            match rec.owner {
                Some(owner) if owner.writer != writer => {
                    let wins = candidate.strength > owner.strength
                        || (candidate.strength == owner.strength
                            && candidate.registration > owner.registration);
                    if wins {
                        rec.owner = Some(candidate);
                    } else {
                        return InsertOutcome::IgnoredNotOwner;
                    }
                }
                _ => rec.owner = Some(candidate),
            }
        }

        // Destination order by source timestamp drops stale arrivals.
        {
            let rec = &inner.instances[&instance];
            if self.destination_order == DestinationOrder::BySourceTimestamp
                && rec.newest_source_ts > source_timestamp
            {
                log::debug!(
                    "[CACHE] stale source timestamp {} < {}, dropping",
                    source_timestamp,
                    rec.newest_source_ts
                );
                return InsertOutcome::LostStaleTimestamp;
            }
        }

        // History / resource-limit bounds.
        let per_instance = inner.instance_sample_count(instance);
        match self.history {
            History::KeepLast { depth } => {
                if per_instance >= depth as usize {
                    inner.evict_oldest_of(instance);
                }
            }
            History::KeepAll => {
                if let Some(max) = self.limits.max_samples_per_instance {
                    if per_instance >= max as usize {
                        return InsertOutcome::Rejected(
                            SampleRejectedReason::SamplesPerInstanceLimit,
                        );
                    }
                }
            }
        }
        if let Some(max) = self.limits.max_samples {
            let total = inner.samples.iter().filter(|s| s.valid).count();
            if total >= max as usize {
                match self.history {
                    History::KeepLast { .. } => {
                        if let Some(pos) = inner.samples.iter().position(|s| s.valid) {
                            inner.samples.remove(pos);
                        }
                    }
                    History::KeepAll => {
                        return InsertOutcome::Rejected(SampleRejectedReason::ResourceLimit);
                    }
                }
            }
        }

        let rec = inner
            .instances
            .get_mut(&instance)
            .unwrap_or_else(|| unreachable!("instance inserted above"));
        rec.register_writer(writer);
        rec.revive();
        rec.newest_source_ts = rec.newest_source_ts.max(source_timestamp);
        let disposed_generation = rec.disposed_generation;
        let no_writers_generation = rec.no_writers_generation;

        inner.samples.push_back(StoredSample {
            data,
            source_timestamp,
            instance,
            writer,
            seq,
            valid: true,
            disposed_generation,
            no_writers_generation,
            read: AtomicBool::new(false),
        });
        InsertOutcome::Stored
    }

    /// Explicit dispose: mark the instance NotAliveDisposed and insert a
    /// zero-data marker sample.
    pub fn dispose(&self, writer: u64, instance: InstanceHandle, source_timestamp: u64) -> bool {
        let mut inner = self.inner.write();
        let Some(rec) = inner.instances.get_mut(&instance) else {
            return false;
        };
        if rec.state == InstanceState::NotAliveDisposed {
            return false;
        }
        rec.state = InstanceState::NotAliveDisposed;
        rec.not_alive_since = Some(Instant::now());
        let disposed_generation = rec.disposed_generation;
        let no_writers_generation = rec.no_writers_generation;
        Self::push_marker(
            &mut inner,
            writer,
            instance,
            source_timestamp,
            disposed_generation,
            no_writers_generation,
        );
        true
    }

    /// Writer unregistration for one instance. The instance transitions to
    /// NotAliveNoWriters (with marker) once its last writer unregisters.
    pub fn unregister(&self, writer: u64, instance: InstanceHandle, source_timestamp: u64) -> bool {
        let mut inner = self.inner.write();
        let Some(rec) = inner.instances.get_mut(&instance) else {
            return false;
        };
        rec.writers.retain(|&w| w != writer);
        if rec.owner.map(|o| o.writer) == Some(writer) {
            rec.owner = None;
        }
        if rec.writers.is_empty() && rec.state == InstanceState::Alive {
            rec.state = InstanceState::NotAliveNoWriters;
            rec.not_alive_since = Some(Instant::now());
            let disposed_generation = rec.disposed_generation;
            let no_writers_generation = rec.no_writers_generation;
            Self::push_marker(
                &mut inner,
                writer,
                instance,
                source_timestamp,
                disposed_generation,
                no_writers_generation,
            );
            return true;
        }
        false
    }

    /// Drop every trace of a deleted writer: unregister it from all its
    /// instances. Returns instances that transitioned to NotAliveNoWriters.
    pub fn release_writer(&self, writer: u64, source_timestamp: u64) -> Vec<InstanceHandle> {
        let handles: Vec<InstanceHandle> = {
            let inner = self.inner.read();
            inner
                .instances
                .iter()
                .filter(|(_, rec)| rec.writers.contains(&writer))
                .map(|(h, _)| *h)
                .collect()
        };
        let mut transitioned = Vec::new();
        for handle in handles {
            if self.unregister(writer, handle, source_timestamp) {
                transitioned.push(handle);
            }
        }
        transitioned
    }

    fn push_marker(
        inner: &mut CacheInner,
        writer: u64,
        instance: InstanceHandle,
        source_timestamp: u64,
        disposed_generation: u32,
        no_writers_generation: u32,
    ) {
        inner.samples.push_back(StoredSample {
            data: Arc::from(&[][..]),
            source_timestamp,
            instance,
            writer,
            seq: u64::MAX,
            valid: false,
            disposed_generation,
            no_writers_generation,
            read: AtomicBool::new(false),
        });
    }

    /// Non-destructive access: returns up to `max_count` samples matching
    /// `mask` in reception order, marking them READ. Runs under the shared
    /// lock; sample state is atomic.
    #[must_use]
    pub fn read(&self, mask: ReadMask, max_count: usize) -> Vec<SampleRecord> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        let mut touched = Vec::new();
        for sample in &inner.samples {
            if out.len() >= max_count {
                break;
            }
            let Some(rec) = inner.instances.get(&sample.instance) else {
                continue;
            };
            if !Self::matches(sample, rec, mask) {
                continue;
            }
            out.push(Self::record_of(sample, rec));
            sample.read.store(true, Ordering::Relaxed);
            touched.push(sample.instance);
        }
        for handle in touched {
            if let Some(rec) = inner.instances.get(&handle) {
                rec.viewed.store(true, Ordering::Relaxed);
            }
        }
        out
    }

    /// Destructive access: like [`HistoryCache::read`] but removes the
    /// returned samples from the cache. Exclusive lock.
    #[must_use]
    pub fn take(&self, mask: ReadMask, max_count: usize) -> Vec<SampleRecord> {
        let mut inner = self.inner.write();
        let mut out = Vec::new();
        let mut touched = Vec::new();
        let mut kept = VecDeque::with_capacity(inner.samples.len());
        while let Some(sample) = inner.samples.pop_front() {
            let matched = out.len() < max_count
                && inner
                    .instances
                    .get(&sample.instance)
                    .is_some_and(|rec| Self::matches(&sample, rec, mask));
            if matched {
                let rec = &inner.instances[&sample.instance];
                out.push(Self::record_of(&sample, rec));
                touched.push(sample.instance);
            } else {
                kept.push_back(sample);
            }
        }
        inner.samples = kept;
        for handle in touched {
            if let Some(rec) = inner.instances.get(&handle) {
                rec.viewed.store(true, Ordering::Relaxed);
            }
        }
        out
    }

    fn matches(sample: &StoredSample, rec: &InstanceRec, mask: ReadMask) -> bool {
        mask.sample.matches(sample.sample_state())
            && mask.view.matches(rec.view_state())
            && mask.instance.matches(rec.state)
    }

    fn record_of(sample: &StoredSample, rec: &InstanceRec) -> SampleRecord {
        SampleRecord {
            data: Arc::clone(&sample.data),
            info: SampleInfo {
                source_timestamp: sample.source_timestamp,
                instance_handle: sample.instance,
                writer: sample.writer,
                sample_state: sample.sample_state(),
                view_state: rec.view_state(),
                instance_state: rec.state,
                disposed_generation: sample.disposed_generation,
                no_writers_generation: sample.no_writers_generation,
                valid_data: sample.valid,
            },
        }
    }

    /// Whether at least one cached sample matches `mask` (ReadCondition).
    #[must_use]
    pub fn any_matching(&self, mask: ReadMask) -> bool {
        self.any_matching_with(mask, |_| true)
    }

    /// Whether at least one cached sample matches `mask` and `predicate`
    /// (QueryCondition). The predicate sees the would-be record.
    #[must_use]
    pub fn any_matching_with<F>(&self, mask: ReadMask, predicate: F) -> bool
    where
        F: Fn(&SampleRecord) -> bool,
    {
        let inner = self.inner.read();
        inner.samples.iter().any(|sample| {
            inner
                .instances
                .get(&sample.instance)
                .is_some_and(|rec| Self::matches(sample, rec, mask))
                && predicate(&Self::record_of(sample, &inner.instances[&sample.instance]))
        })
    }

    /// Resolve a key hash to its instance handle, if tracked.
    #[must_use]
    pub fn lookup_instance(&self, key_hash: [u8; 16]) -> Option<InstanceHandle> {
        let handle = InstanceHandle::new(key_hash);
        self.inner
            .read()
            .instances
            .contains_key(&handle)
            .then_some(handle)
    }

    /// Number of samples currently cached (markers included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().samples.len()
    }

    /// Whether the cache holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().samples.is_empty()
    }

    /// Number of instances currently tracked.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.read().instances.len()
    }

    /// Drop everything (reader deletion).
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.samples.clear();
        inner.instances.clear();
    }

    /// ReaderDataLifecycle autopurge, applied lazily on insert.
    fn purge_expired_locked(&self, inner: &mut CacheInner, now: Instant) {
        let disposed_delay = self.lifecycle.autopurge_disposed_samples_delay;
        let nowriter_delay = self.lifecycle.autopurge_nowriter_samples_delay;
        if disposed_delay.is_none() && nowriter_delay.is_none() {
            return;
        }
        let mut purged = Vec::new();
        inner.instances.retain(|handle, rec| {
            let Some(since) = rec.not_alive_since else {
                return true;
            };
            let delay = match rec.state {
                InstanceState::NotAliveDisposed => disposed_delay,
                InstanceState::NotAliveNoWriters => nowriter_delay,
                InstanceState::Alive => None,
            };
            match delay {
                Some(delay) if now.duration_since(since) >= delay => {
                    purged.push(*handle);
                    false
                }
                _ => true,
            }
        });
        if !purged.is_empty() {
            inner.samples.retain(|s| !purged.contains(&s.instance));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::{Policy, PolicyId};
    use std::time::Duration;

    fn handle(byte: u8) -> InstanceHandle {
        let mut key = [0u8; 16];
        key[0] = byte;
        InstanceHandle::new(key)
    }

    fn payload(text: &str) -> Arc<[u8]> {
        Arc::from(text.as_bytes())
    }

    fn cache_with(policies: Vec<Policy>) -> HistoryCache {
        HistoryCache::new(&Qos::from_policies(policies).expect("valid qos"))
    }

    fn keep_last(depth: u32) -> HistoryCache {
        cache_with(vec![Policy::History(History::KeepLast { depth })])
    }

    #[test]
    fn test_keep_last_evicts_oldest_first() {
        let cache = keep_last(3);
        for (seq, text) in ["a", "b", "c", "d"].iter().enumerate() {
            let outcome = cache.insert(1, 0, 0, seq as u64, payload(text), seq as u64, handle(1));
            assert_eq!(outcome, InsertOutcome::Stored);
        }

        let records = cache.take(ReadMask::any(), usize::MAX);
        let texts: Vec<&str> = records
            .iter()
            .map(|r| std::str::from_utf8(&r.data).expect("utf8"))
            .collect();
        assert_eq!(texts, ["b", "c", "d"], "oldest sample must be evicted");
    }

    #[test]
    fn test_keep_all_rejects_over_per_instance_limit() {
        let cache = cache_with(vec![
            Policy::History(History::KeepAll),
            Policy::ResourceLimits(ResourceLimits {
                max_samples: None,
                max_instances: None,
                max_samples_per_instance: Some(2),
            }),
        ]);
        assert_eq!(
            cache.insert(1, 0, 0, 0, payload("a"), 0, handle(1)),
            InsertOutcome::Stored
        );
        assert_eq!(
            cache.insert(1, 0, 0, 1, payload("b"), 1, handle(1)),
            InsertOutcome::Stored
        );
        assert_eq!(
            cache.insert(1, 0, 0, 2, payload("c"), 2, handle(1)),
            InsertOutcome::Rejected(SampleRejectedReason::SamplesPerInstanceLimit)
        );
        // Other instances continue to be served.
        assert_eq!(
            cache.insert(1, 0, 0, 3, payload("d"), 3, handle(2)),
            InsertOutcome::Stored
        );
    }

    #[test]
    fn test_max_instances_rejects_new_key() {
        let cache = cache_with(vec![Policy::ResourceLimits(ResourceLimits {
            max_samples: None,
            max_instances: Some(1),
            max_samples_per_instance: None,
        })]);
        assert_eq!(
            cache.insert(1, 0, 0, 0, payload("a"), 0, handle(1)),
            InsertOutcome::Stored
        );
        assert_eq!(
            cache.insert(1, 0, 0, 1, payload("b"), 1, handle(2)),
            InsertOutcome::Rejected(SampleRejectedReason::InstanceLimit)
        );
    }

    #[test]
    fn test_take_drains_and_second_take_empty() {
        let cache = keep_last(10);
        for seq in 0..3u64 {
            cache.insert(1, 0, 0, seq, payload("x"), seq, handle(1));
        }
        let first = cache.take(ReadMask::any(), usize::MAX);
        assert_eq!(first.len(), 3);
        assert!(cache.is_empty());
        let second = cache.take(ReadMask::any(), usize::MAX);
        assert!(second.is_empty());
    }

    #[test]
    fn test_read_marks_read_but_keeps_samples() {
        let cache = keep_last(10);
        cache.insert(1, 0, 0, 0, payload("x"), 0, handle(1));

        let first = cache.read(ReadMask::any(), usize::MAX);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].info.sample_state, SampleState::NotRead);
        assert_eq!(cache.len(), 1);

        // NOT_READ mask no longer matches; ANY still returns it as READ.
        assert!(cache.read(ReadMask::not_read(), usize::MAX).is_empty());
        let again = cache.read(ReadMask::any(), usize::MAX);
        assert_eq!(again[0].info.sample_state, SampleState::Read);
    }

    #[test]
    fn test_view_state_new_then_old() {
        let cache = keep_last(10);
        cache.insert(1, 0, 0, 0, payload("x"), 0, handle(1));

        let first = cache.read(ReadMask::any(), usize::MAX);
        assert_eq!(first[0].info.view_state, ViewState::New);

        cache.insert(1, 0, 0, 1, payload("y"), 1, handle(1));
        let second = cache.read(ReadMask::any(), usize::MAX);
        assert!(second.iter().all(|r| r.info.view_state == ViewState::Old));
    }

    #[test]
    fn test_dispose_inserts_marker_and_sets_state() {
        let cache = keep_last(10);
        cache.insert(1, 0, 0, 0, payload("x"), 0, handle(1));
        assert!(cache.dispose(1, handle(1), 1));

        let records = cache.take(ReadMask::any(), usize::MAX);
        assert_eq!(records.len(), 2);
        let marker = &records[1];
        assert!(!marker.info.valid_data);
        assert!(marker.data.is_empty());
        assert_eq!(marker.info.instance_state, InstanceState::NotAliveDisposed);

        // Dispose is idempotent.
        assert!(!cache.dispose(1, handle(1), 2));
    }

    #[test]
    fn test_unregister_last_writer_sets_no_writers() {
        let cache = keep_last(10);
        cache.insert(1, 0, 0, 0, payload("x"), 0, handle(1));
        cache.insert(2, 0, 1, 0, payload("y"), 1, handle(1));

        assert!(!cache.unregister(1, handle(1), 2), "one writer remains");
        assert!(cache.unregister(2, handle(1), 3), "last writer unregisters");

        let records = cache.read(ReadMask::any(), usize::MAX);
        assert!(records
            .iter()
            .all(|r| r.info.instance_state == InstanceState::NotAliveNoWriters));
    }

    #[test]
    fn test_revival_bumps_generation() {
        let cache = keep_last(10);
        cache.insert(1, 0, 0, 0, payload("x"), 0, handle(1));
        cache.dispose(1, handle(1), 1);
        cache.insert(1, 0, 0, 1, payload("y"), 2, handle(1));

        let records = cache.read(ReadMask::any(), usize::MAX);
        let last = records.last().expect("revival sample");
        assert_eq!(last.info.instance_state, InstanceState::Alive);
        assert_eq!(last.info.disposed_generation, 1);
    }

    #[test]
    fn test_by_source_timestamp_drops_stale() {
        let cache = cache_with(vec![
            Policy::History(History::KeepLast { depth: 10 }),
            Policy::DestinationOrder(DestinationOrder::BySourceTimestamp),
        ]);
        assert_eq!(
            cache.insert(1, 0, 0, 0, payload("new"), 100, handle(1)),
            InsertOutcome::Stored
        );
        assert_eq!(
            cache.insert(2, 0, 1, 0, payload("old"), 50, handle(1)),
            InsertOutcome::LostStaleTimestamp
        );
        // Reception order still accepted for a different instance.
        assert_eq!(
            cache.insert(2, 0, 1, 1, payload("other"), 50, handle(2)),
            InsertOutcome::Stored
        );
    }

    #[test]
    fn test_exclusive_ownership_filters_weaker_writer() {
        let cache = cache_with(vec![
            Policy::History(History::KeepLast { depth: 10 }),
            Policy::Ownership(Ownership::Exclusive),
        ]);
        assert_eq!(
            cache.insert(2, 2, 2, 0, payload("strong"), 0, handle(1)),
            InsertOutcome::Stored
        );
        assert_eq!(
            cache.insert(1, 1, 1, 0, payload("weak"), 1, handle(1)),
            InsertOutcome::IgnoredNotOwner
        );

        // Owner death hands the instance to the weaker writer.
        cache.release_writer(2, 2);
        assert_eq!(
            cache.insert(1, 1, 1, 1, payload("weak2"), 3, handle(1)),
            InsertOutcome::Stored
        );
        let records = cache.take(ReadMask::any(), usize::MAX);
        let texts: Vec<&str> = records
            .iter()
            .filter(|r| r.info.valid_data)
            .map(|r| std::str::from_utf8(&r.data).expect("utf8"))
            .collect();
        assert_eq!(texts, ["strong", "weak2"]);
    }

    #[test]
    fn test_exclusive_tie_broken_by_registration() {
        let cache = cache_with(vec![Policy::Ownership(Ownership::Exclusive)]);
        assert_eq!(
            cache.insert(1, 5, 1, 0, payload("first"), 0, handle(1)),
            InsertOutcome::Stored
        );
        // Same strength, later registration wins.
        assert_eq!(
            cache.insert(2, 5, 2, 0, payload("second"), 1, handle(1)),
            InsertOutcome::Stored
        );
        // First writer no longer owns the instance.
        assert_eq!(
            cache.insert(1, 5, 1, 1, payload("third"), 2, handle(1)),
            InsertOutcome::IgnoredNotOwner
        );
    }

    #[test]
    fn test_duplicate_sequence_dropped() {
        let cache = keep_last(10);
        assert_eq!(
            cache.insert(1, 0, 0, 7, payload("x"), 0, handle(1)),
            InsertOutcome::Stored
        );
        assert_eq!(
            cache.insert(1, 0, 0, 7, payload("x"), 0, handle(1)),
            InsertOutcome::DuplicateSequence
        );
    }

    #[test]
    fn test_any_matching_with_predicate() {
        let cache = keep_last(10);
        cache.insert(1, 0, 0, 0, payload("hot"), 0, handle(1));
        assert!(cache.any_matching(ReadMask::not_read()));
        assert!(cache.any_matching_with(ReadMask::any(), |r| r.data.as_ref() == b"hot"));
        assert!(!cache.any_matching_with(ReadMask::any(), |r| r.data.as_ref() == b"cold"));
    }

    #[test]
    fn test_autopurge_zero_delay_drops_disposed() {
        let cache = cache_with(vec![Policy::ReaderDataLifecycle(ReaderDataLifecycle {
            autopurge_disposed_samples_delay: Some(Duration::ZERO),
            autopurge_nowriter_samples_delay: None,
        })]);
        cache.insert(1, 0, 0, 0, payload("x"), 0, handle(1));
        cache.dispose(1, handle(1), 1);
        // Purge runs lazily on the next insert.
        cache.insert(1, 0, 0, 1, payload("y"), 2, handle(2));
        assert_eq!(cache.instance_count(), 1);
        let records = cache.read(ReadMask::any(), usize::MAX);
        assert!(records.iter().all(|r| r.info.instance_handle == handle(2)));
    }

    #[test]
    fn test_lookup_instance() {
        let cache = keep_last(10);
        cache.insert(1, 0, 0, 0, payload("x"), 0, handle(9));
        assert_eq!(cache.lookup_instance(handle(9).0), Some(handle(9)));
        assert_eq!(cache.lookup_instance(handle(8).0), None);
    }

    #[test]
    fn test_max_count_limits_read() {
        let cache = keep_last(10);
        for seq in 0..5u64 {
            cache.insert(1, 0, 0, seq, payload("x"), seq, handle(1));
        }
        assert_eq!(cache.read(ReadMask::any(), 2).len(), 2);
        assert_eq!(cache.take(ReadMask::any(), 3).len(), 3);
        assert_eq!(cache.len(), 2);
    }
}
