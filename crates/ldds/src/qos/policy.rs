// SPDX-License-Identifier: Apache-2.0 OR MIT

//! QoS policy value types and the closed `Policy` sum type.
//!
//! Each DDS policy scope gets exactly one `Policy` variant. Scopes carry a
//! total order over their names so a `Qos` set can be kept sorted for
//! deterministic iteration, equality, and serialization.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier for a QoS policy scope.
///
/// Ordered by scope name (alphabetical), which fixes the iteration and
/// serialization order of a [`crate::qos::Qos`] set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyId {
    Deadline,
    DestinationOrder,
    Durability,
    DurabilityService,
    Groupdata,
    History,
    IgnoreLocal,
    LatencyBudget,
    Lifespan,
    Liveliness,
    Ownership,
    OwnershipStrength,
    Partition,
    Presentation,
    ReaderDataLifecycle,
    Reliability,
    ResourceLimits,
    TimeBasedFilter,
    Topicdata,
    TransportPriority,
    Userdata,
    WriterDataLifecycle,
}

impl PolicyId {
    /// Scope name, as used for ordering and in status reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PolicyId::Deadline => "Deadline",
            PolicyId::DestinationOrder => "DestinationOrder",
            PolicyId::Durability => "Durability",
            PolicyId::DurabilityService => "DurabilityService",
            PolicyId::Groupdata => "Groupdata",
            PolicyId::History => "History",
            PolicyId::IgnoreLocal => "IgnoreLocal",
            PolicyId::LatencyBudget => "LatencyBudget",
            PolicyId::Lifespan => "Lifespan",
            PolicyId::Liveliness => "Liveliness",
            PolicyId::Ownership => "Ownership",
            PolicyId::OwnershipStrength => "OwnershipStrength",
            PolicyId::Partition => "Partition",
            PolicyId::Presentation => "Presentation",
            PolicyId::ReaderDataLifecycle => "ReaderDataLifecycle",
            PolicyId::Reliability => "Reliability",
            PolicyId::ResourceLimits => "ResourceLimits",
            PolicyId::TimeBasedFilter => "TimeBasedFilter",
            PolicyId::Topicdata => "Topicdata",
            PolicyId::TransportPriority => "TransportPriority",
            PolicyId::Userdata => "Userdata",
            PolicyId::WriterDataLifecycle => "WriterDataLifecycle",
        }
    }
}

impl PartialOrd for PolicyId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PolicyId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name().cmp(other.name())
    }
}

/// Reliability policy - delivery guarantee kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Reliability {
    /// Fire-and-forget delivery.
    #[default]
    BestEffort,
    /// Acknowledged delivery. `max_blocking_time` bounds how long a write
    /// may block when the writer history is full.
    Reliable {
        /// Maximum blocking time for a full-history write.
        max_blocking_time: Duration,
    },
}

impl Reliability {
    /// Reliable with the conventional 100ms blocking budget.
    #[must_use]
    pub const fn reliable() -> Self {
        Reliability::Reliable {
            max_blocking_time: Duration::from_millis(100),
        }
    }

    /// Offered-vs-requested rank: Reliable > BestEffort.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Reliability::BestEffort => 0,
            Reliability::Reliable { .. } => 1,
        }
    }
}

/// Durability policy - sample persistence level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Durability {
    /// No persistence.
    #[default]
    Volatile,
    /// Writer-lifetime cache replayed to late joiners.
    TransientLocal,
    /// Durability-service backed cache, survives the writer.
    Transient,
    /// Disk-backed persistence.
    Persistent,
}

impl Durability {
    /// Offered-vs-requested rank: Persistent > Transient > TransientLocal > Volatile.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Durability::Volatile => 0,
            Durability::TransientLocal => 1,
            Durability::Transient => 2,
            Durability::Persistent => 3,
        }
    }
}

/// History policy - how many samples per instance the cache retains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum History {
    /// Keep the newest `depth` samples per instance, evicting oldest first.
    KeepLast {
        /// Per-instance depth, must be > 0.
        depth: u32,
    },
    /// Keep everything within `ResourceLimits`.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        History::KeepLast { depth: 1 }
    }
}

/// Resource limits. `None` means unlimited (the DDS `-1` sentinel).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceLimits {
    /// Max samples across all instances.
    pub max_samples: Option<u32>,
    /// Max distinct instances tracked.
    pub max_instances: Option<u32>,
    /// Max samples per instance.
    pub max_samples_per_instance: Option<u32>,
}

/// Presentation access scope kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PresentationAccessScope {
    /// Changes to one instance are presented independently.
    #[default]
    Instance,
    /// Changes within a topic are presented together.
    Topic,
    /// Changes within a publisher group are presented together.
    Group,
}

impl PresentationAccessScope {
    /// Offered-vs-requested rank: Group > Topic > Instance.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            PresentationAccessScope::Instance => 0,
            PresentationAccessScope::Topic => 1,
            PresentationAccessScope::Group => 2,
        }
    }
}

/// Presentation policy - access scope plus coherency/ordering flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Presentation {
    /// Access scope for coherent/ordered presentation.
    pub access_scope: PresentationAccessScope,
    /// Whether coherent access is supported.
    pub coherent_access: bool,
    /// Whether ordered access is supported.
    pub ordered_access: bool,
}

/// Ownership policy kind - shared vs exclusive instance ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Ownership {
    /// Multiple writers may update an instance.
    #[default]
    Shared,
    /// Only the strongest alive writer updates an instance.
    Exclusive,
}

/// Liveliness assertion kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LivelinessKind {
    /// Runtime asserts liveliness automatically.
    #[default]
    Automatic,
    /// Any writer activity on the participant asserts liveliness.
    ManualByParticipant,
    /// Only explicit per-writer assertion counts.
    ManualByTopic,
}

/// Liveliness policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveliness {
    /// Assertion kind.
    pub kind: LivelinessKind,
    /// Lease duration before liveliness is considered lost.
    pub lease_duration: Duration,
}

impl Default for Liveliness {
    fn default() -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            // Effectively infinite default lease.
            lease_duration: Duration::from_secs(u64::MAX / 4),
        }
    }
}

/// Destination order policy - per-instance ordering basis on the reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DestinationOrder {
    /// Order by reception (arrival) timestamp.
    #[default]
    ByReceptionTimestamp,
    /// Order by the writer's source timestamp; stale samples are dropped.
    BySourceTimestamp,
}

impl DestinationOrder {
    /// Offered-vs-requested rank: BySourceTimestamp > ByReceptionTimestamp.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            DestinationOrder::ByReceptionTimestamp => 0,
            DestinationOrder::BySourceTimestamp => 1,
        }
    }
}

/// Writer data lifecycle policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterDataLifecycle {
    /// Dispose instances when they are unregistered (or the writer deleted).
    pub autodispose_unregistered_instances: bool,
}

impl Default for WriterDataLifecycle {
    fn default() -> Self {
        Self {
            autodispose_unregistered_instances: true,
        }
    }
}

/// Reader data lifecycle policy - instance purge delays. The `None`
/// defaults mean "never purge".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReaderDataLifecycle {
    /// Delay before purging instances with no writers.
    pub autopurge_nowriter_samples_delay: Option<Duration>,
    /// Delay before purging disposed instances.
    pub autopurge_disposed_samples_delay: Option<Duration>,
}

/// Durability service policy - history kept on behalf of late joiners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DurabilityService {
    /// Delay before cleaning up disposed-instance data.
    pub service_cleanup_delay: Duration,
    /// History kept by the service.
    pub history: History,
    /// Max samples kept by the service.
    pub max_samples: Option<u32>,
    /// Max instances kept by the service.
    pub max_instances: Option<u32>,
    /// Max samples per instance kept by the service.
    pub max_samples_per_instance: Option<u32>,
}

/// Ignore-local policy - which local endpoints to ignore during matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IgnoreLocal {
    /// Match everything.
    #[default]
    Nothing,
    /// Ignore endpoints of the same participant.
    Participant,
    /// Ignore endpoints of the same process.
    Process,
}

/// A single QoS policy value, tagged by scope.
///
/// Closed sum type: exactly one variant per policy scope. A
/// [`crate::qos::Qos`] holds at most one `Policy` per scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// Expected update period per instance.
    Deadline {
        /// Maximum period between samples of one instance.
        period: Duration,
    },
    /// Per-instance ordering basis.
    DestinationOrder(DestinationOrder),
    /// Sample persistence level.
    Durability(Durability),
    /// Late-joiner history service configuration.
    DurabilityService(DurabilityService),
    /// Opaque group metadata.
    Groupdata {
        /// Raw bytes.
        data: Vec<u8>,
    },
    /// Cache retention per instance.
    History(History),
    /// Local-endpoint matching filter.
    IgnoreLocal(IgnoreLocal),
    /// Acceptable delivery delay hint.
    LatencyBudget {
        /// Budget duration.
        duration: Duration,
    },
    /// Sample expiration relative to source timestamp.
    Lifespan {
        /// Expiry duration.
        duration: Duration,
    },
    /// Writer aliveness contract.
    Liveliness(Liveliness),
    /// Shared vs exclusive instance ownership.
    Ownership(Ownership),
    /// Writer strength under exclusive ownership.
    OwnershipStrength {
        /// Strength; higher wins.
        strength: i32,
    },
    /// Logical partition names.
    Partition {
        /// Partition names; empty means the default partition.
        names: Vec<String>,
    },
    /// Coherency and ordering presentation.
    Presentation(Presentation),
    /// Instance purge delays on the reader.
    ReaderDataLifecycle(ReaderDataLifecycle),
    /// Delivery guarantee kind.
    Reliability(Reliability),
    /// Cache bounds.
    ResourceLimits(ResourceLimits),
    /// Minimum separation between samples delivered to the reader.
    TimeBasedFilter {
        /// Minimum inter-sample separation.
        minimum_separation: Duration,
    },
    /// Opaque topic metadata.
    Topicdata {
        /// Raw bytes.
        data: Vec<u8>,
    },
    /// Transport priority hint.
    TransportPriority {
        /// Priority value.
        priority: i32,
    },
    /// Opaque user metadata.
    Userdata {
        /// Raw bytes.
        data: Vec<u8>,
    },
    /// Autodispose behavior on unregister.
    WriterDataLifecycle(WriterDataLifecycle),
}

impl Policy {
    /// The scope this policy value belongs to.
    #[must_use]
    pub const fn id(&self) -> PolicyId {
        match self {
            Policy::Deadline { .. } => PolicyId::Deadline,
            Policy::DestinationOrder(_) => PolicyId::DestinationOrder,
            Policy::Durability(_) => PolicyId::Durability,
            Policy::DurabilityService(_) => PolicyId::DurabilityService,
            Policy::Groupdata { .. } => PolicyId::Groupdata,
            Policy::History(_) => PolicyId::History,
            Policy::IgnoreLocal(_) => PolicyId::IgnoreLocal,
            Policy::LatencyBudget { .. } => PolicyId::LatencyBudget,
            Policy::Lifespan { .. } => PolicyId::Lifespan,
            Policy::Liveliness(_) => PolicyId::Liveliness,
            Policy::Ownership(_) => PolicyId::Ownership,
            Policy::OwnershipStrength { .. } => PolicyId::OwnershipStrength,
            Policy::Partition { .. } => PolicyId::Partition,
            Policy::Presentation(_) => PolicyId::Presentation,
            Policy::ReaderDataLifecycle(_) => PolicyId::ReaderDataLifecycle,
            Policy::Reliability(_) => PolicyId::Reliability,
            Policy::ResourceLimits(_) => PolicyId::ResourceLimits,
            Policy::TimeBasedFilter { .. } => PolicyId::TimeBasedFilter,
            Policy::Topicdata { .. } => PolicyId::Topicdata,
            Policy::TransportPriority { .. } => PolicyId::TransportPriority,
            Policy::Userdata { .. } => PolicyId::Userdata,
            Policy::WriterDataLifecycle(_) => PolicyId::WriterDataLifecycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_id_order_is_name_order() {
        let ids = [
            PolicyId::Reliability,
            PolicyId::Deadline,
            PolicyId::Userdata,
            PolicyId::History,
        ];
        let mut sorted = ids;
        sorted.sort();
        assert_eq!(
            sorted,
            [
                PolicyId::Deadline,
                PolicyId::History,
                PolicyId::Reliability,
                PolicyId::Userdata,
            ]
        );
    }

    #[test]
    fn test_durability_rank_total_order() {
        assert!(Durability::Persistent.rank() > Durability::Transient.rank());
        assert!(Durability::Transient.rank() > Durability::TransientLocal.rank());
        assert!(Durability::TransientLocal.rank() > Durability::Volatile.rank());
    }

    #[test]
    fn test_reliability_rank() {
        assert!(Reliability::reliable().rank() > Reliability::BestEffort.rank());
    }

    #[test]
    fn test_policy_scope_mapping() {
        let p = Policy::Ownership(Ownership::Exclusive);
        assert_eq!(p.id(), PolicyId::Ownership);
        assert_eq!(p.id().name(), "Ownership");
    }

    #[test]
    fn test_presentation_scope_rank() {
        assert!(PresentationAccessScope::Group.rank() > PresentationAccessScope::Topic.rank());
        assert!(PresentationAccessScope::Topic.rank() > PresentationAccessScope::Instance.rank());
    }
}
