// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Quality of Service model.
//!
//! A [`Qos`] is an immutable, ordered set of [`Policy`] values with at most
//! one policy per scope. Policies are kept sorted by scope name so iteration,
//! equality, and serialization are deterministic. A `Qos` can be derived from
//! a base `Qos` with selective overrides (override wins per scope).
//!
//! # Examples
//!
//! ```
//! use ldds::qos::{Policy, Qos, Reliability, History};
//!
//! let qos = Qos::from_policies([
//!     Policy::Reliability(Reliability::reliable()),
//!     Policy::History(History::KeepLast { depth: 1 }),
//! ])
//! .unwrap();
//!
//! assert!(matches!(qos.reliability(), Reliability::Reliable { .. }));
//! ```

mod policy;

pub use policy::{
    DestinationOrder, Durability, DurabilityService, History, IgnoreLocal, Liveliness,
    LivelinessKind, Ownership, Policy, PolicyId, Presentation, PresentationAccessScope,
    ReaderDataLifecycle, Reliability, ResourceLimits, WriterDataLifecycle,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable set of QoS policies, one per scope, sorted by scope name.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Qos {
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    policies: Vec<Policy>,
}

impl<'de> Deserialize<'de> for Qos {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let policies: Vec<Policy> =
            serde_yaml::with::singleton_map_recursive::deserialize(deserializer)?;
        Qos::from_policies(policies).map_err(serde::de::Error::custom)
    }
}

impl Qos {
    /// Build a `Qos` from policies, sorting by scope.
    ///
    /// # Errors
    ///
    /// Returns a message naming the scope if two policies share one, or if a
    /// policy value is internally invalid (e.g. `KeepLast` depth of 0).
    pub fn from_policies<I>(policies: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = Policy>,
    {
        let mut policies: Vec<Policy> = policies.into_iter().collect();
        policies.sort_by(|a, b| a.id().cmp(&b.id()));

        for window in policies.windows(2) {
            if window[0].id() == window[1].id() {
                return Err(format!(
                    "multiple QoS policies of scope {}",
                    window[0].id().name()
                ));
            }
        }

        let qos = Self { policies };
        qos.validate()?;
        Ok(qos)
    }

    /// Derive a new `Qos` from `base`, with `overrides` winning per scope.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Qos::from_policies`] applied to the overrides.
    pub fn derive<I>(base: &Qos, overrides: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = Policy>,
    {
        let mut merged: Vec<Policy> = overrides.into_iter().collect();
        {
            // Duplicate-scope overrides must fail before the merge hides them.
            let mut ids: Vec<PolicyId> = merged.iter().map(Policy::id).collect();
            ids.sort();
            for w in ids.windows(2) {
                if w[0] == w[1] {
                    return Err(format!("multiple QoS policies of scope {}", w[0].name()));
                }
            }
        }
        for policy in &base.policies {
            if !merged.iter().any(|p| p.id() == policy.id()) {
                merged.push(policy.clone());
            }
        }
        Self::from_policies(merged)
    }

    /// Internal value checks beyond per-scope uniqueness.
    fn validate(&self) -> Result<(), String> {
        if let Some(History::KeepLast { depth: 0 }) = self.get_history_raw() {
            return Err("History::KeepLast requires depth > 0".to_string());
        }
        let rl = self.resource_limits();
        if let (Some(total), Some(per), Some(inst)) = (
            rl.max_samples,
            rl.max_samples_per_instance,
            rl.max_instances,
        ) {
            if total < per.saturating_mul(inst) {
                return Err(format!(
                    "max_samples ({total}) must be >= max_samples_per_instance ({per}) * max_instances ({inst})"
                ));
            }
        }
        Ok(())
    }

    /// Look up the explicit policy for a scope, if present.
    #[must_use]
    pub fn get(&self, id: PolicyId) -> Option<&Policy> {
        self.policies
            .binary_search_by(|p| p.id().cmp(&id))
            .ok()
            .map(|i| &self.policies[i])
    }

    /// Iterate policies in scope-name order.
    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.iter()
    }

    /// Number of explicit policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no explicit policies are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    fn get_history_raw(&self) -> Option<History> {
        match self.get(PolicyId::History) {
            Some(Policy::History(h)) => Some(*h),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Effective-value accessors (DDS defaults when the scope is unset)
    // ------------------------------------------------------------------

    /// Effective reliability (default BestEffort).
    #[must_use]
    pub fn reliability(&self) -> Reliability {
        match self.get(PolicyId::Reliability) {
            Some(Policy::Reliability(r)) => *r,
            _ => Reliability::default(),
        }
    }

    /// Effective durability (default Volatile).
    #[must_use]
    pub fn durability(&self) -> Durability {
        match self.get(PolicyId::Durability) {
            Some(Policy::Durability(d)) => *d,
            _ => Durability::default(),
        }
    }

    /// Effective history (default KeepLast(1)).
    #[must_use]
    pub fn history(&self) -> History {
        self.get_history_raw().unwrap_or_default()
    }

    /// Effective resource limits (default unlimited).
    #[must_use]
    pub fn resource_limits(&self) -> ResourceLimits {
        match self.get(PolicyId::ResourceLimits) {
            Some(Policy::ResourceLimits(rl)) => *rl,
            _ => ResourceLimits::default(),
        }
    }

    /// Effective deadline period (default infinite -> `None`).
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        match self.get(PolicyId::Deadline) {
            Some(Policy::Deadline { period }) => Some(*period),
            _ => None,
        }
    }

    /// Effective latency budget (default zero).
    #[must_use]
    pub fn latency_budget(&self) -> Duration {
        match self.get(PolicyId::LatencyBudget) {
            Some(Policy::LatencyBudget { duration }) => *duration,
            _ => Duration::ZERO,
        }
    }

    /// Effective ownership (default Shared).
    #[must_use]
    pub fn ownership(&self) -> Ownership {
        match self.get(PolicyId::Ownership) {
            Some(Policy::Ownership(o)) => *o,
            _ => Ownership::default(),
        }
    }

    /// Effective ownership strength (default 0).
    #[must_use]
    pub fn ownership_strength(&self) -> i32 {
        match self.get(PolicyId::OwnershipStrength) {
            Some(Policy::OwnershipStrength { strength }) => *strength,
            _ => 0,
        }
    }

    /// Effective liveliness (default Automatic, infinite lease).
    #[must_use]
    pub fn liveliness(&self) -> Liveliness {
        match self.get(PolicyId::Liveliness) {
            Some(Policy::Liveliness(l)) => *l,
            _ => Liveliness::default(),
        }
    }

    /// Effective partition names (default: empty = default partition).
    #[must_use]
    pub fn partition(&self) -> &[String] {
        match self.get(PolicyId::Partition) {
            Some(Policy::Partition { names }) => names,
            _ => &[],
        }
    }

    /// Effective presentation (default Instance scope, no coherency).
    #[must_use]
    pub fn presentation(&self) -> Presentation {
        match self.get(PolicyId::Presentation) {
            Some(Policy::Presentation(p)) => *p,
            _ => Presentation::default(),
        }
    }

    /// Effective destination order (default ByReceptionTimestamp).
    #[must_use]
    pub fn destination_order(&self) -> DestinationOrder {
        match self.get(PolicyId::DestinationOrder) {
            Some(Policy::DestinationOrder(d)) => *d,
            _ => DestinationOrder::default(),
        }
    }

    /// Effective writer data lifecycle (default autodispose=true).
    #[must_use]
    pub fn writer_data_lifecycle(&self) -> WriterDataLifecycle {
        match self.get(PolicyId::WriterDataLifecycle) {
            Some(Policy::WriterDataLifecycle(w)) => *w,
            _ => WriterDataLifecycle::default(),
        }
    }

    /// Effective reader data lifecycle (default: never purge).
    #[must_use]
    pub fn reader_data_lifecycle(&self) -> ReaderDataLifecycle {
        match self.get(PolicyId::ReaderDataLifecycle) {
            Some(Policy::ReaderDataLifecycle(r)) => *r,
            _ => ReaderDataLifecycle::default(),
        }
    }
}

impl<'a> IntoIterator for &'a Qos {
    type Item = &'a Policy;
    type IntoIter = std::slice::Iter<'a, Policy>;

    fn into_iter(self) -> Self::IntoIter {
        self.policies.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reliable_keep_last(depth: u32) -> Qos {
        Qos::from_policies([
            Policy::Reliability(Reliability::reliable()),
            Policy::History(History::KeepLast { depth }),
        ])
        .expect("valid qos")
    }

    #[test]
    fn test_qos_sorted_by_scope_name() {
        let qos = Qos::from_policies([
            Policy::Userdata { data: vec![1] },
            Policy::Deadline {
                period: Duration::from_secs(1),
            },
            Policy::Reliability(Reliability::BestEffort),
        ])
        .expect("valid qos");

        let ids: Vec<&str> = qos.iter().map(|p| p.id().name()).collect();
        assert_eq!(ids, ["Deadline", "Reliability", "Userdata"]);
    }

    #[test]
    fn test_qos_duplicate_scope_rejected() {
        let result = Qos::from_policies([
            Policy::Reliability(Reliability::BestEffort),
            Policy::Reliability(Reliability::reliable()),
        ]);
        let err = result.expect_err("duplicate scope must fail");
        assert!(err.contains("Reliability"));
    }

    #[test]
    fn test_qos_keep_last_zero_rejected() {
        let result = Qos::from_policies([Policy::History(History::KeepLast { depth: 0 })]);
        assert!(result.is_err());
    }

    #[test]
    fn test_qos_resource_limit_consistency() {
        let result = Qos::from_policies([Policy::ResourceLimits(ResourceLimits {
            max_samples: Some(10),
            max_instances: Some(5),
            max_samples_per_instance: Some(10),
        })]);
        assert!(result.is_err());
    }

    #[test]
    fn test_qos_derive_override_wins() {
        let base = reliable_keep_last(10);
        let derived = Qos::derive(&base, [Policy::History(History::KeepLast { depth: 3 })])
            .expect("valid derive");

        assert_eq!(derived.history(), History::KeepLast { depth: 3 });
        // Base policy for untouched scope survives.
        assert!(matches!(derived.reliability(), Reliability::Reliable { .. }));
    }

    #[test]
    fn test_qos_derive_duplicate_override_rejected() {
        let base = Qos::default();
        let result = Qos::derive(
            &base,
            [
                Policy::Ownership(Ownership::Shared),
                Policy::Ownership(Ownership::Exclusive),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_qos_defaults_when_unset() {
        let qos = Qos::default();
        assert_eq!(qos.reliability(), Reliability::BestEffort);
        assert_eq!(qos.durability(), Durability::Volatile);
        assert_eq!(qos.history(), History::KeepLast { depth: 1 });
        assert_eq!(qos.ownership(), Ownership::Shared);
        assert!(qos.partition().is_empty());
        assert_eq!(qos.deadline(), None);
    }

    #[test]
    fn test_qos_get_by_scope() {
        let qos = reliable_keep_last(5);
        assert!(qos.get(PolicyId::Reliability).is_some());
        assert!(qos.get(PolicyId::History).is_some());
        assert!(qos.get(PolicyId::Partition).is_none());
    }

    #[test]
    fn test_qos_yaml_round_trip() {
        let qos = Qos::from_policies([
            Policy::Reliability(Reliability::reliable()),
            Policy::History(History::KeepLast { depth: 7 }),
            Policy::Partition {
                names: vec!["sensors".to_string(), "actuators".to_string()],
            },
            Policy::Ownership(Ownership::Exclusive),
            Policy::OwnershipStrength { strength: 3 },
            Policy::Deadline {
                period: Duration::from_millis(250),
            },
            Policy::ResourceLimits(ResourceLimits {
                max_samples: Some(100),
                max_instances: Some(10),
                max_samples_per_instance: Some(10),
            }),
            Policy::Userdata {
                data: b"hello".to_vec(),
            },
        ])
        .expect("valid qos");

        let yaml = serde_yaml::to_string(&qos).expect("serialize");
        let back: Qos = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(qos, back);
    }

    #[test]
    fn test_qos_yaml_duplicate_scope_rejected_on_load() {
        let yaml = "- Ownership: Shared\n- Ownership: Exclusive\n";
        let result: Result<Qos, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_qos_equality_is_order_independent() {
        let a = Qos::from_policies([
            Policy::Ownership(Ownership::Exclusive),
            Policy::Reliability(Reliability::BestEffort),
        ])
        .expect("valid");
        let b = Qos::from_policies([
            Policy::Reliability(Reliability::BestEffort),
            Policy::Ownership(Ownership::Exclusive),
        ])
        .expect("valid");
        assert_eq!(a, b);
    }
}
