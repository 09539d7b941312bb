// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Endpoint matching: request-vs-offered QoS compatibility and partition
//! overlap.
//!
//! A writer and a reader on the same topic match when their partitions
//! overlap, neither side's IgnoreLocal policy filters the other out, and the
//! offered QoS satisfies the requested QoS for every request-vs-offered
//! policy. Compatibility failures name the first offending policy so it can
//! be surfaced through the incompatible-QoS statuses.

use crate::qos::{IgnoreLocal, LivelinessKind, PolicyId, Qos};

/// Why two endpoints on the same topic did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFailure {
    /// Partitions do not overlap. Not an error condition; no status is
    /// raised.
    PartitionMismatch,
    /// One side's IgnoreLocal policy excludes the other endpoint.
    IgnoredLocal,
    /// Offered QoS does not satisfy requested QoS on this policy.
    IncompatibleQos(PolicyId),
}

/// Check that `offered` (writer) satisfies `requested` (reader).
///
/// Returns the first offending policy scope, in scope-name order. Policies
/// outside the request-vs-offered set (History, ResourceLimits, Lifespan,
/// TimeBasedFilter, TransportPriority, user metadata) never fail matching.
///
/// # Errors
///
/// The scope of the first policy where the offer falls short.
pub fn is_compatible(offered: &Qos, requested: &Qos) -> Result<(), PolicyId> {
    // Deadline: the writer must update at least as often as the reader
    // expects. Unset means infinite.
    match (offered.deadline(), requested.deadline()) {
        (_, None) => {}
        (Some(off), Some(req)) if off <= req => {}
        _ => {
            log::debug!("[MATCH-QOS] deadline: offered > requested");
            return Err(PolicyId::Deadline);
        }
    }

    if offered.destination_order().rank() < requested.destination_order().rank() {
        log::debug!("[MATCH-QOS] destination order: offered rank below requested");
        return Err(PolicyId::DestinationOrder);
    }

    if offered.durability().rank() < requested.durability().rank() {
        log::debug!(
            "[MATCH-QOS] durability: offered {:?} < requested {:?}",
            offered.durability(),
            requested.durability()
        );
        return Err(PolicyId::Durability);
    }

    if offered.latency_budget() > requested.latency_budget() {
        log::debug!("[MATCH-QOS] latency budget: offered exceeds requested");
        return Err(PolicyId::LatencyBudget);
    }

    {
        let off = offered.liveliness();
        let req = requested.liveliness();
        if liveliness_rank(off.kind) < liveliness_rank(req.kind)
            || off.lease_duration > req.lease_duration
        {
            log::debug!("[MATCH-QOS] liveliness: offered weaker than requested");
            return Err(PolicyId::Liveliness);
        }
    }

    // Ownership kinds must agree exactly.
    if offered.ownership() != requested.ownership() {
        log::debug!(
            "[MATCH-QOS] ownership: offered {:?} != requested {:?}",
            offered.ownership(),
            requested.ownership()
        );
        return Err(PolicyId::Ownership);
    }

    {
        let off = offered.presentation();
        let req = requested.presentation();
        if off.access_scope.rank() < req.access_scope.rank()
            || (req.coherent_access && !off.coherent_access)
            || (req.ordered_access && !off.ordered_access)
        {
            log::debug!("[MATCH-QOS] presentation: offered weaker than requested");
            return Err(PolicyId::Presentation);
        }
    }

    if offered.reliability().rank() < requested.reliability().rank() {
        log::debug!(
            "[MATCH-QOS] reliability: offered {:?} < requested {:?}",
            offered.reliability(),
            requested.reliability()
        );
        return Err(PolicyId::Reliability);
    }

    Ok(())
}

/// Strength order of liveliness kinds: ManualByTopic > ManualByParticipant >
/// Automatic.
const fn liveliness_rank(kind: LivelinessKind) -> u8 {
    match kind {
        LivelinessKind::Automatic => 0,
        LivelinessKind::ManualByParticipant => 1,
        LivelinessKind::ManualByTopic => 2,
    }
}

/// Partition overlap check. An empty partition list stands for the default
/// partition (the empty name).
#[must_use]
pub fn partitions_match(offered: &[String], requested: &[String]) -> bool {
    const DEFAULT: &[&str] = &[""];
    let left: Vec<&str> = if offered.is_empty() {
        DEFAULT.to_vec()
    } else {
        offered.iter().map(String::as_str).collect()
    };
    let right: Vec<&str> = if requested.is_empty() {
        DEFAULT.to_vec()
    } else {
        requested.iter().map(String::as_str).collect()
    };
    left.iter().any(|name| right.contains(name))
}

/// IgnoreLocal filter: whether either side excludes the other endpoint.
///
/// Everything in one runtime shares a process, so `Process` on either side
/// suppresses the match; `Participant` suppresses it when both endpoints
/// hang off the same participant.
#[must_use]
pub fn ignored_local(
    offered: &Qos,
    requested: &Qos,
    same_participant: bool,
) -> bool {
    let ignore = |qos: &Qos| match qos.get(PolicyId::IgnoreLocal) {
        Some(crate::qos::Policy::IgnoreLocal(il)) => *il,
        _ => IgnoreLocal::Nothing,
    };
    for policy in [ignore(offered), ignore(requested)] {
        match policy {
            IgnoreLocal::Nothing => {}
            IgnoreLocal::Participant => {
                if same_participant {
                    return true;
                }
            }
            IgnoreLocal::Process => return true,
        }
    }
    false
}

/// Full match evaluation for a writer/reader pair on a shared topic.
///
/// # Errors
///
/// The reason the pair does not match.
pub fn evaluate(
    offered: &Qos,
    requested: &Qos,
    same_participant: bool,
) -> Result<(), MatchFailure> {
    if ignored_local(offered, requested, same_participant) {
        return Err(MatchFailure::IgnoredLocal);
    }
    if !partitions_match(offered.partition(), requested.partition()) {
        return Err(MatchFailure::PartitionMismatch);
    }
    is_compatible(offered, requested).map_err(MatchFailure::IncompatibleQos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::{
        DestinationOrder, Durability, Liveliness, Ownership, Policy, Presentation,
        PresentationAccessScope, Reliability,
    };
    use std::time::Duration;

    fn qos(policies: Vec<Policy>) -> Qos {
        Qos::from_policies(policies).expect("valid qos")
    }

    #[test]
    fn test_defaults_are_compatible() {
        assert_eq!(is_compatible(&Qos::default(), &Qos::default()), Ok(()));
    }

    #[test]
    fn test_reliable_offer_satisfies_best_effort_request() {
        let offered = qos(vec![Policy::Reliability(Reliability::reliable())]);
        let requested = qos(vec![Policy::Reliability(Reliability::BestEffort)]);
        assert_eq!(is_compatible(&offered, &requested), Ok(()));
    }

    #[test]
    fn test_best_effort_offer_fails_reliable_request() {
        let offered = qos(vec![Policy::Reliability(Reliability::BestEffort)]);
        let requested = qos(vec![Policy::Reliability(Reliability::reliable())]);
        assert_eq!(
            is_compatible(&offered, &requested),
            Err(PolicyId::Reliability)
        );
    }

    #[test]
    fn test_durability_order_respected() {
        let offered = qos(vec![Policy::Durability(Durability::Volatile)]);
        let requested = qos(vec![Policy::Durability(Durability::TransientLocal)]);
        assert_eq!(
            is_compatible(&offered, &requested),
            Err(PolicyId::Durability)
        );

        let offered = qos(vec![Policy::Durability(Durability::Persistent)]);
        assert_eq!(is_compatible(&offered, &requested), Ok(()));
    }

    #[test]
    fn test_deadline_offered_must_be_tighter() {
        let offered = qos(vec![Policy::Deadline {
            period: Duration::from_secs(2),
        }]);
        let requested = qos(vec![Policy::Deadline {
            period: Duration::from_secs(1),
        }]);
        assert_eq!(is_compatible(&offered, &requested), Err(PolicyId::Deadline));
        assert_eq!(is_compatible(&requested, &offered), Ok(()));

        // Unset offered deadline (infinite) fails a finite request.
        assert_eq!(
            is_compatible(&Qos::default(), &requested),
            Err(PolicyId::Deadline)
        );
        // Unset requested deadline accepts anything.
        assert_eq!(is_compatible(&offered, &Qos::default()), Ok(()));
    }

    #[test]
    fn test_ownership_kinds_must_agree() {
        let shared = qos(vec![Policy::Ownership(Ownership::Shared)]);
        let exclusive = qos(vec![Policy::Ownership(Ownership::Exclusive)]);
        assert_eq!(
            is_compatible(&shared, &exclusive),
            Err(PolicyId::Ownership)
        );
        assert_eq!(is_compatible(&exclusive, &exclusive), Ok(()));
    }

    #[test]
    fn test_liveliness_lease_and_kind() {
        let offered = qos(vec![Policy::Liveliness(Liveliness {
            kind: LivelinessKind::Automatic,
            lease_duration: Duration::from_secs(10),
        })]);
        let requested = qos(vec![Policy::Liveliness(Liveliness {
            kind: LivelinessKind::Automatic,
            lease_duration: Duration::from_secs(1),
        })]);
        // Offered lease longer than requested: incompatible.
        assert_eq!(
            is_compatible(&offered, &requested),
            Err(PolicyId::Liveliness)
        );
        assert_eq!(is_compatible(&requested, &offered), Ok(()));
    }

    #[test]
    fn test_presentation_scope_and_flags() {
        let offered = qos(vec![Policy::Presentation(Presentation {
            access_scope: PresentationAccessScope::Instance,
            coherent_access: false,
            ordered_access: false,
        })]);
        let requested = qos(vec![Policy::Presentation(Presentation {
            access_scope: PresentationAccessScope::Topic,
            coherent_access: false,
            ordered_access: false,
        })]);
        assert_eq!(
            is_compatible(&offered, &requested),
            Err(PolicyId::Presentation)
        );
    }

    #[test]
    fn test_destination_order_rank() {
        let offered = qos(vec![Policy::DestinationOrder(
            DestinationOrder::ByReceptionTimestamp,
        )]);
        let requested = qos(vec![Policy::DestinationOrder(
            DestinationOrder::BySourceTimestamp,
        )]);
        assert_eq!(
            is_compatible(&offered, &requested),
            Err(PolicyId::DestinationOrder)
        );
    }

    #[test]
    fn test_first_offending_policy_in_scope_order() {
        // Both durability and reliability offend; Durability sorts first.
        let offered = qos(vec![
            Policy::Durability(Durability::Volatile),
            Policy::Reliability(Reliability::BestEffort),
        ]);
        let requested = qos(vec![
            Policy::Durability(Durability::TransientLocal),
            Policy::Reliability(Reliability::reliable()),
        ]);
        assert_eq!(
            is_compatible(&offered, &requested),
            Err(PolicyId::Durability)
        );
    }

    #[test]
    fn test_partition_overlap() {
        let a = vec!["sensors".to_string(), "lab".to_string()];
        let b = vec!["lab".to_string()];
        let c = vec!["field".to_string()];
        assert!(partitions_match(&a, &b));
        assert!(!partitions_match(&a, &c));
        // Empty list means the default partition; only matches itself or an
        // explicit empty name.
        assert!(partitions_match(&[], &[]));
        assert!(!partitions_match(&[], &c));
        assert!(partitions_match(&[], &[String::new()]));
    }

    #[test]
    fn test_ignore_local() {
        let nothing = Qos::default();
        let participant = qos(vec![Policy::IgnoreLocal(IgnoreLocal::Participant)]);
        let process = qos(vec![Policy::IgnoreLocal(IgnoreLocal::Process)]);

        assert!(!ignored_local(&nothing, &nothing, true));
        assert!(ignored_local(&participant, &nothing, true));
        assert!(!ignored_local(&participant, &nothing, false));
        assert!(ignored_local(&process, &nothing, false));
        assert!(ignored_local(&nothing, &process, false));
    }

    #[test]
    fn test_evaluate_order_partition_before_qos() {
        let offered = qos(vec![
            Policy::Partition {
                names: vec!["a".to_string()],
            },
            Policy::Reliability(Reliability::BestEffort),
        ]);
        let requested = qos(vec![
            Policy::Partition {
                names: vec!["b".to_string()],
            },
            Policy::Reliability(Reliability::reliable()),
        ]);
        // Disjoint partitions: silent no-match, never IncompatibleQos.
        assert_eq!(
            evaluate(&offered, &requested, false),
            Err(MatchFailure::PartitionMismatch)
        );
    }
}
