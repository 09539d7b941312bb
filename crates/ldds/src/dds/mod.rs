// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public DDS API layer.
//!
//! Application-facing entity types ([`DomainParticipant`], [`Publisher`],
//! [`Subscriber`], [`Topic`], [`DataWriter`], [`DataReader`]), conditions
//! and wait-sets, listener tables, and the crate-wide [`Error`] taxonomy.
//! The types here are thin handles over the [`crate::core`] runtime.

pub mod condition;
pub mod listener;
pub mod participant;
pub mod publisher;
pub mod read_condition;
pub mod reader;
pub mod subscriber;
pub mod topic;
pub mod waitset;
pub mod writer;


pub use condition::{Condition, GuardCondition, StatusCondition, StatusMask};
pub use listener::{Listener, StatusEvent, StatusKind};
pub use participant::DomainParticipant;
pub use publisher::Publisher;
pub use read_condition::{
    InstanceState, InstanceStateMask, QueryCondition, QueryPredicate, ReadCondition, ReadMask,
    SampleState, SampleStateMask, ViewState, ViewStateMask,
};
pub use reader::DataReader;
pub use subscriber::Subscriber;
pub use topic::Topic;
pub use waitset::WaitSet;
pub use writer::DataWriter;

/// Errors returned by runtime operations.
///
/// Status events (sample rejection, incompatible QoS, missed deadlines) are
/// counters plus listener dispatch, never call failures; the one exception
/// is a writer exceeding its own resource limits, which fails the `write`
/// with [`Error::OutOfResources`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An argument was structurally invalid (wrong kind, empty name, ...).
    BadParameter(String),
    /// The handle never referred to a live entity.
    InvalidHandle,
    /// The entity existed and has been deleted.
    AlreadyDeleted,
    /// A blocking operation ran out of time.
    Timeout,
    /// The writer's own resource limits are exhausted.
    OutOfResources,
    /// The operation's precondition does not hold (duplicate attach,
    /// unknown instance, topic still in use, conflicting topic type).
    PreconditionNotMet,
    /// The operation is not supported by this runtime.
    Unsupported,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadParameter(detail) => write!(f, "bad parameter: {detail}"),
            Error::InvalidHandle => write!(f, "invalid entity handle"),
            Error::AlreadyDeleted => write!(f, "entity already deleted"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::OutOfResources => write!(f, "resource limits exhausted"),
            Error::PreconditionNotMet => write!(f, "precondition not met"),
            Error::Unsupported => write!(f, "operation not supported"),
        }
    }
}

impl std::error::Error for Error {}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Timeout.to_string(), "operation timed out");
        assert_eq!(
            Error::BadParameter("x".into()).to_string(),
            "bad parameter: x"
        );
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&Error::InvalidHandle);
    }
}
