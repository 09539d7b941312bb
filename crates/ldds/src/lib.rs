// SPDX-License-Identifier: Apache-2.0 OR MIT

//! LDDS - a DDS core runtime in pure Rust.
//!
//! The entity model, QoS matching, history caches, and notification
//! machinery a DDS language binding builds on. Serialization and transport
//! stay behind the [`core::wire`] traits; the runtime treats payloads as
//! opaque bytes plus a 16-byte instance key.
//!
//! # Architecture
//!
//! - [`qos`] - immutable policy sets with merge and consistency rules.
//! - [`core`] - the runtime: generational entity graph, request-vs-offered
//!   matching, per-reader bounded history caches, and the single listener
//!   dispatch thread.
//! - [`dds`] - the application-facing layer: participants, publishers,
//!   subscribers, topics, writers, readers, conditions, and wait-sets.
//!
//! # Example
//!
//! ```
//! use ldds::core::wire::PrefixKeyCodec;
//! use ldds::dds::{DomainParticipant, ReadMask};
//! use ldds::qos::Qos;
//! use std::sync::Arc;
//!
//! let participant = DomainParticipant::new(0)?;
//! let topic = participant.create_topic(
//!     "sensor_data",
//!     "SensorData",
//!     Qos::default(),
//!     Arc::new(PrefixKeyCodec::new(4)),
//! )?;
//! let writer = participant
//!     .create_publisher(Qos::default(), None)?
//!     .create_writer(&topic, Qos::default(), None)?;
//! let reader = participant
//!     .create_subscriber(Qos::default(), None)?
//!     .create_reader(&topic, Qos::default(), None)?;
//!
//! writer.write(b"s01:temperature=21.5")?;
//! let samples = reader.take(ReadMask::any(), usize::MAX)?;
//! assert_eq!(samples.len(), 1);
//! # Ok::<(), ldds::dds::Error>(())
//! ```

pub mod core;
pub mod dds;
pub mod qos;

pub use dds::{
    DataReader, DataWriter, DomainParticipant, Error, Listener, Publisher, ReadMask, Result,
    StatusKind, Subscriber, Topic, WaitSet,
};
pub use qos::{Policy, Qos};

/// Crate version, from the manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
