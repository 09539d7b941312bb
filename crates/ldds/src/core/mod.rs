// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime core: entity graph, matching, history caches, and dispatch.
//!
//! Everything in here is driven through [`crate::core::runtime::DomainRuntime`];
//! the [`crate::dds`] layer wraps it with per-entity handle types.

pub mod cache;
pub mod dispatch;
pub mod entity;
pub mod matcher;
pub mod runtime;
pub mod status;
pub mod wire;
