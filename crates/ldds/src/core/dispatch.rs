// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Listener dispatch thread.
//!
//! Status events are posted to a channel and delivered by one background
//! thread, so application callbacks never run on the caller's thread and a
//! slow callback cannot stall sample delivery. Callback resolution walks up
//! the entity ownership chain: an unset slot falls back to the parent's
//! listener, ending at the participant.
//!
//! A panicking callback is caught and logged; the dispatch thread keeps
//! serving.

use crate::core::entity::{EntityGraph, EntityHandle};
use crate::dds::listener::StatusEvent;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

enum DispatchJob {
    Status {
        entity: EntityHandle,
        event: StatusEvent,
    },
    Flush(Sender<()>),
    Shutdown,
}

/// Handle to the dispatch thread.
pub struct Dispatcher {
    tx: Sender<DispatchJob>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the dispatch thread over `graph`.
    #[must_use]
    pub fn spawn(graph: Arc<EntityGraph>) -> Self {
        let (tx, rx) = unbounded();
        let thread = std::thread::Builder::new()
            .name("ldds-dispatch".to_string())
            .spawn(move || run(&graph, &rx))
            .unwrap_or_else(|e| panic!("failed to spawn dispatch thread: {e}"));
        Self {
            tx,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Queue a status event for listener delivery.
    pub fn post(&self, entity: EntityHandle, event: StatusEvent) {
        // Send fails only after shutdown; events are dropped then.
        let _ = self.tx.send(DispatchJob::Status { entity, event });
    }

    /// Block until every event queued before this call has been delivered,
    /// or `timeout` elapses. Returns whether the queue drained in time.
    #[must_use]
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(DispatchJob::Flush(ack_tx)).is_err() {
            return true;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    fn shutdown(&self) {
        let _ = self.tx.send(DispatchJob::Shutdown);
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(graph: &EntityGraph, rx: &Receiver<DispatchJob>) {
    while let Ok(job) = rx.recv() {
        match job {
            DispatchJob::Status { entity, event } => deliver(graph, entity, &event),
            DispatchJob::Flush(ack) => {
                let _ = ack.send(());
            }
            DispatchJob::Shutdown => break,
        }
    }
    log::debug!("[DISPATCH] thread exiting");
}

/// Resolve the listener callback for `event` by walking up the ownership
/// chain from `entity`, and invoke it.
fn deliver(graph: &EntityGraph, entity: EntityHandle, event: &StatusEvent) {
    let kind = event.kind();
    let mut cursor = entity;
    while let Some(node) = graph.resolve(cursor) {
        let listener = node.listener.load_full();
        if let Some(listener) = listener {
            if let Some(callback) = listener.get(kind) {
                let callback = Arc::clone(callback);
                let result = catch_unwind(AssertUnwindSafe(|| callback(entity, event)));
                if result.is_err() {
                    log::warn!("[DISPATCH] listener for {kind:?} panicked on {entity:?}");
                }
                return;
            }
        }
        cursor = node.parent;
    }
    log::trace!("[DISPATCH] no listener for {kind:?} on {entity:?}");
}
