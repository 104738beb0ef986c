//! Fan-out of session events to registered observers.
//!
//! The worker pushes into an unbounded channel and never waits. A dedicated
//! task drains that channel and forwards each event to every observer's
//! bounded channel with `try_send`. An observer whose channel is closed or
//! full is dropped from the registry; the others are unaffected.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{EventSink, SessionEvent};

/// A subscription handle: events arrive on `receiver` in emission order.
pub struct Observer {
    pub id: u64,
    pub receiver: mpsc::Receiver<SessionEvent>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(u64, mpsc::Sender<SessionEvent>)>,
}

/// Cloneable handle to the broadcaster task.
#[derive(Clone)]
pub struct Broadcaster {
    tx: mpsc::UnboundedSender<SessionEvent>,
    registry: Arc<Mutex<Registry>>,
    buffer: usize,
}

impl Broadcaster {
    /// Spawn the drain task. It exits once every handle has been dropped.
    pub fn spawn(buffer: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        let registry = Arc::new(Mutex::new(Registry::default()));

        let task_registry = Arc::clone(&registry);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                deliver(&task_registry, event);
            }
            debug!("event channel closed, broadcaster exiting");
        });

        (
            Self {
                tx,
                registry,
                buffer: buffer.max(1),
            },
            handle,
        )
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> Observer {
        let (tx, receiver) = mpsc::channel(self.buffer);
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.observers.push((id, tx));
        debug!(observer = id, total = registry.observers.len(), "observer subscribed");
        Observer { id, receiver }
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.observers.len();
        registry.observers.retain(|(oid, _)| *oid != id);
        before != registry.observers.len()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.registry).observers.len()
    }
}

impl EventSink for Broadcaster {
    fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            warn!("broadcaster task is gone, event dropped");
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn deliver(registry: &Mutex<Registry>, event: SessionEvent) {
    let mut registry = lock(registry);
    let kind = event.kind();
    registry.observers.retain(|(id, tx)| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(observer = id, kind, "observer lagging, removing");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(observer = id, kind, "observer disconnected, removing");
            false
        }
    });
}
