//! Event model (§4.6): lifecycle events on symbol nodes, bubbling from leaf
//! to root, plus the coarser registry/coordinator-level events.
//!
//! Emission is synchronous and single-threaded by contract (§5), so a plain
//! `RefCell`-free listener vector guarded by a `parking_lot::Mutex` is enough
//! — there is no expectation of emission happening from more than one task
//! at a time for a given node, only that the listener storage itself be
//! `Send + Sync` so nodes can live behind an `Arc` shared across tasks.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use arcstr::ArcStr;
use parking_lot::Mutex;

use crate::error::CoordinatorId;

/// The four node-lifecycle event names, before any `on*` attribute alias is
/// applied. `Changed` fires for subscription push notifications, the other
/// three mirror the operation that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    Set,
    Get,
    Cleared,
    Changed,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Get => "get",
            Self::Cleared => "cleared",
            Self::Changed => "changed",
        }
    }
}

/// A payload carried by a SymbolNode at any point in its value lifecycle.
/// Left as an opaque, cheaply-clonable blob — the engine doesn't need to
/// interpret it, only route it.
pub type Payload = Arc<crate::binding::Value>;

/// An emitted event: `{ timestamp, context, source-symbol, payload }` plus
/// the mutable `propagationStopped` flag a listener can raise to halt the
/// bubble walk.
#[derive(Clone)]
pub struct Event {
    pub name: ArcStr,
    pub timestamp: SystemTime,
    pub context: CoordinatorId,
    pub source_symbol: ArcStr,
    pub payload: Option<Payload>,
    stopped: Arc<std::sync::atomic::AtomicBool>,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("source_symbol", &self.source_symbol)
            .field("propagation_stopped", &self.is_propagation_stopped())
            .finish()
    }
}

impl Event {
    pub fn new(name: ArcStr, context: CoordinatorId, source_symbol: ArcStr, payload: Option<Payload>, timestamp: SystemTime) -> Self {
        Self { name, timestamp, context, source_symbol, payload, stopped: Arc::new(std::sync::atomic::AtomicBool::new(false)) }
    }

    /// Halts the bubble walk: no ancestor above the listener that calls this
    /// will see the event.
    pub fn stop_propagation(&self) {
        self.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped.load(std::sync::atomic::Ordering::SeqCst)
    }
}

pub type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// A chain link in the bubbling tree. Holds its own listeners keyed by event
/// name and an optional weak-free strong reference to its parent; emission
/// runs this node's listeners first, then — unless stopped — re-emits to the
/// parent. The namespace registry's emitter has no parent of its own but is
/// itself re-emitted to by the coordinator, so a single root handler sees
/// every event in the graph (§4.6).
pub struct Emitter {
    parent: Mutex<Option<Arc<Emitter>>>,
    listeners: Mutex<Vec<(ArcStr, Listener)>>,
    once_listeners: Mutex<Vec<(ArcStr, Listener)>>,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("has_parent", &self.parent.lock().is_some())
            .field("listener_count", &self.listeners.lock().len())
            .finish()
    }
}

impl Emitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { parent: Mutex::new(None), listeners: Mutex::new(Vec::new()), once_listeners: Mutex::new(Vec::new()) })
    }

    pub fn with_parent(parent: Arc<Emitter>) -> Arc<Self> {
        let emitter = Self::new();
        emitter.set_parent(parent);
        emitter
    }

    pub fn set_parent(&self, parent: Arc<Emitter>) {
        *self.parent.lock() = Some(parent);
    }

    /// Registers a persistent listener for `name` (`on`).
    pub fn on(&self, name: impl Into<ArcStr>, listener: Listener) {
        self.listeners.lock().push((name.into(), listener));
    }

    /// Registers a listener that is removed after its first invocation
    /// (`once`).
    pub fn once(&self, name: impl Into<ArcStr>, listener: Listener) {
        self.once_listeners.lock().push((name.into(), listener));
    }

    /// Removes every listener registered under `name` (`off`), both
    /// persistent and one-shot.
    pub fn off(&self, name: &str) {
        self.listeners.lock().retain(|(n, _)| n.as_str() != name);
        self.once_listeners.lock().retain(|(n, _)| n.as_str() != name);
    }

    /// Runs this node's own listeners for `event.name`, then — unless a
    /// listener stopped propagation — re-emits to the parent. Listeners run
    /// inline, in registration order, child before parent (§5).
    pub fn emit(self: &Arc<Self>, event: &Event) {
        for (_, listener) in self.listeners.lock().iter().filter(|(n, _)| n.as_str() == event.name.as_str()) {
            listener(event);
        }
        // Drain matching once-listeners before invoking them so a listener
        // that re-registers itself doesn't observe its own removal.
        let matching_once: Vec<Listener> = {
            let mut once = self.once_listeners.lock();
            let mut i = 0;
            let mut out = Vec::new();
            while i < once.len() {
                if once[i].0.as_str() == event.name.as_str() {
                    out.push(once.remove(i).1);
                } else {
                    i += 1;
                }
            }
            out
        };
        for listener in matching_once {
            listener(event);
        }
        if event.is_propagation_stopped() {
            return;
        }
        if let Some(parent) = self.parent.lock().clone() {
            parent.emit(event);
        }
    }
}

/// Coordinator-level events, which aren't node lifecycle events and so aren't
/// bubbled — they're broadcast directly to whoever is listening on the owning
/// coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    SourceChanged,
    ConnectionLost,
    Reconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorEvent {
    Killed,
    Reinitialized,
}
