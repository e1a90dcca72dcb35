//! Client-side mirror of a running industrial controller's type and variable
//! catalogues.
//!
//! At connect time the [`Coordinator`] fetches the controller's raw type and
//! symbol catalogues over a caller-supplied [`Transport`], resolves the type
//! catalogue into a canonical, cycle-free [`typ::registry::TypeRegistry`],
//! then expands the symbol catalogue against it into a tree of typed
//! [`symbol::SymbolNode`] handles — one per program/global-variable
//! namespace, each reachable by key (struct members, namespaces) or index
//! (array elements) down to its leaves. Reading a handle pulls raw bytes over
//! the transport and decodes them; writing validates and encodes; clearing
//! restores the type's per-attribute default; subscribing installs a
//! transport-side change notifier. The controller may swap its loaded
//! program at any moment — the coordinator detects this via a polled
//! source-version probe and rebuilds the whole graph, invalidating every
//! previously handed-out handle first.
//!
//! This crate owns none of the wire protocol itself; see [`transport`] for
//! the contract it consumes.

pub mod attr;
pub mod binding;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod symbol;
pub mod transport;
pub mod typ;

#[cfg(test)]
pub(crate) mod testutil;

pub use binding::{Binding, Value};
pub use coordinator::{ClientSettings, ClientSettingsBuilder, Coordinator, Mirror};
pub use error::{ClientError, ErrorKind, Result};
pub use events::{Event, Listener};
pub use symbol::SymbolNode;
pub use transport::Transport;
pub use typ::registry::TypeRegistry;
pub use typ::TypeNode;
