//! Typed error taxonomy for the mirror engine.
//!
//! The corpus this crate is grown from reaches for `anyhow` at call
//! boundaries but hand-rolls its own `Display`/`Error` impls for structured
//! failures it wants callers to match on (see `graphix_rt::CouldNotResolve`).
//! We follow the same shape rather than pulling in `thiserror`: one flat enum
//! of kinds, a constructor per kind, and a boxed source error for chaining.

use std::fmt;
use std::sync::Arc;

/// Identifies the coordinator that raised an error. Several coordinators may
/// be alive at once, each bound to a distinct transport endpoint; this lets
/// log lines and returned errors be correlated back to the right one.
pub type CoordinatorId = u64;

/// The kind of failure, mirroring the table in the error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidBinding,
    InvalidType,
    OutOfRange,
    ReadOnly,
    TransportBusy,
    ConnectFailed,
    DisconnectFailed,
    ChangeDetectionFailed,
    UnsubscribeFailed,
    SubscribeFailed,
    ToRawFailed,
    FromRawFailed,
    WriteFailed,
    ReadFailed,
    TypeQueryFailed,
    SymbolQueryFailed,
    RpcCallFailed,
    InvalidNamespace,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidBinding => "invalid binding",
            Self::InvalidType => "invalid type",
            Self::OutOfRange => "out of range",
            Self::ReadOnly => "read only",
            Self::TransportBusy => "transport busy",
            Self::ConnectFailed => "connect failed",
            Self::DisconnectFailed => "disconnect failed",
            Self::ChangeDetectionFailed => "change detection failed",
            Self::UnsubscribeFailed => "unsubscribe failed",
            Self::SubscribeFailed => "subscribe failed",
            Self::ToRawFailed => "to-raw conversion failed",
            Self::FromRawFailed => "from-raw conversion failed",
            Self::WriteFailed => "write failed",
            Self::ReadFailed => "read failed",
            Self::TypeQueryFailed => "type query failed",
            Self::SymbolQueryFailed => "symbol query failed",
            Self::RpcCallFailed => "rpc call failed",
            Self::InvalidNamespace => "invalid namespace",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Source = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// An error raised by the engine, always attributed to the coordinator
/// instance that was handling the failing operation.
#[derive(Debug, Clone)]
pub struct ClientError {
    pub kind: ErrorKind,
    pub coordinator: CoordinatorId,
    message: Arc<str>,
    source: Option<Source>,
}

impl ClientError {
    pub fn new(kind: ErrorKind, coordinator: CoordinatorId, message: impl Into<Arc<str>>) -> Self {
        Self { kind, coordinator, message: message.into(), source: None }
    }

    pub fn with_source(
        kind: ErrorKind,
        coordinator: CoordinatorId,
        message: impl Into<Arc<str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, coordinator, message: message.into(), source: Some(Arc::new(source)) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Re-attribute an error raised deep inside code that doesn't know which
    /// coordinator it's running under (e.g. `TypeNode` construction) to the
    /// coordinator that actually orchestrated the call.
    pub fn with_coordinator(mut self, coordinator: CoordinatorId) -> Self {
        self.coordinator = coordinator;
        self
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[coordinator {}] {}: {}", self.coordinator, self.kind, self.message)
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
