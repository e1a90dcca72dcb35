//! §4.4 — the byte-range and validation capability layered under every
//! SymbolNode. A `Binding` is a plain enum over the six bindable shapes
//! (namespace counts as a seventh, struct-shaped variant), the same
//! tagged-sum treatment `TypeNode` gets in `crate::typ`: cheap to match on,
//! no `dyn` dispatch needed since the set of shapes is closed.

pub mod composite;
pub mod simple;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arcstr::ArcStr;
use bytes::Bytes;
use indexmap::IndexMap;
use log::log_enabled;

use crate::error::{ClientError, ErrorKind, Result};
use crate::transport::{
    ChangeCallback as RawChangeCallback, Pointer, RawValue, RpcResult, Transport, WritePackage,
};
use crate::typ::NumBound;

pub use composite::{ArrayBinding, NamespaceBinding, StructBinding};
pub use simple::{BooleanBinding, EnumBinding, NumericBinding, StringBinding};

/// The decoded value flowing through the binding layer — `read() -> decoded
/// value` / `write(v)` in §4.4's contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Num(NumBound),
    Str(String),
    /// Always the qualified `"<TypeName>.<Field>"` form.
    EnumName(String),
    Struct(IndexMap<ArcStr, Value>),
    Array(Vec<Value>),
}

/// Invoked with the freshly re-read, fully decoded value once a subscribed
/// binding's underlying bytes change.
pub type BindingChangeCallback = Box<dyn Fn(Value) + Send + Sync>;

/// A write-once (true→false) validity flag, cheap to share between a
/// `Binding` and the SymbolNode that owns it (§3 "Lifecycles" — destruction
/// invalidates handles, it never resurrects them).
#[derive(Debug, Clone, Default)]
pub struct Valid(Arc<AtomicBool>);

impl Valid {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_valid(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.0.store(false, Ordering::Release);
    }

    fn check(&self, coordinator: u64) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ClientError::new(ErrorKind::InvalidBinding, coordinator, "operation on an invalidated binding"))
        }
    }
}

/// Split a pointer list into transport calls of at most `cap` items each,
/// preserving order (§4.4 "Request splitting"). Returns one `Bytes` per
/// input pointer, concatenated in the order submitted.
pub(crate) async fn read_split(
    transport: &dyn Transport,
    pointers: &[Pointer],
    cap: usize,
    coordinator: u64,
) -> Result<Vec<Bytes>> {
    if pointers.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(pointers.len());
    for chunk in pointers.chunks(cap.max(1)) {
        let packages =
            transport.read_raw_multi(chunk).await.map_err(|e| e.with_coordinator(coordinator))?;
        out.extend(packages.into_iter().map(|p| p.data));
    }
    Ok(out)
}

/// As [`read_split`] but for writes; the caller has already built the full
/// ordered package list.
pub(crate) async fn write_split(
    transport: &dyn Transport,
    packages: Vec<WritePackage>,
    cap: usize,
    coordinator: u64,
) -> Result<()> {
    if packages.is_empty() {
        return Ok(());
    }
    for chunk in packages.chunks(cap.max(1)) {
        transport.write_raw_multi(chunk).await.map_err(|e| e.with_coordinator(coordinator))?;
    }
    Ok(())
}

/// One addressable node in the binding tree. Composite variants hold their
/// children inline (an `IndexMap` for struct/namespace keyed access, a `Vec`
/// for array indices) rather than behind a further layer of indirection,
/// since the whole tree is built once and never restructured in place.
#[derive(Debug)]
pub enum Binding {
    Boolean(BooleanBinding),
    Numeric(NumericBinding),
    String(StringBinding),
    Enum(EnumBinding),
    Struct(StructBinding),
    Array(ArrayBinding),
    Namespace(NamespaceBinding),
}

impl Binding {
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Boolean(b) => b.valid.is_valid(),
            Self::Numeric(b) => b.valid.is_valid(),
            Self::String(b) => b.valid.is_valid(),
            Self::Enum(b) => b.valid.is_valid(),
            Self::Struct(b) => b.valid.is_valid(),
            Self::Array(b) => b.valid.is_valid(),
            Self::Namespace(b) => b.valid.is_valid(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        match self {
            Self::Boolean(b) => b.read_only,
            Self::Numeric(b) => b.read_only,
            Self::String(b) => b.read_only,
            Self::Enum(b) => b.read_only,
            Self::Struct(b) => b.read_only,
            Self::Array(b) => b.read_only,
            Self::Namespace(b) => b.read_only,
        }
    }

    /// Sets this binding's validity flag false, and — for composites — its
    /// descendants' first, per §4.4 "Invalidation cascades top-down ...
    /// children are invalidated first."
    pub fn invalidate(&self) {
        match self {
            Self::Boolean(b) => b.valid.invalidate(),
            Self::Numeric(b) => b.valid.invalidate(),
            Self::String(b) => b.valid.invalidate(),
            Self::Enum(b) => b.valid.invalidate(),
            Self::Struct(b) => {
                for child in b.children.values() {
                    child.invalidate();
                }
                b.valid.invalidate();
            }
            Self::Array(b) => {
                for child in &b.children {
                    child.invalidate();
                }
                b.valid.invalidate();
            }
            Self::Namespace(b) => {
                for child in b.children.values() {
                    child.invalidate();
                }
                b.valid.invalidate();
            }
        }
    }

    /// The binding's own `(indexGroup, indexOffset, size)`. For a namespace
    /// this is the absorbed span computed as children were attached.
    pub fn pointer(&self) -> Pointer {
        match self {
            Self::Boolean(b) => b.pointer,
            Self::Numeric(b) => b.pointer,
            Self::String(b) => b.pointer,
            Self::Enum(b) => b.pointer,
            Self::Struct(b) => b.pointer,
            Self::Array(b) => b.pointer,
            Self::Namespace(b) => b.pointer(),
        }
    }

    fn item_cap(&self) -> usize {
        match self {
            Self::Boolean(b) => b.item_cap,
            Self::Numeric(b) => b.item_cap,
            Self::String(b) => b.item_cap,
            Self::Enum(b) => b.item_cap,
            Self::Struct(b) => b.item_cap,
            Self::Array(b) => b.item_cap,
            Self::Namespace(b) => b.item_cap,
        }
    }

    /// The flattened, declaration-ordered pointer list this binding's own
    /// `read()` will fetch in one (possibly split) transport round.
    pub fn read_packages(&self) -> Vec<Pointer> {
        match self {
            Self::Boolean(b) => vec![b.pointer],
            Self::Numeric(b) => vec![b.pointer],
            Self::String(b) => vec![b.pointer],
            Self::Enum(b) => vec![b.pointer],
            Self::Struct(b) => b.children.values().flat_map(|c| c.read_packages()).collect(),
            Self::Array(b) => b.children.iter().flat_map(|c| c.read_packages()).collect(),
            Self::Namespace(b) => b.children.values().flat_map(|c| c.read_packages()).collect(),
        }
    }

    /// The flattened, declaration-ordered clear packages: one `(pointer,
    /// bytes)` per writable descendant leaf with a default, skipping
    /// read-only leaves (§4.4).
    pub fn clear_packages(&self) -> Vec<(Pointer, Bytes)> {
        match self {
            Self::Boolean(b) => b.clear_packages(),
            Self::Numeric(b) => b.clear_packages(),
            Self::String(b) => b.clear_packages(),
            Self::Enum(b) => b.clear_packages(),
            Self::Struct(b) => {
                if b.read_only {
                    return Vec::new();
                }
                b.children.values().flat_map(|c| c.clear_packages()).collect()
            }
            Self::Array(b) => {
                if b.read_only {
                    return Vec::new();
                }
                b.children.iter().flat_map(|c| c.clear_packages()).collect()
            }
            Self::Namespace(b) => {
                if b.read_only {
                    return Vec::new();
                }
                b.children.values().flat_map(|c| c.clear_packages()).collect()
            }
        }
    }

    /// Consume exactly as many entries of `packages` as this node's own
    /// `read_packages()` produced, decoding them into a `Value`. Only leaf
    /// variants actually call into the transport's (synchronous) decoder;
    /// composites purely partition the slice and recurse, matching §4.4's
    /// "slices the returned data-package vector by child-read-length and
    /// dispatches each slice to the child."
    fn decode(&self, transport: &dyn Transport, packages: &mut std::slice::Iter<'_, Bytes>) -> Result<Value> {
        match self {
            Self::Boolean(b) => b.decode_one(transport, packages.next()),
            Self::Numeric(b) => b.decode_one(transport, packages.next()),
            Self::String(b) => b.decode_one(transport, packages.next()),
            Self::Enum(b) => b.decode_one(transport, packages.next()),
            Self::Struct(b) => {
                let mut out = IndexMap::with_capacity(b.children.len());
                for (key, child) in &b.children {
                    out.insert(key.clone(), child.decode(transport, packages)?);
                }
                Ok(Value::Struct(out))
            }
            Self::Array(b) => {
                let mut out = Vec::with_capacity(b.children.len());
                for child in &b.children {
                    out.push(child.decode(transport, packages)?);
                }
                Ok(Value::Array(out))
            }
            Self::Namespace(b) => {
                let mut out = IndexMap::with_capacity(b.children.len());
                for (key, child) in &b.children {
                    out.insert(key.clone(), child.decode(transport, packages)?);
                }
                Ok(Value::Struct(out))
            }
        }
    }

    pub async fn read(&self, transport: &dyn Transport, coordinator: u64) -> Result<Value> {
        self.valid_handle().check(coordinator)?;
        let pointers = self.read_packages();
        let bytes = read_split(transport, &pointers, self.item_cap(), coordinator).await?;
        self.decode(transport, &mut bytes.iter()).map_err(|e| e.with_coordinator(coordinator))
    }

    pub async fn write(&self, transport: &dyn Transport, value: Value, coordinator: u64) -> Result<Value> {
        self.valid_handle().check(coordinator)?;
        if self.is_read_only() {
            return Err(ClientError::new(ErrorKind::ReadOnly, coordinator, "write on a read-only binding"));
        }
        let mut packages = Vec::new();
        let result = self.encode(transport, value, coordinator, &mut packages)?;
        write_split(transport, packages, self.item_cap(), coordinator).await?;
        Ok(result)
    }

    /// Validate + encode `value` against this node's shape, appending every
    /// produced `(pointer, bytes)` write package to `out` in declaration
    /// order, returning the (type-checked) value that will be written.
    fn encode(
        &self,
        transport: &dyn Transport,
        value: Value,
        coordinator: u64,
        out: &mut Vec<WritePackage>,
    ) -> Result<Value> {
        match self {
            Self::Boolean(b) => b.encode_one(transport, value, coordinator, out),
            Self::Numeric(b) => b.encode_one(transport, value, coordinator, out),
            Self::String(b) => b.encode_one(transport, value, coordinator, out),
            Self::Enum(b) => b.encode_one(transport, value, coordinator, out),
            Self::Struct(b) => b.encode(transport, value, coordinator, out),
            Self::Array(b) => b.encode(transport, value, coordinator, out),
            Self::Namespace(b) => b.encode(transport, value, coordinator, out),
        }
    }

    pub async fn clear(&self, transport: &dyn Transport, coordinator: u64) -> Result<()> {
        self.valid_handle().check(coordinator)?;
        if self.is_read_only() {
            return Err(ClientError::new(ErrorKind::ReadOnly, coordinator, "clear on a read-only binding"));
        }
        let packages: Vec<WritePackage> =
            self.clear_packages().into_iter().map(|(pointer, data)| WritePackage { pointer, data }).collect();
        write_split(transport, packages, self.item_cap(), coordinator).await
    }

    /// Idempotent: installs a transport-side raw notifier on this binding's
    /// own pointer span. On firing, schedules a fresh `read()` of the whole
    /// subtree and invokes `callback` with the result, matching §4.4's
    /// "firing schedules a read() then invokes callback with its result"
    /// rather than trusting whatever payload the raw notifier carries —
    /// the transport has no type context for an arbitrary pointer span.
    pub async fn subscribe(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        sample_interval_ms: u32,
        callback: BindingChangeCallback,
        coordinator: u64,
    ) -> Result<()> {
        self.valid_handle().check(coordinator)?;
        if self.has_subscription() {
            return Ok(());
        }
        let pointer = self.pointer();
        let me = Arc::clone(self);
        let transport_bg = Arc::clone(transport);
        let callback = Arc::new(callback);
        let raw_cb: RawChangeCallback = Box::new(move |_raw: RawValue| {
            let me = Arc::clone(&me);
            let transport_bg = Arc::clone(&transport_bg);
            let callback = Arc::clone(&callback);
            tokio::spawn(async move {
                match me.read(transport_bg.as_ref(), coordinator).await {
                    Ok(value) => callback(value),
                    Err(e) if log_enabled!(log::Level::Debug) => {
                        log::debug!("subscription re-read failed: {e}");
                    }
                    Err(_) => {}
                }
            });
        });
        let handle = transport.subscribe_raw(pointer, sample_interval_ms, raw_cb).await.map_err(|e| {
            ClientError::with_source(ErrorKind::SubscribeFailed, coordinator, "subscribe_raw failed", e)
        })?;
        self.store_subscription(handle);
        Ok(())
    }

    pub async fn unsubscribe(&self, coordinator: u64) -> Result<()> {
        if let Some(handle) = self.take_subscription() {
            handle.unsubscribe().await.map_err(|e| e.with_coordinator(coordinator))?;
        }
        Ok(())
    }

    /// `callMethod` (§4.4): only struct bindings that exposed RPC methods
    /// support it.
    pub async fn call_method(
        &self,
        transport: &dyn Transport,
        symbol_path: &str,
        method_name: &str,
        args: Vec<RawValue>,
        coordinator: u64,
    ) -> Result<RpcResult> {
        self.valid_handle().check(coordinator)?;
        match self {
            Self::Struct(b) if b.rpc_methods.iter().any(|m| m.as_str() == method_name) => transport
                .invoke_rpc_method(symbol_path, method_name, args)
                .await
                .map_err(|e| e.with_coordinator(coordinator)),
            _ => Err(ClientError::new(
                ErrorKind::InvalidBinding,
                coordinator,
                format!("{method_name} is not an invokable method on this binding"),
            )),
        }
    }

    fn valid_handle(&self) -> &Valid {
        match self {
            Self::Boolean(b) => &b.valid,
            Self::Numeric(b) => &b.valid,
            Self::String(b) => &b.valid,
            Self::Enum(b) => &b.valid,
            Self::Struct(b) => &b.valid,
            Self::Array(b) => &b.valid,
            Self::Namespace(b) => &b.valid,
        }
    }

    fn has_subscription(&self) -> bool {
        match self {
            Self::Boolean(b) => b.subscription.lock().is_some(),
            Self::Numeric(b) => b.subscription.lock().is_some(),
            Self::String(b) => b.subscription.lock().is_some(),
            Self::Enum(b) => b.subscription.lock().is_some(),
            Self::Struct(b) => b.subscription.lock().is_some(),
            Self::Array(b) => b.subscription.lock().is_some(),
            Self::Namespace(b) => b.subscription.lock().is_some(),
        }
    }

    fn store_subscription(&self, handle: Box<dyn crate::transport::Subscription>) {
        match self {
            Self::Boolean(b) => *b.subscription.lock() = Some(handle),
            Self::Numeric(b) => *b.subscription.lock() = Some(handle),
            Self::String(b) => *b.subscription.lock() = Some(handle),
            Self::Enum(b) => *b.subscription.lock() = Some(handle),
            Self::Struct(b) => *b.subscription.lock() = Some(handle),
            Self::Array(b) => *b.subscription.lock() = Some(handle),
            Self::Namespace(b) => *b.subscription.lock() = Some(handle),
        }
    }

    fn take_subscription(&self) -> Option<Box<dyn crate::transport::Subscription>> {
        match self {
            Self::Boolean(b) => b.subscription.lock().take(),
            Self::Numeric(b) => b.subscription.lock().take(),
            Self::String(b) => b.subscription.lock().take(),
            Self::Enum(b) => b.subscription.lock().take(),
            Self::Struct(b) => b.subscription.lock().take(),
            Self::Array(b) => b.subscription.lock().take(),
            Self::Namespace(b) => b.subscription.lock().take(),
        }
    }
}
