//! Composite bindings: struct, array, namespace (§4.4).

use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;
use log::debug;
use parking_lot::Mutex;

use crate::binding::{Binding, Valid, Value};
use crate::error::{ClientError, ErrorKind, Result};
use crate::transport::{Pointer, Subscription, Transport, WritePackage};

#[derive(Debug)]
pub struct StructBinding {
    pub(crate) pointer: Pointer,
    pub(crate) read_only: bool,
    pub(crate) item_cap: usize,
    pub(crate) children: IndexMap<ArcStr, Arc<Binding>>,
    pub(crate) rpc_methods: Arc<[ArcStr]>,
    pub(crate) valid: Valid,
    pub(crate) subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl StructBinding {
    pub fn new(
        pointer: Pointer,
        read_only: bool,
        item_cap: usize,
        children: IndexMap<ArcStr, Arc<Binding>>,
        rpc_methods: Arc<[ArcStr]>,
    ) -> Self {
        Self {
            pointer,
            read_only,
            item_cap,
            children,
            rpc_methods,
            valid: Valid::new(),
            subscription: Mutex::new(None),
        }
    }

    /// Only the keys actually present in `value` are dispatched; keys
    /// missing from the caller's map are left untouched. Writing a key not
    /// declared in the binding fails (§4.4).
    pub(crate) fn encode(
        &self,
        transport: &dyn Transport,
        value: Value,
        coordinator: u64,
        out: &mut Vec<WritePackage>,
    ) -> Result<Value> {
        let Value::Struct(map) = value else {
            return Err(ClientError::new(ErrorKind::InvalidType, coordinator, "expected a struct-shaped value"));
        };
        let mut result = IndexMap::with_capacity(map.len());
        for (key, v) in map {
            let Some(child) = self.children.get(key.as_str()) else {
                return Err(ClientError::new(
                    ErrorKind::OutOfRange,
                    coordinator,
                    format!("{key} is not a declared member of this struct"),
                ));
            };
            if child.is_read_only() {
                return Err(ClientError::new(
                    ErrorKind::ReadOnly,
                    coordinator,
                    format!("{key} is read-only"),
                ));
            }
            result.insert(key, child.encode(transport, v, coordinator, out)?);
        }
        Ok(Value::Struct(result))
    }
}

#[derive(Debug)]
pub struct ArrayBinding {
    pub(crate) pointer: Pointer,
    pub(crate) read_only: bool,
    pub(crate) item_cap: usize,
    pub(crate) start_index: i32,
    pub(crate) children: Vec<Arc<Binding>>,
    pub(crate) valid: Valid,
    pub(crate) subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl ArrayBinding {
    pub fn new(pointer: Pointer, read_only: bool, item_cap: usize, start_index: i32, children: Vec<Arc<Binding>>) -> Self {
        Self { pointer, read_only, item_cap, start_index, children, valid: Valid::new(), subscription: Mutex::new(None) }
    }

    /// Caller-index 0 maps to child key `startIndex`; a partial write
    /// (`len <= children.len()`) only touches the leading elements.
    pub(crate) fn encode(
        &self,
        transport: &dyn Transport,
        value: Value,
        coordinator: u64,
        out: &mut Vec<WritePackage>,
    ) -> Result<Value> {
        let Value::Array(vals) = value else {
            return Err(ClientError::new(ErrorKind::InvalidType, coordinator, "expected an array-shaped value"));
        };
        if vals.len() > self.children.len() {
            return Err(ClientError::new(
                ErrorKind::OutOfRange,
                coordinator,
                format!("{} elements exceeds declared length {}", vals.len(), self.children.len()),
            ));
        }
        let mut result = Vec::with_capacity(vals.len());
        for (child, v) in self.children.iter().zip(vals) {
            if child.is_read_only() {
                return Err(ClientError::new(ErrorKind::ReadOnly, coordinator, "array element is read-only"));
            }
            result.push(child.encode(transport, v, coordinator, out)?);
        }
        Ok(Value::Array(result))
    }
}

/// A struct binding whose own `(indexGroup, indexOffset, size)` is computed
/// by absorbing its children's ranges rather than supplied up front (§4.4).
#[derive(Debug)]
pub struct NamespaceBinding {
    pub(crate) read_only: bool,
    pub(crate) item_cap: usize,
    pub(crate) children: IndexMap<ArcStr, Arc<Binding>>,
    span: Option<(u32, u32, u32)>,
    child_size_sum: u32,
    overread_logged: bool,
    pub(crate) valid: Valid,
    pub(crate) subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl NamespaceBinding {
    pub fn new(item_cap: usize) -> Self {
        Self {
            read_only: false,
            item_cap,
            children: IndexMap::new(),
            span: None,
            child_size_sum: 0,
            overread_logged: false,
            valid: Valid::new(),
            subscription: Mutex::new(None),
        }
    }

    /// Absorb one more child into the namespace's span. The first child
    /// establishes the index group and a `[offset, offset+size)` interval;
    /// every subsequent child must share that group, or this is a fatal
    /// configuration error (§4.4, §7 `InvalidNamespace`).
    ///
    /// When the controller's variables aren't laid out contiguously, the
    /// absorbed `[start, end)` interval can cover bytes belonging to no
    /// declared child (§9 "Non-contiguous namespace growth"). This is
    /// accepted by design — no gap tracking or deduplication is attempted —
    /// but the first time it happens for a given namespace, a `debug!` line
    /// notes the slack to aid field diagnosis.
    pub fn attach(&mut self, key: ArcStr, child: Arc<Binding>, coordinator: u64) -> Result<()> {
        let p = child.pointer();
        self.span = Some(match self.span {
            None => (p.index_group, p.index_offset, p.end()),
            Some((group, start, end)) => {
                if group != p.index_group {
                    return Err(ClientError::new(
                        ErrorKind::InvalidNamespace,
                        coordinator,
                        format!("{key} spans index group {} but this namespace is anchored to {group}", p.index_group),
                    ));
                }
                (group, start.min(p.index_offset), end.max(p.end()))
            }
        });
        self.child_size_sum += p.size;
        self.children.insert(key, child);
        if !self.overread_logged {
            if let Some((_, start, end)) = self.span {
                if (end - start) > self.child_size_sum {
                    self.overread_logged = true;
                    debug!(
                        "namespace span [{start}, {end}) covers {} bytes but only {} bytes belong to declared children; bulk reads will over-read the gap",
                        end - start,
                        self.child_size_sum,
                    );
                }
            }
        }
        Ok(())
    }

    pub fn pointer(&self) -> Pointer {
        match self.span {
            Some((group, start, end)) => Pointer::new(group, start, end - start),
            None => Pointer::new(0, 0, 0),
        }
    }

    pub(crate) fn encode(
        &self,
        transport: &dyn Transport,
        value: Value,
        coordinator: u64,
        out: &mut Vec<WritePackage>,
    ) -> Result<Value> {
        let Value::Struct(map) = value else {
            return Err(ClientError::new(ErrorKind::InvalidType, coordinator, "expected a struct-shaped value"));
        };
        let mut result = IndexMap::with_capacity(map.len());
        for (key, v) in map {
            let Some(child) = self.children.get(key.as_str()) else {
                return Err(ClientError::new(
                    ErrorKind::OutOfRange,
                    coordinator,
                    format!("{key} is not a declared member of this namespace"),
                ));
            };
            if child.is_read_only() {
                return Err(ClientError::new(ErrorKind::ReadOnly, coordinator, format!("{key} is read-only")));
            }
            result.insert(key, child.encode(transport, v, coordinator, out)?);
        }
        Ok(Value::Struct(result))
    }
}
