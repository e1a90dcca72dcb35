//! The symbol graph builder (§4.5) and the observable `SymbolNode` surface.
//!
//! A `SymbolNode` pairs a [`Binding`] (byte-range + codec capability) with an
//! [`Emitter`] (bubbling event chain) and, for composites, a keyed collection
//! of child nodes — the same tagged-sum shape as `TypeNode` and `Binding`
//! themselves, one variant per wire shape.

use std::sync::Arc;
use std::time::SystemTime;

use arcstr::ArcStr;
use futures::future::try_join_all;
use indexmap::IndexMap;
use log::debug;

use crate::binding::{
    ArrayBinding, Binding, BindingChangeCallback, BooleanBinding, EnumBinding, NamespaceBinding,
    NumericBinding, StringBinding, StructBinding, Value,
};
use crate::error::{CoordinatorId, Result};
use crate::events::{Emitter, Event, EventName, Listener};
use crate::transport::{Pointer, RawSymbolDescriptor, RpcResult, Transport};
use crate::typ::registry::TypeRegistry;
use crate::typ::TypeNode;

/// Reserved prefix for engine-surface names, kept distinct from any
/// controller-legal identifier so `child`/`each` lookups never collide with
/// it (§4.5 "Method and child access MUST NOT collide...").
pub const RESERVED_PREFIX: &str = "$";

pub struct SymbolBase {
    pub full_path: ArcStr,
    pub emitter: Arc<Emitter>,
    on_set: ArcStr,
    on_get: ArcStr,
    on_clear: ArcStr,
    on_change: ArcStr,
}

impl SymbolBase {
    /// `overrides` carries the `onSet`/`onGet`/`onClear`/`onChange` attribute
    /// aliases (§4.3) already resolved onto the type's `Base`; `None` for the
    /// namespace root, which has no backing `TypeNode` of its own.
    fn new(full_path: ArcStr, parent: Option<Arc<Emitter>>, overrides: Option<&crate::typ::Base>) -> Self {
        let emitter = match parent {
            Some(p) => Emitter::with_parent(p),
            None => Emitter::new(),
        };
        let (on_set, on_get, on_clear, on_change) = match overrides {
            Some(base) => (base.on_set.clone(), base.on_get.clone(), base.on_clear.clone(), base.on_change.clone()),
            None => (ArcStr::from("set"), ArcStr::from("get"), ArcStr::from("cleared"), ArcStr::from("changed")),
        };
        Self { full_path, emitter, on_set, on_get, on_clear, on_change }
    }
}

pub struct BooleanSym {
    pub base: SymbolBase,
    pub binding: Arc<Binding>,
}

pub struct NumericSym {
    pub base: SymbolBase,
    pub binding: Arc<Binding>,
}

pub struct StringSym {
    pub base: SymbolBase,
    pub binding: Arc<Binding>,
}

pub struct EnumSym {
    pub base: SymbolBase,
    pub binding: Arc<Binding>,
}

pub struct StructSym {
    pub base: SymbolBase,
    pub binding: Arc<Binding>,
    pub children: IndexMap<ArcStr, Arc<SymbolNode>>,
    pub rpc_methods: Arc<[ArcStr]>,
}

pub struct ArraySym {
    pub base: SymbolBase,
    pub binding: Arc<Binding>,
    pub start_index: i32,
    pub children: Vec<Arc<SymbolNode>>,
}

pub struct NamespaceSym {
    pub base: SymbolBase,
    pub binding: Arc<Binding>,
    pub children: IndexMap<ArcStr, Arc<SymbolNode>>,
}

/// The engine's user-facing handle type, one variant per wire shape a
/// top-level or nested symbol can take.
pub enum SymbolNode {
    Boolean(BooleanSym),
    Numeric(NumericSym),
    String(StringSym),
    Enum(EnumSym),
    Struct(StructSym),
    Array(ArraySym),
    Namespace(NamespaceSym),
}

impl SymbolNode {
    fn base(&self) -> &SymbolBase {
        match self {
            Self::Boolean(s) => &s.base,
            Self::Numeric(s) => &s.base,
            Self::String(s) => &s.base,
            Self::Enum(s) => &s.base,
            Self::Struct(s) => &s.base,
            Self::Array(s) => &s.base,
            Self::Namespace(s) => &s.base,
        }
    }

    fn binding(&self) -> &Arc<Binding> {
        match self {
            Self::Boolean(s) => &s.binding,
            Self::Numeric(s) => &s.binding,
            Self::String(s) => &s.binding,
            Self::Enum(s) => &s.binding,
            Self::Struct(s) => &s.binding,
            Self::Array(s) => &s.binding,
            Self::Namespace(s) => &s.binding,
        }
    }

    pub fn full_path(&self) -> &str {
        &self.base().full_path
    }

    pub fn is_valid(&self) -> bool {
        self.binding().is_valid()
    }

    fn event_name(&self, kind: EventName) -> ArcStr {
        let base = self.base();
        match kind {
            EventName::Set => base.on_set.clone(),
            EventName::Get => base.on_get.clone(),
            EventName::Cleared => base.on_clear.clone(),
            EventName::Changed => base.on_change.clone(),
        }
    }

    fn emit(&self, name: ArcStr, coordinator: CoordinatorId, payload: Option<Value>) {
        let event = Event::new(
            name,
            coordinator,
            self.base().full_path.clone(),
            payload.map(Arc::new),
            now(),
        );
        self.base().emitter.emit(&event);
    }

    pub async fn get(&self, transport: &dyn Transport, coordinator: CoordinatorId) -> Result<Value> {
        let value = self.binding().read(transport, coordinator).await?;
        self.emit(self.event_name(EventName::Get), coordinator, Some(value.clone()));
        Ok(value)
    }

    pub async fn set(
        &self,
        transport: &dyn Transport,
        value: Value,
        coordinator: CoordinatorId,
    ) -> Result<Value> {
        let applied = self.binding().write(transport, value, coordinator).await?;
        self.emit(self.event_name(EventName::Set), coordinator, Some(applied.clone()));
        Ok(applied)
    }

    pub async fn clear(&self, transport: &dyn Transport, coordinator: CoordinatorId) -> Result<()> {
        self.binding().clear(transport, coordinator).await?;
        self.emit(self.event_name(EventName::Cleared), coordinator, None);
        Ok(())
    }

    pub async fn subscribe(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        sample_interval_ms: u32,
        coordinator: CoordinatorId,
    ) -> Result<()> {
        let me = Arc::clone(self);
        let callback: BindingChangeCallback = Box::new(move |value| {
            me.emit(me.event_name(EventName::Changed), coordinator, Some(value));
        });
        self.binding().subscribe(transport, sample_interval_ms, callback, coordinator).await
    }

    pub async fn unsubscribe(&self, coordinator: CoordinatorId) -> Result<()> {
        self.binding().unsubscribe(coordinator).await
    }

    pub fn on(&self, name: impl Into<ArcStr>, listener: Listener) {
        self.base().emitter.on(name, listener);
    }

    pub fn once(&self, name: impl Into<ArcStr>, listener: Listener) {
        self.base().emitter.once(name, listener);
    }

    pub fn off(&self, name: &str) {
        self.base().emitter.off(name);
    }

    /// Registers a listener that fires once this node's own binding becomes
    /// invalid. Since invalidation itself doesn't bubble as an `Event` (it's
    /// a structural teardown, not a value lifecycle event, §4.4), this polls
    /// the binding's validity flag at call time rather than subscribing to a
    /// future transition — callers are expected to call it from inside the
    /// coordinator's `kill` sequencing, after the cascade has already run.
    pub fn on_invalidated(&self, listener: impl FnOnce()) {
        if !self.is_valid() {
            listener();
        }
    }

    /// Looks up an immediate struct/namespace member or array element by
    /// key. Returns `None` for leaf nodes and for unknown keys.
    pub fn child(&self, key: &str) -> Option<Arc<SymbolNode>> {
        match self {
            Self::Struct(s) => s.children.get(key).cloned(),
            Self::Namespace(s) => s.children.get(key).cloned(),
            Self::Array(s) => {
                let i: i64 = key.parse().ok()?;
                self.index(i)
            }
            _ => None,
        }
    }

    /// Array element access by caller-index (offset by `startIndex`, §4.4).
    pub fn index(&self, caller_index: i64) -> Option<Arc<SymbolNode>> {
        let Self::Array(s) = self else { return None };
        let zero_based = caller_index - s.start_index as i64;
        if zero_based < 0 {
            return None;
        }
        s.children.get(zero_based as usize).cloned()
    }

    /// Iterates immediate children in declaration order (struct/namespace
    /// keyed, array positional).
    pub fn each(&self, mut f: impl FnMut(&str, &Arc<SymbolNode>)) {
        match self {
            Self::Struct(s) => s.children.iter().for_each(|(k, v)| f(k, v)),
            Self::Namespace(s) => s.children.iter().for_each(|(k, v)| f(k, v)),
            Self::Array(s) => {
                for (i, child) in s.children.iter().enumerate() {
                    f(&(i as i64 + s.start_index as i64).to_string(), child);
                }
            }
            _ => {}
        }
    }

    /// RPC method names exposed by a struct symbol, invokable via
    /// [`Self::invoke`]. Empty for every other variant.
    pub fn rpc_methods(&self) -> &[ArcStr] {
        match self {
            Self::Struct(s) => &s.rpc_methods,
            _ => &[],
        }
    }

    /// Invokes a controller-side method exposed by this struct symbol. Not a
    /// dynamic child lookup — method names are reserved-prefix-free
    /// identifiers the caller is expected to already know, same as the
    /// source's own invokable-child surface (§4.5).
    pub async fn invoke(
        &self,
        transport: &dyn Transport,
        method_name: &str,
        args: Vec<crate::transport::RawValue>,
        coordinator: CoordinatorId,
    ) -> Result<RpcResult> {
        self.binding().call_method(transport, self.full_path(), method_name, args, coordinator).await
    }

    /// Invalidates this node and, for composites, every descendant —
    /// children first, then self (§4.4, §4.5).
    pub(crate) fn invalidate(&self) {
        match self {
            Self::Struct(s) => s.children.values().for_each(|c| c.invalidate()),
            Self::Namespace(s) => s.children.values().for_each(|c| c.invalidate()),
            Self::Array(s) => s.children.iter().for_each(|c| c.invalidate()),
            _ => {}
        }
        self.binding().invalidate();
    }
}

fn now() -> SystemTime {
    SystemTime::now()
}

/// Builds the full `topLevelName -> NamespaceSym` mapping from the
/// controller's raw symbol catalogue and the already-resolved type registry
/// (§4.5). Per-symbol instantiation runs concurrently; the builder awaits
/// every task before returning.
pub async fn build_symbol_graph(
    transport: &dyn Transport,
    registry: &TypeRegistry,
    item_cap: usize,
    coordinator: CoordinatorId,
    root_emitter: Arc<Emitter>,
) -> Result<IndexMap<ArcStr, Arc<SymbolNode>>> {
    let raw = transport.read_and_cache_symbols().await.map_err(|e| e.with_coordinator(coordinator))?;

    let mut by_namespace: IndexMap<String, Vec<RawSymbolDescriptor>> = IndexMap::new();
    for symbol in raw.into_values() {
        let (namespace, _) = split_namespace(&symbol.full_path);
        by_namespace.entry(namespace.to_string()).or_default().push(symbol);
    }

    let tasks = by_namespace.into_iter().map(|(namespace, symbols)| {
        let root_emitter = Arc::clone(&root_emitter);
        async move {
            build_namespace(transport, registry, &namespace, symbols, item_cap, coordinator, root_emitter).await
        }
    });
    let built = try_join_all(tasks).await?;

    let mut out = IndexMap::with_capacity(built.len());
    for (namespace, node) in built {
        out.insert(ArcStr::from(namespace), Arc::new(SymbolNode::Namespace(node)));
    }
    Ok(out)
}

fn split_namespace(full_path: &str) -> (&str, &str) {
    match full_path.split_once('.') {
        Some((ns, local)) => (ns, local),
        None => (full_path, ""),
    }
}

async fn build_namespace(
    transport: &dyn Transport,
    registry: &TypeRegistry,
    namespace: &str,
    symbols: Vec<RawSymbolDescriptor>,
    item_cap: usize,
    coordinator: CoordinatorId,
    root_emitter: Arc<Emitter>,
) -> Result<(String, NamespaceSym)> {
    let ns_base = SymbolBase::new(ArcStr::from(namespace), Some(root_emitter), None);
    let mut ns_binding = NamespaceBinding::new(item_cap);
    let mut children = IndexMap::new();

    for symbol in symbols {
        let Some(type_node) = registry.get(&symbol.type_name) else {
            debug!("symbol {} names unresolved type {}, skipping", symbol.full_path, symbol.type_name);
            continue;
        };
        let (_, local_name) = split_namespace(&symbol.full_path);
        if type_node.is_ignored() {
            continue;
        }
        let node = instantiate(
            transport,
            &type_node,
            symbol.pointer,
            ArcStr::from(symbol.full_path.as_str()),
            Some(Arc::clone(&ns_base.emitter)),
            item_cap,
        )?;
        ns_binding.attach(ArcStr::from(local_name), Arc::clone(node.binding()), coordinator)?;
        children.insert(ArcStr::from(local_name), Arc::new(node));
    }

    Ok((namespace.to_string(), NamespaceSym { base: ns_base, binding: Arc::new(Binding::Namespace(ns_binding)), children }))
}

/// Instantiates one `SymbolNode` (and, recursively, its children) from a
/// resolved `TypeNode` positioned at an absolute pointer (§4.5 steps 5-6).
fn instantiate(
    transport: &dyn Transport,
    type_node: &TypeNode,
    pointer: Pointer,
    full_path: ArcStr,
    parent_emitter: Option<Arc<Emitter>>,
    item_cap: usize,
) -> Result<SymbolNode> {
    let base = SymbolBase::new(full_path.clone(), parent_emitter, Some(type_node.base()));
    let node = match type_node {
        TypeNode::Boolean(t) => SymbolNode::Boolean(BooleanSym {
            binding: Arc::new(Binding::Boolean(BooleanBinding::new(
                pointer,
                t.base.name.clone(),
                t.base.is_read_only(),
                item_cap,
                t.base.default_raw_bytes.clone(),
            ))),
            base,
        }),
        TypeNode::Numeric(t) => SymbolNode::Numeric(NumericSym {
            binding: Arc::new(Binding::Numeric(NumericBinding::new(
                pointer,
                t.base.name.clone(),
                t.kind,
                t.lower,
                t.upper,
                t.base.is_read_only(),
                item_cap,
                t.base.default_raw_bytes.clone(),
            ))),
            base,
        }),
        TypeNode::String(t) => SymbolNode::String(StringSym {
            binding: Arc::new(Binding::String(StringBinding::new(
                pointer,
                t.base.name.clone(),
                t.max_len,
                t.base.is_read_only(),
                item_cap,
                t.base.default_raw_bytes.clone(),
            ))),
            base,
        }),
        TypeNode::Enum(t) => SymbolNode::Enum(EnumSym {
            binding: Arc::new(Binding::Enum(EnumBinding::new(
                pointer,
                t.base.name.clone(),
                Arc::clone(&t.encoding),
                t.base.is_read_only(),
                item_cap,
                t.base.default_raw_bytes.clone(),
            ))),
            base,
        }),
        TypeNode::Struct(t) => {
            let mut binding_children = IndexMap::new();
            let mut symbol_children = IndexMap::new();
            for (key, member) in t.members.iter() {
                let member_pointer =
                    Pointer::new(pointer.index_group, pointer.index_offset + member.offset(), member.byte_size());
                let child_path = ArcStr::from(format!("{full_path}.{key}"));
                let child = instantiate(
                    transport,
                    member,
                    member_pointer,
                    child_path,
                    Some(Arc::clone(&base.emitter)),
                    item_cap,
                )?;
                binding_children.insert(key.clone(), Arc::clone(child.binding()));
                symbol_children.insert(key.clone(), Arc::new(child));
            }
            SymbolNode::Struct(StructSym {
                binding: Arc::new(Binding::Struct(StructBinding::new(
                    pointer,
                    t.base.is_read_only(),
                    item_cap,
                    binding_children,
                    Arc::clone(&t.rpc_methods),
                ))),
                children: symbol_children,
                rpc_methods: Arc::clone(&t.rpc_methods),
                base,
            })
        }
        TypeNode::Array(t) => {
            let dims = &t.dimensions;
            let (dim, rest) = dims.split_first().expect("array type always has at least one dimension");
            let mut binding_children = Vec::with_capacity(dim.length as usize);
            let mut symbol_children = Vec::with_capacity(dim.length as usize);
            let span = if rest.is_empty() { t.element.byte_size() } else { pointer.size / dim.length.max(1) };
            for i in 0..dim.length {
                let elem_pointer = Pointer::new(pointer.index_group, pointer.index_offset + i * span, span);
                let idx = dim.start_index + i as i32;
                let child_path = ArcStr::from(format!("{full_path}[{idx}]"));
                let element_type: TypeNode = if rest.is_empty() {
                    t.element.as_ref().clone()
                } else {
                    // Outer dimension: a proxy array of the same element
                    // type over the remaining dimensions (§4.5 step 6). It
                    // shares the top-level array's read-only/name flags;
                    // only its dimensions and effective byte span differ.
                    TypeNode::Array(crate::typ::ArrayType {
                        base: t.base.clone(),
                        element: Arc::clone(&t.element),
                        dimensions: rest.to_vec().into(),
                    })
                };
                let child = instantiate(
                    transport,
                    &element_type,
                    elem_pointer,
                    child_path,
                    Some(Arc::clone(&base.emitter)),
                    item_cap,
                )?;
                binding_children.push(Arc::clone(child.binding()));
                symbol_children.push(Arc::new(child));
            }
            SymbolNode::Array(ArraySym {
                binding: Arc::new(Binding::Array(ArrayBinding::new(
                    pointer,
                    t.base.is_read_only(),
                    item_cap,
                    dim.start_index,
                    binding_children,
                ))),
                start_index: dim.start_index,
                children: symbol_children,
                base,
            })
        }
    };
    Ok(node)
}

#[cfg(test)] mod test;
