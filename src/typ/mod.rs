//! The canonical type node model (§3 `TypeNode`, §4.2 extend/clone).
//!
//! `TypeNode` is a tagged sum, one variant per wire shape the resolver
//! recognises, the same way the teacher models its own `Type` enum as a
//! tagged sum over `Bottom/Primitive/Struct/Array/...`. Struct members and
//! array elements are held behind `Arc` so that `clone_with` — used
//! constantly during registration and again for every symbol instantiated
//! from a type — is cheap and so that, per §3's invariant, children really
//! are shared by reference once registered rather than deep-copied.

pub mod numeric;
pub mod registry;
mod value;

use arcstr::ArcStr;
use bytes::Bytes;
use enumflags2::{bitflags, BitFlags};
use indexmap::IndexMap;
use std::sync::Arc;

use crate::attr::Attributes;
use crate::error::{ClientError, ErrorKind, Result};
use crate::transport::{ArrayDim, RawTypeDescriptor, Transport, WireKind};
pub use numeric::{NumBound, NumericKind};
pub use value::LeafValue;

/// Per-node flags, mirroring the teacher's own `BitFlags<CFlag>` usage on its
/// compiler nodes rather than two standalone `bool`s.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFlag {
    ReadOnly,
    Ignored,
}

/// The attributes common to every `TypeNode` variant (§3 `base`).
#[derive(Debug, Clone)]
pub struct Base {
    pub name: ArcStr,
    pub ads_kind: WireKind,
    pub offset: u32,
    pub byte_size: u32,
    pub flags: BitFlags<NodeFlag>,
    pub default_value: LeafValue,
    pub default_explicit: bool,
    pub default_raw_bytes: Option<Bytes>,
    pub on_set: ArcStr,
    pub on_get: ArcStr,
    pub on_clear: ArcStr,
    pub on_change: ArcStr,
}

impl Base {
    pub fn new(name: ArcStr, ads_kind: WireKind, offset: u32, byte_size: u32) -> Self {
        Self {
            name,
            ads_kind,
            offset,
            byte_size,
            flags: BitFlags::empty(),
            default_value: LeafValue::None,
            default_explicit: false,
            default_raw_bytes: None,
            on_set: ArcStr::from("set"),
            on_get: ArcStr::from("get"),
            on_clear: ArcStr::from("cleared"),
            on_change: ArcStr::from("changed"),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(NodeFlag::ReadOnly)
    }

    pub fn is_ignored(&self) -> bool {
        self.flags.contains(NodeFlag::Ignored)
    }

    /// Apply the attributes and positional offset common to every variant.
    /// Returns `false` if the node should be dropped (the `ignored`
    /// attribute was present).
    fn apply_common(&mut self, attrs: &Attributes, offset: u32) -> bool {
        self.offset = offset;
        if attrs.read_only {
            self.flags.insert(NodeFlag::ReadOnly);
        }
        if attrs.ignored {
            self.flags.insert(NodeFlag::Ignored);
            return false;
        }
        if let Some(name) = &attrs.on_set {
            self.on_set = ArcStr::from(name.as_str());
        }
        if let Some(name) = &attrs.on_get {
            self.on_get = ArcStr::from(name.as_str());
        }
        if let Some(name) = &attrs.on_clear {
            self.on_clear = ArcStr::from(name.as_str());
        }
        if let Some(name) = &attrs.on_change {
            self.on_change = ArcStr::from(name.as_str());
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct BooleanType {
    pub base: Base,
}

#[derive(Debug, Clone)]
pub struct NumericType {
    pub base: Base,
    pub kind: NumericKind,
    pub lower: NumBound,
    pub upper: NumBound,
}

#[derive(Debug, Clone)]
pub struct StringType {
    pub base: Base,
    pub max_len: usize,
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub base: Base,
    pub fields: Arc<[ArcStr]>,
    pub encoding: Arc<IndexMap<ArcStr, Bytes>>,
}

#[derive(Debug, Clone)]
pub struct StructType {
    pub base: Base,
    pub members: Arc<[(ArcStr, Arc<TypeNode>)]>,
    pub rpc_methods: Arc<[ArcStr]>,
}

#[derive(Debug, Clone)]
pub struct ArrayType {
    pub base: Base,
    pub element: Arc<TypeNode>,
    pub dimensions: Arc<[ArrayDim]>,
}

#[derive(Debug, Clone)]
pub enum TypeNode {
    Boolean(BooleanType),
    Numeric(NumericType),
    String(StringType),
    Enum(EnumType),
    Struct(StructType),
    Array(ArrayType),
}

impl TypeNode {
    pub fn base(&self) -> &Base {
        match self {
            Self::Boolean(t) => &t.base,
            Self::Numeric(t) => &t.base,
            Self::String(t) => &t.base,
            Self::Enum(t) => &t.base,
            Self::Struct(t) => &t.base,
            Self::Array(t) => &t.base,
        }
    }

    fn base_mut(&mut self) -> &mut Base {
        match self {
            Self::Boolean(t) => &mut t.base,
            Self::Numeric(t) => &mut t.base,
            Self::String(t) => &mut t.base,
            Self::Enum(t) => &mut t.base,
            Self::Struct(t) => &mut t.base,
            Self::Array(t) => &mut t.base,
        }
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    pub fn byte_size(&self) -> u32 {
        self.base().byte_size
    }

    pub fn offset(&self) -> u32 {
        self.base().offset
    }

    pub fn is_ignored(&self) -> bool {
        self.base().is_ignored()
    }

    pub fn is_read_only(&self) -> bool {
        self.base().is_read_only()
    }

    /// Construct a fresh leaf/composite node straight from a raw descriptor
    /// with no parent (§4.1 step 5). `members` has already been resolved and
    /// filtered by the caller (the registry, which alone has access to the
    /// rest of the catalogue needed to resolve member types).
    pub fn construct_leaf(transport: &dyn Transport, raw: &RawTypeDescriptor) -> Result<Option<Self>> {
        let name = ArcStr::from(raw.name.as_str());
        let node = match raw.kind {
            WireKind::Bit => {
                let mut base = Base::new(name, raw.kind, raw.offset, raw.byte_size);
                base.default_value = LeafValue::Bool(false);
                Some(Self::Boolean(BooleanType { base }))
            }
            k if k.is_numeric() => {
                let kind = NumericKind::from_wire(k).expect("checked by is_numeric");
                let (lower, upper) = kind.natural_bounds();
                let mut base = Base::new(name, raw.kind, raw.offset, kind.byte_size());
                base.default_value = LeafValue::Num(kind.natural_default());
                Some(Self::Numeric(NumericType { base, kind, lower, upper }))
            }
            k if k.is_string() => {
                let max_len = raw.byte_size.saturating_sub(1) as usize;
                let mut base = Base::new(name, raw.kind, raw.offset, raw.byte_size);
                base.default_value = LeafValue::Str(String::new());
                Some(Self::String(StringType { base, max_len }))
            }
            _ => None,
        };
        match node {
            Some(mut node) => {
                node.refresh_default_bytes(transport)?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// §4.2 `extend`: called when `raw.kind` matches this node's kind,
    /// during resolution of a type that names this node as its parent.
    pub fn extend(&self, transport: &dyn Transport, raw: &RawTypeDescriptor) -> Result<Option<Self>> {
        if !raw.array_dimensions.is_empty() {
            let dims: Arc<[ArrayDim]> = raw.array_dimensions.clone().into();
            let count: u64 = dims.iter().map(|d| d.length as u64).product();
            let total = self.byte_size() as u64 * count;
            let base = Base::new(ArcStr::from(raw.name.as_str()), raw.kind, raw.offset, total as u32);
            return Ok(Some(Self::Array(ArrayType { base, element: Arc::new(self.clone()), dimensions: dims })));
        }
        if matches!(self, Self::Numeric(_)) {
            if let Some(fields) = &raw.enum_fields {
                return Ok(Some(Self::Enum(EnumType::from_raw(raw, fields))));
            }
        }
        self.clone_with(transport, Some(raw))
    }

    /// §4.2 `clone`: a deep-enough copy that shares no mutable state with
    /// the original (structs/arrays still share children by `Arc`, which is
    /// fine because children are immutable after registration).
    pub fn clone_with(&self, transport: &dyn Transport, mutator: Option<&RawTypeDescriptor>) -> Result<Option<Self>> {
        let mut node = self.clone();
        let Some(raw) = mutator else { return Ok(Some(node)) };
        let attrs = Attributes::parse(&raw.attributes);
        if !node.base_mut().apply_common(&attrs, raw.offset) {
            return Ok(None);
        }
        node.apply_variant_attrs(transport, &attrs)?;
        Ok(Some(node))
    }

    fn apply_variant_attrs(&mut self, transport: &dyn Transport, attrs: &Attributes) -> Result<()> {
        match self {
            Self::Boolean(t) => {
                if let Some(d) = &attrs.default {
                    t.base.default_value = LeafValue::Bool(d.eq_ignore_ascii_case("true"));
                    t.base.default_explicit = true;
                }
            }
            Self::Numeric(t) => {
                if let Some(s) = &attrs.lower_border {
                    if let Some(b) = numeric::parse_num_bound(t.kind, s) {
                        t.lower = b;
                        if !t.base.default_explicit {
                            t.base.default_value = LeafValue::Num(b);
                        }
                    }
                }
                if let Some(s) = &attrs.upper_border {
                    if let Some(b) = numeric::parse_num_bound(t.kind, s) {
                        t.upper = b;
                    }
                }
                if let Some(s) = &attrs.default {
                    if let Some(b) = numeric::parse_num_bound(t.kind, s) {
                        t.base.default_value = LeafValue::Num(b);
                        t.base.default_explicit = true;
                    }
                }
            }
            Self::String(t) => {
                if let Some(d) = &attrs.default {
                    t.base.default_value = LeafValue::Str(d.clone());
                    t.base.default_explicit = true;
                }
            }
            Self::Enum(t) => {
                if let Some(d) = &attrs.default {
                    t.base.default_value = LeafValue::EnumName(d.clone());
                    t.base.default_explicit = true;
                }
            }
            Self::Struct(_) | Self::Array(_) => {
                // `default` and numeric borders apply only to leaf kinds (§4.3).
            }
        }
        self.refresh_default_bytes(transport)
    }

    /// Re-derive `default_raw_bytes` from `default_value` if it changed.
    /// Enum leaves never call the transport encoder — they look their
    /// pre-encoded bytes up in `encoding`, per §4.4's binding rule applied
    /// equally to the type's own default.
    fn refresh_default_bytes(&mut self, transport: &dyn Transport) -> Result<()> {
        match self {
            Self::Enum(t) => {
                if let LeafValue::EnumName(name) = &t.base.default_value {
                    if let Some(bytes) = t.encoding.get(name.as_str()) {
                        t.base.default_raw_bytes = Some(bytes.clone());
                    }
                } else if t.base.default_raw_bytes.is_none() {
                    if let Some((_, bytes)) = t.encoding.first() {
                        t.base.default_raw_bytes = Some(bytes.clone());
                    }
                }
                Ok(())
            }
            Self::Struct(_) | Self::Array(_) => Ok(()),
            Self::Boolean(t) => Self::encode_scalar(transport, &mut t.base),
            Self::Numeric(t) => Self::encode_scalar(transport, &mut t.base),
            Self::String(t) => Self::encode_scalar(transport, &mut t.base),
        }
    }

    fn encode_scalar(transport: &dyn Transport, base: &mut Base) -> Result<()> {
        let Some(value) = base.default_value.to_raw_value() else { return Ok(()) };
        let bytes = transport.convert_to_raw(&value, &base.name).map_err(|e| {
            ClientError::with_source(
                ErrorKind::ToRawFailed,
                0,
                format!("encoding default for {}", base.name),
                e,
            )
        })?;
        base.default_raw_bytes = Some(bytes);
        Ok(())
    }
}

impl EnumType {
    fn from_raw(raw: &RawTypeDescriptor, fields: &[(String, Bytes)]) -> Self {
        let qualified: Vec<ArcStr> =
            fields.iter().map(|(n, _)| ArcStr::from(format!("{}.{}", raw.name, n))).collect();
        let mut encoding = IndexMap::new();
        for (name, (_, bytes)) in qualified.iter().zip(fields.iter()) {
            encoding.insert(name.clone(), bytes.clone());
        }
        let default_name = qualified.first().cloned().unwrap_or_else(|| ArcStr::from(""));
        let mut base = Base::new(ArcStr::from(raw.name.as_str()), raw.kind, raw.offset, raw.byte_size);
        base.default_value = LeafValue::EnumName(default_name.to_string());
        base.default_raw_bytes = encoding.get(&default_name).cloned();
        EnumType { base, fields: qualified.into(), encoding: Arc::new(encoding) }
    }
}

#[cfg(test)] mod test;
