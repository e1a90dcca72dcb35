//! The contract this crate consumes from a raw field-bus client.
//!
//! Everything in this module is a trait or a plain data type: connection
//! handling, wire framing, the data-type and symbol catalogue fetch, bulk
//! read/write, subscriptions and RPC invocation are all implemented by
//! whatever sits on the other side of [`Transport`]. This is the one seam in
//! the crate that is genuinely dynamic — every caller plugs in their own
//! wire client — so it is the one place we reach for `async_trait` rather
//! than a concrete `async fn`, the same trade the teacher makes with its own
//! single extension trait (`graphix_compiler::Rt`).

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

use crate::error::ClientError;

pub type IndexGroup = u32;
pub type IndexOffset = u32;

/// A byte range in the controller's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub index_group: IndexGroup,
    pub index_offset: IndexOffset,
    pub size: u32,
}

impl Pointer {
    pub fn new(index_group: IndexGroup, index_offset: IndexOffset, size: u32) -> Self {
        Self { index_group, index_offset, size }
    }

    pub fn end(&self) -> IndexOffset {
        self.index_offset + self.size
    }
}

/// The wire-level type tag. Bucketed coarsely into the handful of shapes the
/// type resolver cares about; an unrecognised tag round-trips as `Other` so
/// catalogues from newer controllers don't fail to parse outright (they just
/// fail to resolve, which is the silent-drop path §4.1 already specifies).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    Bit,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    StringNarrow,
    StringWide,
    Composite,
    Pointer,
    Reference,
    Other(u16),
}

impl WireKind {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::U8
                | Self::I16
                | Self::U16
                | Self::I32
                | Self::U32
                | Self::I64
                | Self::U64
                | Self::F32
                | Self::F64
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::StringNarrow | Self::StringWide)
    }
}

/// One member of a composite raw type. TwinCAT-style catalogues attach
/// attributes per member (not just per named type), so the member carries
/// its own attribute block alongside the `(name, type, offset)` triple named
/// in the data model — this resolves the ambiguity the data model's prose
/// otherwise leaves open about where a child's `ReadOnly`/`default`/etc.
/// overrides come from (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct RawChild {
    pub member_name: String,
    pub type_name: String,
    pub offset: u32,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDim {
    pub start_index: i32,
    pub length: u32,
}

/// The controller's raw description of one named type.
#[derive(Debug, Clone)]
pub struct RawTypeDescriptor {
    pub name: String,
    pub parent_name: String,
    pub kind: WireKind,
    pub byte_size: u32,
    pub offset: u32,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<RawChild>,
    pub array_dimensions: Vec<ArrayDim>,
    pub enum_fields: Option<Vec<(String, Bytes)>>,
    pub rpc_method_names: Vec<String>,
}

/// One entry of the controller's top-level variable catalogue.
#[derive(Debug, Clone)]
pub struct RawSymbolDescriptor {
    pub full_path: String,
    pub type_name: String,
    pub pointer: Pointer,
}

/// A decoded primitive leaf value, as handed back by
/// [`Transport::convert_from_raw`] or accepted by
/// [`Transport::convert_to_raw`]. Enum leaves decode to `EnumName` holding
/// just the bare field name — qualifying it with the type name is the
/// binding layer's job (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Bool(bool),
    Int(i128),
    UInt(u128),
    Float(f64),
    Str(String),
    EnumName(String),
}

/// One `{group, offset, data}` package returned by a bulk read.
#[derive(Debug, Clone)]
pub struct DataPackage {
    pub pointer: Pointer,
    pub data: Bytes,
}

/// One `{group, offset, data}` package submitted to a bulk write.
#[derive(Debug, Clone)]
pub struct WritePackage {
    pub pointer: Pointer,
    pub data: Bytes,
}

/// The result of an RPC invocation: a return value plus optional named
/// output (VAR_OUTPUT/VAR_IN_OUT) parameters.
#[derive(Debug, Clone)]
pub struct RpcResult {
    pub result: RawValue,
    pub outputs: Option<Vec<(String, RawValue)>>,
}

/// A live subscription handle. Dropping it does not implicitly unsubscribe —
/// callers (the binding layer) call `unsubscribe` explicitly so the
/// idempotence rules in §4.4 are testable independent of `Drop` timing.
#[async_trait]
pub trait Subscription: Send + Sync {
    async fn unsubscribe(&self) -> Result<(), ClientError>;
}

impl fmt::Debug for dyn Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscription")
    }
}

/// A callback invoked on a subscription firing, with the freshly read value.
pub type ChangeCallback = Box<dyn Fn(RawValue) + Send + Sync>;

/// The contract consumed by the engine. None of this is implemented here;
/// see spec.md §6 for the full behavioural contract each method must honor.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), ClientError>;
    async fn disconnect(&self, force: bool) -> Result<(), ClientError>;

    async fn subscribe(
        &self,
        symbol_path: &str,
        cycle_ms: Option<u32>,
        callback: ChangeCallback,
    ) -> Result<Box<dyn Subscription>, ClientError>;

    async fn subscribe_raw(
        &self,
        pointer: Pointer,
        cycle_ms: u32,
        callback: ChangeCallback,
    ) -> Result<Box<dyn Subscription>, ClientError>;

    async fn unsubscribe_all(&self) -> Result<(), ClientError>;

    fn convert_from_raw(&self, bytes: &[u8], type_name: &str) -> Result<RawValue, ClientError>;
    fn convert_to_raw(&self, value: &RawValue, type_name: &str) -> Result<Bytes, ClientError>;

    async fn read_raw_multi(&self, pointers: &[Pointer]) -> Result<Vec<DataPackage>, ClientError>;
    async fn write_raw_multi(&self, packages: &[WritePackage]) -> Result<(), ClientError>;

    async fn read_and_cache_data_types(
        &self,
    ) -> Result<HashMap<String, RawTypeDescriptor>, ClientError>;
    async fn read_and_cache_symbols(
        &self,
    ) -> Result<HashMap<String, RawSymbolDescriptor>, ClientError>;

    async fn invoke_rpc_method(
        &self,
        symbol_path: &str,
        method_name: &str,
        args: Vec<RawValue>,
    ) -> Result<RpcResult, ClientError>;

    /// The last-observed value of the source-change probe (§6), e.g. the
    /// controller's program compile timestamp. The coordinator polls this
    /// after connect and compares successive values to detect a reload.
    async fn source_version(&self) -> Result<i64, ClientError>;
}
