//! An in-memory `Transport` double shared by this crate's own test modules.
//! Not part of the public API; it exists purely so unit tests exercise real
//! `async fn` call paths instead of hand-rolled stubs per module.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{ClientError, ErrorKind};
use crate::transport::{
    ChangeCallback, DataPackage, Pointer, RawSymbolDescriptor, RawTypeDescriptor, RawValue,
    RpcResult, Subscription, Transport, WireKind, WritePackage,
};

struct NoopSubscription;

#[async_trait]
impl Subscription for NoopSubscription {
    async fn unsubscribe(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct Calls {
    pub reads: Vec<Vec<Pointer>>,
    pub writes: Vec<Vec<Pointer>>,
}

pub struct MockTransport {
    types: HashMap<String, RawTypeDescriptor>,
    symbols: HashMap<String, RawSymbolDescriptor>,
    leaf_kind: HashMap<String, WireKind>,
    enum_fields: HashMap<String, Vec<(String, Bytes)>>,
    memory: Mutex<HashMap<(u32, u32), Vec<u8>>>,
    pub calls: Mutex<Calls>,
    pub item_cap: usize,
    source_version: AtomicI64,
    fail_to_raw: Mutex<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
            symbols: HashMap::new(),
            leaf_kind: HashMap::new(),
            enum_fields: HashMap::new(),
            memory: Mutex::new(HashMap::new()),
            calls: Mutex::new(Calls::default()),
            item_cap: 500,
            source_version: AtomicI64::new(1),
            fail_to_raw: Mutex::new(false),
        }
    }

    pub fn add_type(&mut self, raw: RawTypeDescriptor) {
        self.leaf_kind.insert(raw.name.to_ascii_lowercase(), raw.kind);
        if let Some(fields) = &raw.enum_fields {
            self.enum_fields.insert(raw.name.to_ascii_lowercase(), fields.clone());
        }
        self.types.insert(raw.name.to_ascii_lowercase(), raw);
    }

    pub fn add_symbol(&mut self, raw: RawSymbolDescriptor) {
        self.symbols.insert(raw.full_path.to_ascii_lowercase(), raw);
    }

    pub fn register_leaf(&mut self, type_name: &str, kind: WireKind) {
        self.leaf_kind.insert(type_name.to_ascii_lowercase(), kind);
    }

    pub fn set_memory(&self, pointer: Pointer, data: Vec<u8>) {
        self.memory.lock().insert((pointer.index_group, pointer.index_offset), data);
    }

    pub fn read_memory(&self, pointer: Pointer) -> Vec<u8> {
        self.memory
            .lock()
            .get(&(pointer.index_group, pointer.index_offset))
            .cloned()
            .unwrap_or_else(|| vec![0u8; pointer.size as usize])
    }

    pub fn bump_source_version(&self) {
        self.source_version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_fail_to_raw(&self, fail: bool) {
        *self.fail_to_raw.lock() = fail;
    }

    fn decode(kind: WireKind, bytes: &[u8]) -> RawValue {
        match kind {
            WireKind::Bit => RawValue::Bool(bytes.first().copied().unwrap_or(0) != 0),
            WireKind::I8 => RawValue::Int(bytes.first().copied().unwrap_or(0) as i8 as i128),
            WireKind::U8 => RawValue::UInt(bytes.first().copied().unwrap_or(0) as u128),
            WireKind::I16 => RawValue::Int(le_i(bytes, 2) as i128),
            WireKind::U16 => RawValue::UInt(le_u(bytes, 2) as u128),
            WireKind::I32 => RawValue::Int(le_i(bytes, 4) as i128),
            WireKind::U32 => RawValue::UInt(le_u(bytes, 4) as u128),
            WireKind::I64 => RawValue::Int(le_i(bytes, 8) as i128),
            WireKind::U64 => RawValue::UInt(le_u(bytes, 8) as u128),
            WireKind::F32 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes[..4.min(bytes.len())]);
                RawValue::Float(f32::from_le_bytes(buf) as f64)
            }
            WireKind::F64 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes[..8.min(bytes.len())]);
                RawValue::Float(f64::from_le_bytes(buf))
            }
            WireKind::StringNarrow | WireKind::StringWide => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                RawValue::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            _ => RawValue::UInt(0),
        }
    }

    fn encode(kind: WireKind, value: &RawValue, byte_size: usize) -> Bytes {
        let mut buf = vec![0u8; byte_size];
        match (kind, value) {
            (WireKind::Bit, RawValue::Bool(b)) => buf[0] = *b as u8,
            (_, RawValue::Int(i)) => {
                let b = i.to_le_bytes();
                let n = byte_size.min(16);
                buf[..n].copy_from_slice(&b[..n]);
            }
            (_, RawValue::UInt(u)) => {
                let b = u.to_le_bytes();
                let n = byte_size.min(16);
                buf[..n].copy_from_slice(&b[..n]);
            }
            (WireKind::F32, RawValue::Float(f)) => {
                buf[..4].copy_from_slice(&(*f as f32).to_le_bytes())
            }
            (_, RawValue::Float(f)) => {
                let n = byte_size.min(8);
                buf[..n].copy_from_slice(&f.to_le_bytes()[..n])
            }
            (_, RawValue::Str(s)) => {
                let bytes = s.as_bytes();
                let n = bytes.len().min(buf.len().saturating_sub(1));
                buf[..n].copy_from_slice(&bytes[..n]);
            }
            (_, RawValue::EnumName(_)) => {}
            _ => {}
        }
        Bytes::from(buf)
    }
}

fn le_i(bytes: &[u8], n: usize) -> i64 {
    let mut buf = [0u8; 8];
    let n = n.min(bytes.len()).min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    let shift = (8 - n) * 8;
    (i64::from_le_bytes(buf) << shift) >> shift
}

fn le_u(bytes: &[u8], n: usize) -> u64 {
    let mut buf = [0u8; 8];
    let n = n.min(bytes.len()).min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn disconnect(&self, _force: bool) -> Result<(), ClientError> {
        Ok(())
    }

    async fn subscribe(
        &self,
        _symbol_path: &str,
        _cycle_ms: Option<u32>,
        _callback: ChangeCallback,
    ) -> Result<Box<dyn Subscription>, ClientError> {
        Ok(Box::new(NoopSubscription))
    }

    async fn subscribe_raw(
        &self,
        _pointer: Pointer,
        _cycle_ms: u32,
        _callback: ChangeCallback,
    ) -> Result<Box<dyn Subscription>, ClientError> {
        Ok(Box::new(NoopSubscription))
    }

    async fn unsubscribe_all(&self) -> Result<(), ClientError> {
        Ok(())
    }

    fn convert_from_raw(&self, bytes: &[u8], type_name: &str) -> Result<RawValue, ClientError> {
        let lname = type_name.to_ascii_lowercase();
        if let Some(fields) = self.enum_fields.get(&lname) {
            for (name, raw) in fields {
                if raw.as_ref() == bytes {
                    return Ok(RawValue::EnumName(name.clone()));
                }
            }
            return Ok(RawValue::EnumName(
                fields.first().map(|(n, _)| n.clone()).unwrap_or_default(),
            ));
        }
        let kind = self.leaf_kind.get(&lname).copied().unwrap_or(WireKind::Other(0));
        Ok(Self::decode(kind, bytes))
    }

    fn convert_to_raw(&self, value: &RawValue, type_name: &str) -> Result<Bytes, ClientError> {
        if *self.fail_to_raw.lock() {
            return Err(ClientError::new(ErrorKind::ToRawFailed, 0, "injected failure"));
        }
        let lname = type_name.to_ascii_lowercase();
        let kind = self.leaf_kind.get(&lname).copied().unwrap_or(WireKind::Other(0));
        let byte_size = self.types.get(&lname).map(|t| t.byte_size as usize).unwrap_or(match value {
            RawValue::Bool(_) => 1,
            RawValue::Str(s) => s.len() + 1,
            RawValue::Float(_) => 8,
            _ => 8,
        });
        Ok(Self::encode(kind, value, byte_size))
    }

    async fn read_raw_multi(&self, pointers: &[Pointer]) -> Result<Vec<DataPackage>, ClientError> {
        self.calls.lock().reads.push(pointers.to_vec());
        if pointers.len() > self.item_cap {
            return Err(ClientError::new(ErrorKind::ReadFailed, 0, "too many items for one call"));
        }
        Ok(pointers
            .iter()
            .map(|p| DataPackage { pointer: *p, data: Bytes::from(self.read_memory(*p)) })
            .collect())
    }

    async fn write_raw_multi(&self, packages: &[WritePackage]) -> Result<(), ClientError> {
        let pointers: Vec<Pointer> = packages.iter().map(|p| p.pointer).collect();
        self.calls.lock().writes.push(pointers);
        if packages.len() > self.item_cap {
            return Err(ClientError::new(ErrorKind::WriteFailed, 0, "too many items for one call"));
        }
        let mut mem = self.memory.lock();
        for pkg in packages {
            mem.insert((pkg.pointer.index_group, pkg.pointer.index_offset), pkg.data.to_vec());
        }
        Ok(())
    }

    async fn read_and_cache_data_types(
        &self,
    ) -> Result<HashMap<String, RawTypeDescriptor>, ClientError> {
        Ok(self.types.clone())
    }

    async fn read_and_cache_symbols(
        &self,
    ) -> Result<HashMap<String, RawSymbolDescriptor>, ClientError> {
        Ok(self.symbols.clone())
    }

    async fn invoke_rpc_method(
        &self,
        _symbol_path: &str,
        _method_name: &str,
        _args: Vec<RawValue>,
    ) -> Result<RpcResult, ClientError> {
        Ok(RpcResult { result: RawValue::Int(0), outputs: None })
    }

    async fn source_version(&self) -> Result<i64, ClientError> {
        Ok(self.source_version.load(Ordering::SeqCst))
    }
}

pub fn shared(t: MockTransport) -> Arc<MockTransport> {
    Arc::new(t)
}
