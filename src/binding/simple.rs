//! Simple (leaf) bindings: boolean, numeric, string, enum (§4.4).

use arcstr::ArcStr;
use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::binding::Valid;
use crate::error::{ClientError, ErrorKind, Result};
use crate::transport::{Pointer, RawValue, Subscription, Transport, WritePackage};
use crate::typ::{NumBound, NumericKind};

use super::Value;

#[derive(Debug)]
pub struct BooleanBinding {
    pub(crate) pointer: Pointer,
    pub(crate) type_name: ArcStr,
    pub(crate) read_only: bool,
    pub(crate) item_cap: usize,
    pub(crate) default_raw_bytes: Option<Bytes>,
    pub(crate) valid: Valid,
    pub(crate) subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl BooleanBinding {
    pub fn new(
        pointer: Pointer,
        type_name: ArcStr,
        read_only: bool,
        item_cap: usize,
        default_raw_bytes: Option<Bytes>,
    ) -> Self {
        Self {
            pointer,
            type_name,
            read_only,
            item_cap,
            default_raw_bytes,
            valid: Valid::new(),
            subscription: Mutex::new(None),
        }
    }

    pub(crate) fn clear_packages(&self) -> Vec<(Pointer, Bytes)> {
        if self.read_only {
            return Vec::new();
        }
        self.default_raw_bytes.clone().map(|b| vec![(self.pointer, b)]).unwrap_or_default()
    }

    pub(crate) fn decode_one(&self, transport: &dyn Transport, bytes: Option<&Bytes>) -> Result<Value> {
        let bytes = bytes.expect("read_packages/decode slice mismatch");
        let raw = transport.convert_from_raw(bytes, &self.type_name)?;
        match raw {
            RawValue::Bool(b) => Ok(Value::Bool(b)),
            other => Err(ClientError::new(
                ErrorKind::FromRawFailed,
                0,
                format!("decoder returned {other:?} for a boolean leaf"),
            )),
        }
    }

    pub(crate) fn encode_one(
        &self,
        transport: &dyn Transport,
        value: Value,
        coordinator: u64,
        out: &mut Vec<WritePackage>,
    ) -> Result<Value> {
        let Value::Bool(b) = value else {
            return Err(ClientError::new(ErrorKind::InvalidType, coordinator, "expected a boolean value"));
        };
        let bytes = transport
            .convert_to_raw(&RawValue::Bool(b), &self.type_name)
            .map_err(|e| e.with_coordinator(coordinator))?;
        out.push(WritePackage { pointer: self.pointer, data: bytes });
        Ok(Value::Bool(b))
    }
}

#[derive(Debug)]
pub struct NumericBinding {
    pub(crate) pointer: Pointer,
    pub(crate) type_name: ArcStr,
    pub(crate) kind: NumericKind,
    pub(crate) lower: NumBound,
    pub(crate) upper: NumBound,
    pub(crate) read_only: bool,
    pub(crate) item_cap: usize,
    pub(crate) default_raw_bytes: Option<Bytes>,
    pub(crate) valid: Valid,
    pub(crate) subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl NumericBinding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pointer: Pointer,
        type_name: ArcStr,
        kind: NumericKind,
        lower: NumBound,
        upper: NumBound,
        read_only: bool,
        item_cap: usize,
        default_raw_bytes: Option<Bytes>,
    ) -> Self {
        Self {
            pointer,
            type_name,
            kind,
            lower,
            upper,
            read_only,
            item_cap,
            default_raw_bytes,
            valid: Valid::new(),
            subscription: Mutex::new(None),
        }
    }

    pub(crate) fn clear_packages(&self) -> Vec<(Pointer, Bytes)> {
        if self.read_only {
            return Vec::new();
        }
        self.default_raw_bytes.clone().map(|b| vec![(self.pointer, b)]).unwrap_or_default()
    }

    /// For unsigned 64-bit, the transport's decoder hands back a signed
    /// big integer; mask it down to the true 64-bit unsigned value (§4.4
    /// "Numeric binding additionally enforces ... on read, for unsigned
    /// 64-bit, the decoded big integer is masked to 64 bits").
    fn mask_u64(&self, raw: RawValue) -> NumBound {
        match raw {
            RawValue::Int(i) if self.kind == NumericKind::U64 => NumBound::UInt((i as u128) & u128::from(u64::MAX)),
            RawValue::Int(i) => NumBound::Int(i),
            RawValue::UInt(u) => NumBound::UInt(u),
            RawValue::Float(f) => NumBound::Float(f),
            _ => NumBound::Int(0),
        }
    }

    pub(crate) fn decode_one(&self, transport: &dyn Transport, bytes: Option<&Bytes>) -> Result<Value> {
        let bytes = bytes.expect("read_packages/decode slice mismatch");
        let raw = transport.convert_from_raw(bytes, &self.type_name)?;
        Ok(Value::Num(self.mask_u64(raw)))
    }

    pub(crate) fn encode_one(
        &self,
        transport: &dyn Transport,
        value: Value,
        coordinator: u64,
        out: &mut Vec<WritePackage>,
    ) -> Result<Value> {
        let Value::Num(n) = value else {
            return Err(ClientError::new(ErrorKind::InvalidType, coordinator, "expected a numeric value"));
        };
        if n.as_f64() < self.lower.as_f64() || n.as_f64() > self.upper.as_f64() {
            return Err(ClientError::new(
                ErrorKind::OutOfRange,
                coordinator,
                format!("value {:?} outside [{:?}, {:?}]", n, self.lower, self.upper),
            ));
        }
        let raw = match n {
            NumBound::Int(i) => RawValue::Int(i),
            NumBound::UInt(u) => RawValue::UInt(u),
            NumBound::Float(f) => RawValue::Float(f),
        };
        let bytes = transport.convert_to_raw(&raw, &self.type_name).map_err(|e| e.with_coordinator(coordinator))?;
        out.push(WritePackage { pointer: self.pointer, data: bytes });
        Ok(Value::Num(n))
    }
}

#[derive(Debug)]
pub struct StringBinding {
    pub(crate) pointer: Pointer,
    pub(crate) type_name: ArcStr,
    pub(crate) max_len: usize,
    pub(crate) read_only: bool,
    pub(crate) item_cap: usize,
    pub(crate) default_raw_bytes: Option<Bytes>,
    pub(crate) valid: Valid,
    pub(crate) subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl StringBinding {
    pub fn new(
        pointer: Pointer,
        type_name: ArcStr,
        max_len: usize,
        read_only: bool,
        item_cap: usize,
        default_raw_bytes: Option<Bytes>,
    ) -> Self {
        Self {
            pointer,
            type_name,
            max_len,
            read_only,
            item_cap,
            default_raw_bytes,
            valid: Valid::new(),
            subscription: Mutex::new(None),
        }
    }

    pub(crate) fn clear_packages(&self) -> Vec<(Pointer, Bytes)> {
        if self.read_only {
            return Vec::new();
        }
        self.default_raw_bytes.clone().map(|b| vec![(self.pointer, b)]).unwrap_or_default()
    }

    pub(crate) fn decode_one(&self, transport: &dyn Transport, bytes: Option<&Bytes>) -> Result<Value> {
        let bytes = bytes.expect("read_packages/decode slice mismatch");
        let raw = transport.convert_from_raw(bytes, &self.type_name)?;
        match raw {
            RawValue::Str(s) => Ok(Value::Str(s)),
            other => Err(ClientError::new(
                ErrorKind::FromRawFailed,
                0,
                format!("decoder returned {other:?} for a string leaf"),
            )),
        }
    }

    pub(crate) fn encode_one(
        &self,
        transport: &dyn Transport,
        value: Value,
        coordinator: u64,
        out: &mut Vec<WritePackage>,
    ) -> Result<Value> {
        let Value::Str(s) = value else {
            return Err(ClientError::new(ErrorKind::InvalidType, coordinator, "expected a string value"));
        };
        if s.chars().count() > self.max_len {
            return Err(ClientError::new(
                ErrorKind::OutOfRange,
                coordinator,
                format!("string of length {} exceeds max length {}", s.chars().count(), self.max_len),
            ));
        }
        let bytes = transport
            .convert_to_raw(&RawValue::Str(s.clone()), &self.type_name)
            .map_err(|e| e.with_coordinator(coordinator))?;
        out.push(WritePackage { pointer: self.pointer, data: bytes });
        Ok(Value::Str(s))
    }
}

#[derive(Debug)]
pub struct EnumBinding {
    pub(crate) pointer: Pointer,
    pub(crate) type_name: ArcStr,
    pub(crate) encoding: std::sync::Arc<IndexMap<ArcStr, Bytes>>,
    pub(crate) read_only: bool,
    pub(crate) item_cap: usize,
    pub(crate) default_raw_bytes: Option<Bytes>,
    pub(crate) valid: Valid,
    pub(crate) subscription: Mutex<Option<Box<dyn Subscription>>>,
}

impl EnumBinding {
    pub fn new(
        pointer: Pointer,
        type_name: ArcStr,
        encoding: std::sync::Arc<IndexMap<ArcStr, Bytes>>,
        read_only: bool,
        item_cap: usize,
        default_raw_bytes: Option<Bytes>,
    ) -> Self {
        Self {
            pointer,
            type_name,
            encoding,
            read_only,
            item_cap,
            default_raw_bytes,
            valid: Valid::new(),
            subscription: Mutex::new(None),
        }
    }

    pub(crate) fn clear_packages(&self) -> Vec<(Pointer, Bytes)> {
        if self.read_only {
            return Vec::new();
        }
        self.default_raw_bytes.clone().map(|b| vec![(self.pointer, b)]).unwrap_or_default()
    }

    /// On read, the transport hands back `{ name }`; the binding qualifies
    /// it as `"<typeName>.<name>"` (§4.4).
    pub(crate) fn decode_one(&self, transport: &dyn Transport, bytes: Option<&Bytes>) -> Result<Value> {
        let bytes = bytes.expect("read_packages/decode slice mismatch");
        let raw = transport.convert_from_raw(bytes, &self.type_name)?;
        match raw {
            RawValue::EnumName(name) => Ok(Value::EnumName(format!("{}.{name}", self.type_name))),
            other => Err(ClientError::new(
                ErrorKind::FromRawFailed,
                0,
                format!("decoder returned {other:?} for an enum leaf"),
            )),
        }
    }

    /// On write, the encoder is never called — the pre-encoded `rawBytes`
    /// for the qualified name are looked up and dispatched directly (§4.4).
    pub(crate) fn encode_one(
        &self,
        _transport: &dyn Transport,
        value: Value,
        coordinator: u64,
        out: &mut Vec<WritePackage>,
    ) -> Result<Value> {
        let Value::EnumName(name) = value else {
            return Err(ClientError::new(ErrorKind::InvalidType, coordinator, "expected a qualified enum name"));
        };
        let Some(bytes) = self.encoding.get(name.as_str()) else {
            return Err(ClientError::new(
                ErrorKind::OutOfRange,
                coordinator,
                format!("{name} is not a member of this enum"),
            ));
        };
        out.push(WritePackage { pointer: self.pointer, data: bytes.clone() });
        Ok(Value::EnumName(name))
    }
}
