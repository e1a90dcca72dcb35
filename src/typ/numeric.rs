//! Numeric kinds, their natural wire ranges, and bound parsing (§3, §4.3).

use crate::transport::WireKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
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
}

impl NumericKind {
    pub fn from_wire(kind: WireKind) -> Option<Self> {
        match kind {
            WireKind::I8 => Some(Self::I8),
            WireKind::U8 => Some(Self::U8),
            WireKind::I16 => Some(Self::I16),
            WireKind::U16 => Some(Self::U16),
            WireKind::I32 => Some(Self::I32),
            WireKind::U32 => Some(Self::U32),
            WireKind::I64 => Some(Self::I64),
            WireKind::U64 => Some(Self::U64),
            WireKind::F32 => Some(Self::F32),
            WireKind::F64 => Some(Self::F64),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, Self::I64 | Self::U64)
    }

    /// The kind's natural range, before any `lowerBorder`/`upperBorder`
    /// narrowing is applied.
    pub fn natural_bounds(&self) -> (NumBound, NumBound) {
        match self {
            Self::I8 => (NumBound::Int(i8::MIN as i128), NumBound::Int(i8::MAX as i128)),
            Self::U8 => (NumBound::UInt(0), NumBound::UInt(u8::MAX as u128)),
            Self::I16 => (NumBound::Int(i16::MIN as i128), NumBound::Int(i16::MAX as i128)),
            Self::U16 => (NumBound::UInt(0), NumBound::UInt(u16::MAX as u128)),
            Self::I32 => (NumBound::Int(i32::MIN as i128), NumBound::Int(i32::MAX as i128)),
            Self::U32 => (NumBound::UInt(0), NumBound::UInt(u32::MAX as u128)),
            Self::I64 => (NumBound::Int(i64::MIN as i128), NumBound::Int(i64::MAX as i128)),
            Self::U64 => (NumBound::UInt(0), NumBound::UInt(u64::MAX as u128)),
            Self::F32 => (NumBound::Float(f32::MIN as f64), NumBound::Float(f32::MAX as f64)),
            Self::F64 => (NumBound::Float(f64::MIN), NumBound::Float(f64::MAX)),
        }
    }

    pub fn natural_default(&self) -> NumBound {
        if self.is_float() {
            NumBound::Float(0.0)
        } else if self.is_unsigned() {
            NumBound::UInt(0)
        } else {
            NumBound::Int(0)
        }
    }

    pub fn byte_size(&self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

/// A numeric bound or value. 64-bit kinds carry it in `i128`/`u128` so the
/// full signed/unsigned extreme is representable without precision loss
/// (which an `f64`-only representation would suffer for `U64`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumBound {
    Int(i128),
    UInt(u128),
    Float(f64),
}

impl NumBound {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::UInt(u) => *u as f64,
            Self::Float(f) => *f,
        }
    }
}

/// Parse a `lowerBorder`/`upperBorder`/`default` attribute value for the
/// given numeric kind.
pub fn parse_num_bound(kind: NumericKind, s: &str) -> Option<NumBound> {
    let s = s.trim();
    if kind.is_float() {
        s.parse::<f64>().ok().map(NumBound::Float)
    } else if kind.is_unsigned() {
        s.parse::<u128>().ok().map(NumBound::UInt)
    } else {
        s.parse::<i128>().ok().map(NumBound::Int)
    }
}
