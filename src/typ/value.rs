//! The generic `defaultValue` slot carried by every `Base` (§3).

use crate::transport::RawValue;
use crate::typ::numeric::NumBound;

#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    /// Composite types (struct/array) have no scalar default of their own.
    None,
    Bool(bool),
    Num(NumBound),
    Str(String),
    EnumName(String),
}

impl LeafValue {
    pub fn to_raw_value(&self) -> Option<RawValue> {
        match self {
            Self::None => None,
            Self::Bool(b) => Some(RawValue::Bool(*b)),
            Self::Num(NumBound::Int(i)) => Some(RawValue::Int(*i)),
            Self::Num(NumBound::UInt(u)) => Some(RawValue::UInt(*u)),
            Self::Num(NumBound::Float(f)) => Some(RawValue::Float(*f)),
            Self::Str(s) => Some(RawValue::Str(s.clone())),
            Self::EnumName(s) => Some(RawValue::EnumName(s.clone())),
        }
    }
}
