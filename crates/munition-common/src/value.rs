//! Engine-agnostic guest values.
//!
//! Guest arguments and results cross the runtime contract as [`Value`], a
//! mirror of the four core WebAssembly numeric types. Runtime adapters
//! convert to and from their engine-native representation at the boundary.

use serde::{Deserialize, Serialize};

/// The type of a guest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl std::fmt::Display for ValType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
        }
    }
}

/// A guest argument or result value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
}

impl Value {
    /// The type of this value.
    pub fn ty(&self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }

    /// Extract an `i32`, if that is what this value holds.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract an `i64`, if that is what this value holds.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Encode an argument list into its canonical byte form.
///
/// The encoding is a little-endian `u32` count followed by, for each value,
/// a one-byte type tag and the value's little-endian payload. It is the
/// input to argument hashing, so it must stay stable across releases.
pub fn canonical_encode(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + values.len() * 9);
    buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for value in values {
        match value {
            Value::I32(v) => {
                buf.push(0x01);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::I64(v) => {
                buf.push(0x02);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::F32(v) => {
                buf.push(0x03);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Value::F64(v) => {
                buf.push(0x04);
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    buf
}
