//! Decoded value model
//!
//! The codec is schema-driven rather than struct-driven, so decode produces
//! a dynamically-typed `Value`. `DecodeMode` selects between the rich
//! representation (named enumerators, flag-name sets) and a plain-old-data
//! representation for loosely-typed consumers; it is threaded explicitly
//! through every decode call so decoding stays referentially transparent.

use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use prism_core::{PrismError, PrismResult, Quaternion, Vector3, Vector4};
use uuid::Uuid;

use crate::buffer::{Endian, Reader};
use crate::context::Context;
use crate::spec::SpecRef;

/// Rich vs. plain-old-data decoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeMode {
    /// Full representation: named enumerators, flag-name sets, lazy blobs
    Rich,
    /// Interchange representation: raw integers and strings only
    Plain,
}

/// Insertion-ordered map of decoded fields
///
/// Field names come from schema declarations and are always static.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueMap {
    entries: Vec<(&'static str, Value)>,
}

impl ValueMap {
    pub const fn new() -> Self {
        ValueMap {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: &'static str, value: Value) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    /// The set of field names, in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }
}

impl FromIterator<(&'static str, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (&'static str, Value)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (n, v) in iter {
            map.insert(n, v);
        }
        map
    }
}

/// Captured-but-not-yet-decoded sub-blob
///
/// The byte range is captured during the outer decode; the inner decode is
/// deferred to first access and runs without a context, so nothing here can
/// extend the lifetime of transient decode state.
#[derive(Clone)]
pub struct LazyBlob {
    bytes: Bytes,
    inner: SpecRef,
    endian: Endian,
    mode: DecodeMode,
    cell: Arc<OnceLock<Value>>,
}

impl LazyBlob {
    pub fn new(bytes: Bytes, inner: SpecRef, endian: Endian, mode: DecodeMode) -> Self {
        LazyBlob {
            bytes,
            inner,
            endian,
            mode,
            cell: Arc::new(OnceLock::new()),
        }
    }

    /// The raw captured bytes
    pub fn raw(&self) -> &Bytes {
        &self.bytes
    }

    /// Decode the inner value, caching the result on success
    pub fn decoded(&self) -> PrismResult<&Value> {
        if let Some(v) = self.cell.get() {
            return Ok(v);
        }
        let mut reader = Reader::new(&self.bytes, self.endian);
        let value = self
            .inner
            .decode(&mut reader, &Context::top(), self.mode)?;
        // A concurrent first access may have won the race; either value is
        // identical since decoding is pure.
        let _ = self.cell.set(value);
        Ok(self.cell.get().unwrap())
    }
}

impl fmt::Debug for LazyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(v) => write!(f, "LazyBlob(decoded: {v:?})"),
            None => write!(f, "LazyBlob({} bytes)", self.bytes.len()),
        }
    }
}

impl PartialEq for LazyBlob {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

/// A decoded wire value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Bytes),
    Uuid(Uuid),
    Vector3(Vector3),
    Vector4(Vector4),
    Quaternion(Quaternion),
    List(Vec<Value>),
    Map(ValueMap),
    /// Named enumerator with its raw wire value
    Enum { name: &'static str, raw: u64 },
    /// Decoded flag set: raw wire bits, known names, and unknown residual bits
    Flags {
        raw: u64,
        names: Vec<&'static str>,
        residual: u64,
    },
    /// Captured sub-blob with deferred inner decode
    Blob(LazyBlob),
    /// Sentinel for a subfield no registered decoder could interpret
    Untyped(Bytes),
    /// Placeholder for an optional field that was not present
    Absent,
}

impl Value {
    /// Short type label for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Vector3(_) => "vector3",
            Value::Vector4(_) => "vector4",
            Value::Quaternion(_) => "quaternion",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Enum { .. } => "enum",
            Value::Flags { .. } => "flags",
            Value::Blob(_) => "blob",
            Value::Untyped(_) => "untyped",
            Value::Absent => "absent",
        }
    }

    #[inline]
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Widen any unsigned integer (or non-negative signed one) to u64
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U8(v) => Some(v as u64),
            Value::U16(v) => Some(v as u64),
            Value::U32(v) => Some(v as u64),
            Value::U64(v) => Some(v),
            Value::I8(v) if v >= 0 => Some(v as u64),
            Value::I16(v) if v >= 0 => Some(v as u64),
            Value::I32(v) if v >= 0 => Some(v as u64),
            Value::I64(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    /// Widen any integer to i128
    pub fn as_wide(&self) -> Option<i128> {
        match *self {
            Value::U8(v) => Some(v as i128),
            Value::U16(v) => Some(v as i128),
            Value::U32(v) => Some(v as i128),
            Value::U64(v) => Some(v as i128),
            Value::I8(v) => Some(v as i128),
            Value::I16(v) => Some(v as i128),
            Value::I32(v) => Some(v as i128),
            Value::I64(v) => Some(v as i128),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|v| v as f32)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Untyped(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match *self {
            Value::Uuid(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<Vector3> {
        match *self {
            Value::Vector3(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vector4(&self) -> Option<Vector4> {
        match *self {
            Value::Vector4(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_quaternion(&self) -> Option<Quaternion> {
        match *self {
            Value::Quaternion(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Bits usable as a dispatch discriminant: plain integers, decoded
    /// enums, and decoded flag sets all qualify
    pub fn discriminant_bits(&self) -> Option<u64> {
        match self {
            Value::Enum { raw, .. } => Some(*raw),
            Value::Flags { raw, .. } => Some(*raw),
            Value::Bool(b) => Some(*b as u64),
            other => other.as_u64(),
        }
    }

    /// Require a map, with a schema-mismatch error otherwise
    pub fn expect_map(&self) -> PrismResult<&ValueMap> {
        self.as_map().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "map".into(),
            actual: self.kind().into(),
        })
    }

    /// Require a list, with a schema-mismatch error otherwise
    pub fn expect_list(&self) -> PrismResult<&[Value]> {
        self.as_list().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "list".into(),
            actual: self.kind().into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_preserves_insertion_order() {
        let mut map = ValueMap::new();
        map.insert("b", Value::U8(2));
        map.insert("a", Value::U8(1));
        map.insert("c", Value::U8(3));
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_map_insert_replaces_in_place() {
        let mut map = ValueMap::new();
        map.insert("a", Value::U8(1));
        map.insert("b", Value::U8(2));
        map.insert("a", Value::U8(9));
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&Value::U8(9)));
    }

    #[test]
    fn test_integer_widening() {
        assert_eq!(Value::U16(7).as_u64(), Some(7));
        assert_eq!(Value::I8(-1).as_u64(), None);
        assert_eq!(Value::I8(-1).as_wide(), Some(-1));
        assert_eq!(Value::F32(1.0).as_u64(), None);
    }

    #[test]
    fn test_discriminant_bits() {
        assert_eq!(
            Value::Enum {
                name: "x",
                raw: 42
            }
            .discriminant_bits(),
            Some(42)
        );
        assert_eq!(
            Value::Flags {
                raw: 0b101,
                names: vec![],
                residual: 0
            }
            .discriminant_bits(),
            Some(0b101)
        );
        assert_eq!(Value::U8(3).discriminant_bits(), Some(3));
        assert_eq!(Value::Str("no".into()).discriminant_bits(), None);
    }
}
