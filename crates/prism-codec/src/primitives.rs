//! Fixed-width primitive specs
//!
//! Integer and float codecs with the writer/reader's byte order, plus the
//! protocol's compound primitives: UUIDs, vectors, and the 12-byte packed
//! normalized quaternion.

use prism_core::{PrismError, PrismResult, Quaternion, Vector3, Vector4};
use uuid::Uuid;

use crate::buffer::{Reader, Writer};
use crate::context::Context;
use crate::spec::Spec;
use crate::value::{DecodeMode, Value};

/// Fixed-width integer primitive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntSpec {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl IntSpec {
    pub fn width(self) -> usize {
        match self {
            IntSpec::U8 | IntSpec::I8 => 1,
            IntSpec::U16 | IntSpec::I16 => 2,
            IntSpec::U32 | IntSpec::I32 => 4,
            IntSpec::U64 | IntSpec::I64 => 8,
        }
    }

    pub fn signed(self) -> bool {
        matches!(self, IntSpec::I8 | IntSpec::I16 | IntSpec::I32 | IntSpec::I64)
    }

    /// Smallest representable value
    pub fn wide_min(self) -> i128 {
        match self {
            IntSpec::U8 | IntSpec::U16 | IntSpec::U32 | IntSpec::U64 => 0,
            IntSpec::I8 => i8::MIN as i128,
            IntSpec::I16 => i16::MIN as i128,
            IntSpec::I32 => i32::MIN as i128,
            IntSpec::I64 => i64::MIN as i128,
        }
    }

    /// Largest representable value
    pub fn wide_max(self) -> i128 {
        match self {
            IntSpec::U8 => u8::MAX as i128,
            IntSpec::U16 => u16::MAX as i128,
            IntSpec::U32 => u32::MAX as i128,
            IntSpec::U64 => u64::MAX as i128,
            IntSpec::I8 => i8::MAX as i128,
            IntSpec::I16 => i16::MAX as i128,
            IntSpec::I32 => i32::MAX as i128,
            IntSpec::I64 => i64::MAX as i128,
        }
    }

    /// Largest count a length prefix of this width can represent
    pub fn max_count(self) -> u64 {
        self.wide_max() as u64
    }

    /// Read the raw integer, widened for arithmetic
    pub fn read_wide(self, reader: &mut Reader) -> PrismResult<i128> {
        Ok(match self {
            IntSpec::U8 => reader.read_u8()? as i128,
            IntSpec::U16 => reader.read_u16()? as i128,
            IntSpec::U32 => reader.read_u32()? as i128,
            IntSpec::U64 => reader.read_u64()? as i128,
            IntSpec::I8 => reader.read_i8()? as i128,
            IntSpec::I16 => reader.read_i16()? as i128,
            IntSpec::I32 => reader.read_i32()? as i128,
            IntSpec::I64 => reader.read_i64()? as i128,
        })
    }

    /// Write a widened integer, range-checked
    pub fn write_wide(self, writer: &mut Writer, v: i128) -> PrismResult<()> {
        if v < self.wide_min() || v > self.wide_max() {
            return Err(PrismError::InvalidWireFormat(format!(
                "{v} out of range for {self:?}"
            )));
        }
        match self {
            IntSpec::U8 => writer.put_u8(v as u8),
            IntSpec::U16 => writer.put_u16(v as u16),
            IntSpec::U32 => writer.put_u32(v as u32),
            IntSpec::U64 => writer.put_u64(v as u64),
            IntSpec::I8 => writer.put_i8(v as i8),
            IntSpec::I16 => writer.put_i16(v as i16),
            IntSpec::I32 => writer.put_i32(v as i32),
            IntSpec::I64 => writer.put_i64(v as i64),
        }
        Ok(())
    }

    /// Wrap a widened integer in the matching value variant
    pub fn wrap(self, v: i128) -> Value {
        match self {
            IntSpec::U8 => Value::U8(v as u8),
            IntSpec::U16 => Value::U16(v as u16),
            IntSpec::U32 => Value::U32(v as u32),
            IntSpec::U64 => Value::U64(v as u64),
            IntSpec::I8 => Value::I8(v as i8),
            IntSpec::I16 => Value::I16(v as i16),
            IntSpec::I32 => Value::I32(v as i32),
            IntSpec::I64 => Value::I64(v as i64),
        }
    }
}

impl Spec for IntSpec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let v = value.as_wide().ok_or_else(|| PrismError::SchemaMismatch {
            expected: format!("{self:?}"),
            actual: value.kind().into(),
        })?;
        self.write_wide(writer, v)
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        Ok(self.wrap(self.read_wide(reader)?))
    }
}

/// 4-byte IEEE float
#[derive(Clone, Copy, Debug, Default)]
pub struct F32Spec;

impl Spec for F32Spec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let v = value.as_f32().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "f32".into(),
            actual: value.kind().into(),
        })?;
        writer.put_f32(v);
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        Ok(Value::F32(reader.read_f32()?))
    }
}

/// 8-byte IEEE float
#[derive(Clone, Copy, Debug, Default)]
pub struct F64Spec;

impl Spec for F64Spec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let v = value.as_f64().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "f64".into(),
            actual: value.kind().into(),
        })?;
        writer.put_f64(v);
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        Ok(Value::F64(reader.read_f64()?))
    }
}

/// Fixed-length opaque byte run
#[derive(Clone, Copy, Debug)]
pub struct BytesSpec {
    pub len: usize,
}

impl BytesSpec {
    pub fn new(len: usize) -> Self {
        BytesSpec { len }
    }
}

impl Spec for BytesSpec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let bytes = value.as_bytes().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "bytes".into(),
            actual: value.kind().into(),
        })?;
        if bytes.len() != self.len {
            return Err(PrismError::SchemaMismatch {
                expected: format!("{} bytes", self.len),
                actual: format!("{} bytes", bytes.len()),
            });
        }
        writer.put_bytes(bytes);
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let bytes = reader.read_bytes(self.len)?;
        Ok(Value::Bytes(bytes.to_vec().into()))
    }
}

/// Length-prefixed opaque byte run
#[derive(Clone, Copy, Debug)]
pub struct VarBytesSpec {
    pub prefix: IntSpec,
}

impl VarBytesSpec {
    pub fn new(prefix: IntSpec) -> Self {
        VarBytesSpec { prefix }
    }
}

impl Spec for VarBytesSpec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let bytes = value.as_bytes().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "bytes".into(),
            actual: value.kind().into(),
        })?;
        if bytes.len() as u64 > self.prefix.max_count() {
            return Err(PrismError::CapacityExceeded {
                count: bytes.len(),
                max: self.prefix.max_count(),
            });
        }
        self.prefix.write_wide(writer, bytes.len() as i128)?;
        writer.put_bytes(bytes);
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let len = self.prefix.read_wide(reader)? as usize;
        let bytes = reader.read_bytes(len)?;
        Ok(Value::Bytes(bytes.to_vec().into()))
    }
}

/// Length-prefixed string
///
/// The wire form counts a trailing NUL (the simulator's text fields are
/// null-terminated inside their counted region); decode strips it.
#[derive(Clone, Copy, Debug)]
pub struct StrSpec {
    pub prefix: IntSpec,
}

impl StrSpec {
    pub fn new(prefix: IntSpec) -> Self {
        StrSpec { prefix }
    }
}

impl Spec for StrSpec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let s = value.as_str().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "str".into(),
            actual: value.kind().into(),
        })?;
        // Empty strings encode as a zero count with no terminator
        let wire_len = if s.is_empty() { 0 } else { s.len() + 1 };
        if wire_len as u64 > self.prefix.max_count() {
            return Err(PrismError::CapacityExceeded {
                count: wire_len,
                max: self.prefix.max_count(),
            });
        }
        self.prefix.write_wide(writer, wire_len as i128)?;
        if !s.is_empty() {
            writer.put_bytes(s.as_bytes());
            writer.put_u8(0);
        }
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let len = self.prefix.read_wide(reader)? as usize;
        let mut bytes = reader.read_bytes(len)?;
        if let [rest @ .., 0] = bytes {
            bytes = rest;
        }
        let s = String::from_utf8_lossy(bytes).into_owned();
        Ok(Value::Str(s))
    }
}

/// Null-terminated string with no length prefix
#[derive(Clone, Copy, Debug, Default)]
pub struct CStrSpec;

impl Spec for CStrSpec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let s = value.as_str().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "str".into(),
            actual: value.kind().into(),
        })?;
        if s.as_bytes().contains(&0) {
            return Err(PrismError::InvalidWireFormat(
                "embedded NUL in terminated string".into(),
            ));
        }
        writer.put_bytes(s.as_bytes());
        writer.put_u8(0);
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let bytes = reader.read_until(0)?;
        Ok(Value::Str(String::from_utf8_lossy(bytes).into_owned()))
    }
}

/// 16-byte UUID (byte order is part of the UUID, not the reader)
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidSpec;

impl Spec for UuidSpec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let id = value.as_uuid().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "uuid".into(),
            actual: value.kind().into(),
        })?;
        writer.put_bytes(id.as_bytes());
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let bytes: [u8; 16] = reader.read_bytes(16)?.try_into().unwrap();
        Ok(Value::Uuid(Uuid::from_bytes(bytes)))
    }
}

/// 12-byte float vector
#[derive(Clone, Copy, Debug, Default)]
pub struct Vector3Spec;

impl Spec for Vector3Spec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let v = value
            .as_vector3()
            .ok_or_else(|| PrismError::SchemaMismatch {
                expected: "vector3".into(),
                actual: value.kind().into(),
            })?;
        writer.put_f32(v.x);
        writer.put_f32(v.y);
        writer.put_f32(v.z);
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let x = reader.read_f32()?;
        let y = reader.read_f32()?;
        let z = reader.read_f32()?;
        Ok(Value::Vector3(Vector3::new(x, y, z)))
    }
}

/// 16-byte float vector (collision planes)
#[derive(Clone, Copy, Debug, Default)]
pub struct Vector4Spec;

impl Spec for Vector4Spec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let v = value
            .as_vector4()
            .ok_or_else(|| PrismError::SchemaMismatch {
                expected: "vector4".into(),
                actual: value.kind().into(),
            })?;
        writer.put_f32(v.x);
        writer.put_f32(v.y);
        writer.put_f32(v.z);
        writer.put_f32(v.w);
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let x = reader.read_f32()?;
        let y = reader.read_f32()?;
        let z = reader.read_f32()?;
        let w = reader.read_f32()?;
        Ok(Value::Vector4(Vector4::new(x, y, z, w)))
    }
}

/// 12-byte packed normalized quaternion: x/y/z on the wire, w recovered
/// from the unit constraint
#[derive(Clone, Copy, Debug, Default)]
pub struct QuaternionSpec;

impl Spec for QuaternionSpec {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let q = value
            .as_quaternion()
            .ok_or_else(|| PrismError::SchemaMismatch {
                expected: "quaternion".into(),
                actual: value.kind().into(),
            })?;
        let [x, y, z] = q.pack();
        writer.put_f32(x);
        writer.put_f32(y);
        writer.put_f32(z);
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let x = reader.read_f32()?;
        let y = reader.read_f32()?;
        let z = reader.read_f32()?;
        Ok(Value::Quaternion(Quaternion::unpack([x, y, z])))
    }
}
