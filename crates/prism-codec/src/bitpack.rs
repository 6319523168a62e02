//! Bit-range packing over a single integer primitive
//!
//! A named schema of (field, bit width) pairs packed
//! most-significant-field-first into the low bits of one primitive.
//! Pack and unpack mirror exactly: same order, same shift direction. A
//! schema may disable shifting, in which case each field keeps its bits in
//! place (values carry their wire position, useful for pre-shifted masks).

use std::sync::Arc;

use prism_core::{PrismError, PrismResult};

use crate::adapters::Adapter;
use crate::buffer::{Reader, Writer};
use crate::context::Context;
use crate::primitives::IntSpec;
use crate::spec::Spec;
use crate::value::{DecodeMode, Value, ValueMap};

/// One named bit range
#[derive(Debug)]
pub struct BitField {
    pub name: &'static str,
    pub bits: u32,
    pub adapter: Option<Arc<dyn Adapter>>,
}

impl BitField {
    pub fn plain(name: &'static str, bits: u32) -> Self {
        BitField {
            name,
            bits,
            adapter: None,
        }
    }

    pub fn adapted(name: &'static str, bits: u32, adapter: impl Adapter + 'static) -> Self {
        BitField {
            name,
            bits,
            adapter: Some(Arc::new(adapter)),
        }
    }
}

/// Declarative bit-packing schema
#[derive(Debug)]
pub struct BitPack {
    int: IntSpec,
    fields: Vec<BitField>,
    shifted: bool,
    total_bits: u32,
}

impl BitPack {
    pub fn new(int: IntSpec, fields: Vec<BitField>) -> PrismResult<Self> {
        Self::build(int, fields, true)
    }

    /// Schema whose field values keep their in-place bit positions
    pub fn without_shift(int: IntSpec, fields: Vec<BitField>) -> PrismResult<Self> {
        Self::build(int, fields, false)
    }

    fn build(int: IntSpec, fields: Vec<BitField>, shifted: bool) -> PrismResult<Self> {
        if let Some(field) = fields.iter().find(|f| f.bits == 0) {
            return Err(PrismError::SchemaMismatch {
                expected: "non-zero bit width".into(),
                actual: format!("0-bit field '{}'", field.name),
            });
        }
        let total_bits: u32 = fields.iter().map(|f| f.bits).sum();
        if total_bits as usize > int.width() * 8 {
            return Err(PrismError::SchemaMismatch {
                expected: format!("at most {} bits", int.width() * 8),
                actual: format!("{total_bits} bits declared"),
            });
        }
        Ok(BitPack {
            int,
            fields,
            shifted,
            total_bits,
        })
    }

    fn mask(bits: u32) -> u64 {
        if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        }
    }
}

impl Spec for BitPack {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        let map = value.expect_map()?;
        let mut raw = 0u64;
        let mut shift = self.total_bits;
        for field in &self.fields {
            shift -= field.bits;
            let field_value = map.get(field.name).ok_or_else(|| {
                PrismError::SchemaMismatch {
                    expected: format!("bit field '{}'", field.name),
                    actual: "missing".into(),
                }
            })?;
            let unpacked = match &field.adapter {
                Some(adapter) => adapter.encode(field_value, ctx)?,
                None => field_value.clone(),
            };
            let bits = unpacked.as_u64().ok_or_else(|| PrismError::SchemaMismatch {
                expected: "integer bit field".into(),
                actual: unpacked.kind().into(),
            })?;
            raw |= if self.shifted {
                (bits & Self::mask(field.bits)) << shift
            } else {
                bits & (Self::mask(field.bits) << shift)
            };
        }
        self.int.write_wide(writer, raw as i128)
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let raw = self.int.read_wide(reader)? as u64;
        let mut map = ValueMap::new();
        let mut shift = self.total_bits;
        for field in &self.fields {
            shift -= field.bits;
            let bits = if self.shifted {
                (raw >> shift) & Self::mask(field.bits)
            } else {
                raw & (Self::mask(field.bits) << shift)
            };
            let value = match &field.adapter {
                Some(adapter) => adapter.decode(Value::U64(bits), ctx, mode)?,
                None => Value::U64(bits),
            };
            map.insert(field.name, value);
        }
        Ok(Value::Map(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::BoolAdapter;
    use crate::spec::{decode, encode};

    #[test]
    fn test_msb_first_packing() {
        // version:4 | flags:3 | live:1 over one byte
        let pack = BitPack::new(
            IntSpec::U8,
            vec![
                BitField::plain("version", 4),
                BitField::plain("flags", 3),
                BitField::adapted("live", 1, BoolAdapter),
            ],
        )
        .unwrap();

        let mut r = Reader::little(&[0b1010_110_1]);
        let v = decode(&pack, &mut r, DecodeMode::Rich).unwrap();
        let map = v.expect_map().unwrap();
        assert_eq!(map.get("version"), Some(&Value::U64(0b1010)));
        assert_eq!(map.get("flags"), Some(&Value::U64(0b110)));
        assert_eq!(map.get("live"), Some(&Value::Bool(true)));

        let mut w = Writer::little();
        encode(&pack, &v, &mut w).unwrap();
        assert_eq!(w.as_slice(), &[0b1010_110_1]);
    }

    #[test]
    fn test_unshifted_fields_keep_position() {
        let pack = BitPack::without_shift(
            IntSpec::U8,
            vec![BitField::plain("high", 4), BitField::plain("low", 4)],
        )
        .unwrap();

        let mut r = Reader::little(&[0xA5]);
        let v = decode(&pack, &mut r, DecodeMode::Rich).unwrap();
        let map = v.expect_map().unwrap();
        assert_eq!(map.get("high"), Some(&Value::U64(0xA0)));
        assert_eq!(map.get("low"), Some(&Value::U64(0x05)));

        let mut w = Writer::little();
        encode(&pack, &v, &mut w).unwrap();
        assert_eq!(w.as_slice(), &[0xA5]);
    }

    #[test]
    fn test_partial_coverage_uses_low_bits() {
        let pack = BitPack::new(
            IntSpec::U16,
            vec![BitField::plain("a", 4), BitField::plain("b", 4)],
        )
        .unwrap();
        let mut w = Writer::little();
        let mut map = ValueMap::new();
        map.insert("a", Value::U64(0xF));
        map.insert("b", Value::U64(0x1));
        encode(&pack, &Value::Map(map), &mut w).unwrap();
        assert_eq!(w.as_slice(), &[0xF1, 0x00]);
    }

    #[test]
    fn test_overwide_schema_rejected() {
        let err = BitPack::new(IntSpec::U8, vec![BitField::plain("too_wide", 9)]).unwrap_err();
        assert!(matches!(err, PrismError::SchemaMismatch { .. }));
    }
}
