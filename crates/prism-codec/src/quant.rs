//! Quantized float codecs
//!
//! Lossy linear mapping of `[lower, upper]` onto an integer primitive's
//! full representable range. The integer side is lossless:
//! `encode(decode(i)) == i` for every representable `i`. When the domain
//! midpoint sits at zero (within one step), the codec is zero-median: the
//! two integers straddling the midpoint decode to signed zero, and encode
//! of a snap-zone value nudges by half a step toward its sign so exact 0.0
//! has a canonical wire representation per side.

use prism_core::{PrismError, PrismResult, Quaternion, Vector3};

use crate::buffer::{Reader, Writer};
use crate::context::Context;
use crate::primitives::IntSpec;
use crate::spec::Spec;
use crate::value::{DecodeMode, Value};

/// Float quantized onto an integer primitive
#[derive(Clone, Copy, Debug)]
pub struct QuantizedFloat {
    int: IntSpec,
    lower: f64,
    upper: f64,
    zero_median: bool,
}

impl QuantizedFloat {
    /// Construct with zero-median auto-detection
    pub fn new(int: IntSpec, lower: f32, upper: f32) -> Self {
        let mut q = QuantizedFloat {
            int,
            lower: lower as f64,
            upper: upper as f64,
            zero_median: false,
        };
        let midpoint = (q.lower + q.upper) / 2.0;
        q.zero_median = midpoint.abs() < q.step();
        q
    }

    /// Construct with an explicit zero-median setting
    pub fn with_zero_median(int: IntSpec, lower: f32, upper: f32, zero_median: bool) -> Self {
        let mut q = QuantizedFloat::new(int, lower, upper);
        q.zero_median = zero_median;
        q
    }

    pub fn zero_median(&self) -> bool {
        self.zero_median
    }

    /// Size of one quantization step in domain units
    pub fn step(&self) -> f64 {
        (self.upper - self.lower) / (self.int.wide_max() - self.int.wide_min()) as f64
    }

    /// Raw integer -> domain value
    pub fn decode_raw(&self, raw: i128) -> f32 {
        let step = self.step();
        let v = self.lower + (raw - self.int.wide_min()) as f64 * step;
        if self.zero_median && v.abs() < step {
            // Snap to signed zero so the side survives a re-encode
            return if v < 0.0 { -0.0 } else { 0.0 };
        }
        v as f32
    }

    /// Domain value -> raw integer
    pub fn encode_raw(&self, value: f32) -> i128 {
        let step = self.step();
        let mut v = (value as f64).clamp(self.lower, self.upper);
        if self.zero_median && v.abs() < step {
            // Snap-zone values carry only their sign; the half-step nudge
            // lands them on the correct side of the midpoint.
            v += if v.is_sign_negative() {
                -step * 0.5
            } else {
                step * 0.5
            };
        }
        let raw = ((v - self.lower) / step).round() as i128 + self.int.wide_min();
        raw.clamp(self.int.wide_min(), self.int.wide_max())
    }
}

impl Spec for QuantizedFloat {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let v = value.as_f32().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "f32".into(),
            actual: value.kind().into(),
        })?;
        self.int.write_wide(writer, self.encode_raw(v))
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let raw = self.int.read_wide(reader)?;
        Ok(Value::F32(self.decode_raw(raw)))
    }
}

/// Three equally-quantized components decoded as a vector
#[derive(Clone, Copy, Debug)]
pub struct QuantizedVec3 {
    pub component: QuantizedFloat,
}

impl QuantizedVec3 {
    pub fn new(component: QuantizedFloat) -> Self {
        QuantizedVec3 { component }
    }
}

impl Spec for QuantizedVec3 {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let v = value
            .as_vector3()
            .ok_or_else(|| PrismError::SchemaMismatch {
                expected: "vector3".into(),
                actual: value.kind().into(),
            })?;
        for component in [v.x, v.y, v.z] {
            self.component
                .int
                .write_wide(writer, self.component.encode_raw(component))?;
        }
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let x = self.component.decode_raw(self.component.int.read_wide(reader)?);
        let y = self.component.decode_raw(self.component.int.read_wide(reader)?);
        let z = self.component.decode_raw(self.component.int.read_wide(reader)?);
        Ok(Value::Vector3(Vector3::new(x, y, z)))
    }
}

/// Four equally-quantized components decoded as a quaternion
///
/// The decoded quaternion keeps the raw dequantized components (not
/// renormalized), so decode-then-encode reproduces the original bytes;
/// consumers normalize at the point of use.
#[derive(Clone, Copy, Debug)]
pub struct QuantizedQuat {
    pub component: QuantizedFloat,
}

impl QuantizedQuat {
    pub fn new(component: QuantizedFloat) -> Self {
        QuantizedQuat { component }
    }
}

impl Spec for QuantizedQuat {
    fn encode(&self, value: &Value, writer: &mut Writer, _ctx: &Context) -> PrismResult<()> {
        let q = value
            .as_quaternion()
            .ok_or_else(|| PrismError::SchemaMismatch {
                expected: "quaternion".into(),
                actual: value.kind().into(),
            })?;
        for component in [q.x, q.y, q.z, q.w] {
            self.component
                .int
                .write_wide(writer, self.component.encode_raw(component))?;
        }
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let x = self.component.decode_raw(self.component.int.read_wide(reader)?);
        let y = self.component.decode_raw(self.component.int.read_wide(reader)?);
        let z = self.component.decode_raw(self.component.int.read_wide(reader)?);
        let w = self.component.decode_raw(self.component.int.read_wide(reader)?);
        Ok(Value::Quaternion(Quaternion::new(x, y, z, w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_median_autodetect() {
        assert!(QuantizedFloat::new(IntSpec::U8, -1.0, 1.0).zero_median());
        assert!(QuantizedFloat::new(IntSpec::U16, -256.0, 256.0).zero_median());
        assert!(!QuantizedFloat::new(IntSpec::U8, 0.0, 1.0).zero_median());
        assert!(!QuantizedFloat::new(IntSpec::U16, 50.0, 500.0).zero_median());
    }

    #[test]
    fn test_integer_roundtrip_exhaustive_u8() {
        for q in [
            QuantizedFloat::new(IntSpec::U8, -1.0, 1.0),
            QuantizedFloat::new(IntSpec::U8, -64.0, 64.0),
            QuantizedFloat::new(IntSpec::U8, 0.0, 1.0),
        ] {
            for raw in 0..=255i128 {
                assert_eq!(q.encode_raw(q.decode_raw(raw)), raw, "{q:?} raw={raw}");
            }
        }
    }

    #[test]
    fn test_integer_roundtrip_exhaustive_i8() {
        let q = QuantizedFloat::new(IntSpec::I8, -1.0, 1.0);
        for raw in -128..=127i128 {
            assert_eq!(q.encode_raw(q.decode_raw(raw)), raw);
        }
    }

    #[test]
    fn test_zero_snaps_signed() {
        let q = QuantizedFloat::new(IntSpec::U8, -1.0, 1.0);
        let below = q.decode_raw(127);
        let above = q.decode_raw(128);
        assert_eq!(below, 0.0);
        assert_eq!(above, 0.0);
        assert!(below.is_sign_negative());
        assert!(!above.is_sign_negative());
        // Exact zero has one canonical representation per side
        assert_eq!(q.encode_raw(0.0), 128);
        assert_eq!(q.encode_raw(-0.0), 127);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let q = QuantizedFloat::new(IntSpec::U16, -128.0, 128.0);
        assert_eq!(q.encode_raw(1e6), 65535);
        assert_eq!(q.encode_raw(-1e6), 0);
    }

    proptest! {
        #[test]
        fn prop_u16_integer_roundtrip(raw in 0..=65535i128) {
            let q = QuantizedFloat::new(IntSpec::U16, -256.0, 256.0);
            prop_assert_eq!(q.encode_raw(q.decode_raw(raw)), raw);
        }

        #[test]
        fn prop_float_roundtrip_within_one_step(f in -255.9f32..255.9) {
            let q = QuantizedFloat::new(IntSpec::U16, -256.0, 256.0);
            let decoded = q.decode_raw(q.encode_raw(f));
            prop_assert!((decoded as f64 - f as f64).abs() <= q.step());
        }

        #[test]
        fn prop_asymmetric_float_roundtrip(f in 0.01f32..63.9) {
            let q = QuantizedFloat::new(IntSpec::U8, 0.0, 64.0);
            let decoded = q.decode_raw(q.encode_raw(f));
            prop_assert!((decoded as f64 - f as f64).abs() <= q.step());
        }
    }
}
