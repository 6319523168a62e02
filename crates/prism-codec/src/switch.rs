//! Variant dispatch specs
//!
//! Four ways a field's shape can depend on something else:
//! - `ContextSwitch`: on a discriminant already decoded elsewhere
//! - `EnumSwitch` / `FlagSwitch`: on an inline discriminant written
//!   immediately before the body
//! - `LengthSwitch`: on the number of bytes remaining in the buffer, for
//!   formats with no explicit discriminant on the wire
//! - `OptionalFlagged`: present iff a named bit in a sibling flag field

use std::fmt;

use prism_core::{PrismError, PrismResult};

use crate::buffer::{Reader, Writer};
use crate::context::Context;
use crate::primitives::IntSpec;
use crate::spec::{Spec, SpecRef};
use crate::value::{DecodeMode, Value, ValueMap};

/// Field name carrying the inline discriminant in a switch's decoded map
pub const TAG_FIELD: &str = "tag";
/// Field name carrying the selected branch's value
pub const VALUE_FIELD: &str = "value";
/// Field name carrying the length-switch branch tag
pub const VARIANT_FIELD: &str = "variant";
/// Field name carrying a flag switch's raw discriminant
pub const FLAGS_FIELD: &str = "flags";

/// Discriminant key for context-driven dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchKey {
    U64(u64),
    Str(&'static str),
    /// Fallback entry matched when no concrete key does
    Missing,
}

/// Dispatch on a discriminant computed from the context
pub struct ContextSwitch {
    label: &'static str,
    selector: Box<dyn Fn(&Context) -> SwitchKey + Send + Sync>,
    branches: Vec<(SwitchKey, SpecRef)>,
}

impl ContextSwitch {
    pub fn new(
        label: &'static str,
        selector: impl Fn(&Context) -> SwitchKey + Send + Sync + 'static,
        branches: Vec<(SwitchKey, SpecRef)>,
    ) -> Self {
        ContextSwitch {
            label,
            selector: Box::new(selector),
            branches,
        }
    }

    /// Common case: the discriminant is a sibling or ancestor field
    pub fn on_field(
        label: &'static str,
        field: &'static str,
        branches: Vec<(SwitchKey, SpecRef)>,
    ) -> Self {
        ContextSwitch::new(
            label,
            move |ctx| match ctx.lookup(field).and_then(Value::discriminant_bits) {
                Some(bits) => SwitchKey::U64(bits),
                None => SwitchKey::Missing,
            },
            branches,
        )
    }

    fn select(&self, key: SwitchKey) -> PrismResult<&SpecRef> {
        self.branches
            .iter()
            .find(|(k, _)| *k == key)
            .or_else(|| self.branches.iter().find(|(k, _)| *k == SwitchKey::Missing))
            .map(|(_, spec)| spec)
            .ok_or_else(|| {
                PrismError::UnknownVariant(format!("{}: no branch for {key:?}", self.label))
            })
    }
}

impl fmt::Debug for ContextSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextSwitch({}, {} branches)", self.label, self.branches.len())
    }
}

impl Spec for ContextSwitch {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        self.select((self.selector)(ctx))?.encode(value, writer, ctx)
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        self.select((self.selector)(ctx))?.decode(reader, ctx, mode)
    }
}

/// Inline enum discriminant followed by the single active branch
#[derive(Debug)]
pub struct EnumSwitch {
    label: &'static str,
    discriminant: IntSpec,
    branches: Vec<(u64, SpecRef)>,
    fallback: Option<SpecRef>,
}

impl EnumSwitch {
    pub fn new(label: &'static str, discriminant: IntSpec, branches: Vec<(u64, SpecRef)>) -> Self {
        EnumSwitch {
            label,
            discriminant,
            branches,
            fallback: None,
        }
    }

    /// Branch taken when no declared discriminant value matches
    pub fn with_fallback(mut self, spec: SpecRef) -> Self {
        self.fallback = Some(spec);
        self
    }

    fn select(&self, tag: u64) -> PrismResult<&SpecRef> {
        self.branches
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, spec)| spec)
            .or(self.fallback.as_ref())
            .ok_or_else(|| {
                PrismError::UnknownVariant(format!("{}: no branch for tag {tag}", self.label))
            })
    }
}

impl Spec for EnumSwitch {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        let map = value.expect_map()?;
        let tag = map
            .get(TAG_FIELD)
            .and_then(Value::as_u64)
            .ok_or_else(|| PrismError::SchemaMismatch {
                expected: format!("'{TAG_FIELD}' field"),
                actual: "missing".into(),
            })?;
        let body = map.get(VALUE_FIELD).ok_or_else(|| PrismError::SchemaMismatch {
            expected: format!("'{VALUE_FIELD}' field"),
            actual: "missing".into(),
        })?;
        self.discriminant.write_wide(writer, tag as i128)?;
        self.select(tag)?.encode(body, writer, ctx)
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let tag = self.discriminant.read_wide(reader)? as u64;
        let body = self.select(tag)?.decode(reader, ctx, mode)?;
        let mut map = ValueMap::new();
        map.insert(TAG_FIELD, self.discriminant.wrap(tag as i128));
        map.insert(VALUE_FIELD, body);
        Ok(Value::Map(map))
    }
}

/// One bit-gated section of a flag switch
#[derive(Debug)]
pub struct FlagBranch {
    pub bit: u64,
    pub name: &'static str,
    pub spec: SpecRef,
}

/// Inline flag discriminant followed by zero or more gated sections
///
/// Each section is present iff its bit is set, and sections appear on the
/// wire in declared order regardless of bit positions.
#[derive(Debug)]
pub struct FlagSwitch {
    discriminant: IntSpec,
    branches: Vec<FlagBranch>,
}

impl FlagSwitch {
    pub fn new(discriminant: IntSpec, branches: Vec<FlagBranch>) -> Self {
        FlagSwitch {
            discriminant,
            branches,
        }
    }
}

impl Spec for FlagSwitch {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        let map = value.expect_map()?;
        // Unknown high bits from a previous decode are preserved
        let mut raw = map
            .get(FLAGS_FIELD)
            .and_then(Value::discriminant_bits)
            .unwrap_or(0);
        for branch in &self.branches {
            if matches!(map.get(branch.name), Some(v) if !v.is_absent()) {
                raw |= branch.bit;
            }
        }
        self.discriminant.write_wide(writer, raw as i128)?;
        for branch in &self.branches {
            if raw & branch.bit != 0 {
                let body = map.get(branch.name).filter(|v| !v.is_absent()).ok_or_else(
                    || PrismError::SchemaMismatch {
                        expected: format!("section '{}' (bit set)", branch.name),
                        actual: "missing".into(),
                    },
                )?;
                branch.spec.encode(body, writer, ctx)?;
            }
        }
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let raw = self.discriminant.read_wide(reader)? as u64;
        let mut map = ValueMap::new();
        map.insert(FLAGS_FIELD, self.discriminant.wrap(raw as i128));
        for branch in &self.branches {
            let value = if raw & branch.bit != 0 {
                let section_ctx = ctx.nest_map(&map);
                branch.spec.decode(reader, &section_ctx, mode)?
            } else {
                Value::Absent
            };
            map.insert(branch.name, value);
        }
        Ok(Value::Map(map))
    }
}

/// One exact-size branch of a length switch
#[derive(Debug)]
pub struct LengthBranch {
    pub len: usize,
    pub tag: &'static str,
    pub spec: SpecRef,
}

/// Dispatch purely on the bytes remaining in the current sub-buffer
///
/// Decode picks the branch whose exact byte count matches (or a designated
/// catch-all); encode picks the branch named by the variant tag carried
/// alongside the value.
#[derive(Debug)]
pub struct LengthSwitch {
    label: &'static str,
    branches: Vec<LengthBranch>,
    catch_all: Option<LengthBranch>,
}

impl LengthSwitch {
    pub fn new(label: &'static str, branches: Vec<LengthBranch>) -> Self {
        LengthSwitch {
            label,
            branches,
            catch_all: None,
        }
    }

    /// Branch taken when no exact byte count matches (`len` is ignored)
    pub fn with_catch_all(mut self, tag: &'static str, spec: SpecRef) -> Self {
        self.catch_all = Some(LengthBranch { len: 0, tag, spec });
        self
    }
}

impl Spec for LengthSwitch {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        let map = value.expect_map()?;
        let tag = map
            .get(VARIANT_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| PrismError::SchemaMismatch {
                expected: format!("'{VARIANT_FIELD}' field"),
                actual: "missing".into(),
            })?;
        let body = map.get(VALUE_FIELD).ok_or_else(|| PrismError::SchemaMismatch {
            expected: format!("'{VALUE_FIELD}' field"),
            actual: "missing".into(),
        })?;
        let branch = self
            .branches
            .iter()
            .chain(self.catch_all.as_ref())
            .find(|b| b.tag == tag)
            .ok_or_else(|| {
                PrismError::UnknownVariant(format!("{}: no branch tagged '{tag}'", self.label))
            })?;
        branch.spec.encode(body, writer, ctx)
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let remaining = reader.remaining();
        let branch = self
            .branches
            .iter()
            .find(|b| b.len == remaining)
            .or(self.catch_all.as_ref())
            .ok_or_else(|| {
                PrismError::UnknownVariant(format!(
                    "{}: no branch for {remaining}-byte payload",
                    self.label
                ))
            })?;
        let body = branch.spec.decode(reader, ctx, mode)?;
        let mut map = ValueMap::new();
        map.insert(VARIANT_FIELD, Value::Str(branch.tag.into()));
        map.insert(VALUE_FIELD, body);
        Ok(Value::Map(map))
    }
}

/// A field present iff a named bit in an already-decoded sibling is set
///
/// Absent fields decode to `Absent` and encode to nothing, on both paths.
/// Declare such fields with the template's optional marker so an absent
/// value is skipped rather than treated as a missing required field.
#[derive(Debug)]
pub struct OptionalFlagged {
    flag_field: &'static str,
    bit: u64,
    inner: SpecRef,
}

impl OptionalFlagged {
    pub fn new(flag_field: &'static str, bit: u64, inner: SpecRef) -> Self {
        OptionalFlagged {
            flag_field,
            bit,
            inner,
        }
    }

    fn is_set(&self, ctx: &Context) -> PrismResult<bool> {
        let bits = ctx
            .lookup(self.flag_field)
            .and_then(Value::discriminant_bits)
            .ok_or_else(|| PrismError::SchemaMismatch {
                expected: format!("decoded flag field '{}'", self.flag_field),
                actual: "missing".into(),
            })?;
        Ok(bits & self.bit != 0)
    }
}

impl Spec for OptionalFlagged {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        if !self.is_set(ctx)? {
            return Ok(());
        }
        if value.is_absent() {
            return Err(PrismError::SchemaMismatch {
                expected: format!("value (bit set in '{}')", self.flag_field),
                actual: "absent".into(),
            });
        }
        self.inner.encode(value, writer, ctx)
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        if self.is_set(ctx)? {
            self.inner.decode(reader, ctx, mode)
        } else {
            Ok(Value::Absent)
        }
    }
}
