//! Value adapters
//!
//! An adapter wraps a child spec and transforms between the wire-level
//! value and a richer decoded representation (booleans, named enumerators,
//! flag sets) without changing the wire shape.

use std::sync::Arc;

use prism_core::{PrismError, PrismResult};

use crate::buffer::{Reader, Writer};
use crate::context::Context;
use crate::spec::{Spec, SpecRef};
use crate::value::{DecodeMode, Value};

/// Transform between a rich value and its wire-level child value
pub trait Adapter: std::fmt::Debug + Send + Sync {
    /// Rich value -> child value, ahead of the child's encode
    fn encode(&self, value: &Value, ctx: &Context) -> PrismResult<Value>;

    /// Child value -> rich (or plain) value, after the child's decode
    fn decode(&self, child: Value, ctx: &Context, mode: DecodeMode) -> PrismResult<Value>;
}

/// A child spec with an adapter layered over it
#[derive(Debug)]
pub struct Adapted {
    child: SpecRef,
    adapter: Arc<dyn Adapter>,
}

impl Adapted {
    pub fn new(child: SpecRef, adapter: Arc<dyn Adapter>) -> Self {
        Adapted { child, adapter }
    }
}

/// Convenience constructor for an adapted spec
pub fn adapted(child: SpecRef, adapter: impl Adapter + 'static) -> SpecRef {
    Arc::new(Adapted::new(child, Arc::new(adapter)))
}

impl Spec for Adapted {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        let child_value = self.adapter.encode(value, ctx)?;
        self.child.encode(&child_value, writer, ctx)
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let child_value = self.child.decode(reader, ctx, mode)?;
        self.adapter.decode(child_value, ctx, mode)
    }
}

/// Boolean over any integer primitive (non-zero means true)
#[derive(Clone, Copy, Debug, Default)]
pub struct BoolAdapter;

impl Adapter for BoolAdapter {
    fn encode(&self, value: &Value, _ctx: &Context) -> PrismResult<Value> {
        match value {
            Value::Bool(b) => Ok(Value::U64(*b as u64)),
            // Already-raw integers pass through untouched
            other if other.as_wide().is_some() => Ok(other.clone()),
            other => Err(PrismError::SchemaMismatch {
                expected: "bool".into(),
                actual: other.kind().into(),
            }),
        }
    }

    fn decode(&self, child: Value, _ctx: &Context, _mode: DecodeMode) -> PrismResult<Value> {
        let raw = child.as_wide().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "integer".into(),
            actual: child.kind().into(),
        })?;
        Ok(Value::Bool(raw != 0))
    }
}

/// Named enumeration over an integer primitive
///
/// Decode is permissive: a raw value with no mapping comes back as the raw
/// integer, never an error. Encode of an unknown lookup name fails fast.
#[derive(Debug)]
pub struct EnumAdapter {
    entries: Vec<(&'static str, u64)>,
}

impl EnumAdapter {
    pub fn new(entries: &[(&'static str, u64)]) -> Self {
        EnumAdapter {
            entries: entries.to_vec(),
        }
    }

    fn name_of(&self, raw: u64) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == raw)
            .map(|(n, _)| *n)
    }

    fn value_of(&self, name: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

impl Adapter for EnumAdapter {
    fn encode(&self, value: &Value, _ctx: &Context) -> PrismResult<Value> {
        match value {
            Value::Enum { raw, .. } => Ok(Value::U64(*raw)),
            Value::Str(name) => match self.value_of(name) {
                Some(raw) => Ok(Value::U64(raw)),
                None => Err(PrismError::UnknownVariant(format!(
                    "enum name '{name}' not in enumeration"
                ))),
            },
            other if other.as_wide().is_some() => Ok(other.clone()),
            other => Err(PrismError::SchemaMismatch {
                expected: "enum, name, or integer".into(),
                actual: other.kind().into(),
            }),
        }
    }

    fn decode(&self, child: Value, _ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let raw = match child.as_u64() {
            Some(raw) => raw,
            None => {
                return Err(PrismError::SchemaMismatch {
                    expected: "integer".into(),
                    actual: child.kind().into(),
                })
            }
        };
        match (self.name_of(raw), mode) {
            (Some(name), DecodeMode::Rich) => Ok(Value::Enum { name, raw }),
            (Some(name), DecodeMode::Plain) => Ok(Value::Str(name.into())),
            // Out-of-range values are tolerated as raw integers
            (None, _) => Ok(child),
        }
    }
}

/// Named flag set over an integer primitive
///
/// Decode partitions unknown high bits into a numeric residual rather than
/// dropping them; encode composes from a name list, a decoded flag set, or
/// an already-packed integer.
#[derive(Debug)]
pub struct FlagsAdapter {
    entries: Vec<(&'static str, u64)>,
}

impl FlagsAdapter {
    pub fn new(entries: &[(&'static str, u64)]) -> Self {
        FlagsAdapter {
            entries: entries.to_vec(),
        }
    }

    fn known_mask(&self) -> u64 {
        self.entries.iter().fold(0, |acc, (_, bit)| acc | bit)
    }

    fn compose(&self, names: &[Value]) -> PrismResult<u64> {
        let mut raw = 0u64;
        for name in names {
            match name {
                Value::Str(s) => match self.entries.iter().find(|(n, _)| n == s) {
                    Some((_, bit)) => raw |= bit,
                    None => {
                        return Err(PrismError::UnknownVariant(format!(
                            "flag name '{s}' not in flag set"
                        )))
                    }
                },
                other => match other.as_u64() {
                    Some(bits) => raw |= bits,
                    None => {
                        return Err(PrismError::SchemaMismatch {
                            expected: "flag name or bits".into(),
                            actual: other.kind().into(),
                        })
                    }
                },
            }
        }
        Ok(raw)
    }
}

impl Adapter for FlagsAdapter {
    fn encode(&self, value: &Value, _ctx: &Context) -> PrismResult<Value> {
        match value {
            Value::Flags { raw, .. } => Ok(Value::U64(*raw)),
            Value::List(names) => Ok(Value::U64(self.compose(names)?)),
            other if other.as_u64().is_some() => Ok(other.clone()),
            other => Err(PrismError::SchemaMismatch {
                expected: "flags, name list, or integer".into(),
                actual: other.kind().into(),
            }),
        }
    }

    fn decode(&self, child: Value, _ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let raw = child.as_u64().ok_or_else(|| PrismError::SchemaMismatch {
            expected: "integer".into(),
            actual: child.kind().into(),
        })?;
        if mode == DecodeMode::Plain {
            return Ok(child);
        }
        let names = self
            .entries
            .iter()
            .filter(|(_, bit)| raw & bit == *bit && *bit != 0)
            .map(|(n, _)| *n)
            .collect();
        Ok(Value::Flags {
            raw,
            names,
            residual: raw & !self.known_mask(),
        })
    }
}
