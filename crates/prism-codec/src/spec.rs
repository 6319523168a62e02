//! The field-spec trait and schema plumbing
//!
//! A `Spec` is one unit of wire representation: it knows how to write a
//! `Value` into a `Writer` and how to read one back out of a `Reader`,
//! given the context of what has been decoded so far. Every spec produces a
//! deterministic byte length for a given value, or is explicitly
//! length-prefixed or greedy; there is no ambiguity between "more data" and
//! "end of field".

use std::fmt;
use std::sync::{Arc, OnceLock};

use prism_core::{PrismError, PrismResult};

use crate::buffer::{Reader, Writer};
use crate::context::Context;
use crate::value::{DecodeMode, Value};

/// One unit of wire representation
pub trait Spec: fmt::Debug + Send + Sync {
    /// Append the value's wire bytes
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()>;

    /// Consume the value's wire bytes
    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value>;
}

/// Shared handle to a spec; schemas are built once and referenced freely
pub type SpecRef = Arc<dyn Spec>;

/// Encode a top-level value with a fresh root context
pub fn encode(spec: &dyn Spec, value: &Value, writer: &mut Writer) -> PrismResult<()> {
    spec.encode(value, writer, &Context::top())
}

/// Decode a top-level value with a fresh root context
pub fn decode(spec: &dyn Spec, reader: &mut Reader, mode: DecodeMode) -> PrismResult<Value> {
    spec.decode(reader, &Context::top(), mode)
}

/// Two-phase cell for mutually recursive or forward-declared schemas
///
/// Declare the placeholder first, wire it into dependent schemas, then
/// `resolve` it exactly once when the full dependency graph is known. Using
/// an unresolved placeholder is a schema-construction error, reported as
/// `SchemaMismatch` rather than a panic.
pub struct Placeholder {
    name: &'static str,
    cell: OnceLock<SpecRef>,
}

impl Placeholder {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Placeholder {
            name,
            cell: OnceLock::new(),
        })
    }

    /// Supply the real spec; the first resolution wins and later ones fail
    pub fn resolve(&self, spec: SpecRef) -> PrismResult<()> {
        self.cell
            .set(spec)
            .map_err(|_| PrismError::SchemaMismatch {
                expected: format!("unresolved placeholder '{}'", self.name),
                actual: "already resolved".into(),
            })
    }

    fn get(&self) -> PrismResult<&SpecRef> {
        self.cell.get().ok_or_else(|| PrismError::SchemaMismatch {
            expected: format!("resolved schema '{}'", self.name),
            actual: "unresolved placeholder".into(),
        })
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Placeholder({}, {})",
            self.name,
            if self.cell.get().is_some() {
                "resolved"
            } else {
                "unresolved"
            }
        )
    }
}

impl Spec for Placeholder {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        self.get()?.encode(value, writer, ctx)
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        self.get()?.decode(reader, ctx, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::IntSpec;

    #[test]
    fn test_placeholder_two_phase() {
        let cell = Placeholder::new("inner");
        let as_spec: SpecRef = cell.clone();

        // Unresolved use is an error, not a panic
        let mut r = Reader::little(&[0x05]);
        assert!(decode(as_spec.as_ref(), &mut r, DecodeMode::Rich).is_err());

        cell.resolve(Arc::new(IntSpec::U8)).unwrap();
        let mut r = Reader::little(&[0x05]);
        let v = decode(as_spec.as_ref(), &mut r, DecodeMode::Rich).unwrap();
        assert_eq!(v, Value::U8(5));

        // Double resolution is rejected
        assert!(cell.resolve(Arc::new(IntSpec::U8)).is_err());
    }
}
