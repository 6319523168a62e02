//! Subfield decoder registry
//!
//! Some fields of the outer self-describing container format carry opaque
//! byte blobs whose shape the container cannot express. This registry maps
//! (message, block, field) to a decoder for such a blob, with three
//! strategies: a fixed template, a discriminant-keyed choice with
//! structural fallback, and a flag-gated concatenation of sub-templates.
//!
//! A failed or missing lookup never fails the outer decode: it yields the
//! `Untyped` sentinel and the blob rides along as raw bytes. The registry
//! is built once at session startup and passed by reference; there is no
//! ambient global table.

use std::collections::HashMap;

use prism_core::{PrismError, PrismResult};
use tracing::{debug, warn};

use crate::buffer::{Endian, Reader};
use crate::context::Context;
use crate::spec::SpecRef;
use crate::value::{DecodeMode, Value, ValueMap};

/// Registry key: outer message, field group, field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubfieldKey {
    pub message: &'static str,
    pub block: &'static str,
    pub field: &'static str,
}

impl SubfieldKey {
    pub fn new(message: &'static str, block: &'static str, field: &'static str) -> Self {
        SubfieldKey {
            message,
            block,
            field,
        }
    }
}

/// One discriminant-keyed candidate shape
#[derive(Debug)]
pub struct SubfieldBranch {
    pub key: u64,
    /// Exact encoded size, when the shape has one; used for structural
    /// matching when the discriminant does not decode cleanly
    pub fixed_len: Option<usize>,
    pub spec: SpecRef,
}

/// How a registered subfield resolves its blob
#[derive(Debug)]
pub enum SubfieldStrategy {
    /// Always the same inner shape
    Single(SpecRef),
    /// Chosen by a sibling field's value, with optional best-effort
    /// structural matching when that fails
    Keyed {
        discriminant: &'static str,
        branches: Vec<SubfieldBranch>,
        structural_fallback: bool,
    },
    /// Each set bit of a sibling flag field contributes one sub-template's
    /// fields, concatenated in declared order
    Flagged {
        flag_field: &'static str,
        branches: Vec<(u64, SpecRef)>,
    },
}

/// Read-only-after-init table of subfield decoders
#[derive(Debug, Default)]
pub struct SubfieldRegistry {
    table: HashMap<SubfieldKey, SubfieldStrategy>,
}

impl SubfieldRegistry {
    pub fn new() -> Self {
        SubfieldRegistry::default()
    }

    pub fn register(
        &mut self,
        message: &'static str,
        block: &'static str,
        field: &'static str,
        strategy: SubfieldStrategy,
    ) {
        self.table
            .insert(SubfieldKey::new(message, block, field), strategy);
    }

    pub fn lookup(&self, key: &SubfieldKey) -> Option<&SubfieldStrategy> {
        self.table.get(key)
    }

    /// Resolve and decode a subfield blob
    ///
    /// Never fails: anything uninterpretable comes back as the `Untyped`
    /// sentinel so the outer decode proceeds.
    pub fn decode(
        &self,
        key: SubfieldKey,
        bytes: &[u8],
        block_ctx: &Context,
        endian: Endian,
        mode: DecodeMode,
    ) -> Value {
        match self.try_decode(&key, bytes, block_ctx, endian, mode) {
            Ok(value) => value,
            Err(err) => {
                if matches!(err, PrismError::UnresolvableSubfield(_)) {
                    debug!(?key, "no subfield decoder registered");
                } else {
                    warn!(?key, %err, "subfield blob did not decode; keeping raw bytes");
                }
                Value::Untyped(bytes.to_vec().into())
            }
        }
    }

    fn try_decode(
        &self,
        key: &SubfieldKey,
        bytes: &[u8],
        block_ctx: &Context,
        endian: Endian,
        mode: DecodeMode,
    ) -> PrismResult<Value> {
        let strategy = self
            .lookup(key)
            .ok_or_else(|| PrismError::UnresolvableSubfield(format!("{key:?}")))?;
        match strategy {
            SubfieldStrategy::Single(spec) => decode_exact(spec, bytes, endian, mode),
            SubfieldStrategy::Keyed {
                discriminant,
                branches,
                structural_fallback,
            } => {
                let declared = block_ctx
                    .lookup(discriminant)
                    .and_then(Value::discriminant_bits);
                if let Some(tag) = declared {
                    if let Some(branch) = branches.iter().find(|b| b.key == tag) {
                        match decode_exact(&branch.spec, bytes, endian, mode) {
                            Ok(value) => return Ok(value),
                            Err(err) if !structural_fallback => return Err(err),
                            Err(_) => {}
                        }
                    } else if !structural_fallback {
                        return Err(PrismError::UnknownVariant(format!(
                            "{key:?}: no subfield branch for discriminant {tag}"
                        )));
                    }
                }
                if !structural_fallback {
                    return Err(PrismError::UnresolvableSubfield(format!(
                        "{key:?}: discriminant '{discriminant}' not decoded"
                    )));
                }
                // Structural pass 1: unique exact-length match
                if let Some(branch) = branches
                    .iter()
                    .find(|b| b.fixed_len == Some(bytes.len()))
                {
                    if let Ok(value) = decode_exact(&branch.spec, bytes, endian, mode) {
                        return Ok(value);
                    }
                }
                // Structural pass 2: first branch that decodes cleanly
                for branch in branches {
                    if let Ok(value) = decode_exact(&branch.spec, bytes, endian, mode) {
                        return Ok(value);
                    }
                }
                Err(PrismError::UnresolvableSubfield(format!(
                    "{key:?}: no structural match for {}-byte blob",
                    bytes.len()
                )))
            }
            SubfieldStrategy::Flagged {
                flag_field,
                branches,
            } => {
                let flags = block_ctx
                    .lookup(flag_field)
                    .and_then(Value::discriminant_bits)
                    .ok_or_else(|| {
                        PrismError::UnresolvableSubfield(format!(
                            "{key:?}: flag field '{flag_field}' not decoded"
                        ))
                    })?;
                let mut reader = Reader::new(bytes, endian);
                let mut merged = ValueMap::new();
                for (bit, spec) in branches {
                    if flags & bit == 0 {
                        continue;
                    }
                    let section = spec.decode(&mut reader, &Context::top(), mode)?;
                    match section {
                        Value::Map(map) => {
                            for (name, value) in map.iter() {
                                merged.insert(name, value.clone());
                            }
                        }
                        other => {
                            return Err(PrismError::SchemaMismatch {
                                expected: "template section".into(),
                                actual: other.kind().into(),
                            })
                        }
                    }
                }
                if !reader.is_empty() {
                    return Err(PrismError::InvalidWireFormat(format!(
                        "{} trailing bytes after flagged subfield",
                        reader.remaining()
                    )));
                }
                Ok(Value::Map(merged))
            }
        }
    }
}

/// Decode a spec over the whole blob, requiring full consumption
fn decode_exact(
    spec: &SpecRef,
    bytes: &[u8],
    endian: Endian,
    mode: DecodeMode,
) -> PrismResult<Value> {
    let mut reader = Reader::new(bytes, endian);
    let value = spec.decode(&mut reader, &Context::top(), mode)?;
    if !reader.is_empty() {
        return Err(PrismError::InvalidWireFormat(format!(
            "{} trailing bytes after subfield decode",
            reader.remaining()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::primitives::IntSpec;
    use crate::schema::TemplateBuilder;

    fn fixed_pair() -> SpecRef {
        TemplateBuilder::new()
            .field("a", Arc::new(IntSpec::U8))
            .field("b", Arc::new(IntSpec::U16))
            .build_ref()
    }

    fn single_byte() -> SpecRef {
        TemplateBuilder::new()
            .field("only", Arc::new(IntSpec::U8))
            .build_ref()
    }

    fn ctx_with_field(name: &'static str, value: Value) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert(name, value);
        map
    }

    #[test]
    fn test_single_strategy() {
        let mut registry = SubfieldRegistry::new();
        registry.register(
            "ObjectUpdate",
            "ObjectData",
            "Data",
            SubfieldStrategy::Single(fixed_pair()),
        );

        let key = SubfieldKey::new("ObjectUpdate", "ObjectData", "Data");
        let v = registry.decode(key, &[7, 0x22, 0x11], &Context::top(), Endian::Little, DecodeMode::Rich);
        let map = v.expect_map().unwrap();
        assert_eq!(map.get("a"), Some(&Value::U8(7)));
        assert_eq!(map.get("b"), Some(&Value::U16(0x1122)));
    }

    #[test]
    fn test_unregistered_yields_sentinel() {
        let registry = SubfieldRegistry::new();
        let key = SubfieldKey::new("Nope", "Nope", "Nope");
        let v = registry.decode(key, &[1, 2], &Context::top(), Endian::Little, DecodeMode::Rich);
        assert_eq!(v, Value::Untyped(vec![1, 2].into()));
    }

    #[test]
    fn test_malformed_blob_yields_sentinel() {
        let mut registry = SubfieldRegistry::new();
        registry.register(
            "M",
            "B",
            "F",
            SubfieldStrategy::Single(fixed_pair()),
        );
        let key = SubfieldKey::new("M", "B", "F");
        // One byte short of the template's shape
        let v = registry.decode(key, &[7, 0x22], &Context::top(), Endian::Little, DecodeMode::Rich);
        assert_eq!(v, Value::Untyped(vec![7, 0x22].into()));
    }

    #[test]
    fn test_keyed_strategy_by_discriminant() {
        let mut registry = SubfieldRegistry::new();
        registry.register(
            "M",
            "B",
            "F",
            SubfieldStrategy::Keyed {
                discriminant: "shape",
                branches: vec![
                    SubfieldBranch {
                        key: 1,
                        fixed_len: Some(1),
                        spec: single_byte(),
                    },
                    SubfieldBranch {
                        key: 2,
                        fixed_len: Some(3),
                        spec: fixed_pair(),
                    },
                ],
                structural_fallback: true,
            },
        );
        let key = SubfieldKey::new("M", "B", "F");

        let block = ctx_with_field("shape", Value::U8(2));
        let top = Context::top();
        let ctx = top.nest_map(&block);
        let v = registry.decode(key, &[9, 0x10, 0x00], &ctx, Endian::Little, DecodeMode::Rich);
        assert_eq!(v.expect_map().unwrap().get("a"), Some(&Value::U8(9)));
    }

    #[test]
    fn test_keyed_structural_fallback_by_length() {
        let mut registry = SubfieldRegistry::new();
        registry.register(
            "M",
            "B",
            "F",
            SubfieldStrategy::Keyed {
                discriminant: "shape",
                branches: vec![
                    SubfieldBranch {
                        key: 1,
                        fixed_len: Some(1),
                        spec: single_byte(),
                    },
                    SubfieldBranch {
                        key: 2,
                        fixed_len: Some(3),
                        spec: fixed_pair(),
                    },
                ],
                structural_fallback: true,
            },
        );
        let key = SubfieldKey::new("M", "B", "F");

        // Discriminant names a branch whose shape doesn't fit the bytes;
        // the 1-byte blob structurally matches the other branch.
        let block = ctx_with_field("shape", Value::U8(2));
        let top = Context::top();
        let ctx = top.nest_map(&block);
        let v = registry.decode(key, &[5], &ctx, Endian::Little, DecodeMode::Rich);
        assert_eq!(v.expect_map().unwrap().get("only"), Some(&Value::U8(5)));

        // Without fallback the same mismatch keeps the raw bytes
        let mut strict = SubfieldRegistry::new();
        strict.register(
            "M",
            "B",
            "F",
            SubfieldStrategy::Keyed {
                discriminant: "shape",
                branches: vec![SubfieldBranch {
                    key: 2,
                    fixed_len: Some(3),
                    spec: fixed_pair(),
                }],
                structural_fallback: false,
            },
        );
        let v = strict.decode(key, &[5], &ctx, Endian::Little, DecodeMode::Rich);
        assert_eq!(v, Value::Untyped(vec![5].into()));
    }

    #[test]
    fn test_flagged_strategy_concatenates() {
        let mut registry = SubfieldRegistry::new();
        registry.register(
            "M",
            "B",
            "F",
            SubfieldStrategy::Flagged {
                flag_field: "bits",
                branches: vec![(0x01, single_byte()), (0x02, fixed_pair())],
            },
        );
        let key = SubfieldKey::new("M", "B", "F");

        let block = ctx_with_field("bits", Value::U8(0x03));
        let top = Context::top();
        let ctx = top.nest_map(&block);
        let v = registry.decode(key, &[4, 7, 0x22, 0x11], &ctx, Endian::Little, DecodeMode::Rich);
        let map = v.expect_map().unwrap();
        assert_eq!(map.get("only"), Some(&Value::U8(4)));
        assert_eq!(map.get("a"), Some(&Value::U8(7)));
        assert_eq!(map.get("b"), Some(&Value::U16(0x1122)));

        // Only the second section present
        let block = ctx_with_field("bits", Value::U8(0x02));
        let ctx = top.nest_map(&block);
        let v = registry.decode(key, &[7, 0x22, 0x11], &ctx, Endian::Little, DecodeMode::Rich);
        let map = v.expect_map().unwrap();
        assert_eq!(map.get("only"), None);
        assert_eq!(map.get("a"), Some(&Value::U8(7)));
    }
}
