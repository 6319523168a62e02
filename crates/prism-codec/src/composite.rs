//! Composite specs: templates, collections, tuples, and sized sub-blobs

use bytes::Bytes;
use prism_core::{PrismError, PrismResult};
use tracing::warn;

use crate::buffer::{Reader, Writer};
use crate::context::Context;
use crate::primitives::IntSpec;
use crate::spec::{Spec, SpecRef};
use crate::value::{DecodeMode, LazyBlob, Value, ValueMap};

/// One named slot in a template
#[derive(Debug)]
pub struct TemplateField {
    pub name: &'static str,
    pub spec: SpecRef,
    /// Optional fields may produce no bytes when absent, and decode to
    /// `Absent` once the buffer is exhausted
    pub optional: bool,
}

/// Ordered mapping of field names to specs
///
/// Decode accumulates into a map that later fields can see through the
/// context, so a field may branch on an earlier sibling's decoded value.
#[derive(Debug, Default)]
pub struct Template {
    fields: Vec<TemplateField>,
}

impl Template {
    pub fn new(fields: Vec<TemplateField>) -> Self {
        Template { fields }
    }

    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    /// The declared field names, in order
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

impl Spec for Template {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        let map = value.expect_map()?;
        // Each field encodes under a fresh child context over the full
        // value container, so cross-field rules see every sibling.
        let field_ctx = ctx.nest_map(map);
        for field in &self.fields {
            match map.get(field.name) {
                Some(v) if !v.is_absent() => field.spec.encode(v, writer, &field_ctx)?,
                _ if field.optional => {}
                _ => {
                    return Err(PrismError::SchemaMismatch {
                        expected: format!("field '{}'", field.name),
                        actual: "missing".into(),
                    })
                }
            }
        }
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let mut map = ValueMap::new();
        for field in &self.fields {
            let value = if field.optional && reader.is_empty() {
                Value::Absent
            } else {
                let field_ctx = ctx.nest_map(&map);
                field.spec.decode(reader, &field_ctx, mode)?
            };
            map.insert(field.name, value);
        }
        Ok(Value::Map(map))
    }
}

/// Length policy for a collection
#[derive(Clone, Copy, Debug)]
pub enum Count {
    /// Element count fixed at schema construction
    Fixed(usize),
    /// Count read/written as a prefix primitive before the elements
    Prefixed(IntSpec),
    /// Consume elements until the buffer is exhausted. Only meaningful at
    /// the owning (final) position of its container: it has no terminator
    /// of its own.
    Greedy,
}

/// Homogeneous repeated field
#[derive(Debug)]
pub struct Collection {
    count: Count,
    element: SpecRef,
}

impl Collection {
    pub fn new(count: Count, element: SpecRef) -> Self {
        Collection { count, element }
    }
}

impl Spec for Collection {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        let list = value.expect_list()?;
        match self.count {
            Count::Fixed(n) if list.len() != n => {
                return Err(PrismError::SchemaMismatch {
                    expected: format!("{n} elements"),
                    actual: format!("{} elements", list.len()),
                })
            }
            Count::Fixed(_) | Count::Greedy => {}
            Count::Prefixed(prefix) => {
                if list.len() as u64 > prefix.max_count() {
                    return Err(PrismError::CapacityExceeded {
                        count: list.len(),
                        max: prefix.max_count(),
                    });
                }
                prefix.write_wide(writer, list.len() as i128)?;
            }
        }
        let element_ctx = ctx.nest_list(list);
        for element in list {
            self.element.encode(element, writer, &element_ctx)?;
        }
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let mut items = Vec::new();
        match self.count {
            Count::Fixed(n) => {
                for _ in 0..n {
                    let item_ctx = ctx.nest_list(&items);
                    let item = self.element.decode(reader, &item_ctx, mode)?;
                    items.push(item);
                }
            }
            Count::Prefixed(prefix) => {
                let n = prefix.read_wide(reader)? as usize;
                for _ in 0..n {
                    let item_ctx = ctx.nest_list(&items);
                    let item = self.element.decode(reader, &item_ctx, mode)?;
                    items.push(item);
                }
            }
            Count::Greedy => {
                while !reader.is_empty() {
                    let item_ctx = ctx.nest_list(&items);
                    let item = self.element.decode(reader, &item_ctx, mode)?;
                    items.push(item);
                }
            }
        }
        Ok(Value::List(items))
    }
}

/// Fixed heterogeneous sequence
#[derive(Debug)]
pub struct Tuple {
    elements: Vec<SpecRef>,
}

impl Tuple {
    pub fn new(elements: Vec<SpecRef>) -> Self {
        Tuple { elements }
    }
}

impl Spec for Tuple {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        let list = value.expect_list()?;
        if list.len() != self.elements.len() {
            return Err(PrismError::SchemaMismatch {
                expected: format!("{}-tuple", self.elements.len()),
                actual: format!("{} elements", list.len()),
            });
        }
        let element_ctx = ctx.nest_list(list);
        for (spec, element) in self.elements.iter().zip(list) {
            spec.encode(element, writer, &element_ctx)?;
        }
        Ok(())
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let mut items = Vec::with_capacity(self.elements.len());
        for spec in &self.elements {
            let item_ctx = ctx.nest_list(&items);
            let item = spec.decode(reader, &item_ctx, mode)?;
            items.push(item);
        }
        Ok(Value::List(items))
    }
}

/// How a sized blob's byte range is delimited
#[derive(Clone, Copy, Debug)]
pub enum BlobLen {
    Fixed(usize),
    Prefixed(IntSpec),
    /// The rest of the enclosing buffer
    Rest,
    /// Scan to a terminator byte (consumed, not part of the blob)
    Terminated(u8),
}

/// An inner spec confined to an isolated sub-buffer
///
/// The sub-buffer boundary makes the blob skippable: the outer decode can
/// carry an uninterpreted blob (as raw bytes) even when the inner shape is
/// unknown. In lazy mode the byte range is captured immediately and the
/// inner decode deferred to first access, without a context.
#[derive(Debug)]
pub struct SizedBlob {
    len: BlobLen,
    inner: SpecRef,
    lazy: bool,
    tolerate_trailing: bool,
}

impl SizedBlob {
    pub fn new(len: BlobLen, inner: SpecRef) -> Self {
        SizedBlob {
            len,
            inner,
            lazy: false,
            tolerate_trailing: false,
        }
    }

    /// Defer inner decode to first access
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Treat bytes left over after the inner decode as skippable padding
    pub fn tolerate_trailing(mut self) -> Self {
        self.tolerate_trailing = true;
        self
    }

    fn frame(&self, writer: &mut Writer, payload: &[u8]) -> PrismResult<()> {
        match self.len {
            BlobLen::Fixed(n) => {
                if payload.len() != n {
                    return Err(PrismError::SchemaMismatch {
                        expected: format!("{n}-byte blob"),
                        actual: format!("{} bytes", payload.len()),
                    });
                }
                writer.put_bytes(payload);
            }
            BlobLen::Prefixed(prefix) => {
                if payload.len() as u64 > prefix.max_count() {
                    return Err(PrismError::CapacityExceeded {
                        count: payload.len(),
                        max: prefix.max_count(),
                    });
                }
                prefix.write_wide(writer, payload.len() as i128)?;
                writer.put_bytes(payload);
            }
            BlobLen::Rest => writer.put_bytes(payload),
            BlobLen::Terminated(term) => {
                writer.put_bytes(payload);
                writer.put_u8(term);
            }
        }
        Ok(())
    }
}

impl Spec for SizedBlob {
    fn encode(&self, value: &Value, writer: &mut Writer, ctx: &Context) -> PrismResult<()> {
        // Captured and uninterpreted blobs round-trip byte-exactly
        let payload = match value {
            Value::Blob(blob) => return self.frame(writer, blob.raw()),
            Value::Bytes(bytes) | Value::Untyped(bytes) => return self.frame(writer, bytes),
            decoded => {
                let mut sub = Writer::new(writer.endian());
                self.inner.encode(decoded, &mut sub, ctx)?;
                sub.freeze()
            }
        };
        self.frame(writer, &payload)
    }

    fn decode(&self, reader: &mut Reader, ctx: &Context, mode: DecodeMode) -> PrismResult<Value> {
        let bytes = match self.len {
            BlobLen::Fixed(n) => reader.read_bytes(n)?,
            BlobLen::Prefixed(prefix) => {
                let n = prefix.read_wide(reader)? as usize;
                reader.read_bytes(n)?
            }
            BlobLen::Rest => reader.read_rest(),
            BlobLen::Terminated(term) => reader.read_until(term)?,
        };
        if self.lazy {
            return Ok(Value::Blob(LazyBlob::new(
                Bytes::copy_from_slice(bytes),
                self.inner.clone(),
                reader.endian(),
                mode,
            )));
        }
        let mut sub = Reader::new(bytes, reader.endian());
        let value = self.inner.decode(&mut sub, ctx, mode)?;
        if !sub.is_empty() {
            if self.tolerate_trailing {
                warn!(
                    trailing = sub.remaining(),
                    "ignoring trailing bytes after sized blob"
                );
            } else {
                return Err(PrismError::InvalidWireFormat(format!(
                    "{} trailing bytes after sized blob",
                    sub.remaining()
                )));
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::primitives::{F32Spec, VarBytesSpec};
    use crate::schema::TemplateBuilder;
    use crate::spec::{decode, encode};

    fn u8_spec() -> SpecRef {
        Arc::new(IntSpec::U8)
    }

    #[test]
    fn test_template_roundtrip() {
        let template = TemplateBuilder::new()
            .field("id", Arc::new(IntSpec::U32))
            .field("height", Arc::new(F32Spec))
            .build();

        let mut value = ValueMap::new();
        value.insert("id", Value::U32(77));
        value.insert("height", Value::F32(2.5));

        let mut w = Writer::little();
        encode(&template, &Value::Map(value.clone()), &mut w).unwrap();
        assert_eq!(w.len(), 8);

        let bytes = w.freeze();
        let mut r = Reader::little(&bytes);
        let decoded = decode(&template, &mut r, DecodeMode::Rich).unwrap();
        assert_eq!(decoded, Value::Map(value));
    }

    #[test]
    fn test_template_optional_tail() {
        let template = TemplateBuilder::new()
            .field("always", u8_spec())
            .optional("sometimes", u8_spec())
            .build();

        let mut r = Reader::little(&[7]);
        let decoded = decode(&template, &mut r, DecodeMode::Rich).unwrap();
        let map = decoded.expect_map().unwrap();
        assert_eq!(map.get("always"), Some(&Value::U8(7)));
        assert_eq!(map.get("sometimes"), Some(&Value::Absent));

        // Absent optional fields produce no bytes
        let mut w = Writer::little();
        encode(&template, &decoded, &mut w).unwrap();
        assert_eq!(w.as_slice(), &[7]);
    }

    #[test]
    fn test_template_missing_required_field() {
        let template = TemplateBuilder::new().field("required", u8_spec()).build();
        let mut w = Writer::little();
        let err = encode(&template, &Value::Map(ValueMap::new()), &mut w).unwrap_err();
        assert!(matches!(err, PrismError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_collection_prefixed_roundtrip() {
        let coll = Collection::new(Count::Prefixed(IntSpec::U8), u8_spec());
        let value = Value::List(vec![Value::U8(1), Value::U8(2), Value::U8(3)]);

        let mut w = Writer::little();
        encode(&coll, &value, &mut w).unwrap();
        assert_eq!(w.as_slice(), &[3, 1, 2, 3]);

        let bytes = w.freeze();
        let mut r = Reader::little(&bytes);
        assert_eq!(decode(&coll, &mut r, DecodeMode::Rich).unwrap(), value);
    }

    #[test]
    fn test_collection_prefix_overflow() {
        let coll = Collection::new(Count::Prefixed(IntSpec::U8), u8_spec());
        let value = Value::List(vec![Value::U8(0); 256]);
        let mut w = Writer::little();
        let err = encode(&coll, &value, &mut w).unwrap_err();
        assert!(matches!(err, PrismError::CapacityExceeded { count: 256, .. }));
    }

    #[test]
    fn test_collection_fixed_arity() {
        let coll = Collection::new(Count::Fixed(2), u8_spec());
        let mut w = Writer::little();
        let err = encode(&coll, &Value::List(vec![Value::U8(1)]), &mut w).unwrap_err();
        assert!(matches!(err, PrismError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_collection_greedy_consumes_all() {
        let coll = Collection::new(Count::Greedy, Arc::new(IntSpec::U16));
        let mut r = Reader::little(&[1, 0, 2, 0, 3, 0]);
        let v = decode(&coll, &mut r, DecodeMode::Rich).unwrap();
        assert_eq!(
            v,
            Value::List(vec![Value::U16(1), Value::U16(2), Value::U16(3)])
        );
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let tuple = Tuple::new(vec![u8_spec(), u8_spec()]);
        let mut w = Writer::little();
        let err = encode(
            &tuple,
            &Value::List(vec![Value::U8(1), Value::U8(2), Value::U8(3)]),
            &mut w,
        )
        .unwrap_err();
        assert!(matches!(err, PrismError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_sized_blob_isolation() {
        // Inner greedy bytes cannot escape the prefixed boundary
        let blob = SizedBlob::new(
            BlobLen::Prefixed(IntSpec::U8),
            Arc::new(Collection::new(Count::Greedy, u8_spec())),
        );
        let mut r = Reader::little(&[2, 10, 20, 99]);
        let v = decode(&blob, &mut r, DecodeMode::Rich).unwrap();
        assert_eq!(v, Value::List(vec![Value::U8(10), Value::U8(20)]));
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn test_sized_blob_trailing_policy() {
        let strict = SizedBlob::new(BlobLen::Fixed(3), u8_spec());
        let mut r = Reader::little(&[1, 2, 3]);
        assert!(decode(&strict, &mut r, DecodeMode::Rich).is_err());

        let tolerant = SizedBlob::new(BlobLen::Fixed(3), u8_spec()).tolerate_trailing();
        let mut r = Reader::little(&[1, 2, 3]);
        assert_eq!(
            decode(&tolerant, &mut r, DecodeMode::Rich).unwrap(),
            Value::U8(1)
        );
    }

    #[test]
    fn test_lazy_blob_defers_and_roundtrips() {
        let blob = SizedBlob::new(BlobLen::Prefixed(IntSpec::U8), Arc::new(IntSpec::U32)).lazy();
        let wire = [4u8, 0xEF, 0xBE, 0xAD, 0xDE];
        let mut r = Reader::little(&wire);
        let v = decode(&blob, &mut r, DecodeMode::Rich).unwrap();

        let lazy = match &v {
            Value::Blob(b) => b,
            other => panic!("expected blob, got {other:?}"),
        };
        assert_eq!(lazy.raw().as_ref(), &wire[1..]);
        assert_eq!(lazy.decoded().unwrap(), &Value::U32(0xDEADBEEF));

        // Undecoded capture re-encodes byte-exactly
        let mut w = Writer::little();
        encode(&blob, &v, &mut w).unwrap();
        assert_eq!(w.as_slice(), &wire);
    }

    #[test]
    fn test_uninterpreted_blob_passthrough() {
        let blob = SizedBlob::new(BlobLen::Prefixed(IntSpec::U8), Arc::new(IntSpec::U32));
        let mut w = Writer::little();
        encode(&blob, &Value::Untyped(vec![9, 9].into()), &mut w).unwrap();
        assert_eq!(w.as_slice(), &[2, 9, 9]);
    }

    #[test]
    fn test_template_with_var_bytes_field() {
        let template = TemplateBuilder::new()
            .field("sequence", u8_spec())
            .field("payload", Arc::new(VarBytesSpec::new(IntSpec::U8)))
            .build();
        let mut r = Reader::little(&[1, 2, 0xAA, 0xBB]);
        let v = decode(&template, &mut r, DecodeMode::Rich).unwrap();
        let map = v.expect_map().unwrap();
        assert_eq!(map.get("sequence"), Some(&Value::U8(1)));
        assert_eq!(
            map.get("payload").and_then(|p| p.as_bytes()).unwrap().as_ref(),
            &[0xAA, 0xBB]
        );
    }
}
