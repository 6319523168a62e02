//! Declarative schema construction
//!
//! Schemas are plain values: a template is built by listing (name, spec)
//! pairs in declaration order. Forward references go through
//! `Placeholder` (two-phase resolution) rather than any reflection.

use std::sync::Arc;

use crate::composite::{Template, TemplateField};
use crate::spec::SpecRef;

/// Builder for an ordered field template
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    fields: Vec<TemplateField>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        TemplateBuilder { fields: Vec::new() }
    }

    /// Append a required field
    pub fn field(mut self, name: &'static str, spec: SpecRef) -> Self {
        self.fields.push(TemplateField {
            name,
            spec,
            optional: false,
        });
        self
    }

    /// Append a field that may be absent (producing no bytes)
    pub fn optional(mut self, name: &'static str, spec: SpecRef) -> Self {
        self.fields.push(TemplateField {
            name,
            spec,
            optional: true,
        });
        self
    }

    pub fn build(self) -> Template {
        Template::new(self.fields)
    }

    pub fn build_ref(self) -> SpecRef {
        Arc::new(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Reader;
    use crate::composite::{Collection, Count};
    use crate::primitives::IntSpec;
    use crate::spec::{decode, Placeholder};
    use crate::value::{DecodeMode, Value};

    #[test]
    fn test_builder_preserves_declaration_order() {
        let template = TemplateBuilder::new()
            .field("first", Arc::new(IntSpec::U8))
            .field("second", Arc::new(IntSpec::U8))
            .optional("third", Arc::new(IntSpec::U8))
            .build();
        let names: Vec<_> = template.field_names().collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_recursive_schema_via_placeholder() {
        // node := depth:u8, children:(count:u8, node*)
        let node_cell = Placeholder::new("node");
        let node: SpecRef = node_cell.clone();
        let schema = TemplateBuilder::new()
            .field("depth", Arc::new(IntSpec::U8))
            .field(
                "children",
                Arc::new(Collection::new(Count::Prefixed(IntSpec::U8), node.clone())),
            )
            .build_ref();
        node_cell.resolve(schema.clone()).unwrap();

        // depth 0 with one child of depth 1 with no children
        let mut r = Reader::little(&[0, 1, 1, 0]);
        let v = decode(schema.as_ref(), &mut r, DecodeMode::Rich).unwrap();
        let map = v.expect_map().unwrap();
        assert_eq!(map.get("depth"), Some(&Value::U8(0)));
        let children = map.get("children").unwrap().expect_list().unwrap();
        assert_eq!(children.len(), 1);
        let child = children[0].expect_map().unwrap();
        assert_eq!(child.get("depth"), Some(&Value::U8(1)));
    }
}
