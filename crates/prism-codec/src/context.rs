//! Decode/encode context propagation
//!
//! A `Context` is an immutable view over the container currently being
//! decoded or encoded (a template's field map or a collection's accumulating
//! list), chained to its parent container. It lets a later field branch on
//! an earlier sibling's decoded value, or walk to the root message.
//!
//! Contexts are created fresh per composite encode/decode call and borrow
//! their container, so they cannot outlive the call that made them.

use crate::value::{Value, ValueMap};

static EMPTY_MAP: ValueMap = ValueMap::new();

/// The container a context wraps
#[derive(Clone, Copy, Debug)]
pub enum Container<'a> {
    Map(&'a ValueMap),
    List(&'a [Value]),
}

/// Read-only, parent-linked view over partially-built decode state
#[derive(Clone, Copy, Debug)]
pub struct Context<'a> {
    container: Container<'a>,
    parent: Option<&'a Context<'a>>,
}

impl<'a> Context<'a> {
    /// Root context for a top-level encode/decode call
    pub fn top() -> Context<'static> {
        Context {
            container: Container::Map(&EMPTY_MAP),
            parent: None,
        }
    }

    /// Child context over a field map
    pub fn nest_map(&'a self, map: &'a ValueMap) -> Context<'a> {
        Context {
            container: Container::Map(map),
            parent: Some(self),
        }
    }

    /// Child context over a collection's element list
    pub fn nest_list(&'a self, list: &'a [Value]) -> Context<'a> {
        Context {
            container: Container::List(list),
            parent: Some(self),
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<&Context<'a>> {
        self.parent
    }

    /// Walk to the outermost context (the root message container)
    pub fn root(&self) -> &Context<'a> {
        let mut ctx = self;
        while let Some(parent) = ctx.parent {
            ctx = parent;
        }
        ctx
    }

    /// Look up a field in the directly wrapped container only
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        match self.container {
            Container::Map(map) => map.get(name),
            Container::List(_) => None,
        }
    }

    /// Element of the directly wrapped list container
    pub fn element(&self, index: usize) -> Option<&'a Value> {
        match self.container {
            Container::List(list) => list.get(index),
            Container::Map(_) => None,
        }
    }

    /// Number of elements decoded so far in a list container
    pub fn element_count(&self) -> usize {
        match self.container {
            Container::List(list) => list.len(),
            Container::Map(_) => 0,
        }
    }

    /// Look up a field here or in any ancestor container, nearest first
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if let Some(v) = c.field(name) {
                return Some(v);
            }
            ctx = c.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_ancestors() {
        let mut outer = ValueMap::new();
        outer.insert("message_kind", Value::U8(7));
        let mut inner = ValueMap::new();
        inner.insert("length", Value::U16(12));

        let top = Context::top();
        let outer_ctx = top.nest_map(&outer);
        let inner_ctx = outer_ctx.nest_map(&inner);

        assert_eq!(inner_ctx.field("length"), Some(&Value::U16(12)));
        assert_eq!(inner_ctx.field("message_kind"), None);
        assert_eq!(inner_ctx.lookup("message_kind"), Some(&Value::U8(7)));
        assert_eq!(inner_ctx.lookup("missing"), None);
    }

    #[test]
    fn test_nearest_binding_wins() {
        let mut outer = ValueMap::new();
        outer.insert("kind", Value::U8(1));
        let mut inner = ValueMap::new();
        inner.insert("kind", Value::U8(2));

        let top = Context::top();
        let outer_ctx = top.nest_map(&outer);
        let inner_ctx = outer_ctx.nest_map(&inner);

        assert_eq!(inner_ctx.lookup("kind"), Some(&Value::U8(2)));
    }

    #[test]
    fn test_root_reaches_outermost() {
        let mut outer = ValueMap::new();
        outer.insert("root_marker", Value::Bool(true));
        let top = Context::top();
        let outer_ctx = top.nest_map(&outer);
        let list = [Value::U8(0)];
        let list_ctx = outer_ctx.nest_list(&list);

        // Root is the empty top-level context; its child holds the marker
        assert!(list_ctx.root().field("root_marker").is_none());
        assert_eq!(list_ctx.element_count(), 1);
        assert_eq!(
            list_ctx.parent().unwrap().field("root_marker"),
            Some(&Value::Bool(true))
        );
    }
}
