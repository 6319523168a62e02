//! PRISM Codec - Declarative binary serialization framework
//!
//! This crate implements the wire codec for the legacy simulator protocol:
//! - Endian-configurable readers and writers
//! - A dynamically-typed decoded value model with rich and plain modes
//! - Composable field specs (primitives, adapters, templates, collections,
//!   tuples, sized sub-blobs)
//! - Context propagation so later fields can branch on earlier ones
//! - Quantized floats and bit-packed integer schemas
//! - Variant dispatch (context, enum, flag, and buffer-length switches)
//! - A registry resolving opaque subfield blobs to inner decoders

pub mod adapters;
pub mod bitpack;
pub mod buffer;
pub mod composite;
pub mod context;
pub mod primitives;
pub mod quant;
pub mod schema;
pub mod spec;
pub mod subfield;
pub mod switch;
pub mod value;

pub use adapters::*;
pub use bitpack::*;
pub use buffer::*;
pub use composite::*;
pub use context::*;
pub use primitives::*;
pub use quant::*;
pub use schema::*;
pub use spec::*;
pub use subfield::*;
pub use switch::*;
pub use value::*;
