//! PRISM Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the PRISM proxy:
//! - Identifiers (FullId, LocalId)
//! - Wire math (Vector3, Vector4, Quaternion)
//! - Error taxonomy and result alias

pub mod error;
pub mod id;
pub mod math;

pub use error::*;
pub use id::*;
pub use math::*;
