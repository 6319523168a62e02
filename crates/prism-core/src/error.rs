//! Error types for the PRISM proxy

use thiserror::Error;

/// Core PRISM errors
#[derive(Error, Debug)]
pub enum PrismError {
    // Codec errors
    #[error("Buffer truncated: needed {needed}, only {remaining} remaining")]
    TruncatedBuffer { needed: usize, remaining: usize },

    #[error("Capacity exceeded: {count} elements, prefix can hold {max}")]
    CapacityExceeded { count: usize, max: u64 },

    #[error("Unknown variant: {0}")]
    UnknownVariant(String),

    #[error("Schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    // Subfield errors
    #[error("No subfield decoder for {0}")]
    UnresolvableSubfield(String),

    // Graph errors
    #[error("Graph invariant violated: {0}")]
    GraphInvariant(String),
}

/// Result type for PRISM operations
pub type PrismResult<T> = Result<T, PrismError>;

impl PrismError {
    /// True for errors a tolerant call site may skip-and-log rather than
    /// abort on (unknown dispatch branches, unregistered subfields).
    pub fn is_tolerable(&self) -> bool {
        matches!(
            self,
            PrismError::UnknownVariant(_) | PrismError::UnresolvableSubfield(_)
        )
    }
}
