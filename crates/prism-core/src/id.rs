//! Identity types for the PRISM proxy
//!
//! Every addressable entity in the simulator protocol carries two identities:
//! a stable 128-bit `FullId` that never changes for the entity's lifetime,
//! and an ephemeral 32-bit `LocalId` handle scoped to a single session,
//! which the simulator may reassign mid-life.

use std::fmt;

use uuid::Uuid;

/// Stable entity identity - constant for the entity's lifetime
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FullId(pub Uuid);

impl FullId {
    pub const ZERO: FullId = FullId(Uuid::nil());

    #[inline]
    pub fn new(id: Uuid) -> Self {
        FullId(id)
    }

    /// Generate a fresh random identity
    pub fn random() -> Self {
        FullId(Uuid::new_v4())
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0.is_nil()
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.into_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        FullId(Uuid::from_bytes(bytes))
    }
}

impl fmt::Debug for FullId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Full({})", self.0)
    }
}

impl fmt::Display for FullId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for FullId {
    fn from(id: Uuid) -> Self {
        FullId(id)
    }
}

/// Ephemeral session-scoped entity handle
///
/// Zero is reserved: as a parent reference it means "no parent".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct LocalId(pub u32);

impl LocalId {
    pub const NONE: LocalId = LocalId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        LocalId(id)
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        LocalId(u32::from_le_bytes(bytes))
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Local({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LocalId {
    fn from(id: u32) -> Self {
        LocalId(id)
    }
}
