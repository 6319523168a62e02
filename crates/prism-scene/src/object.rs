//! Scene object state

use std::fmt;

use bytes::Bytes;
use prism_core::{FullId, LocalId, Quaternion, Vector3, Vector4};

/// Entity class, as carried in update messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectKind {
    Prim = 9,
    Avatar = 47,
    Grass = 51,
    Tree = 95,
}

impl ObjectKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            9 => Some(ObjectKind::Prim),
            47 => Some(ObjectKind::Avatar),
            51 => Some(ObjectKind::Grass),
            95 => Some(ObjectKind::Tree),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_avatar(self) -> bool {
        matches!(self, ObjectKind::Avatar)
    }
}

/// One trackable attribute of a scene object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Attr {
    LocalId = 1 << 0,
    Kind = 1 << 1,
    Parent = 1 << 2,
    State = 1 << 3,
    Flags = 1 << 4,
    Position = 1 << 5,
    Velocity = 1 << 6,
    Acceleration = 1 << 7,
    Rotation = 1 << 8,
    AngularVelocity = 1 << 9,
    CollisionPlane = 1 << 10,
    Scale = 1 << 11,
    Text = 1 << 12,
    MediaUrl = 1 << 13,
    Sound = 1 << 14,
    NameValues = 1 << 15,
    Particles = 1 << 16,
    TextureAnim = 1 << 17,
    Crc = 1 << 18,
}

impl Attr {
    pub fn all() -> &'static [Attr] {
        &[
            Attr::LocalId,
            Attr::Kind,
            Attr::Parent,
            Attr::State,
            Attr::Flags,
            Attr::Position,
            Attr::Velocity,
            Attr::Acceleration,
            Attr::Rotation,
            Attr::AngularVelocity,
            Attr::CollisionPlane,
            Attr::Scale,
            Attr::Text,
            Attr::MediaUrl,
            Attr::Sound,
            Attr::NameValues,
            Attr::Particles,
            Attr::TextureAnim,
            Attr::Crc,
        ]
    }
}

/// Set of changed attributes reported to observers
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct AttrSet(u32);

impl AttrSet {
    pub fn empty() -> Self {
        AttrSet(0)
    }

    #[inline]
    pub fn insert(&mut self, attr: Attr) {
        self.0 |= attr as u32;
    }

    #[inline]
    pub fn contains(self, attr: Attr) -> bool {
        self.0 & attr as u32 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Attr> {
        Attr::all().iter().copied().filter(move |a| self.contains(*a))
    }
}

impl fmt::Debug for AttrSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A live addressable entity in the scene
///
/// `parent` is a non-owning back-reference by handle, resolved lazily
/// against the owning table; `children` is the owned, insertion-ordered
/// list of handles this object exclusively tracks.
#[derive(Clone, Debug)]
pub struct SceneObject {
    pub full_id: FullId,
    pub local_id: LocalId,
    pub kind: ObjectKind,
    pub parent: LocalId,
    pub children: Vec<LocalId>,
    pub state: u8,
    pub flags: u32,
    /// Parent-relative when parented, region-global otherwise
    pub position: Vector3,
    pub velocity: Vector3,
    pub acceleration: Vector3,
    pub rotation: Quaternion,
    pub angular_velocity: Vector3,
    pub collision_plane: Option<Vector4>,
    pub scale: Vector3,
    pub text: String,
    pub media_url: String,
    pub sound: FullId,
    pub name_values: String,
    pub particles: Bytes,
    pub texture_anim: Bytes,
    pub crc: u32,
}

impl SceneObject {
    pub fn new(full_id: FullId, local_id: LocalId, kind: ObjectKind) -> Self {
        SceneObject {
            full_id,
            local_id,
            kind,
            parent: LocalId::NONE,
            children: Vec::new(),
            state: 0,
            flags: 0,
            position: Vector3::ZERO,
            velocity: Vector3::ZERO,
            acceleration: Vector3::ZERO,
            rotation: Quaternion::IDENTITY,
            angular_velocity: Vector3::ZERO,
            collision_plane: None,
            scale: Vector3::new(0.5, 0.5, 0.5),
            text: String::new(),
            media_url: String::new(),
            sound: FullId::ZERO,
            name_values: String::new(),
            particles: Bytes::new(),
            texture_anim: Bytes::new(),
            crc: 0,
        }
    }

    #[inline]
    pub fn is_avatar(&self) -> bool {
        self.kind.is_avatar()
    }

    #[inline]
    pub fn has_parent(&self) -> bool {
        !self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_bytes() {
        assert_eq!(ObjectKind::from_byte(47), Some(ObjectKind::Avatar));
        assert_eq!(ObjectKind::from_byte(9), Some(ObjectKind::Prim));
        assert_eq!(ObjectKind::from_byte(0), None);
        assert_eq!(ObjectKind::Tree.to_byte(), 95);
    }

    #[test]
    fn test_attr_set_operations() {
        let mut set = AttrSet::empty();
        assert!(set.is_empty());
        set.insert(Attr::Position);
        set.insert(Attr::Parent);
        assert!(set.contains(Attr::Position));
        assert!(!set.contains(Attr::Rotation));
        let listed: Vec<_> = set.iter().collect();
        assert_eq!(listed, vec![Attr::Parent, Attr::Position]);
    }
}
