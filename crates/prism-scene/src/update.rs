//! Wire update shapes
//!
//! Four shapes reach the scene engine, all normalized into one
//! `ObjectUpdate` record before merging:
//! - Full snapshot (`ObjectUpdate`): every attribute present.
//! - Terse delta (`ImprovedTerseObjectUpdate`): motion fields only, at a
//!   precision chosen by payload size (16/32/48/60/76 bytes).
//! - Cache hit (`ObjectUpdateCached`): flags and CRC only.
//! - Compressed delta (`ObjectUpdateCompressed`): optional sections gated
//!   by a flags word. Unlike the other three shapes, an absent section
//!   here means its default value, not "unchanged"; the upstream protocol
//!   is inconsistent about this and the inconsistency is preserved.
//!
//! Terse payload layout (little-endian), in all variants the field order
//! is position, velocity, acceleration, rotation, angular velocity:
//! - 16 B: u8-quantized (3/3/3/4/3)
//! - 32 B: u16-quantized (6/6/6/8/6)
//! - 48 B: 16-byte collision plane + the 32 B body
//! - 60 B: raw f32 (12/12/12/12-packed-quat/12)
//! - 76 B: collision plane + the 60 B body

use std::sync::Arc;

use bytes::Bytes;
use prism_codec::{
    adapted, Collection, Context, Count, DecodeMode, Endian, EnumAdapter, FlagsAdapter, IntSpec,
    LengthBranch, LengthSwitch, OptionalFlagged, QuantizedFloat, QuantizedQuat, QuantizedVec3,
    QuaternionSpec, Reader, SpecRef, StrSpec, SubfieldKey, SubfieldRegistry, SubfieldStrategy,
    TemplateBuilder, UuidSpec, Value, ValueMap, VarBytesSpec, Vector3Spec, Vector4Spec, Writer,
    CStrSpec, VALUE_FIELD,
};
use prism_core::{FullId, LocalId, PrismResult, Quaternion, Vector3, Vector4};
use tracing::warn;

use crate::object::ObjectKind;

/// Message names, as keyed in the subfield registry
pub const OBJECT_UPDATE: &str = "ObjectUpdate";
pub const TERSE_UPDATE: &str = "ImprovedTerseObjectUpdate";
pub const CACHED_UPDATE: &str = "ObjectUpdateCached";
pub const COMPRESSED_UPDATE: &str = "ObjectUpdateCompressed";
pub const KILL_OBJECT: &str = "KillObject";

const OBJECT_DATA: &str = "object_data";

/// Quantization domains for the terse motion fields
pub const POSITION_RANGE: f32 = 256.0;
pub const VELOCITY_RANGE: f32 = 128.0;
pub const ACCELERATION_RANGE: f32 = 64.0;
pub const ANGULAR_VELOCITY_RANGE: f32 = 64.0;

/// Section-gating bits in a compressed update's flags word, in wire order
pub mod compressed_flags {
    pub const ANGULAR_VELOCITY: u64 = 0x01;
    pub const PARENT: u64 = 0x02;
    pub const TEXT: u64 = 0x04;
    pub const SOUND: u64 = 0x08;
    pub const PARTICLES: u64 = 0x10;
    pub const NAME_VALUES: u64 = 0x20;
    pub const MEDIA_URL: u64 = 0x40;
    pub const TEXTURE_ANIM: u64 = 0x80;
}

const KIND_ENUM: &[(&str, u64)] = &[("prim", 9), ("avatar", 47), ("grass", 51), ("tree", 95)];

const UPDATE_FLAGS: &[(&str, u64)] = &[
    ("physics", 0x0000_0001),
    ("grab", 0x0000_0004),
    ("phantom", 0x0000_0010),
    ("temporary", 0x0000_0040),
    ("sound_source", 0x0000_0100),
];

const COMPRESSED_FLAGS: &[(&str, u64)] = &[
    ("angular_velocity", compressed_flags::ANGULAR_VELOCITY),
    ("parent", compressed_flags::PARENT),
    ("text", compressed_flags::TEXT),
    ("sound", compressed_flags::SOUND),
    ("particles", compressed_flags::PARTICLES),
    ("name_values", compressed_flags::NAME_VALUES),
    ("media_url", compressed_flags::MEDIA_URL),
    ("texture_anim", compressed_flags::TEXTURE_ANIM),
];

fn kind_spec() -> SpecRef {
    adapted(Arc::new(IntSpec::U8), EnumAdapter::new(KIND_ENUM))
}

fn update_flags_spec() -> SpecRef {
    adapted(Arc::new(IntSpec::U32), FlagsAdapter::new(UPDATE_FLAGS))
}

fn compressed_flags_spec() -> SpecRef {
    adapted(Arc::new(IntSpec::U32), FlagsAdapter::new(COMPRESSED_FLAGS))
}

/// Motion body at one quantized precision
fn quantized_motion(int: IntSpec, with_plane: bool) -> SpecRef {
    let quant = |range: f32| -> SpecRef {
        Arc::new(QuantizedVec3::new(QuantizedFloat::new(int, -range, range)))
    };
    let mut builder = TemplateBuilder::new();
    if with_plane {
        builder = builder.field("collision_plane", Arc::new(Vector4Spec));
    }
    builder
        .field("position", quant(POSITION_RANGE))
        .field("velocity", quant(VELOCITY_RANGE))
        .field("acceleration", quant(ACCELERATION_RANGE))
        .field(
            "rotation",
            Arc::new(QuantizedQuat::new(QuantizedFloat::new(int, -1.0, 1.0))),
        )
        .field("angular_velocity", quant(ANGULAR_VELOCITY_RANGE))
        .build_ref()
}

/// Motion body at full float precision
fn float_motion(with_plane: bool) -> SpecRef {
    let mut builder = TemplateBuilder::new();
    if with_plane {
        builder = builder.field("collision_plane", Arc::new(Vector4Spec));
    }
    builder
        .field("position", Arc::new(Vector3Spec))
        .field("velocity", Arc::new(Vector3Spec))
        .field("acceleration", Arc::new(Vector3Spec))
        .field("rotation", Arc::new(QuaternionSpec))
        .field("angular_velocity", Arc::new(Vector3Spec))
        .build_ref()
}

/// The five payload-size-to-layout mappings of the motion blob
fn motion_switch() -> SpecRef {
    Arc::new(LengthSwitch::new(
        "motion payload",
        vec![
            LengthBranch {
                len: 16,
                tag: "q8",
                spec: quantized_motion(IntSpec::U8, false),
            },
            LengthBranch {
                len: 32,
                tag: "q16",
                spec: quantized_motion(IntSpec::U16, false),
            },
            LengthBranch {
                len: 48,
                tag: "plane_q16",
                spec: quantized_motion(IntSpec::U16, true),
            },
            LengthBranch {
                len: 60,
                tag: "f32",
                spec: float_motion(false),
            },
            LengthBranch {
                len: 76,
                tag: "plane_f32",
                spec: float_motion(true),
            },
        ],
    ))
}

/// Body of a compressed update's data blob
fn compressed_body() -> SpecRef {
    let gated = |bit: u64, inner: SpecRef| -> SpecRef {
        Arc::new(OptionalFlagged::new("flags", bit, inner))
    };
    TemplateBuilder::new()
        .field("full_id", Arc::new(UuidSpec))
        .field("local_id", Arc::new(IntSpec::U32))
        .field("kind", kind_spec())
        .field("state", Arc::new(IntSpec::U8))
        .field("crc", Arc::new(IntSpec::U32))
        .field("flags", compressed_flags_spec())
        .field("position", Arc::new(Vector3Spec))
        .field("rotation", Arc::new(QuaternionSpec))
        .optional(
            "angular_velocity",
            gated(compressed_flags::ANGULAR_VELOCITY, Arc::new(Vector3Spec)),
        )
        .optional("parent", gated(compressed_flags::PARENT, Arc::new(IntSpec::U32)))
        .optional("text", gated(compressed_flags::TEXT, Arc::new(CStrSpec)))
        .optional("sound", gated(compressed_flags::SOUND, Arc::new(UuidSpec)))
        .optional(
            "particles",
            gated(
                compressed_flags::PARTICLES,
                Arc::new(VarBytesSpec::new(IntSpec::U8)),
            ),
        )
        .optional(
            "name_values",
            gated(compressed_flags::NAME_VALUES, Arc::new(CStrSpec)),
        )
        .optional("media_url", gated(compressed_flags::MEDIA_URL, Arc::new(CStrSpec)))
        .optional(
            "texture_anim",
            gated(
                compressed_flags::TEXTURE_ANIM,
                Arc::new(VarBytesSpec::new(IntSpec::U8)),
            ),
        )
        .build_ref()
}

fn region_header(builder: TemplateBuilder) -> TemplateBuilder {
    builder
        .field("region_handle", Arc::new(IntSpec::U64))
        .field("time_dilation", Arc::new(IntSpec::U16))
}

fn full_update_schema() -> SpecRef {
    let block = TemplateBuilder::new()
        .field("full_id", Arc::new(UuidSpec))
        .field("local_id", Arc::new(IntSpec::U32))
        .field("kind", kind_spec())
        .field("state", Arc::new(IntSpec::U8))
        .field("parent", Arc::new(IntSpec::U32))
        .field("flags", update_flags_spec())
        .field("scale", Arc::new(Vector3Spec))
        .field("motion", Arc::new(VarBytesSpec::new(IntSpec::U8)))
        .field("text", Arc::new(StrSpec::new(IntSpec::U8)))
        .field("media_url", Arc::new(StrSpec::new(IntSpec::U8)))
        .field("sound", Arc::new(UuidSpec))
        .field("name_values", Arc::new(StrSpec::new(IntSpec::U16)))
        .field("particles", Arc::new(VarBytesSpec::new(IntSpec::U8)))
        .field("texture_anim", Arc::new(VarBytesSpec::new(IntSpec::U8)))
        .field("crc", Arc::new(IntSpec::U32))
        .build_ref();
    region_header(TemplateBuilder::new())
        .field(
            OBJECT_DATA,
            Arc::new(Collection::new(Count::Prefixed(IntSpec::U8), block)),
        )
        .build_ref()
}

fn terse_update_schema() -> SpecRef {
    let block = TemplateBuilder::new()
        .field("local_id", Arc::new(IntSpec::U32))
        .field("state", Arc::new(IntSpec::U8))
        .field("motion", Arc::new(VarBytesSpec::new(IntSpec::U8)))
        .build_ref();
    region_header(TemplateBuilder::new())
        .field(
            OBJECT_DATA,
            Arc::new(Collection::new(Count::Prefixed(IntSpec::U8), block)),
        )
        .build_ref()
}

fn cached_update_schema() -> SpecRef {
    let block = TemplateBuilder::new()
        .field("local_id", Arc::new(IntSpec::U32))
        .field("crc", Arc::new(IntSpec::U32))
        .field("flags", update_flags_spec())
        .build_ref();
    region_header(TemplateBuilder::new())
        .field(
            OBJECT_DATA,
            Arc::new(Collection::new(Count::Prefixed(IntSpec::U8), block)),
        )
        .build_ref()
}

fn compressed_update_schema() -> SpecRef {
    let block = TemplateBuilder::new()
        .field("body", Arc::new(VarBytesSpec::new(IntSpec::U16)))
        .build_ref();
    region_header(TemplateBuilder::new())
        .field(
            OBJECT_DATA,
            Arc::new(Collection::new(Count::Prefixed(IntSpec::U8), block)),
        )
        .build_ref()
}

fn kill_schema() -> SpecRef {
    let block = TemplateBuilder::new()
        .field("local_id", Arc::new(IntSpec::U32))
        .build_ref();
    TemplateBuilder::new()
        .field(
            OBJECT_DATA,
            Arc::new(Collection::new(Count::Prefixed(IntSpec::U8), block)),
        )
        .build_ref()
}

/// One normalized update record, whatever wire shape it arrived in
///
/// `None` means "not carried by this update" for the full/terse/cached
/// shapes; the compressed normalizer never produces `None` for its gated
/// sections, materializing defaults instead.
#[derive(Clone, Debug, Default)]
pub struct ObjectUpdate {
    pub full_id: Option<FullId>,
    pub local_id: LocalId,
    pub kind: Option<ObjectKind>,
    pub parent: Option<LocalId>,
    pub state: Option<u8>,
    pub flags: Option<u32>,
    pub position: Option<Vector3>,
    pub velocity: Option<Vector3>,
    pub acceleration: Option<Vector3>,
    pub rotation: Option<Quaternion>,
    pub angular_velocity: Option<Vector3>,
    pub collision_plane: Option<Vector4>,
    pub scale: Option<Vector3>,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub sound: Option<FullId>,
    pub name_values: Option<String>,
    pub particles: Option<Bytes>,
    pub texture_anim: Option<Bytes>,
    pub crc: Option<u32>,
}

// Field extraction helpers over decoded block maps

fn get_u64(map: &ValueMap, name: &str) -> Option<u64> {
    map.get(name).and_then(Value::discriminant_bits)
}

fn get_u32(map: &ValueMap, name: &str) -> Option<u32> {
    get_u64(map, name).map(|v| v as u32)
}

fn get_local_id(map: &ValueMap, name: &str) -> Option<LocalId> {
    get_u32(map, name).map(LocalId::new)
}

fn get_full_id(map: &ValueMap, name: &str) -> Option<FullId> {
    map.get(name).and_then(Value::as_uuid).map(FullId::new)
}

fn get_str(map: &ValueMap, name: &str) -> Option<String> {
    map.get(name).and_then(Value::as_str).map(str::to_owned)
}

fn get_bytes(map: &ValueMap, name: &str) -> Option<Bytes> {
    map.get(name).and_then(Value::as_bytes).cloned()
}

fn get_vec3(map: &ValueMap, name: &str) -> Option<Vector3> {
    map.get(name).and_then(Value::as_vector3)
}

fn get_kind(map: &ValueMap, name: &str) -> Option<ObjectKind> {
    let raw = get_u64(map, name)? as u8;
    let kind = ObjectKind::from_byte(raw);
    if kind.is_none() {
        warn!(raw, "unrecognized object kind");
    }
    kind
}

impl ObjectUpdate {
    /// Fold a decoded motion payload (the length-switch result) in
    fn apply_motion(&mut self, motion: &Value) {
        let map = match motion.as_map().and_then(|m| m.get(VALUE_FIELD)).and_then(Value::as_map) {
            Some(map) => map,
            None => return,
        };
        self.collision_plane = map.get("collision_plane").and_then(Value::as_vector4);
        self.position = get_vec3(map, "position");
        self.velocity = get_vec3(map, "velocity");
        self.acceleration = get_vec3(map, "acceleration");
        self.rotation = map.get("rotation").and_then(Value::as_quaternion);
        self.angular_velocity = get_vec3(map, "angular_velocity");
    }
}

/// Compiled schemas and the subfield registry for the update messages
///
/// Built once at session startup; decoding borrows it immutably.
#[derive(Debug)]
pub struct UpdateCodec {
    full: SpecRef,
    terse: SpecRef,
    cached: SpecRef,
    compressed: SpecRef,
    kill: SpecRef,
    registry: SubfieldRegistry,
}

impl UpdateCodec {
    pub fn new() -> Self {
        let mut registry = SubfieldRegistry::new();
        registry.register(
            OBJECT_UPDATE,
            OBJECT_DATA,
            "motion",
            SubfieldStrategy::Single(motion_switch()),
        );
        registry.register(
            TERSE_UPDATE,
            OBJECT_DATA,
            "motion",
            SubfieldStrategy::Single(motion_switch()),
        );
        registry.register(
            COMPRESSED_UPDATE,
            OBJECT_DATA,
            "body",
            SubfieldStrategy::Single(compressed_body()),
        );
        UpdateCodec {
            full: full_update_schema(),
            terse: terse_update_schema(),
            cached: cached_update_schema(),
            compressed: compressed_update_schema(),
            kill: kill_schema(),
            registry,
        }
    }

    pub fn registry(&self) -> &SubfieldRegistry {
        &self.registry
    }

    fn decode_blocks(&self, schema: &SpecRef, bytes: &[u8]) -> PrismResult<Vec<ValueMap>> {
        let mut reader = Reader::little(bytes);
        let message = prism_codec::decode(schema.as_ref(), &mut reader, DecodeMode::Rich)?;
        let map = message.expect_map()?;
        let blocks = map
            .get(OBJECT_DATA)
            .map(|v| v.expect_list())
            .transpose()?
            .unwrap_or(&[]);
        Ok(blocks
            .iter()
            .filter_map(|b| b.as_map().cloned())
            .collect())
    }

    /// Resolve a block's opaque blob through the subfield registry
    fn resolve_blob(&self, message: &'static str, field: &'static str, block: &ValueMap) -> Value {
        let bytes = match get_bytes(block, field) {
            Some(bytes) => bytes,
            None => return Value::Absent,
        };
        let top = Context::top();
        let block_ctx = top.nest_map(block);
        self.registry.decode(
            SubfieldKey::new(message, OBJECT_DATA, field),
            &bytes,
            &block_ctx,
            Endian::Little,
            DecodeMode::Rich,
        )
    }

    /// Decode a full-snapshot message into normalized records
    pub fn decode_full(&self, bytes: &[u8]) -> PrismResult<Vec<ObjectUpdate>> {
        let blocks = self.decode_blocks(&self.full, bytes)?;
        Ok(blocks
            .iter()
            .map(|block| {
                let mut update = ObjectUpdate {
                    full_id: get_full_id(block, "full_id"),
                    local_id: get_local_id(block, "local_id").unwrap_or(LocalId::NONE),
                    kind: get_kind(block, "kind"),
                    parent: get_local_id(block, "parent"),
                    state: get_u64(block, "state").map(|v| v as u8),
                    flags: get_u32(block, "flags"),
                    scale: get_vec3(block, "scale"),
                    text: get_str(block, "text"),
                    media_url: get_str(block, "media_url"),
                    sound: get_full_id(block, "sound"),
                    name_values: get_str(block, "name_values"),
                    particles: get_bytes(block, "particles"),
                    texture_anim: get_bytes(block, "texture_anim"),
                    crc: get_u32(block, "crc"),
                    ..ObjectUpdate::default()
                };
                let motion = self.resolve_blob(OBJECT_UPDATE, "motion", block);
                if matches!(motion, Value::Untyped(_)) {
                    warn!(local_id = %update.local_id, "motion blob uninterpretable; keeping prior motion state");
                } else {
                    update.apply_motion(&motion);
                }
                update
            })
            .collect())
    }

    /// Decode a terse (motion-only) message into normalized records
    pub fn decode_terse(&self, bytes: &[u8]) -> PrismResult<Vec<ObjectUpdate>> {
        let blocks = self.decode_blocks(&self.terse, bytes)?;
        Ok(blocks
            .iter()
            .map(|block| {
                let mut update = ObjectUpdate {
                    local_id: get_local_id(block, "local_id").unwrap_or(LocalId::NONE),
                    state: get_u64(block, "state").map(|v| v as u8),
                    ..ObjectUpdate::default()
                };
                let motion = self.resolve_blob(TERSE_UPDATE, "motion", block);
                if matches!(motion, Value::Untyped(_)) {
                    warn!(local_id = %update.local_id, "terse motion blob uninterpretable; dropping motion fields");
                } else {
                    update.apply_motion(&motion);
                }
                update
            })
            .collect())
    }

    /// Decode a cache-hit message (flags and CRC only)
    pub fn decode_cached(&self, bytes: &[u8]) -> PrismResult<Vec<ObjectUpdate>> {
        let blocks = self.decode_blocks(&self.cached, bytes)?;
        Ok(blocks
            .iter()
            .map(|block| ObjectUpdate {
                local_id: get_local_id(block, "local_id").unwrap_or(LocalId::NONE),
                crc: get_u32(block, "crc"),
                flags: get_u32(block, "flags"),
                ..ObjectUpdate::default()
            })
            .collect())
    }

    /// Decode a compressed-delta message
    ///
    /// Gated sections that are absent materialize their default value (not
    /// "unchanged"): an update without the parent bit unparents the object.
    pub fn decode_compressed(&self, bytes: &[u8]) -> PrismResult<Vec<ObjectUpdate>> {
        let blocks = self.decode_blocks(&self.compressed, bytes)?;
        Ok(blocks
            .iter()
            .filter_map(|block| {
                let body = self.resolve_blob(COMPRESSED_UPDATE, "body", block);
                let map = match body.as_map() {
                    Some(map) => map,
                    None => {
                        warn!("compressed body uninterpretable; dropping block");
                        return None;
                    }
                };
                Some(ObjectUpdate {
                    full_id: get_full_id(map, "full_id"),
                    local_id: get_local_id(map, "local_id").unwrap_or(LocalId::NONE),
                    kind: get_kind(map, "kind"),
                    state: get_u64(map, "state").map(|v| v as u8),
                    crc: get_u32(map, "crc"),
                    position: get_vec3(map, "position"),
                    rotation: map.get("rotation").and_then(Value::as_quaternion),
                    // Absence means default for every gated section
                    angular_velocity: Some(get_vec3(map, "angular_velocity").unwrap_or(Vector3::ZERO)),
                    parent: Some(get_local_id(map, "parent").unwrap_or(LocalId::NONE)),
                    text: Some(get_str(map, "text").unwrap_or_default()),
                    sound: Some(get_full_id(map, "sound").unwrap_or(FullId::ZERO)),
                    particles: Some(get_bytes(map, "particles").unwrap_or_default()),
                    name_values: Some(get_str(map, "name_values").unwrap_or_default()),
                    media_url: Some(get_str(map, "media_url").unwrap_or_default()),
                    texture_anim: Some(get_bytes(map, "texture_anim").unwrap_or_default()),
                    ..ObjectUpdate::default()
                })
            })
            .collect())
    }

    /// Decode a kill message into the condemned handles
    pub fn decode_kill(&self, bytes: &[u8]) -> PrismResult<Vec<LocalId>> {
        let blocks = self.decode_blocks(&self.kill, bytes)?;
        Ok(blocks
            .iter()
            .filter_map(|block| get_local_id(block, "local_id"))
            .collect())
    }
}

impl Default for UpdateCodec {
    fn default() -> Self {
        UpdateCodec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_codec::{decode, encode, VARIANT_FIELD};

    /// Deterministic patterned payload of a given size
    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 13) as u8).collect()
    }

    #[test]
    fn test_motion_switch_every_branch_byte_exact() {
        let switch = motion_switch();
        for (len, tag) in [
            (16usize, "q8"),
            (32, "q16"),
            (48, "plane_q16"),
            (60, "f32"),
            (76, "plane_f32"),
        ] {
            let wire = patterned(len);
            let mut r = Reader::little(&wire);
            let v = decode(switch.as_ref(), &mut r, DecodeMode::Rich).unwrap();
            assert!(r.is_empty());
            let map = v.expect_map().unwrap();
            assert_eq!(
                map.get(VARIANT_FIELD),
                Some(&Value::Str(tag.into())),
                "{len}-byte payload"
            );

            let mut w = Writer::little();
            encode(switch.as_ref(), &v, &mut w).unwrap();
            assert_eq!(w.as_slice(), &wire[..], "{tag} re-encode");
        }
    }

    #[test]
    fn test_motion_switch_rejects_odd_size() {
        let switch = motion_switch();
        let wire = patterned(20);
        let mut r = Reader::little(&wire);
        assert!(decode(switch.as_ref(), &mut r, DecodeMode::Rich).is_err());
    }

    #[test]
    fn test_terse_normalization() {
        // One object at u16 precision, position near the region center
        let q = QuantizedFloat::new(IntSpec::U16, -POSITION_RANGE, POSITION_RANGE);
        let mut motion = Writer::little();
        for component in [128.0f32, 64.0, 22.5] {
            motion.put_u16(q.encode_raw(component) as u16);
        }
        let qv = QuantizedFloat::new(IntSpec::U16, -VELOCITY_RANGE, VELOCITY_RANGE);
        for _ in 0..3 {
            motion.put_u16(qv.encode_raw(0.0) as u16);
        }
        let qa = QuantizedFloat::new(IntSpec::U16, -ACCELERATION_RANGE, ACCELERATION_RANGE);
        for _ in 0..3 {
            motion.put_u16(qa.encode_raw(0.0) as u16);
        }
        let qr = QuantizedFloat::new(IntSpec::U16, -1.0, 1.0);
        for component in [0.0f32, 0.0, 0.0, 1.0] {
            motion.put_u16(qr.encode_raw(component) as u16);
        }
        let qw = QuantizedFloat::new(IntSpec::U16, -ANGULAR_VELOCITY_RANGE, ANGULAR_VELOCITY_RANGE);
        for _ in 0..3 {
            motion.put_u16(qw.encode_raw(0.0) as u16);
        }
        let motion = motion.freeze();
        assert_eq!(motion.len(), 32);

        let mut w = Writer::little();
        w.put_u64(0x100);
        w.put_u16(65535);
        w.put_u8(1); // one block
        w.put_u32(4242);
        w.put_u8(3);
        w.put_u8(motion.len() as u8);
        w.put_bytes(&motion);
        let message = w.freeze();

        let codec = UpdateCodec::new();
        let updates = codec.decode_terse(&message).unwrap();
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.local_id, LocalId::new(4242));
        assert_eq!(update.state, Some(3));
        let pos = update.position.unwrap();
        assert!((pos.x - 128.0).abs() < 0.01);
        assert!((pos.y - 64.0).abs() < 0.01);
        assert!((pos.z - 22.5).abs() < 0.01);
        assert_eq!(update.velocity, Some(Vector3::ZERO));
        assert!(update.collision_plane.is_none());
        // Terse updates never carry identity or parent changes
        assert!(update.full_id.is_none());
        assert!(update.parent.is_none());
    }

    #[test]
    fn test_terse_unknown_motion_size_is_tolerated() {
        let mut w = Writer::little();
        w.put_u64(0);
        w.put_u16(0);
        w.put_u8(1);
        w.put_u32(7);
        w.put_u8(0);
        w.put_u8(5); // 5-byte blob matches no branch
        w.put_bytes(&[1, 2, 3, 4, 5]);
        let message = w.freeze();

        let codec = UpdateCodec::new();
        let updates = codec.decode_terse(&message).unwrap();
        assert_eq!(updates.len(), 1);
        // The outer decode survives; motion fields are simply not carried
        assert_eq!(updates[0].local_id, LocalId::new(7));
        assert!(updates[0].position.is_none());
    }

    #[test]
    fn test_compressed_absence_means_default() {
        // Body with only the parent section present
        let body_schema = compressed_body();
        let full_id = uuid::Uuid::new_v4();
        let mut body_value = ValueMap::new();
        body_value.insert("full_id", Value::Uuid(full_id));
        body_value.insert("local_id", Value::U32(88));
        body_value.insert("kind", Value::Str("prim".into()));
        body_value.insert("state", Value::U8(0));
        body_value.insert("crc", Value::U32(1));
        body_value.insert("flags", Value::U32(compressed_flags::PARENT as u32));
        body_value.insert("position", Value::Vector3(Vector3::new(1.0, 2.0, 3.0)));
        body_value.insert(
            "rotation",
            Value::Quaternion(Quaternion::IDENTITY),
        );
        body_value.insert("parent", Value::U32(55));
        let mut body = Writer::little();
        encode(body_schema.as_ref(), &Value::Map(body_value), &mut body).unwrap();
        let body = body.freeze();

        let mut w = Writer::little();
        w.put_u64(0);
        w.put_u16(0);
        w.put_u8(1);
        w.put_u16(body.len() as u16);
        w.put_bytes(&body);
        let message = w.freeze();

        let codec = UpdateCodec::new();
        let updates = codec.decode_compressed(&message).unwrap();
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.full_id, Some(FullId::new(full_id)));
        assert_eq!(update.local_id, LocalId::new(88));
        assert_eq!(update.parent, Some(LocalId::new(55)));
        // Absent gated sections materialize defaults, not "unchanged"
        assert_eq!(update.angular_velocity, Some(Vector3::ZERO));
        assert_eq!(update.text, Some(String::new()));
        assert_eq!(update.sound, Some(FullId::ZERO));
        // Sections the format never carries stay unchanged
        assert!(update.velocity.is_none());
        assert!(update.scale.is_none());
    }

    #[test]
    fn test_full_update_roundtrip_and_normalization() {
        let schema = full_update_schema();
        let full_id = uuid::Uuid::new_v4();

        let mut block = ValueMap::new();
        block.insert("full_id", Value::Uuid(full_id));
        block.insert("local_id", Value::U32(1001));
        block.insert("kind", Value::Str("avatar".into()));
        block.insert("state", Value::U8(0));
        block.insert("parent", Value::U32(0));
        block.insert("flags", Value::U32(0x11));
        block.insert("scale", Value::Vector3(Vector3::new(1.0, 1.0, 2.0)));
        block.insert("motion", Value::Bytes(patterned(60).into()));
        block.insert("text", Value::Str("floating label".into()));
        block.insert("media_url", Value::Str("".into()));
        block.insert("sound", Value::Uuid(uuid::Uuid::nil()));
        block.insert("name_values", Value::Str("FirstName STRING RW SV Ada".into()));
        block.insert("particles", Value::Bytes(Bytes::new()));
        block.insert("texture_anim", Value::Bytes(Bytes::new()));
        block.insert("crc", Value::U32(0xABCD));

        let mut message = ValueMap::new();
        message.insert("region_handle", Value::U64(9));
        message.insert("time_dilation", Value::U16(65535));
        message.insert(OBJECT_DATA, Value::List(vec![Value::Map(block)]));

        let mut w = Writer::little();
        encode(schema.as_ref(), &Value::Map(message), &mut w).unwrap();
        let wire = w.freeze();

        // Byte-exact re-encode through a decode cycle
        let mut r = Reader::little(&wire);
        let decoded = decode(schema.as_ref(), &mut r, DecodeMode::Rich).unwrap();
        let mut w2 = Writer::little();
        encode(schema.as_ref(), &decoded, &mut w2).unwrap();
        assert_eq!(w2.as_slice(), wire.as_ref());

        // Normalization picks up both the block and its motion blob
        let codec = UpdateCodec::new();
        let updates = codec.decode_full(&wire).unwrap();
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.full_id, Some(FullId::new(full_id)));
        assert_eq!(update.kind, Some(ObjectKind::Avatar));
        assert_eq!(update.parent, Some(LocalId::NONE));
        assert_eq!(update.flags, Some(0x11));
        assert_eq!(update.text.as_deref(), Some("floating label"));
        assert!(update.position.is_some());
        assert_eq!(update.crc, Some(0xABCD));
    }

    #[test]
    fn test_cached_and_kill_normalization() {
        let codec = UpdateCodec::new();

        let mut w = Writer::little();
        w.put_u64(0);
        w.put_u16(0);
        w.put_u8(1);
        w.put_u32(31);
        w.put_u32(0xFEED);
        w.put_u32(0x01);
        let updates = codec.decode_cached(&w.freeze()).unwrap();
        assert_eq!(updates[0].local_id, LocalId::new(31));
        assert_eq!(updates[0].crc, Some(0xFEED));
        assert_eq!(updates[0].flags, Some(1));
        assert!(updates[0].position.is_none());

        let mut w = Writer::little();
        w.put_u8(2);
        w.put_u32(5);
        w.put_u32(6);
        let killed = codec.decode_kill(&w.freeze()).unwrap();
        assert_eq!(killed, vec![LocalId::new(5), LocalId::new(6)]);
    }
}
