//! Wire math for the simulator protocol
//!
//! The protocol packs positions, velocities, and rotations as raw or
//! quantized float components, and derived-pose queries need quaternion
//! composition. This module carries exactly that much linear algebra and
//! no more.

use std::ops::{Add, Mul, Neg, Sub};

/// 3-component float vector (12 bytes on the wire)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vector3 { x, y, z }
    }

    #[inline]
    pub fn dot(self, other: Vector3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(self, other: Vector3) -> Vector3 {
        Vector3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Component-wise distance check, used by change detection
    pub fn approx_eq(self, other: Vector3, epsilon: f32) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.z - other.z).abs() <= epsilon
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    #[inline]
    fn add(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    #[inline]
    fn sub(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;

    #[inline]
    fn mul(self, s: f32) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;

    #[inline]
    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

/// 4-component float vector (16 bytes on the wire)
///
/// Used for collision planes: (normal.xyz, offset).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vector4 {
    pub const ZERO: Vector4 = Vector4 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 0.0,
    };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Vector4 { x, y, z, w }
    }
}

/// Rotation quaternion
///
/// Wire representation is the packed form: the quaternion is normalized,
/// the sign flipped so `w >= 0`, and only x/y/z are sent; decode recovers
/// `w` from the unit constraint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Quaternion { x, y, z, w }
    }

    /// Rotation of `angle` radians about `axis` (axis need not be unit)
    pub fn from_axis_angle(axis: Vector3, angle: f32) -> Self {
        let len = axis.length();
        if len == 0.0 {
            return Quaternion::IDENTITY;
        }
        let half = angle * 0.5;
        let s = half.sin() / len;
        Quaternion {
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
            w: half.cos(),
        }
    }

    #[inline]
    pub fn magnitude(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Normalize to unit length; degenerate input collapses to identity
    pub fn normalized(self) -> Quaternion {
        let mag = self.magnitude();
        if mag == 0.0 {
            return Quaternion::IDENTITY;
        }
        let inv = 1.0 / mag;
        Quaternion {
            x: self.x * inv,
            y: self.y * inv,
            z: self.z * inv,
            w: self.w * inv,
        }
    }

    /// Hamilton product: `self * other` applies `other` first, then `self`
    pub fn mul_quat(self, other: Quaternion) -> Quaternion {
        Quaternion {
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
        }
    }

    /// Rotate a vector by this quaternion
    pub fn rotate(self, v: Vector3) -> Vector3 {
        let axis = Vector3::new(self.x, self.y, self.z);
        let t = axis.cross(v) * 2.0;
        v + t * self.w + axis.cross(t)
    }

    /// Drop `w` for the 12-byte packed wire form, flipping sign so `w >= 0`
    ///
    /// The input must already be normalized; no renormalization happens
    /// here, so a decoded quaternion re-packs to its exact wire bytes.
    pub fn pack(self) -> [f32; 3] {
        if self.w < 0.0 {
            [-self.x, -self.y, -self.z]
        } else {
            [self.x, self.y, self.z]
        }
    }

    /// Recover a quaternion from its packed x/y/z components
    pub fn unpack(xyz: [f32; 3]) -> Quaternion {
        let [x, y, z] = xyz;
        let sq = 1.0 - (x * x + y * y + z * z);
        // Quantization error can push the sum slightly past 1.0
        let w = if sq > 0.0 { sq.sqrt() } else { 0.0 };
        Quaternion { x, y, z, w }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f32 = 1e-5;

    fn assert_vec_close(a: Vector3, b: Vector3) {
        assert!(a.approx_eq(b, EPS), "{a:?} != {b:?}");
    }

    #[test]
    fn test_identity_rotation() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_vec_close(Quaternion::IDENTITY.rotate(v), v);
    }

    #[test]
    fn test_half_turn_about_vertical() {
        let q = Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), std::f32::consts::PI);
        let v = Vector3::new(0.0, 1.0, 0.0);
        assert_vec_close(q.rotate(v), Vector3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_quarter_turn_composition() {
        let quarter =
            Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), std::f32::consts::FRAC_PI_2);
        let half = quarter.mul_quat(quarter);
        let v = Vector3::new(1.0, 0.0, 0.0);
        assert_vec_close(half.rotate(v), Vector3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let q = Quaternion::from_axis_angle(Vector3::new(1.0, 2.0, 0.5), 1.3).normalized();
        let packed = q.pack();
        let recovered = Quaternion::unpack(packed);
        // q and -q are the same rotation; compare by action on a vector
        let v = Vector3::new(0.3, -1.0, 2.0);
        assert_vec_close(q.rotate(v), recovered.rotate(v));
    }

    #[test]
    fn test_unpack_clamps_overlong() {
        // Components summing past unity must not NaN
        let q = Quaternion::unpack([0.8, 0.8, 0.8]);
        assert!(!q.w.is_nan());
        assert_eq!(q.w, 0.0);
    }

    #[test]
    fn test_cross_handedness() {
        let x = Vector3::new(1.0, 0.0, 0.0);
        let y = Vector3::new(0.0, 1.0, 0.0);
        assert_vec_close(x.cross(y), Vector3::new(0.0, 0.0, 1.0));
    }

    proptest! {
        #[test]
        fn prop_rotation_preserves_length(
            x in -64.0f32..64.0,
            y in -64.0f32..64.0,
            z in -64.0f32..64.0,
            angle in -3.14f32..3.14,
        ) {
            let q = Quaternion::from_axis_angle(Vector3::new(0.3, -0.5, 0.8), angle);
            let v = Vector3::new(x, y, z);
            prop_assert!((q.rotate(v).length() - v.length()).abs() < 1e-2);
        }
    }
}
