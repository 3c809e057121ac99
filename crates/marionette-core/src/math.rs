//! Quaternion math in the VMC wire convention
//!
//! Components are ordered `[x, y, z, w]` to match the `/VMC/Ext/Bone/Pos`
//! argument layout. Every rotation that leaves this process is expected to
//! be normalized; `normalize` substitutes identity for degenerate inputs.

use std::ops::Mul;

use serde::{Deserialize, Serialize};

/// Magnitude below which a quaternion is treated as degenerate.
const MIN_MAGNITUDE: f32 = 1e-10;

/// Rotation quaternion, `[x, y, z, w]` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    /// The identity rotation `[0, 0, 0, 1]`.
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Quat { x, y, z, w }
    }

    /// Inverse of a unit quaternion (conjugate).
    pub fn inverse(self) -> Quat {
        Quat {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    pub fn magnitude(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn dot(self, other: Quat) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Normalize to unit magnitude; degenerate inputs become identity.
    pub fn normalize(self) -> Quat {
        let mag = self.magnitude();
        if mag < MIN_MAGNITUDE {
            return Quat::IDENTITY;
        }
        Quat {
            x: self.x / mag,
            y: self.y / mag,
            z: self.z / mag,
            w: self.w / mag,
        }
    }

    /// Normalized linear interpolation from `self` toward `other`.
    ///
    /// Takes the shortest path: `other` is negated first when the two
    /// quaternions sit in opposite hemispheres.
    pub fn nlerp(self, other: Quat, t: f32) -> Quat {
        let other = if self.dot(other) < 0.0 {
            Quat {
                x: -other.x,
                y: -other.y,
                z: -other.z,
                w: -other.w,
            }
        } else {
            other
        };

        Quat {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
            w: self.w + (other.w - self.w) * t,
        }
        .normalize()
    }

    /// Build a rotation from intrinsic X-Y-Z Euler angles in degrees.
    pub fn from_euler_deg(x_deg: f32, y_deg: f32, z_deg: f32) -> Quat {
        let (rx, ry, rz) = (
            x_deg.to_radians(),
            y_deg.to_radians(),
            z_deg.to_radians(),
        );
        let (cx, sx) = ((rx / 2.0).cos(), (rx / 2.0).sin());
        let (cy, sy) = ((ry / 2.0).cos(), (ry / 2.0).sin());
        let (cz, sz) = ((rz / 2.0).cos(), (rz / 2.0).sin());

        Quat {
            x: sx * cy * cz - cx * sy * sz,
            y: cx * sy * cz + sx * cy * sz,
            z: cx * cy * sz - sx * sy * cz,
            w: cx * cy * cz + sx * sy * sz,
        }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

impl Mul for Quat {
    type Output = Quat;

    /// Hamilton product `self * rhs`.
    fn mul(self, rhs: Quat) -> Quat {
        let (ax, ay, az, aw) = (self.x, self.y, self.z, self.w);
        let (bx, by, bz, bw) = (rhs.x, rhs.y, rhs.z, rhs.w);
        Quat {
            x: aw * bx + ax * bw + ay * bz - az * by,
            y: aw * by - ax * bz + ay * bw + az * bx,
            z: aw * bz + ax * by - ay * bx + az * bw,
            w: aw * bw - ax * bx - ay * by - az * bz,
        }
    }
}

impl From<[f32; 4]> for Quat {
    fn from(q: [f32; 4]) -> Self {
        Quat {
            x: q[0],
            y: q[1],
            z: q[2],
            w: q[3],
        }
    }
}

impl From<Quat> for [f32; 4] {
    fn from(q: Quat) -> Self {
        [q.x, q.y, q.z, q.w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: Quat, b: Quat, tol: f32) -> bool {
        (a.x - b.x).abs() < tol
            && (a.y - b.y).abs() < tol
            && (a.z - b.z).abs() < tol
            && (a.w - b.w).abs() < tol
    }

    #[test]
    fn test_identity_product() {
        let q = Quat::from_euler_deg(30.0, -45.0, 10.0);
        assert!(approx_eq(q * Quat::IDENTITY, q, 1e-6));
        assert!(approx_eq(Quat::IDENTITY * q, q, 1e-6));
    }

    #[test]
    fn test_inverse_cancels() {
        let q = Quat::from_euler_deg(12.0, 70.0, -30.0);
        let composed = (q.inverse() * q).normalize();
        assert!(approx_eq(composed, Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_normalize_degenerate() {
        let q = Quat::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(q.normalize(), Quat::IDENTITY);
    }

    #[test]
    fn test_nlerp_endpoints() {
        let a = Quat::from_euler_deg(0.0, 0.0, 0.0);
        let b = Quat::from_euler_deg(0.0, 90.0, 0.0);
        assert!(approx_eq(a.nlerp(b, 0.0), a, 1e-6));
        assert!(approx_eq(a.nlerp(b, 1.0), b, 1e-6));
    }

    #[test]
    fn test_nlerp_hemisphere_correction() {
        let a = Quat::from_euler_deg(0.0, 10.0, 0.0);
        // Same rotation, opposite sign. Blending must not pass through zero.
        let b = Quat::new(-a.x, -a.y, -a.z, -a.w);
        let mid = a.nlerp(b, 0.5);
        assert!(approx_eq(mid, a, 1e-5));
    }

    #[test]
    fn test_from_euler_ninety_z() {
        let q = Quat::from_euler_deg(0.0, 0.0, 90.0);
        let expected = Quat::new(0.0, 0.0, std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2);
        assert!(approx_eq(q, expected, 1e-6));
    }

    #[test]
    fn test_serde_array_form() {
        let q = Quat::new(0.1, 0.2, 0.3, 0.9);
        let json = serde_json::to_string(&q).unwrap();
        assert_eq!(json, "[0.1,0.2,0.3,0.9]");
        let back: Quat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_unit(x in -2.0f32..2.0, y in -2.0f32..2.0,
                                  z in -2.0f32..2.0, w in -2.0f32..2.0) {
            let q = Quat::new(x, y, z, w).normalize();
            prop_assert!((q.magnitude() - 1.0).abs() < 1e-5);
        }

        #[test]
        fn prop_nlerp_is_unit(yaw in -180.0f32..180.0, pitch in -90.0f32..90.0,
                              t in 0.0f32..1.0) {
            let a = Quat::from_euler_deg(pitch, yaw, 0.0);
            let b = Quat::from_euler_deg(-pitch, -yaw, 15.0);
            let q = a.nlerp(b, t);
            prop_assert!((q.magnitude() - 1.0).abs() < 1e-5);
        }
    }
}
