use std::ops::Mul;

use glam::{Mat3, Quat, Vec3};

/// Rotation group SO(3), backed by a unit quaternion.
#[derive(Debug, Clone, Copy)]
pub struct SO3 {
    /// The unit quaternion representing the rotation.
    pub q: Quat,
}

impl SO3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { q: Quat::IDENTITY };

    /// Build from a quaternion, renormalizing it.
    pub fn from_quaternion(q: Quat) -> Self {
        Self { q: q.normalize() }
    }

    /// Build from a rotation matrix.
    pub fn from_matrix(mat: &Mat3) -> Self {
        Self {
            q: Quat::from_mat3(mat),
        }
    }

    /// The rotation as a 3x3 matrix.
    pub fn to_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.q)
    }

    /// The inverse rotation.
    pub fn inverse(&self) -> Self {
        Self {
            q: self.q.inverse(),
        }
    }

    /// Lie algebra -> Lie group.
    pub fn exp(v: Vec3) -> Self {
        let theta = v.length();
        let (w, b) = if theta > f32::EPSILON {
            let theta_half = theta / 2.0;
            (theta_half.cos(), theta_half.sin() / theta)
        } else {
            // first order expansion around zero
            (1.0, 0.5)
        };
        let xyz = b * v;

        Self {
            q: Quat::from_xyzw(xyz.x, xyz.y, xyz.z, w),
        }
    }

    /// Lie group -> Lie algebra.
    pub fn log(&self) -> Vec3 {
        let q = if self.q.w < 0.0 { -self.q } else { self.q };
        let vec = Vec3::new(q.x, q.y, q.z);
        let vec_norm = vec.length();

        if vec_norm > f32::EPSILON {
            let theta = 2.0 * vec_norm.atan2(q.w);
            vec * (theta / vec_norm)
        } else {
            vec * (2.0 / q.w)
        }
    }

    /// Vector space -> Lie algebra.
    pub fn hat(v: Vec3) -> Mat3 {
        Mat3::from_cols_array(&[
            0.0, v.z, -v.y, //
            -v.z, 0.0, v.x, //
            v.y, -v.x, 0.0,
        ])
    }

    /// Angle of the relative rotation between two elements.
    pub fn angular_distance(&self, other: &Self) -> f32 {
        self.q.angle_between(other.q)
    }
}

impl Mul for SO3 {
    type Output = SO3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            q: (self.q * rhs.q).normalize(),
        }
    }
}

impl Mul<Vec3> for SO3 {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Self::Output {
        self.q * rhs
    }
}
