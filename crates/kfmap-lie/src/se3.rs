use std::ops::Mul;

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

use crate::so3::SO3;

/// Rigid motion group SE(3): a rotation plus a translation.
#[derive(Debug, Clone, Copy)]
pub struct SE3 {
    /// The rotation part.
    pub rotation: SO3,
    /// The translation part.
    pub translation: Vec3,
}

impl SE3 {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: SO3::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// Build from a rotation and a translation.
    pub fn new(rotation: SO3, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build from a quaternion and a translation.
    pub fn from_quaternion_translation(q: Quat, translation: Vec3) -> Self {
        Self {
            rotation: SO3::from_quaternion(q),
            translation,
        }
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.inverse();
        Self {
            rotation: inv_rot,
            translation: -(inv_rot * self.translation),
        }
    }

    /// Lie algebra -> Lie group.
    ///
    /// The increment is split into a translational part `upsilon` and a
    /// rotational part `omega`.
    pub fn exp(upsilon: Vec3, omega: Vec3) -> Self {
        let rotation = SO3::exp(omega);
        let theta = omega.length();

        let translation = if theta > f32::EPSILON {
            let hat = SO3::hat(omega);
            let hat2 = hat * hat;
            let v = Mat3::IDENTITY
                + hat * ((1.0 - theta.cos()) / (theta * theta))
                + hat2 * ((theta - theta.sin()) / (theta * theta * theta));
            v * upsilon
        } else {
            upsilon
        };

        Self {
            rotation,
            translation,
        }
    }

    /// Lie group -> Lie algebra, returning `(upsilon, omega)`.
    pub fn log(&self) -> (Vec3, Vec3) {
        let omega = self.rotation.log();
        let theta = omega.length();

        let upsilon = if theta > f32::EPSILON {
            let hat = SO3::hat(omega);
            let hat2 = hat * hat;
            let half_theta = 0.5 * theta;
            let v_inv = Mat3::IDENTITY - hat * 0.5
                + hat2
                    * ((1.0 - half_theta * half_theta.cos() / half_theta.sin())
                        / (theta * theta));
            v_inv * self.translation
        } else {
            self.translation
        };

        (upsilon, omega)
    }

    /// The transform as a 4x4 homogeneous matrix.
    pub fn as_matrix(&self) -> Mat4 {
        let mut matrix = Mat4::from_mat3(self.rotation.to_matrix());
        matrix.w_axis = Vec4::new(
            self.translation.x,
            self.translation.y,
            self.translation.z,
            1.0,
        );
        matrix
    }
}

impl Mul for SE3 {
    type Output = SE3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            rotation: self.rotation * rhs.rotation,
            translation: self.translation + self.rotation * rhs.translation,
        }
    }
}

impl Mul<Vec3> for SE3 {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Self::Output {
        self.rotation * rhs + self.translation
    }
}
