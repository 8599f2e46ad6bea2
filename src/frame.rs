// Copyright 2017 Matthew Plant. This file is part of MGF.
//
// MGF is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MGF is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with MGF. If not, see <http://www.gnu.org/licenses/>.

use cgmath::{EuclideanSpace, InnerSpace, Matrix, Matrix3, Point3, Quaternion, SquareMatrix,
             Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::*;

/// Normals shorter than this are rejected when building a contact frame.
pub const MIN_NORMAL_LENGTH: f32 = 1.0e-9;

/// If the normal crossed with the singular axis is shorter than this, the
/// singular axis is swapped for the coordinate axis most perpendicular to the
/// normal.
pub const SINGULARITY_THRESHOLD: f32 = 1.0e-2;

/// Position and orientation of a body with respect to the world.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub pos: Point3<f32>,
    /// Rotation matrix `A` taking body coordinates to world coordinates.
    pub rot: Matrix3<f32>,
}

impl Frame {
    pub fn new(pos: Point3<f32>, rot: Quaternion<f32>) -> Self {
        Frame {
            pos,
            rot: Matrix3::from(rot),
        }
    }

    /// A frame translated by `pos` with no rotation.
    pub fn from_pos(pos: Point3<f32>) -> Self {
        Frame {
            pos,
            rot: Matrix3::identity(),
        }
    }

    /// Returns the point in local coordinates, `A'(p - origin)`.
    #[inline]
    pub fn transform_parent_to_local(&self, p: Point3<f32>) -> Point3<f32> {
        Point3::from_vec(self.rot.transpose() * (p - self.pos))
    }

    /// Returns the point in parent coordinates, `origin + A p`.
    #[inline]
    pub fn transform_local_to_parent(&self, p: Point3<f32>) -> Point3<f32> {
        self.pos + self.rot * p.to_vec()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Frame::from_pos(Point3::origin())
    }
}

/// Orthonormal basis of a contact, stored as the columns of a rotation
/// matrix: `x` is the contact normal, `y` and `z` span the tangent plane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContactFrame {
    pub plane: Matrix3<f32>,
}

impl ContactFrame {
    /// Build the contact frame from a normal, using the Y axis as the
    /// reference direction unless the normal is nearly parallel to it.
    pub fn from_normal(normal: Vector3<f32>) -> LcpResult<Self> {
        let len = normal.magnitude();
        if !len.is_finite() || len < MIN_NORMAL_LENGTH {
            warn!(x = normal.x, y = normal.y, z = normal.z, "rejecting degenerate contact normal");
            return Err(LcpError::DegenerateNormal(normal.x, normal.y, normal.z));
        }
        let vx = normal / len;
        let mut vz = vx.cross(Vector3::unit_y());
        if vz.magnitude() < SINGULARITY_THRESHOLD {
            vz = vx.cross(most_perpendicular_axis(vx));
        }
        let vz = vz.normalize();
        let vy = vz.cross(vx);
        Ok(ContactFrame {
            plane: Matrix3::from_cols(vx, vy, vz),
        })
    }

    #[inline(always)]
    pub fn normal(&self) -> Vector3<f32> {
        self.plane.x
    }

    #[inline(always)]
    pub fn tangent_u(&self) -> Vector3<f32> {
        self.plane.y
    }

    #[inline(always)]
    pub fn tangent_v(&self) -> Vector3<f32> {
        self.plane.z
    }

    /// The three axes in row order: normal, tangent U, tangent V.
    #[inline(always)]
    pub fn axes(&self) -> [Vector3<f32>; 3] {
        [self.plane.x, self.plane.y, self.plane.z]
    }

    /// Express a world vector in contact coordinates.
    #[inline]
    pub fn world_to_contact(&self, v: Vector3<f32>) -> Vector3<f32> {
        self.plane.transpose() * v
    }

    /// Express a contact-coordinate vector in world coordinates.
    #[inline]
    pub fn contact_to_world(&self, v: Vector3<f32>) -> Vector3<f32> {
        self.plane * v
    }

    pub fn orientation(&self) -> Quaternion<f32> {
        Quaternion::from(self.plane)
    }
}

/// The coordinate axis with the smallest component along `v`.
fn most_perpendicular_axis(v: Vector3<f32>) -> Vector3<f32> {
    let (ax, ay, az) = (v.x.abs(), v.y.abs(), v.z.abs());
    if ax <= ay && ax <= az {
        Vector3::unit_x()
    } else if ay <= az {
        Vector3::unit_y()
    } else {
        Vector3::unit_z()
    }
}

#[cfg(test)]
mod tests {
    mod frame {
        use approx::assert_abs_diff_eq;
        use cgmath::{Deg, InnerSpace, Point3, Quaternion, Rotation3, Vector3};

        use crate::error::*;
        use crate::frame::*;

        fn assert_orthonormal(frame: &ContactFrame) {
            let [x, y, z] = frame.axes();
            assert_abs_diff_eq!(x.magnitude(), 1.0, epsilon = 1.0e-5);
            assert_abs_diff_eq!(y.magnitude(), 1.0, epsilon = 1.0e-5);
            assert_abs_diff_eq!(z.magnitude(), 1.0, epsilon = 1.0e-5);
            assert_abs_diff_eq!(x.dot(y), 0.0, epsilon = 1.0e-5);
            assert_abs_diff_eq!(x.dot(z), 0.0, epsilon = 1.0e-5);
            assert_abs_diff_eq!(y.dot(z), 0.0, epsilon = 1.0e-5);
            // Right handed:
            assert_abs_diff_eq!(x.cross(y).dot(z), 1.0, epsilon = 1.0e-5);
        }

        #[test]
        fn test_contact_frame_orthonormal() {
            let normals = [
                Vector3::new(0.0, 0.0, 1.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.0, -1.0, 0.0),
                Vector3::new(1.0e-4, 1.0, -1.0e-4),
                Vector3::new(1.0, 2.0, 3.0),
                Vector3::new(-0.3, 0.1, -7.0),
                Vector3::new(0.0, 5.0, 0.0),
            ];
            for n in normals.iter() {
                let frame = ContactFrame::from_normal(*n).unwrap();
                assert_orthonormal(&frame);
                let unit = n.normalize();
                assert_abs_diff_eq!(frame.normal().dot(unit), 1.0, epsilon = 1.0e-5);
            }
        }

        #[test]
        fn test_contact_frame_degenerate() {
            assert_eq!(
                ContactFrame::from_normal(Vector3::new(0.0, 0.0, 0.0)),
                Err(LcpError::DegenerateNormal(0.0, 0.0, 0.0))
            );
            assert!(ContactFrame::from_normal(Vector3::new(std::f32::NAN, 0.0, 1.0)).is_err());
            assert!(ContactFrame::from_normal(Vector3::new(std::f32::INFINITY, 0.0, 0.0)).is_err());
        }

        #[test]
        fn test_contact_frame_change_of_basis() {
            let frame = ContactFrame::from_normal(Vector3::new(0.0, 0.0, 1.0)).unwrap();
            let w = Vector3::new(0.5, -2.0, 3.0);
            let local = frame.world_to_contact(w);
            assert_abs_diff_eq!(local.x, 3.0, epsilon = 1.0e-6);
            let back = frame.contact_to_world(local);
            assert_abs_diff_eq!(back.x, w.x, epsilon = 1.0e-6);
            assert_abs_diff_eq!(back.y, w.y, epsilon = 1.0e-6);
            assert_abs_diff_eq!(back.z, w.z, epsilon = 1.0e-6);
        }

        #[test]
        fn test_frame_transforms() {
            let frame = Frame::new(Point3::new(1.0, 2.0, 3.0),
                                   Quaternion::from_angle_z(Deg(90.0)));
            let p = Point3::new(1.0, 3.0, 3.0);
            let local = frame.transform_parent_to_local(p);
            assert_abs_diff_eq!(local.x, 1.0, epsilon = 1.0e-6);
            assert_abs_diff_eq!(local.y, 0.0, epsilon = 1.0e-6);
            assert_abs_diff_eq!(local.z, 0.0, epsilon = 1.0e-6);
            let world = frame.transform_local_to_parent(local);
            assert_abs_diff_eq!(world.x, p.x, epsilon = 1.0e-6);
            assert_abs_diff_eq!(world.y, p.y, epsilon = 1.0e-6);
            assert_abs_diff_eq!(world.z, p.z, epsilon = 1.0e-6);
        }
    }
}
