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

use cgmath::{EuclideanSpace, Point3, Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::frame::*;
use crate::variables::*;

/// Kinematic queries on the body behind a collision model.
pub trait BodyKinematics {
    /// Transform a world point into body coordinates.
    fn point_world_to_body(&self, p: Point3<f32>) -> Point3<f32>;

    /// World velocity of a point given in body coordinates.
    fn point_speed_local_to_parent(&self, p: Point3<f32>) -> Vector3<f32>;

    /// Step size of the simulation the body belongs to.
    fn step(&self) -> f32;

    /// Approach speeds under this value never bounce.
    fn min_bounce_speed(&self) -> f32;
}

/// The collision shape attached to something in the scene, as seen by a
/// contact.
pub trait CollisionModel {
    /// The dynamic body owning this model, if any. Contacts only consider
    /// restitution when both models expose one.
    fn body(&self) -> Option<&dyn BodyKinematics> {
        None
    }
}

/// Kinematic state of a dynamic rigid body.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub frame: Frame,
    /// Linear velocity in world coordinates.
    pub v: Vector3<f32>,
    /// Angular velocity in body coordinates.
    pub omega: Vector3<f32>,
    pub step: f32,
    pub min_bounce_speed: f32,
}

impl BodyState {
    pub fn new(frame: Frame, step: f32, min_bounce_speed: f32) -> Self {
        BodyState {
            frame,
            v: Vector3::zero(),
            omega: Vector3::zero(),
            step,
            min_bounce_speed,
        }
    }

    /// Copy the velocities held in a variable block.
    pub fn set_velocity_from(&mut self, variables: &VariablesBody) {
        let (v, omega) = variables.velocity();
        self.v = v;
        self.omega = omega;
    }
}

impl BodyKinematics for BodyState {
    #[inline]
    fn point_world_to_body(&self, p: Point3<f32>) -> Point3<f32> {
        self.frame.transform_parent_to_local(p)
    }

    #[inline]
    fn point_speed_local_to_parent(&self, p: Point3<f32>) -> Vector3<f32> {
        self.v + self.frame.rot * self.omega.cross(p.to_vec())
    }

    fn step(&self) -> f32 {
        self.step
    }

    fn min_bounce_speed(&self) -> f32 {
        self.min_bounce_speed
    }
}

impl CollisionModel for BodyState {
    fn body(&self) -> Option<&dyn BodyKinematics> {
        Some(self)
    }
}

/// A model attached to static geometry, with no body behind it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticModel;

impl CollisionModel for StaticModel {}

#[cfg(test)]
mod tests {
    mod model {
        use approx::assert_abs_diff_eq;
        use cgmath::{Deg, Point3, Quaternion, Rotation3, Vector3};

        use crate::frame::*;
        use crate::model::*;
        use crate::variables::*;

        #[test]
        fn test_point_speed() {
            let frame = Frame::new(Point3::new(0.0, 0.0, 1.0), Quaternion::from_angle_z(Deg(90.0)));
            let mut body = BodyState::new(frame, 0.01, 0.15);
            body.v = Vector3::new(1.0, 0.0, 0.0);
            body.omega = Vector3::new(0.0, 0.0, 2.0);
            // World point one unit along the body's local x axis.
            let local = body.point_world_to_body(Point3::new(0.0, 1.0, 1.0));
            assert_abs_diff_eq!(local.x, 1.0, epsilon = 1.0e-6);
            assert_abs_diff_eq!(local.y, 0.0, epsilon = 1.0e-6);
            let speed = body.point_speed_local_to_parent(local);
            // omega x p = (0, 2, 0) locally, (-2, 0, 0) in the world.
            assert_abs_diff_eq!(speed.x, -1.0, epsilon = 1.0e-5);
            assert_abs_diff_eq!(speed.y, 0.0, epsilon = 1.0e-5);
            assert_abs_diff_eq!(speed.z, 0.0, epsilon = 1.0e-5);
        }

        #[test]
        fn test_body_capability() {
            let body = BodyState::new(Frame::default(), 0.02, 0.1);
            let kinematics = body.body().unwrap();
            assert_eq!(kinematics.step(), 0.02);
            assert_eq!(kinematics.min_bounce_speed(), 0.1);
            assert!(StaticModel.body().is_none());
        }

        #[test]
        fn test_velocity_from_variables() {
            let mut vars = VariablesBody::default();
            vars.set_velocity(Vector3::new(1.0, 2.0, 3.0), Vector3::new(4.0, 5.0, 6.0));
            let mut body = BodyState::new(Frame::default(), 0.01, 0.0);
            body.set_velocity_from(&vars);
            assert_eq!(body.v, Vector3::new(1.0, 2.0, 3.0));
            assert_eq!(body.omega, Vector3::new(4.0, 5.0, 6.0));
        }
    }
}
