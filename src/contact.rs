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

use std::cell::Cell;
use std::rc::Rc;

use cgmath::{EuclideanSpace, Matrix, Point3, Quaternion, Vector3, Zero};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::constraint::*;
use crate::descriptor::*;
use crate::error::*;
use crate::frame::*;
use crate::material::*;
use crate::model::*;

/// Number of slots of a reaction cache: three speed-level multipliers
/// followed by three position-level multipliers.
pub const REACTION_CACHE_LEN: usize = 6;

/// Warm start storage for the multipliers of one contact, kept by the
/// persistent contact manifold across steps.
///
/// Clones refer to the same storage. Anyone holding a handle can read it,
/// but only contacts write to it.
#[derive(Clone, Debug, Default)]
pub struct ReactionCache(Rc<Cell<[f32; REACTION_CACHE_LEN]>>);

impl ReactionCache {
    pub fn new() -> Self {
        ReactionCache::default()
    }

    pub fn get(&self) -> [f32; REACTION_CACHE_LEN] {
        self.0.get()
    }

    /// The speed-level multipliers (N, U, V).
    pub fn speed(&self) -> [f32; 3] {
        let c = self.0.get();
        [c[0], c[1], c[2]]
    }

    /// The position-level multipliers (N, U, V).
    pub fn position(&self) -> [f32; 3] {
        let c = self.0.get();
        [c[3], c[4], c[5]]
    }

    /// Returns true if both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &ReactionCache) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn set_speed(&self, l: [f32; 3]) {
        let mut c = self.0.get();
        c[..3].copy_from_slice(&l);
        self.0.set(c);
    }

    pub(crate) fn set_position(&self, l: [f32; 3]) {
        let mut c = self.0.get();
        c[3..].copy_from_slice(&l);
        self.0.set(c);
    }
}

/// Which law produced the right-hand side of the normal row.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RhsBranch {
    /// Newton restitution, the target is a rebound speed.
    Bounce,
    /// Soft contact with compliance and damping.
    Compliant,
    /// Rigid contact recovering the penetration.
    Rigid,
}

/// Parameters of a right-hand-side load.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RhsSettings {
    /// Scale factor `c` of the violation, usually the inverse time step.
    pub factor: f32,
    /// Largest speed used to recover penetration when clamping.
    pub recovery_clamp: f32,
    pub do_clamp: bool,
}

impl RhsSettings {
    pub fn new(factor: f32, recovery_clamp: f32) -> Self {
        RhsSettings {
            factor,
            recovery_clamp,
            do_clamp: true,
        }
    }

    pub fn unclamped(factor: f32) -> Self {
        RhsSettings {
            factor,
            recovery_clamp: 0.0,
            do_clamp: false,
        }
    }
}

/// The two sides of a contact: their collision models, variable blocks and
/// frames.
#[derive(Clone)]
pub struct ContactPair<'a> {
    pub model_a: Rc<dyn CollisionModel>,
    pub model_b: Rc<dyn CollisionModel>,
    pub variables_a: VarIndex,
    pub variables_b: VarIndex,
    pub frame_a: &'a Frame,
    pub frame_b: &'a Frame,
}

/// Output of the narrow phase for one contact point.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactGeometry {
    /// Contact point on A, in world coordinates.
    pub p1: Point3<f32>,
    /// Contact point on B, in world coordinates.
    pub p2: Point3<f32>,
    /// Unit normal pointing from A to B.
    pub normal: Vector3<f32>,
    /// Signed distance between the points, negative when penetrating.
    pub distance: f32,
}

/// Where a right-hand side is loaded: into the known term of the normal row,
/// or into the `Qc` vector of a time integrator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RhsRoute {
    Row,
    Integrator,
}

struct NormalRhs {
    branch: RhsBranch,
    value: f32,
    /// Constraint force mixing for the normal and the tangent rows.
    cfm: Option<(f32, f32)>,
}

/// A frictional contact between two rigid bodies: one unilateral row along
/// the normal and two friction rows in the tangent plane, coupled by a
/// Coulomb cone.
pub struct Contact {
    model_a: Rc<dyn CollisionModel>,
    model_b: Rc<dyn CollisionModel>,
    p1: Point3<f32>,
    p2: Point3<f32>,
    normal: Vector3<f32>,
    distance: f32,
    plane: ContactFrame,
    friction: f32,
    cohesion: f32,
    restitution: f32,
    dampingf: f32,
    compliance: f32,
    compliance_t: f32,
    react_force: Vector3<f32>,
    cache: Option<ReactionCache>,
    nx: ConstraintRow,
    tu: ConstraintRow,
    tv: ConstraintRow,
}

impl Contact {
    pub fn new(
        pair: ContactPair<'_>,
        geometry: &ContactGeometry,
        material: &MaterialCouple,
        cache: Option<ReactionCache>,
    ) -> LcpResult<Self> {
        let plane = ContactFrame::from_normal(geometry.normal)?;
        let (a, b) = (pair.variables_a, pair.variables_b);
        let mut contact = Contact {
            model_a: pair.model_a.clone(),
            model_b: pair.model_b.clone(),
            p1: geometry.p1,
            p2: geometry.p2,
            normal: geometry.normal,
            distance: geometry.distance,
            plane,
            friction: 0.0,
            cohesion: 0.0,
            restitution: 0.0,
            dampingf: 0.0,
            compliance: 0.0,
            compliance_t: 0.0,
            react_force: Vector3::zero(),
            cache: None,
            nx: ConstraintRow::new(a, b, RowMode::Unilateral),
            tu: ConstraintRow::new(a, b, RowMode::Friction),
            tv: ConstraintRow::new(a, b, RowMode::Friction),
        };
        contact.reset(pair, geometry, material, cache)?;
        Ok(contact)
    }

    /// Rebuild the contact for new geometry. Multipliers already in the rows
    /// are kept; use the warm start operations to reload them from the cache.
    ///
    /// On error the contact is left unchanged.
    pub fn reset(
        &mut self,
        pair: ContactPair<'_>,
        geometry: &ContactGeometry,
        material: &MaterialCouple,
        cache: Option<ReactionCache>,
    ) -> LcpResult<()> {
        let plane = ContactFrame::from_normal(geometry.normal)?;

        self.model_a = pair.model_a;
        self.model_b = pair.model_b;
        self.p1 = geometry.p1;
        self.p2 = geometry.p2;
        self.normal = geometry.normal;
        self.distance = geometry.distance;
        self.plane = plane;
        self.friction = material.static_friction;
        self.cohesion = material.cohesion;
        self.restitution = material.restitution;
        self.dampingf = material.dampingf;
        self.compliance = material.compliance;
        self.compliance_t = material.compliance_t;
        self.cache = cache;

        let p1_local = pair.frame_a.transform_parent_to_local(geometry.p1).to_vec();
        let p2_local = pair.frame_b.transform_parent_to_local(geometry.p2).to_vec();
        let (rot_a, rot_b) = (pair.frame_a.rot, pair.frame_b.rot);
        let axes = plane.axes();
        let friction = self.friction;
        for (row, &axis) in [&mut self.nx, &mut self.tu, &mut self.tv].iter_mut().zip(axes.iter()) {
            row.set_variables(pair.variables_a, pair.variables_b);
            // Axis in each body's coordinates, crossed with the lever arm.
            let axis_a = rot_a.transpose() * axis;
            let axis_b = rot_b.transpose() * axis;
            row.cq_a = jacobian(-axis, axis_a.cross(p1_local));
            row.cq_b = jacobian(axis, -axis_b.cross(p2_local));
            row.friction = friction;
            row.cfm_i = 0.0;
            row.cone = None;
        }

        self.react_force = Vector3::zero();
        Ok(())
    }

    /// Coordinate system at the contact point on B, its rotation being the
    /// contact plane.
    pub fn contact_coords(&self) -> Frame {
        Frame {
            pos: self.p2,
            rot: self.plane.plane,
        }
    }

    pub fn contact_orientation(&self) -> Quaternion<f32> {
        self.plane.orientation()
    }

    /// Register the three rows into the descriptor, normal row first, and
    /// couple them by a friction cone. Returns the index of the normal row.
    pub fn inject_constraints<'a>(&'a mut self, descriptor: &mut SystemDescriptor<'a>) -> usize {
        let base = descriptor.next_constraint_index();
        self.nx.cone = Some(Cone::Sliding {
            friction: self.friction,
            cohesion: self.cohesion,
            u: base + 1,
            v: base + 2,
        });
        let Contact { nx, tu, tv, .. } = self;
        descriptor.insert_constraint(nx);
        descriptor.insert_constraint(tu);
        descriptor.insert_constraint(tv);
        base
    }

    pub fn constraints_bi_reset(&mut self) {
        self.nx.b_i = 0.0;
        self.tu.b_i = 0.0;
        self.tv.b_i = 0.0;
    }

    /// Add the violation term to the right-hand side of the normal row.
    /// Tangent rows are left untouched: there is no target sliding speed.
    pub fn load_constraint_rhs(&mut self, settings: &RhsSettings) -> RhsBranch {
        let rhs = self.normal_rhs(settings, RhsRoute::Row);
        self.apply_cfm(&rhs);
        self.nx.b_i += rhs.value;
        rhs.branch
    }

    /// Store the multipliers, times `factor`, as the reaction force in the
    /// contact plane.
    pub fn constraints_fetch_react(&mut self, factor: f32) {
        self.react_force = Vector3::new(self.nx.l_i, self.tu.l_i, self.tv.l_i) * factor;
    }

    pub fn load_suggested_speed_solution(&mut self) {
        if let Some(ref cache) = self.cache {
            let [n, u, v] = cache.speed();
            self.nx.l_i = n;
            self.tu.l_i = u;
            self.tv.l_i = v;
        }
    }

    pub fn load_suggested_position_solution(&mut self) {
        if let Some(ref cache) = self.cache {
            let [n, u, v] = cache.position();
            self.nx.l_i = n;
            self.tu.l_i = u;
            self.tv.l_i = v;
        }
    }

    pub fn fetch_suggested_speed_solution(&self) {
        if let Some(ref cache) = self.cache {
            cache.set_speed(self.multipliers());
        }
    }

    pub fn fetch_suggested_position_solution(&self) {
        if let Some(ref cache) = self.cache {
            cache.set_position(self.multipliers());
        }
    }

    /// Write the reaction force into `l` at `off_l`.
    pub fn state_gather_reactions(&self, off_l: usize, l: &mut DVector<f32>) -> LcpResult<()> {
        check_slots(l.len(), off_l, 3)?;
        l[off_l] = self.react_force.x;
        l[off_l + 1] = self.react_force.y;
        l[off_l + 2] = self.react_force.z;
        Ok(())
    }

    /// Read the reaction force from `l` at `off_l`.
    pub fn state_scatter_reactions(&mut self, off_l: usize, l: &DVector<f32>) -> LcpResult<()> {
        check_slots(l.len(), off_l, 3)?;
        self.react_force = Vector3::new(l[off_l], l[off_l + 1], l[off_l + 2]);
        Ok(())
    }

    /// Computes `r += c Cq' l` with the multipliers found in `l` at `off_l`.
    pub fn load_residual_cql(
        &self,
        off_l: usize,
        r: &mut DVector<f32>,
        l: &DVector<f32>,
        c: f32,
        vars: &dyn VariableSet,
    ) -> LcpResult<()> {
        check_slots(l.len(), off_l, 3)?;
        self.nx.multiply_t_and_add(r, l[off_l] * c, vars)?;
        self.tu.multiply_t_and_add(r, l[off_l + 1] * c, vars)?;
        self.tv.multiply_t_and_add(r, l[off_l + 2] * c, vars)
    }

    /// Add the violation term to `qc` at `off_l`, with the same laws as
    /// `load_constraint_rhs`. The step length used to extrapolate bounces and
    /// to soften compliant contacts is the one of body A, falling back to
    /// `1 / factor` when a model has no body. The compliant term is scaled by
    /// `factor`.
    pub fn load_constraint_c(
        &mut self,
        off_l: usize,
        qc: &mut DVector<f32>,
        settings: &RhsSettings,
    ) -> LcpResult<RhsBranch> {
        check_slots(qc.len(), off_l, 3)?;
        let rhs = self.normal_rhs(settings, RhsRoute::Integrator);
        self.apply_cfm(&rhs);
        qc[off_l] += rhs.value;
        Ok(rhs.branch)
    }

    /// Copy multipliers from `l` and known terms from `qc` into the rows.
    pub fn to_lcp(&mut self, off_l: usize, l: &DVector<f32>, qc: &DVector<f32>) -> LcpResult<()> {
        check_slots(l.len(), off_l, 3)?;
        check_slots(qc.len(), off_l, 3)?;
        for (i, row) in [&mut self.nx, &mut self.tu, &mut self.tv].iter_mut().enumerate() {
            row.l_i = l[off_l + i];
            row.b_i = qc[off_l + i];
        }
        Ok(())
    }

    /// Copy the multipliers of the rows into `l`.
    pub fn from_lcp(&self, off_l: usize, l: &mut DVector<f32>) -> LcpResult<()> {
        check_slots(l.len(), off_l, 3)?;
        for (i, m) in self.multipliers().iter().enumerate() {
            l[off_l + i] = *m;
        }
        Ok(())
    }

    fn multipliers(&self) -> [f32; 3] {
        [self.nx.l_i, self.tu.l_i, self.tv.l_i]
    }

    fn normal_rhs(&self, settings: &RhsSettings, route: RhsRoute) -> NormalRhs {
        let c = settings.factor;
        let bodies = match (self.model_a.body(), self.model_b.body()) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        };
        // `c` is the inverse step on the row route only.
        let h = match (route, bodies) {
            (RhsRoute::Integrator, Some((body_a, _))) => body_a.step(),
            _ => 1.0 / c,
        };

        if let Some((body_a, body_b)) = bodies {
            if let Some(rebound) = self.rebound_speed(body_a, body_b, h) {
                return NormalRhs {
                    branch: RhsBranch::Bounce,
                    value: c * rebound,
                    cfm: None,
                };
            }
        }

        if self.compliance > 0.0 {
            let inv_hpa = 1.0 / (h + self.dampingf);
            let inv_hhpa = 1.0 / (h * (h + self.dampingf));
            let value = match route {
                RhsRoute::Row => inv_hpa * self.distance,
                RhsRoute::Integrator => c * inv_hpa * self.distance,
            };
            return NormalRhs {
                branch: RhsBranch::Compliant,
                value,
                cfm: Some((inv_hhpa * self.compliance, inv_hhpa * self.compliance_t)),
            };
        }

        let value = c * self.distance;
        let value = if !settings.do_clamp {
            value
        } else if self.cohesion > 0.0 {
            value.max(-settings.recovery_clamp).min(0.0)
        } else {
            value.max(-settings.recovery_clamp)
        };
        NormalRhs {
            branch: RhsBranch::Rigid,
            value,
            cfm: None,
        }
    }

    /// The target normal speed after a bounce, if the contact bounces within
    /// a step of length `h`.
    fn rebound_speed(&self, body_a: &dyn BodyKinematics, body_b: &dyn BodyKinematics, h: f32) -> Option<f32> {
        if self.restitution <= 0.0 {
            return None;
        }
        let v1 = body_a.point_speed_local_to_parent(body_a.point_world_to_body(self.p1));
        let v2 = body_b.point_speed_local_to_parent(body_b.point_world_to_body(self.p2));
        let v_rel = self.plane.world_to_contact(v2 - v1);
        let neg_rebound_speed = v_rel.x * self.restitution;
        let bounce = neg_rebound_speed < -body_a.min_bounce_speed()
            && self.distance + neg_rebound_speed * h < 0.0;
        trace!(approach = v_rel.x, neg_rebound_speed, h, bounce, "restitution check");
        if bounce {
            Some(neg_rebound_speed)
        } else {
            None
        }
    }

    fn apply_cfm(&mut self, rhs: &NormalRhs) {
        if let Some((cfm_n, cfm_t)) = rhs.cfm {
            self.nx.cfm_i = cfm_n;
            self.tu.cfm_i = cfm_t;
            self.tv.cfm_i = cfm_t;
        }
    }

    pub fn p1(&self) -> Point3<f32> {
        self.p1
    }

    pub fn p2(&self) -> Point3<f32> {
        self.p2
    }

    pub fn normal(&self) -> Vector3<f32> {
        self.normal
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn contact_plane(&self) -> &ContactFrame {
        &self.plane
    }

    /// Reaction force in the contact plane: normal, tangent U, tangent V.
    pub fn react_force(&self) -> Vector3<f32> {
        self.react_force
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn cohesion(&self) -> f32 {
        self.cohesion
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn dampingf(&self) -> f32 {
        self.dampingf
    }

    pub fn compliance(&self) -> f32 {
        self.compliance
    }

    pub fn compliance_t(&self) -> f32 {
        self.compliance_t
    }

    pub fn model_a(&self) -> &Rc<dyn CollisionModel> {
        &self.model_a
    }

    pub fn model_b(&self) -> &Rc<dyn CollisionModel> {
        &self.model_b
    }

    pub fn reaction_cache(&self) -> Option<&ReactionCache> {
        self.cache.as_ref()
    }

    pub fn normal_row(&self) -> &ConstraintRow {
        &self.nx
    }

    /// The rows in injection order: normal, tangent U, tangent V.
    pub fn rows(&self) -> [&ConstraintRow; 3] {
        [&self.nx, &self.tu, &self.tv]
    }

    pub fn rows_mut(&mut self) -> [&mut ConstraintRow; 3] {
        [&mut self.nx, &mut self.tu, &mut self.tv]
    }
}
