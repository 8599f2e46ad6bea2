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

use cgmath::{Matrix, Vector3, Zero};
use nalgebra::DVector;

use crate::constraint::*;
use crate::contact::*;
use crate::descriptor::*;
use crate::error::*;
use crate::frame::*;
use crate::material::*;

/// Rows resisting the relative rotation of two bodies in contact: spinning
/// about the normal and rolling about the two tangents.
///
/// The rows only act on angular velocities and carry no known term. Their
/// multipliers are bounded by the normal multiplier of the contact they
/// belong to.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingRows {
    rx: ConstraintRow,
    ru: ConstraintRow,
    rv: ConstraintRow,
    rolling_friction: f32,
    spinning_friction: f32,
    react_torque: Vector3<f32>,
}

impl RollingRows {
    pub fn new(variables_a: VarIndex, variables_b: VarIndex) -> Self {
        RollingRows {
            rx: ConstraintRow::new(variables_a, variables_b, RowMode::Friction),
            ru: ConstraintRow::new(variables_a, variables_b, RowMode::Friction),
            rv: ConstraintRow::new(variables_a, variables_b, RowMode::Friction),
            rolling_friction: 0.0,
            spinning_friction: 0.0,
            react_torque: Vector3::zero(),
        }
    }

    /// Rebuild the rows in the given contact plane.
    pub fn reset(
        &mut self,
        variables_a: VarIndex,
        variables_b: VarIndex,
        plane: &ContactFrame,
        frame_a: &Frame,
        frame_b: &Frame,
        material: &MaterialCouple,
    ) {
        self.rolling_friction = material.rolling_friction;
        self.spinning_friction = material.spinning_friction;
        let bounds = [material.spinning_friction, material.rolling_friction, material.rolling_friction];
        let axes = plane.axes();
        let mut rows = [&mut self.rx, &mut self.ru, &mut self.rv];
        for ((row, &axis), &bound) in rows.iter_mut().zip(axes.iter()).zip(bounds.iter()) {
            row.set_variables(variables_a, variables_b);
            let zero = Vector3::zero();
            row.cq_a = jacobian(zero, -(frame_a.rot.transpose() * axis));
            row.cq_b = jacobian(zero, frame_b.rot.transpose() * axis);
            row.friction = bound;
            row.cfm_i = 0.0;
            row.cone = None;
        }
        self.react_torque = Vector3::zero();
    }

    /// Register the rows after the contact rows, coupling them to the normal
    /// row at index `normal`. Returns the index of the spinning row.
    pub fn inject<'a>(&'a mut self, normal: usize, descriptor: &mut SystemDescriptor<'a>) -> usize {
        let base = descriptor.next_constraint_index();
        self.rx.cone = Some(Cone::Rolling {
            rolling: self.rolling_friction,
            spinning: self.spinning_friction,
            normal,
            u: base + 1,
            v: base + 2,
        });
        let RollingRows { rx, ru, rv, .. } = self;
        descriptor.insert_constraint(rx);
        descriptor.insert_constraint(ru);
        descriptor.insert_constraint(rv);
        base
    }

    pub fn constraints_bi_reset(&mut self) {
        self.rx.b_i = 0.0;
        self.ru.b_i = 0.0;
        self.rv.b_i = 0.0;
    }

    pub fn constraints_fetch_react(&mut self, factor: f32) {
        self.react_torque = Vector3::new(self.rx.l_i, self.ru.l_i, self.rv.l_i) * factor;
    }

    /// Largest magnitudes of the spinning and the two rolling multipliers for
    /// a given normal multiplier.
    pub fn rolling_bounds(&self, normal_multiplier: f32) -> [f32; 3] {
        [
            self.rx.friction_bound(normal_multiplier),
            self.ru.friction_bound(normal_multiplier),
            self.rv.friction_bound(normal_multiplier),
        ]
    }

    /// Reaction torque in the contact plane: spinning, rolling U, rolling V.
    pub fn react_torque(&self) -> Vector3<f32> {
        self.react_torque
    }

    pub fn rolling_friction(&self) -> f32 {
        self.rolling_friction
    }

    pub fn spinning_friction(&self) -> f32 {
        self.spinning_friction
    }

    /// The rows in injection order: spinning, rolling U, rolling V.
    pub fn rows(&self) -> [&ConstraintRow; 3] {
        [&self.rx, &self.ru, &self.rv]
    }

    pub fn rows_mut(&mut self) -> [&mut ConstraintRow; 3] {
        [&mut self.rx, &mut self.ru, &mut self.rv]
    }
}

/// A contact with rolling and spinning friction.
///
/// Behaves as the inner `Contact` for everything that concerns the normal
/// and sliding rows. Integrator vectors get six slots per contact, the last
/// three holding the rolling multipliers or the reaction torque.
pub struct RollingContact {
    contact: Contact,
    rolling: RollingRows,
}

impl RollingContact {
    pub fn new(
        pair: ContactPair<'_>,
        geometry: &ContactGeometry,
        material: &MaterialCouple,
        cache: Option<ReactionCache>,
    ) -> LcpResult<Self> {
        let (a, b) = (pair.variables_a, pair.variables_b);
        let (frame_a, frame_b) = (pair.frame_a, pair.frame_b);
        let contact = Contact::new(pair, geometry, material, cache)?;
        let mut rolling = RollingRows::new(a, b);
        rolling.reset(a, b, contact.contact_plane(), frame_a, frame_b, material);
        Ok(RollingContact { contact, rolling })
    }

    pub fn reset(
        &mut self,
        pair: ContactPair<'_>,
        geometry: &ContactGeometry,
        material: &MaterialCouple,
        cache: Option<ReactionCache>,
    ) -> LcpResult<()> {
        let (a, b) = (pair.variables_a, pair.variables_b);
        let (frame_a, frame_b) = (pair.frame_a, pair.frame_b);
        self.contact.reset(pair, geometry, material, cache)?;
        self.rolling.reset(a, b, self.contact.contact_plane(), frame_a, frame_b, material);
        Ok(())
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn contact_mut(&mut self) -> &mut Contact {
        &mut self.contact
    }

    pub fn rolling(&self) -> &RollingRows {
        &self.rolling
    }

    pub fn rolling_mut(&mut self) -> &mut RollingRows {
        &mut self.rolling
    }

    /// Register all six rows. Returns the index of the normal row.
    pub fn inject_constraints<'a>(&'a mut self, descriptor: &mut SystemDescriptor<'a>) -> usize {
        let RollingContact { contact, rolling } = self;
        let normal = contact.inject_constraints(descriptor);
        rolling.inject(normal, descriptor);
        normal
    }

    pub fn constraints_bi_reset(&mut self) {
        self.contact.constraints_bi_reset();
        self.rolling.constraints_bi_reset();
    }

    /// Rolling rows never get a known term, only the normal row does.
    pub fn load_constraint_rhs(&mut self, settings: &RhsSettings) -> RhsBranch {
        self.contact.load_constraint_rhs(settings)
    }

    pub fn constraints_fetch_react(&mut self, factor: f32) {
        self.contact.constraints_fetch_react(factor);
        self.rolling.constraints_fetch_react(factor);
    }

    // Rolling multipliers have no slot in the reaction cache, so the warm
    // start operations only move the contact multipliers.

    pub fn load_suggested_speed_solution(&mut self) {
        self.contact.load_suggested_speed_solution();
    }

    pub fn load_suggested_position_solution(&mut self) {
        self.contact.load_suggested_position_solution();
    }

    pub fn fetch_suggested_speed_solution(&self) {
        self.contact.fetch_suggested_speed_solution();
    }

    pub fn fetch_suggested_position_solution(&self) {
        self.contact.fetch_suggested_position_solution();
    }

    pub fn react_force(&self) -> Vector3<f32> {
        self.contact.react_force()
    }

    pub fn react_torque(&self) -> Vector3<f32> {
        self.rolling.react_torque()
    }

    pub fn state_gather_reactions(&self, off_l: usize, l: &mut DVector<f32>) -> LcpResult<()> {
        check_slots(l.len(), off_l, 6)?;
        self.contact.state_gather_reactions(off_l, l)?;
        let t = self.rolling.react_torque;
        l[off_l + 3] = t.x;
        l[off_l + 4] = t.y;
        l[off_l + 5] = t.z;
        Ok(())
    }

    pub fn state_scatter_reactions(&mut self, off_l: usize, l: &DVector<f32>) -> LcpResult<()> {
        check_slots(l.len(), off_l, 6)?;
        self.contact.state_scatter_reactions(off_l, l)?;
        self.rolling.react_torque = Vector3::new(l[off_l + 3], l[off_l + 4], l[off_l + 5]);
        Ok(())
    }

    pub fn load_residual_cql(
        &self,
        off_l: usize,
        r: &mut DVector<f32>,
        l: &DVector<f32>,
        c: f32,
        vars: &dyn VariableSet,
    ) -> LcpResult<()> {
        check_slots(l.len(), off_l, 6)?;
        self.contact.load_residual_cql(off_l, r, l, c, vars)?;
        for (i, row) in self.rolling.rows().iter().enumerate() {
            row.multiply_t_and_add(r, l[off_l + 3 + i] * c, vars)?;
        }
        Ok(())
    }

    pub fn load_constraint_c(
        &mut self,
        off_l: usize,
        qc: &mut DVector<f32>,
        settings: &RhsSettings,
    ) -> LcpResult<RhsBranch> {
        check_slots(qc.len(), off_l, 6)?;
        self.contact.load_constraint_c(off_l, qc, settings)
    }

    pub fn to_lcp(&mut self, off_l: usize, l: &DVector<f32>, qc: &DVector<f32>) -> LcpResult<()> {
        check_slots(l.len(), off_l, 6)?;
        check_slots(qc.len(), off_l, 6)?;
        self.contact.to_lcp(off_l, l, qc)?;
        for (i, row) in self.rolling.rows_mut().iter_mut().enumerate() {
            row.l_i = l[off_l + 3 + i];
            row.b_i = qc[off_l + 3 + i];
        }
        Ok(())
    }

    pub fn from_lcp(&self, off_l: usize, l: &mut DVector<f32>) -> LcpResult<()> {
        check_slots(l.len(), off_l, 6)?;
        self.contact.from_lcp(off_l, l)?;
        for (i, row) in self.rolling.rows().iter().enumerate() {
            l[off_l + 3 + i] = row.l_i;
        }
        Ok(())
    }

    /// All six rows in injection order.
    pub fn rows(&self) -> [&ConstraintRow; 6] {
        let [n, u, v] = self.contact.rows();
        let [rx, ru, rv] = self.rolling.rows();
        [n, u, v, rx, ru, rv]
    }
}
