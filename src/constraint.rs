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

use cgmath::Vector3;
use nalgebra::{DVector, Vector6};

use crate::descriptor::*;
use crate::error::*;
use crate::variables::{Variables, BODY_DOF};

/// A 1 × 6 Jacobian sub-block acting on the six degrees of freedom of a body:
/// three linear components followed by three angular ones.
pub type Jacobian = Vector6<f32>;

/// Assemble a Jacobian sub-block from its linear and angular parts.
#[inline(always)]
pub fn jacobian(linear: Vector3<f32>, angular: Vector3<f32>) -> Jacobian {
    Vector6::new(linear.x, linear.y, linear.z, angular.x, angular.y, angular.z)
}

/// How the multiplier of a row is bounded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RowMode {
    /// Bilateral: the multiplier is unbounded.
    Free,
    /// The multiplier must stay non-negative.
    Unilateral,
    /// The row is part of a friction group and is bounded by the cone
    /// carried by the group leader.
    Friction,
}

/// Cone coupling stored on the leader row of a friction group. Indices refer
/// to rows of the `SystemDescriptor` the group was inserted into.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Cone {
    /// Coulomb cone over (normal, u, v). The leader is the normal row.
    Sliding {
        friction: f32,
        cohesion: f32,
        u: usize,
        v: usize,
    },
    /// Rolling and spinning bounds over (spin, u, v), scaled by the
    /// multiplier of the `normal` row. The leader is the spinning row.
    Rolling {
        rolling: f32,
        spinning: f32,
        normal: usize,
        u: usize,
        v: usize,
    },
}

impl Cone {
    /// The two rows coupled to the leader.
    pub fn members(&self) -> [usize; 2] {
        match *self {
            Cone::Sliding { u, v, .. } => [u, v],
            Cone::Rolling { u, v, .. } => [u, v],
        }
    }

    /// The normal row scaling the bounds, for cones that are not led by it.
    pub fn normal(&self) -> Option<usize> {
        match *self {
            Cone::Sliding { .. } => None,
            Cone::Rolling { normal, .. } => Some(normal),
        }
    }
}

/// A scalar complementarity constraint between two six-dof variable blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintRow {
    pub variables_a: VarIndex,
    pub variables_b: VarIndex,
    pub cq_a: Jacobian,
    pub cq_b: Jacobian,
    /// Current Lagrange multiplier.
    pub l_i: f32,
    /// Known term, usually the scaled constraint violation.
    pub b_i: f32,
    /// Constraint force mixing, zero for rigid constraints.
    pub cfm_i: f32,
    pub active: bool,
    pub mode: RowMode,
    /// Bound of this row relative to the normal multiplier of its group.
    pub friction: f32,
    pub cone: Option<Cone>,
    eq_a: Jacobian,
    eq_b: Jacobian,
    g_i: f32,
}

impl ConstraintRow {
    pub fn new(variables_a: VarIndex, variables_b: VarIndex, mode: RowMode) -> Self {
        ConstraintRow {
            variables_a,
            variables_b,
            cq_a: Jacobian::zeros(),
            cq_b: Jacobian::zeros(),
            l_i: 0.0,
            b_i: 0.0,
            cfm_i: 0.0,
            active: true,
            mode,
            friction: 0.0,
            cone: None,
            eq_a: Jacobian::zeros(),
            eq_b: Jacobian::zeros(),
            g_i: 0.0,
        }
    }

    pub fn set_variables(&mut self, variables_a: VarIndex, variables_b: VarIndex) {
        self.variables_a = variables_a;
        self.variables_b = variables_b;
    }

    /// `Cq M⁻¹ Cq' + cfm`, valid after `update_auxiliary`.
    pub fn g_i(&self) -> f32 {
        self.g_i
    }

    /// Precompute `M⁻¹ Cq'` for both blocks and the diagonal term `g_i`.
    pub fn update_auxiliary(&mut self, vars: &dyn VariableSet) -> LcpResult<()> {
        let va = lookup(vars, self.variables_a)?;
        let vb = lookup(vars, self.variables_b)?;
        let mut out = DVector::zeros(BODY_DOF);
        va.compute_inv_mass_times(&mut out, &DVector::from_column_slice(self.cq_a.as_slice()))?;
        self.eq_a.copy_from_slice(out.as_slice());
        vb.compute_inv_mass_times(&mut out, &DVector::from_column_slice(self.cq_b.as_slice()))?;
        self.eq_b.copy_from_slice(out.as_slice());
        self.g_i = self.cq_a.dot(&self.eq_a) + self.cq_b.dot(&self.eq_b) + self.cfm_i;
        Ok(())
    }

    /// Computes `Cq q` with the current state of both blocks.
    pub fn compute_cq_q(&self, vars: &dyn VariableSet) -> LcpResult<f32> {
        let qa = lookup(vars, self.variables_a)?.qb();
        let qb = lookup(vars, self.variables_b)?.qb();
        debug_assert_eq!(qa.len(), BODY_DOF);
        debug_assert_eq!(qb.len(), BODY_DOF);
        let mut sum = 0.0;
        for j in 0..BODY_DOF {
            sum += self.cq_a[j] * qa[j] + self.cq_b[j] * qb[j];
        }
        Ok(sum)
    }

    /// Computes `q += M⁻¹ Cq' delta` for both blocks.
    pub fn increment_q(&self, delta: f32, vars: &mut dyn VariableSet) -> LcpResult<()> {
        let qa = lookup_mut(vars, self.variables_a)?.qb_mut();
        debug_assert_eq!(qa.len(), BODY_DOF);
        for j in 0..BODY_DOF {
            qa[j] += self.eq_a[j] * delta;
        }
        let qb = lookup_mut(vars, self.variables_b)?.qb_mut();
        debug_assert_eq!(qb.len(), BODY_DOF);
        for j in 0..BODY_DOF {
            qb[j] += self.eq_b[j] * delta;
        }
        Ok(())
    }

    /// Computes `result += Cq' l`, writing at the offsets of the two blocks.
    pub fn multiply_t_and_add(&self, result: &mut DVector<f32>, l: f32, vars: &dyn VariableSet) -> LcpResult<()> {
        let off_a = lookup(vars, self.variables_a)?.offset();
        let off_b = lookup(vars, self.variables_b)?.offset();
        let needed = off_a.max(off_b) + BODY_DOF;
        if result.len() < needed {
            return Err(LcpError::DimensionMismatch { expected: needed, found: result.len() });
        }
        for j in 0..BODY_DOF {
            result[off_a + j] += self.cq_a[j] * l;
            result[off_b + j] += self.cq_b[j] * l;
        }
        Ok(())
    }

    /// The part of a residual that actually violates the constraint.
    pub fn violation(&self, residual: f32) -> f32 {
        match self.mode {
            RowMode::Free => residual,
            RowMode::Unilateral => residual.min(0.0),
            RowMode::Friction => match self.cone {
                Some(Cone::Sliding { .. }) => residual.min(0.0),
                _ => 0.0,
            },
        }
    }

    /// Largest magnitude the multiplier of this row may take given the
    /// multiplier of its normal row.
    pub fn friction_bound(&self, normal_multiplier: f32) -> f32 {
        self.friction * normal_multiplier.max(0.0)
    }

    /// Project the multiplier of a single row onto its feasible set. Friction
    /// rows are projected as a group with `project_cone`.
    pub fn project(&mut self) {
        if let RowMode::Unilateral = self.mode {
            if self.l_i < 0.0 {
                self.l_i = 0.0;
            }
        }
    }
}

#[inline]
fn lookup(vars: &dyn VariableSet, index: VarIndex) -> LcpResult<&dyn Variables> {
    vars.get(index).ok_or(LcpError::UnknownVariables(index))
}

#[inline]
fn lookup_mut(vars: &mut dyn VariableSet, index: VarIndex) -> LcpResult<&mut dyn Variables> {
    vars.get_mut(index).ok_or(LcpError::UnknownVariables(index))
}

/// Project the multipliers of the friction group led by `rows[leader]` onto
/// its cone. Does nothing if the leader carries no cone.
pub fn project_cone(rows: &mut [&mut ConstraintRow], leader: usize) {
    match rows[leader].cone {
        Some(Cone::Sliding { friction, cohesion, u, v }) => {
            let f_n = rows[leader].l_i + cohesion;
            let (f_u, f_v) = (rows[u].l_i, rows[v].l_i);
            let (n, t_u, t_v) = project_sliding(friction, f_n, f_u, f_v);
            rows[leader].l_i = n - cohesion;
            rows[u].l_i = t_u;
            rows[v].l_i = t_v;
        }
        Some(Cone::Rolling { rolling, spinning, normal, u, v }) => {
            let f_n = rows[normal].l_i.max(0.0);
            let spin_bound = spinning * f_n;
            rows[leader].l_i = rows[leader].l_i.max(-spin_bound).min(spin_bound);
            let (t_u, t_v) = (rows[u].l_i, rows[v].l_i);
            let t_tang = (t_u * t_u + t_v * t_v).sqrt();
            let roll_bound = rolling * f_n;
            if t_tang > roll_bound {
                let scale = if t_tang > 0.0 { roll_bound / t_tang } else { 0.0 };
                rows[u].l_i = t_u * scale;
                rows[v].l_i = t_v * scale;
            }
        }
        None => (),
    }
}

/// Orthogonal projection of (f_n, f_u, f_v) onto the cone |f_t| <= mu f_n.
fn project_sliding(mu: f32, f_n: f32, f_u: f32, f_v: f32) -> (f32, f32, f32) {
    if mu == 0.0 {
        return (f_n.max(0.0), 0.0, 0.0);
    }
    let f_tang = (f_u * f_u + f_v * f_v).sqrt();
    // Inside the upper cone:
    if f_tang <= mu * f_n {
        return (f_n, f_u, f_v);
    }
    // Inside the polar cone:
    if f_tang <= -f_n / mu {
        return (0.0, 0.0, 0.0);
    }
    let f_n_proj = (f_tang * mu + f_n) / (mu * mu + 1.0);
    let f_tang_proj = f_n_proj * mu;
    let ratio = f_tang_proj / f_tang;
    (f_n_proj, f_u * ratio, f_v * ratio)
}

#[cfg(test)]
mod tests {
    mod constraint {
        use approx::assert_relative_eq;
        use cgmath::Vector3;
        use nalgebra::DVector;

        use crate::constraint::*;
        use crate::descriptor::*;
        use crate::error::*;
        use crate::variables::*;

        fn sliding_group(friction: f32, cohesion: f32) -> Vec<ConstraintRow> {
            let mut n = ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Friction);
            n.cone = Some(Cone::Sliding { friction, cohesion, u: 1, v: 2 });
            let u = ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Friction);
            let v = ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Friction);
            vec![n, u, v]
        }

        fn project(rows: &mut Vec<ConstraintRow>, leader: usize) {
            let mut refs: Vec<&mut ConstraintRow> = rows.iter_mut().collect();
            project_cone(&mut refs, leader);
        }

        #[test]
        fn test_update_auxiliary_and_increment() {
            let mut vars = vec![VariablesBody::default(), VariablesBody::default()];
            let mut row = ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Unilateral);
            row.cq_a = jacobian(Vector3::new(-1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0));
            row.cq_b = jacobian(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0));
            row.update_auxiliary(&vars).unwrap();
            assert_relative_eq!(row.g_i(), 3.0);

            row.increment_q(2.0, &mut vars).unwrap();
            assert_eq!(vars[0].qb()[0], -2.0);
            assert_eq!(vars[1].qb()[0], 2.0);
            assert_eq!(vars[1].qb()[5], 2.0);
            assert_relative_eq!(row.compute_cq_q(&vars).unwrap(), 6.0);
        }

        #[test]
        fn test_unknown_variables() {
            let vars = vec![VariablesBody::default()];
            let mut row = ConstraintRow::new(VarIndex(0), VarIndex(3), RowMode::Free);
            assert_eq!(row.update_auxiliary(&vars), Err(LcpError::UnknownVariables(VarIndex(3))));
            assert!(row.compute_cq_q(&vars).is_err());
        }

        #[test]
        fn test_multiply_t_and_add() {
            let mut vars = vec![VariablesBody::default(), VariablesBody::default()];
            vars[1].set_offset(6);
            let mut row = ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Free);
            row.cq_a = jacobian(Vector3::new(0.0, -1.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
            row.cq_b = jacobian(Vector3::new(0.0, 1.0, 0.0), Vector3::new(0.0, 0.0, 0.0));
            let mut r = DVector::zeros(12);
            row.multiply_t_and_add(&mut r, 0.5, &vars).unwrap();
            assert_eq!(r[1], -0.5);
            assert_eq!(r[3], 0.5);
            assert_eq!(r[7], 0.5);
            let mut short = DVector::zeros(8);
            assert!(row.multiply_t_and_add(&mut short, 1.0, &vars).is_err());
        }

        #[test]
        fn test_violation_and_projection() {
            let mut row = ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Unilateral);
            assert_eq!(row.violation(2.0), 0.0);
            assert_eq!(row.violation(-2.0), -2.0);
            row.l_i = -1.0;
            row.project();
            assert_eq!(row.l_i, 0.0);

            let mut row = ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Free);
            assert_eq!(row.violation(2.0), 2.0);
            row.l_i = -1.0;
            row.project();
            assert_eq!(row.l_i, -1.0);
        }

        #[test]
        fn test_sliding_cone_inside() {
            let mut rows = sliding_group(0.5, 0.0);
            rows[0].l_i = 2.0;
            rows[1].l_i = 0.3;
            rows[2].l_i = -0.4;
            project(&mut rows, 0);
            assert_eq!(rows[0].l_i, 2.0);
            assert_eq!(rows[1].l_i, 0.3);
            assert_eq!(rows[2].l_i, -0.4);
        }

        #[test]
        fn test_sliding_cone_outside() {
            let mut rows = sliding_group(0.5, 0.0);
            rows[0].l_i = 1.0;
            rows[1].l_i = 3.0;
            rows[2].l_i = 4.0;
            project(&mut rows, 0);
            let f_n = rows[0].l_i;
            let f_t = (rows[1].l_i.powi(2) + rows[2].l_i.powi(2)).sqrt();
            assert_relative_eq!(f_t, 0.5 * f_n, epsilon = 1.0e-5);
            // (5 * 0.5 + 1) / 1.25
            assert_relative_eq!(f_n, 2.8, epsilon = 1.0e-5);
            // Direction of the tangential force is kept
            assert_relative_eq!(rows[1].l_i / rows[2].l_i, 0.75, epsilon = 1.0e-5);
        }

        #[test]
        fn test_sliding_cone_polar() {
            let mut rows = sliding_group(0.5, 0.0);
            rows[0].l_i = -3.0;
            rows[1].l_i = 0.1;
            rows[2].l_i = 0.0;
            project(&mut rows, 0);
            assert_eq!(rows[0].l_i, 0.0);
            assert_eq!(rows[1].l_i, 0.0);
            assert_eq!(rows[2].l_i, 0.0);
        }

        #[test]
        fn test_sliding_cone_frictionless_with_cohesion() {
            let mut rows = sliding_group(0.0, 0.5);
            rows[0].l_i = -0.2;
            rows[1].l_i = 1.0;
            rows[2].l_i = 1.0;
            project(&mut rows, 0);
            // Cohesion allows a slightly negative normal multiplier.
            assert_relative_eq!(rows[0].l_i, -0.2);
            assert_eq!(rows[1].l_i, 0.0);
            assert_eq!(rows[2].l_i, 0.0);

            rows[0].l_i = -0.9;
            project(&mut rows, 0);
            assert_relative_eq!(rows[0].l_i, -0.5);
        }

        #[test]
        fn test_rolling_cone() {
            let mut rows = sliding_group(0.0, 0.0);
            for _ in 0..3 {
                rows.push(ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Friction));
            }
            rows[3].cone = Some(Cone::Rolling { rolling: 0.1, spinning: 0.05, normal: 0, u: 4, v: 5 });
            rows[0].l_i = 10.0;
            rows[3].l_i = -2.0;
            rows[4].l_i = 3.0;
            rows[5].l_i = 4.0;
            project(&mut rows, 3);
            assert_relative_eq!(rows[3].l_i, -0.5);
            assert_relative_eq!(rows[4].l_i, 0.6, epsilon = 1.0e-5);
            assert_relative_eq!(rows[5].l_i, 0.8, epsilon = 1.0e-5);
            assert_eq!(rows[0].l_i, 10.0);
        }

        #[test]
        fn test_friction_bound() {
            let mut row = ConstraintRow::new(VarIndex(0), VarIndex(1), RowMode::Friction);
            row.friction = 0.25;
            assert_eq!(row.friction_bound(4.0), 1.0);
            assert_eq!(row.friction_bound(-4.0), 0.0);
            row.friction = 0.0;
            assert_eq!(row.friction_bound(100.0), 0.0);
        }
    }
}
