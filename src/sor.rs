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

use nalgebra::DVector;
use smallvec::SmallVec;
use tracing::trace;

use crate::constraint::*;
use crate::descriptor::*;
use crate::error::*;
use crate::solver::*;

/// Projected Gauss-Seidel with successive over-relaxation.
///
/// Every sweep visits the active rows in registration order and applies each
/// multiplier change to the body velocities right away. Rows of a friction
/// group are updated together and projected onto their cone by the group
/// leader.
#[derive(Clone, Debug, Default)]
pub struct SorSolver {
    base: IterativeSolver,
}

impl SorSolver {
    pub fn new() -> Self {
        SorSolver {
            base: IterativeSolver::new(),
        }
    }

    pub fn with_settings(settings: IterativeSolverSettings) -> Self {
        SorSolver {
            base: IterativeSolver::with_settings(settings),
        }
    }

    pub fn base(&self) -> &IterativeSolver {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut IterativeSolver {
        &mut self.base
    }
}

impl LcpSolver for SorSolver {
    fn solve(&mut self, descriptor: &mut SystemDescriptor<'_>) -> LcpResult<f32> {
        descriptor.check()?;
        let (vars, rows) = descriptor.split_mut();

        for row in rows.iter_mut() {
            if row.active {
                row.update_auxiliary(&*vars)?;
            }
        }

        // Unconstrained velocities, q = M⁻¹ f
        for i in 0..vars.len() {
            if let Some(v) = vars.get_mut(VarIndex(i)) {
                let f = v.fb().clone();
                let mut q = DVector::zeros(v.ndof());
                v.compute_inv_mass_times(&mut q, &f)?;
                *v.qb_mut() = q;
            }
        }

        let warm_start = self.base.warm_start();
        for row in rows.iter_mut() {
            if !row.active {
                continue;
            }
            if warm_start {
                if row.l_i != 0.0 {
                    row.increment_q(row.l_i, vars)?;
                }
            } else {
                row.l_i = 0.0;
            }
        }

        let omega = self.base.omega();
        let tolerance = self.base.tolerance();
        let mut max_violation = 0.0f32;
        for iter in 0..self.base.max_iterations() {
            max_violation = 0.0;
            let mut max_delta_lambda = 0.0f32;

            for i in 0..rows.len() {
                if !rows[i].active {
                    continue;
                }
                match rows[i].cone {
                    Some(cone) => {
                        let [u, v] = cone.members();
                        let group: SmallVec<[usize; 3]> = SmallVec::from_buf([i, u, v]);
                        let mut old: SmallVec<[f32; 3]> = SmallVec::new();
                        for &k in group.iter() {
                            let row = &mut *rows[k];
                            old.push(row.l_i);
                            if row.g_i() <= 0.0 {
                                continue;
                            }
                            let residual = row.compute_cq_q(&*vars)? + row.b_i;
                            if k == i {
                                max_violation = max_violation.max(row.violation(residual).abs());
                            }
                            row.l_i += omega / row.g_i() * (-residual - row.cfm_i * row.l_i);
                        }
                        project_cone(rows, i);
                        for (&k, &l_old) in group.iter().zip(old.iter()) {
                            let delta = rows[k].l_i - l_old;
                            if delta != 0.0 {
                                rows[k].increment_q(delta, vars)?;
                            }
                            max_delta_lambda = max_delta_lambda.max(delta.abs());
                        }
                    }
                    None => {
                        let row = &mut *rows[i];
                        // Members of a group are handled by their leader.
                        if row.mode == RowMode::Friction || row.g_i() <= 0.0 {
                            continue;
                        }
                        let residual = row.compute_cq_q(&*vars)? + row.b_i;
                        max_violation = max_violation.max(row.violation(residual).abs());
                        let l_old = row.l_i;
                        row.l_i = l_old + omega / row.g_i() * (-residual - row.cfm_i * l_old);
                        row.project();
                        let delta = row.l_i - l_old;
                        if delta != 0.0 {
                            row.increment_q(delta, vars)?;
                        }
                        max_delta_lambda = max_delta_lambda.max(delta.abs());
                    }
                }
            }

            trace!(iter, max_violation, max_delta_lambda, "sor sweep");
            self.base.at_iteration_end(max_violation, max_delta_lambda, iter);
            if max_violation < tolerance {
                break;
            }
        }

        Ok(max_violation)
    }
}

#[cfg(test)]
mod tests {
    mod sor {
        use approx::assert_relative_eq;
        use cgmath::Vector3;

        use crate::constraint::*;
        use crate::descriptor::*;
        use crate::error::*;
        use crate::solver::*;
        use crate::sor::*;
        use crate::variables::*;

        fn ground_and_box(force: Vector3<f32>) -> Vec<VariablesBody> {
            let mut bodies = vec![
                VariablesBody::new(BodyMass::immovable()),
                VariablesBody::default(),
            ];
            let f = bodies[1].fb_mut();
            f[0] = force.x;
            f[1] = force.y;
            f[2] = force.z;
            bodies
        }

        fn axis_row(axis: Vector3<f32>, mode: RowMode) -> ConstraintRow {
            let mut row = ConstraintRow::new(VarIndex(0), VarIndex(1), mode);
            row.cq_a = jacobian(-axis, Vector3::new(0.0, 0.0, 0.0));
            row.cq_b = jacobian(axis, Vector3::new(0.0, 0.0, 0.0));
            row
        }

        #[test]
        fn test_resting_contact() {
            let mut bodies = ground_and_box(Vector3::new(0.0, 0.0, -1.0));
            let mut row = axis_row(Vector3::unit_z(), RowMode::Unilateral);
            let mut solver = SorSolver::new();
            solver.base_mut().set_record_violation(true);
            let violation = {
                let mut d = SystemDescriptor::new(&mut bodies);
                d.insert_constraint(&mut row);
                solver.solve(&mut d).unwrap()
            };
            assert_eq!(violation, 0.0);
            assert_relative_eq!(row.l_i, 1.0);
            assert_relative_eq!(bodies[1].qb()[2], 0.0);
            assert_eq!(bodies[0].qb()[2], 0.0);

            let history = solver.base().violation_history();
            assert_eq!(history.len(), 50);
            assert_relative_eq!(history[0], 1.0);
            assert_eq!(history[1], 0.0);
            assert_relative_eq!(solver.base().delta_lambda_history()[0], 1.0);
        }

        #[test]
        fn test_separating_contact_stays_inactive() {
            let mut bodies = ground_and_box(Vector3::new(0.0, 0.0, 2.0));
            let mut row = axis_row(Vector3::unit_z(), RowMode::Unilateral);
            let mut solver = SorSolver::new();
            {
                let mut d = SystemDescriptor::new(&mut bodies);
                d.insert_constraint(&mut row);
                solver.solve(&mut d).unwrap();
            }
            assert_eq!(row.l_i, 0.0);
            assert_relative_eq!(bodies[1].qb()[2], 2.0);
        }

        #[test]
        fn test_tolerance_stops_early() {
            let mut bodies = ground_and_box(Vector3::new(0.0, 0.0, -1.0));
            let mut row = axis_row(Vector3::unit_z(), RowMode::Unilateral);
            let mut solver = SorSolver::with_settings(IterativeSolverSettings {
                tolerance: 1.0e-6,
                record_violation: true,
                ..IterativeSolverSettings::default()
            });
            {
                let mut d = SystemDescriptor::new(&mut bodies);
                d.insert_constraint(&mut row);
                solver.solve(&mut d).unwrap();
            }
            assert_eq!(solver.base().violation_history().len(), 2);
        }

        #[test]
        fn test_warm_start() {
            let mut bodies = ground_and_box(Vector3::new(0.0, 0.0, -1.0));
            let mut row = axis_row(Vector3::unit_z(), RowMode::Unilateral);
            row.l_i = 1.0;
            let mut solver = SorSolver::with_settings(IterativeSolverSettings {
                warm_start: true,
                record_violation: true,
                ..IterativeSolverSettings::default()
            });
            {
                let mut d = SystemDescriptor::new(&mut bodies);
                d.insert_constraint(&mut row);
                solver.solve(&mut d).unwrap();
            }
            // Already converged before the first sweep.
            assert_eq!(solver.base().violation_history()[0], 0.0);
            assert_eq!(solver.base().delta_lambda_history()[0], 0.0);
            assert_relative_eq!(row.l_i, 1.0);

            // Without warm start the stored multiplier is discarded.
            solver.base_mut().set_warm_start(false);
            row.l_i = 5.0;
            {
                let mut d = SystemDescriptor::new(&mut bodies);
                d.insert_constraint(&mut row);
                solver.solve(&mut d).unwrap();
            }
            assert_relative_eq!(row.l_i, 1.0);
            assert_relative_eq!(solver.base().violation_history()[0], 1.0);
        }

        #[test]
        fn test_friction_cone() {
            let mut bodies = ground_and_box(Vector3::new(2.0, 0.0, -1.0));
            let mut rows = vec![
                axis_row(Vector3::unit_z(), RowMode::Friction),
                axis_row(Vector3::unit_x(), RowMode::Friction),
                axis_row(Vector3::unit_y(), RowMode::Friction),
            ];
            rows[0].cone = Some(Cone::Sliding { friction: 0.5, cohesion: 0.0, u: 1, v: 2 });
            let mut solver = SorSolver::new();
            {
                let mut d = SystemDescriptor::new(&mut bodies);
                for row in rows.iter_mut() {
                    d.insert_constraint(row);
                }
                solver.solve(&mut d).unwrap();
            }
            let (l_n, l_u, l_v) = (rows[0].l_i, rows[1].l_i, rows[2].l_i);
            assert_relative_eq!(l_n, 1.6, epsilon = 1.0e-5);
            assert_relative_eq!(l_u, -0.8, epsilon = 1.0e-5);
            assert_eq!(l_v, 0.0);
            assert!(l_u.abs() <= 0.5 * l_n + 1.0e-5);
            // Still sliding, but slower.
            assert_relative_eq!(bodies[1].qb()[0], 1.2, epsilon = 1.0e-5);
        }

        #[test]
        fn test_inactive_rows_are_ignored() {
            let mut bodies = ground_and_box(Vector3::new(0.0, 0.0, -1.0));
            let mut row = axis_row(Vector3::unit_z(), RowMode::Unilateral);
            row.active = false;
            row.l_i = 3.0;
            let mut solver = SorSolver::new();
            {
                let mut d = SystemDescriptor::new(&mut bodies);
                d.insert_constraint(&mut row);
                assert_eq!(solver.solve(&mut d), Ok(0.0));
            }
            assert_eq!(row.l_i, 3.0);
            assert_relative_eq!(bodies[1].qb()[2], -1.0);
        }

        #[test]
        fn test_stale_cone_is_an_error() {
            let mut bodies = ground_and_box(Vector3::new(0.0, 0.0, -1.0));
            let mut row = axis_row(Vector3::unit_z(), RowMode::Friction);
            row.cone = Some(Cone::Sliding { friction: 0.5, cohesion: 0.0, u: 1, v: 2 });
            let mut d = SystemDescriptor::new(&mut bodies);
            d.insert_constraint(&mut row);
            assert_eq!(
                SorSolver::new().solve(&mut d),
                Err(LcpError::InvalidCone { row: 0, index: 1 })
            );
        }

        #[test]
        fn test_unknown_variables() {
            let mut bodies = vec![VariablesBody::default()];
            let mut row = axis_row(Vector3::unit_z(), RowMode::Unilateral);
            let mut d = SystemDescriptor::new(&mut bodies);
            d.insert_constraint(&mut row);
            assert_eq!(
                SorSolver::new().solve(&mut d),
                Err(LcpError::UnknownVariables(VarIndex(1)))
            );
        }
    }
}
