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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::*;
use crate::error::*;

/// A method for solving the complementarity problem described by a
/// `SystemDescriptor`.
pub trait LcpSolver {
    /// Solve the problem, leaving the multipliers in the registered rows and
    /// the resulting state in the variable blocks. Returns the largest
    /// constraint violation of the last iteration.
    fn solve(&mut self, descriptor: &mut SystemDescriptor<'_>) -> LcpResult<f32>;
}

/// Settings shared by all iterative solvers.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterativeSolverSettings {
    /// Stop after this many iterations even if the tolerance isn't reached.
    pub max_iterations: usize,
    /// Start from the multipliers already stored in the rows.
    pub warm_start: bool,
    /// Stop once the largest violation falls under this value. Zero always
    /// runs up to `max_iterations`.
    pub tolerance: f32,
    /// Overrelaxation factor.
    pub omega: f32,
    /// Sharpness factor for methods with projection, usually in (0, 1].
    pub sharpness: f32,
    /// Record the violation and multiplier change of every iteration.
    pub record_violation: bool,
}

impl Default for IterativeSolverSettings {
    fn default() -> Self {
        IterativeSolverSettings {
            max_iterations: 50,
            warm_start: false,
            tolerance: 0.0,
            omega: 1.0,
            sharpness: 1.0,
            record_violation: false,
        }
    }
}

/// Bookkeeping shared by all iterative solvers: limits, relaxation factors
/// and the optional history of each iteration.
///
/// This type does not solve anything. Concrete methods own one, read the
/// settings from it and must call `at_iteration_end` once per sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct IterativeSolver {
    max_iterations: usize,
    warm_start: bool,
    tolerance: f32,
    omega: f32,
    sharpness: f32,
    record_violation: bool,
    violation_history: Vec<f32>,
    dlambda_history: Vec<f32>,
}

impl IterativeSolver {
    pub fn new() -> Self {
        IterativeSolver::with_settings(IterativeSolverSettings::default())
    }

    pub fn with_settings(settings: IterativeSolverSettings) -> Self {
        let mut solver = IterativeSolver {
            max_iterations: settings.max_iterations,
            warm_start: settings.warm_start,
            tolerance: settings.tolerance,
            omega: 1.0,
            sharpness: 1.0,
            record_violation: settings.record_violation,
            violation_history: Vec::new(),
            dlambda_history: Vec::new(),
        };
        solver.set_omega(settings.omega);
        solver.set_sharpness(settings.sharpness);
        solver
    }

    pub fn settings(&self) -> IterativeSolverSettings {
        IterativeSolverSettings {
            max_iterations: self.max_iterations,
            warm_start: self.warm_start,
            tolerance: self.tolerance,
            omega: self.omega,
            sharpness: self.sharpness,
            record_violation: self.record_violation,
        }
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Set the overrelaxation factor. Values that are not positive are
    /// ignored.
    pub fn set_omega(&mut self, omega: f32) {
        if omega > 0.0 {
            self.omega = omega;
        }
    }

    pub fn omega(&self) -> f32 {
        self.omega
    }

    /// Set the sharpness factor. Values that are not positive are ignored.
    pub fn set_sharpness(&mut self, sharpness: f32) {
        if sharpness > 0.0 {
            self.sharpness = sharpness;
        }
    }

    pub fn sharpness(&self) -> f32 {
        self.sharpness
    }

    pub fn set_warm_start(&mut self, warm_start: bool) {
        self.warm_start = warm_start;
    }

    pub fn warm_start(&self) -> bool {
        self.warm_start
    }

    pub fn set_tolerance(&mut self, tolerance: f32) {
        self.tolerance = tolerance;
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn set_record_violation(&mut self, record: bool) {
        self.record_violation = record;
    }

    pub fn record_violation(&self) -> bool {
        self.record_violation
    }

    /// Largest constraint violation of each recorded iteration.
    pub fn violation_history(&self) -> &[f32] {
        &self.violation_history
    }

    /// Largest change of any multiplier in each recorded iteration.
    pub fn delta_lambda_history(&self) -> &[f32] {
        &self.dlambda_history
    }

    /// Must be called at the end of every iteration, `iteration` being 0 for
    /// the first one. When recording, the histories are restarted if they do
    /// not line up with `iteration`.
    pub fn at_iteration_end(&mut self, max_violation: f32, delta_lambda: f32, iteration: usize) {
        if !self.record_violation {
            return;
        }
        if iteration != self.violation_history.len() {
            debug!(iteration, len = self.violation_history.len(), "restarting violation history");
            self.violation_history.clear();
            self.violation_history.resize(iteration, 0.0);
        }
        if iteration != self.dlambda_history.len() {
            self.dlambda_history.clear();
            self.dlambda_history.resize(iteration, 0.0);
        }
        self.violation_history.push(max_violation);
        self.dlambda_history.push(delta_lambda);
    }
}

impl Default for IterativeSolver {
    fn default() -> Self {
        IterativeSolver::new()
    }
}
