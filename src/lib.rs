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

//! Contact constraints and iterative complementarity solvers for rigid body
//! simulation.
//!
//! # Overview
//!
//! A step of the simulation is set up as a complementarity problem between
//! the velocities of the bodies and the multipliers of the constraints:
//!
//! - `Variables`: the degrees of freedom of a body, with its mass matrix.
//!   `VariablesBody` covers rigid bodies, `VariablesGeneric` anything else.
//! - `ConstraintRow`: one scalar constraint between two variable blocks.
//! - `Contact`: three rows for a frictional contact point, built from the
//!   output of the narrow phase. `RollingContact` adds rolling and spinning
//!   friction on top of it.
//! - `SystemDescriptor`: borrows the variable blocks and the rows of every
//!   contact for the duration of a solve.
//! - `LcpSolver`: solves a descriptor. `SorSolver` is a projected
//!   Gauss-Seidel method built on the `IterativeSolver` settings.
//!
//! Contacts use `cgmath` types for geometry. Generalized vectors of arbitrary
//! length are `nalgebra` dynamic vectors.

pub extern crate cgmath;
pub extern crate nalgebra;

mod constraint;
pub use constraint::*;

mod contact;
pub use contact::*;

mod descriptor;
pub use descriptor::*;

mod error;
pub use error::*;

mod frame;
pub use frame::*;

mod material;
pub use material::*;

mod model;
pub use model::*;

mod rolling;
pub use rolling::*;

mod solver;
pub use solver::*;

mod sor;
pub use sor::*;

mod variables;
pub use variables::*;
