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

use std::f32;
use std::rc::Rc;

use cgmath::{Matrix3, SquareMatrix, Vector3, Zero};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::*;

/// State shared by every kind of variable block: the generalized
/// coordinates `q` (usually velocities), the generalized forces `f` and the
/// offset of the block in the global vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct VariablesState {
    pub qb: DVector<f32>,
    pub fb: DVector<f32>,
    pub offset: usize,
}

impl VariablesState {
    pub fn new(ndof: usize) -> Self {
        VariablesState {
            qb: DVector::zeros(ndof),
            fb: DVector::zeros(ndof),
            offset: 0,
        }
    }
}

/// A block of `n` scalar unknowns of the complementarity problem together
/// with its mass matrix:
///
/// ```text
/// | M -Cq'|*|q|- | f|= |0| ,  c>=0, l>=0, l*c=0;
/// | Cq  0 | |l|  |-b|  |c|
/// ```
///
/// Iterative solvers never need `M` explicitly, only its products with
/// vectors.
pub trait Variables {
    /// The number of degrees of freedom of the block.
    fn ndof(&self) -> usize;

    fn state(&self) -> &VariablesState;

    fn state_mut(&mut self) -> &mut VariablesState;

    /// Computes `result = M⁻¹ vect`.
    fn compute_inv_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()>;

    /// Computes `result += M⁻¹ vect`.
    fn compute_inc_inv_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()>;

    /// Computes `result = M vect`.
    fn compute_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()>;

    /// Computes `result += M vect`.
    fn compute_inc_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()>;

    /// Paste the mass matrix into `storage` with its upper left corner at
    /// (`row`, `col`). Only direct solvers need this.
    fn build_mass(&self, storage: &mut DMatrix<f32>, row: usize, col: usize) -> LcpResult<()>;

    fn qb(&self) -> &DVector<f32> {
        &self.state().qb
    }

    fn qb_mut(&mut self) -> &mut DVector<f32> {
        &mut self.state_mut().qb
    }

    fn fb(&self) -> &DVector<f32> {
        &self.state().fb
    }

    fn fb_mut(&mut self) -> &mut DVector<f32> {
        &mut self.state_mut().fb
    }

    /// Offset of the block in the global state vectors.
    fn offset(&self) -> usize {
        self.state().offset
    }

    fn set_offset(&mut self, offset: usize) {
        self.state_mut().offset = offset;
    }
}

#[inline]
fn check_product(ndof: usize, result: &DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
    check_dim(ndof, vect.len())?;
    check_dim(ndof, result.len())
}

#[inline]
fn check_storage(ndof: usize, storage: &DMatrix<f32>, row: usize, col: usize) -> LcpResult<()> {
    if storage.nrows() < row + ndof {
        return Err(LcpError::DimensionMismatch { expected: row + ndof, found: storage.nrows() });
    }
    if storage.ncols() < col + ndof {
        return Err(LcpError::DimensionMismatch { expected: col + ndof, found: storage.ncols() });
    }
    Ok(())
}

/// A block with a full, dense `n × n` mass matrix.
///
/// Both the mass matrix and its inverse start as the identity, so the block
/// can be used before any mass is assigned. For rigid bodies prefer
/// `VariablesBody`, which does not store the mostly empty 6 × 6 matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct VariablesGeneric {
    state: VariablesState,
    mass: DMatrix<f32>,
    inv_mass: DMatrix<f32>,
}

impl VariablesGeneric {
    pub fn new(ndof: usize) -> Self {
        VariablesGeneric {
            state: VariablesState::new(ndof),
            mass: DMatrix::identity(ndof, ndof),
            inv_mass: DMatrix::identity(ndof, ndof),
        }
    }

    pub fn mass(&self) -> &DMatrix<f32> {
        &self.mass
    }

    pub fn inv_mass(&self) -> &DMatrix<f32> {
        &self.inv_mass
    }

    /// Replace the mass matrix, recomputing its inverse.
    pub fn set_mass(&mut self, mass: DMatrix<f32>) -> LcpResult<()> {
        let ndof = self.ndof();
        check_dim(ndof, mass.nrows())?;
        check_dim(ndof, mass.ncols())?;
        let inv_mass = mass.clone().try_inverse().ok_or(LcpError::SingularMass)?;
        self.mass = mass;
        self.inv_mass = inv_mass;
        Ok(())
    }
}

impl Variables for VariablesGeneric {
    fn ndof(&self) -> usize {
        self.mass.nrows()
    }

    fn state(&self) -> &VariablesState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut VariablesState {
        &mut self.state
    }

    fn compute_inv_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        check_product(self.ndof(), result, vect)?;
        result.gemv(1.0, &self.inv_mass, vect, 0.0);
        Ok(())
    }

    fn compute_inc_inv_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        check_product(self.ndof(), result, vect)?;
        result.gemv(1.0, &self.inv_mass, vect, 1.0);
        Ok(())
    }

    fn compute_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        check_product(self.ndof(), result, vect)?;
        result.gemv(1.0, &self.mass, vect, 0.0);
        Ok(())
    }

    fn compute_inc_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        check_product(self.ndof(), result, vect)?;
        result.gemv(1.0, &self.mass, vect, 1.0);
        Ok(())
    }

    fn build_mass(&self, storage: &mut DMatrix<f32>, row: usize, col: usize) -> LcpResult<()> {
        let ndof = self.ndof();
        check_storage(ndof, storage, row, col)?;
        storage.view_mut((row, col), (ndof, ndof)).copy_from(&self.mass);
        Ok(())
    }
}

/// Mass and inertia tensor of a rigid body. The tensor is expressed in the
/// body frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyMass {
    mass: f32,
    inv_mass: f32,
    inertia: Matrix3<f32>,
    inv_inertia: Matrix3<f32>,
}

impl BodyMass {
    pub fn new(mass: f32, inertia: Matrix3<f32>) -> LcpResult<Self> {
        if mass <= 0.0 {
            return Err(LcpError::SingularMass);
        }
        let inv_inertia = inertia.invert().ok_or(LcpError::SingularMass)?;
        Ok(BodyMass {
            mass,
            inv_mass: 1.0 / mass,
            inertia,
            inv_inertia,
        })
    }

    /// A body with infinite mass. Its inverse mass and inverse inertia are
    /// zero, so constraints never move it.
    pub fn immovable() -> Self {
        BodyMass {
            mass: f32::INFINITY,
            inv_mass: 0.0,
            inertia: Matrix3::from_value(f32::INFINITY),
            inv_inertia: Matrix3::zero(),
        }
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn inertia(&self) -> &Matrix3<f32> {
        &self.inertia
    }

    pub fn inv_inertia(&self) -> &Matrix3<f32> {
        &self.inv_inertia
    }
}

impl Default for BodyMass {
    fn default() -> Self {
        BodyMass {
            mass: 1.0,
            inv_mass: 1.0,
            inertia: Matrix3::identity(),
            inv_inertia: Matrix3::identity(),
        }
    }
}

/// Where the mass data of a `VariablesBody` lives.
#[derive(Clone, Debug, PartialEq)]
pub enum MassStorage {
    Own(BodyMass),
    /// Shared between a cluster of clones with the same shape and mass.
    Shared(Rc<BodyMass>),
}

/// The six degrees of freedom of a rigid body: three linear velocity
/// components in world coordinates followed by three angular velocity
/// components in body coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct VariablesBody {
    state: VariablesState,
    storage: MassStorage,
}

pub const BODY_DOF: usize = 6;

impl VariablesBody {
    pub fn new(mass: BodyMass) -> Self {
        VariablesBody {
            state: VariablesState::new(BODY_DOF),
            storage: MassStorage::Own(mass),
        }
    }

    pub fn shared(mass: Rc<BodyMass>) -> Self {
        VariablesBody {
            state: VariablesState::new(BODY_DOF),
            storage: MassStorage::Shared(mass),
        }
    }

    pub fn body_mass(&self) -> &BodyMass {
        match self.storage {
            MassStorage::Own(ref m) => m,
            MassStorage::Shared(ref m) => &**m,
        }
    }

    /// Mutable access to the mass data. Shared mass can only be changed
    /// through its owner, so this returns None for clones.
    pub fn body_mass_mut(&mut self) -> Option<&mut BodyMass> {
        match self.storage {
            MassStorage::Own(ref mut m) => Some(m),
            MassStorage::Shared(_) => None,
        }
    }

    pub fn is_shared(&self) -> bool {
        match self.storage {
            MassStorage::Own(_) => false,
            MassStorage::Shared(_) => true,
        }
    }

    /// Linear and angular velocity currently held in `q`.
    pub fn velocity(&self) -> (Vector3<f32>, Vector3<f32>) {
        split(&self.state.qb)
    }

    pub fn set_velocity(&mut self, linear: Vector3<f32>, angular: Vector3<f32>) {
        join(&mut self.state.qb, linear, angular, false);
    }

    fn inv_product(&self, vect: &DVector<f32>) -> (Vector3<f32>, Vector3<f32>) {
        let m = self.body_mass();
        let (lin, ang) = split(vect);
        (lin * m.inv_mass, m.inv_inertia * ang)
    }

    fn product(&self, vect: &DVector<f32>) -> (Vector3<f32>, Vector3<f32>) {
        let m = self.body_mass();
        let (lin, ang) = split(vect);
        (lin * m.mass, m.inertia * ang)
    }
}

impl Default for VariablesBody {
    fn default() -> Self {
        VariablesBody::new(BodyMass::default())
    }
}

impl Variables for VariablesBody {
    fn ndof(&self) -> usize {
        BODY_DOF
    }

    fn state(&self) -> &VariablesState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut VariablesState {
        &mut self.state
    }

    fn compute_inv_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        check_product(BODY_DOF, result, vect)?;
        let (lin, ang) = self.inv_product(vect);
        join(result, lin, ang, false);
        Ok(())
    }

    fn compute_inc_inv_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        check_product(BODY_DOF, result, vect)?;
        let (lin, ang) = self.inv_product(vect);
        join(result, lin, ang, true);
        Ok(())
    }

    fn compute_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        check_product(BODY_DOF, result, vect)?;
        let (lin, ang) = self.product(vect);
        join(result, lin, ang, false);
        Ok(())
    }

    fn compute_inc_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        check_product(BODY_DOF, result, vect)?;
        let (lin, ang) = self.product(vect);
        join(result, lin, ang, true);
        Ok(())
    }

    fn build_mass(&self, storage: &mut DMatrix<f32>, row: usize, col: usize) -> LcpResult<()> {
        check_storage(BODY_DOF, storage, row, col)?;
        let m = self.body_mass();
        let mut block = storage.view_mut((row, col), (BODY_DOF, BODY_DOF));
        block.fill(0.0);
        for i in 0..3 {
            block[(i, i)] = m.mass;
            for j in 0..3 {
                // cgmath matrices are indexed column first.
                block[(3 + i, 3 + j)] = m.inertia[j][i];
            }
        }
        Ok(())
    }
}

#[inline(always)]
fn split(v: &DVector<f32>) -> (Vector3<f32>, Vector3<f32>) {
    (Vector3::new(v[0], v[1], v[2]), Vector3::new(v[3], v[4], v[5]))
}

#[inline(always)]
fn join(out: &mut DVector<f32>, lin: Vector3<f32>, ang: Vector3<f32>, add: bool) {
    let vals = [lin.x, lin.y, lin.z, ang.x, ang.y, ang.z];
    for (i, val) in vals.iter().enumerate() {
        if add {
            out[i] += *val;
        } else {
            out[i] = *val;
        }
    }
}
