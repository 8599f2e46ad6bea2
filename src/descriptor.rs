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

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constraint::*;
use crate::error::*;
use crate::variables::*;

/// Index of a variable block inside a `VariableSet`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarIndex(pub usize);

/// A collection of variable blocks addressed by `VarIndex`.
pub trait VariableSet {
    fn len(&self) -> usize;

    fn get(&self, index: VarIndex) -> Option<&dyn Variables>;

    fn get_mut(&mut self, index: VarIndex) -> Option<&mut dyn Variables>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Variables> VariableSet for [V] {
    fn len(&self) -> usize {
        <[V]>::len(self)
    }

    fn get(&self, index: VarIndex) -> Option<&dyn Variables> {
        <[V]>::get(self, index.0).map(|v| v as &dyn Variables)
    }

    fn get_mut(&mut self, index: VarIndex) -> Option<&mut dyn Variables> {
        <[V]>::get_mut(self, index.0).map(|v| v as &mut dyn Variables)
    }
}

impl<V: Variables> VariableSet for Vec<V> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: VarIndex) -> Option<&dyn Variables> {
        VariableSet::get(self.as_slice(), index)
    }

    fn get_mut(&mut self, index: VarIndex) -> Option<&mut dyn Variables> {
        VariableSet::get_mut(self.as_mut_slice(), index)
    }
}

impl<V: Variables + ?Sized> Variables for Box<V> {
    fn ndof(&self) -> usize {
        (**self).ndof()
    }

    fn state(&self) -> &VariablesState {
        (**self).state()
    }

    fn state_mut(&mut self) -> &mut VariablesState {
        (**self).state_mut()
    }

    fn compute_inv_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        (**self).compute_inv_mass_times(result, vect)
    }

    fn compute_inc_inv_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        (**self).compute_inc_inv_mass_times(result, vect)
    }

    fn compute_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        (**self).compute_mass_times(result, vect)
    }

    fn compute_inc_mass_times(&self, result: &mut DVector<f32>, vect: &DVector<f32>) -> LcpResult<()> {
        (**self).compute_inc_mass_times(result, vect)
    }

    fn build_mass(&self, storage: &mut DMatrix<f32>, row: usize, col: usize) -> LcpResult<()> {
        (**self).build_mass(storage, row, col)
    }
}

/// The complementarity problem handed to a solver: the variable blocks and
/// every constraint row registered for this step.
///
/// A descriptor borrows both; it is assembled right before a solve and
/// dropped afterwards, giving the rows back to the contacts that own them.
pub struct SystemDescriptor<'a> {
    variables: &'a mut dyn VariableSet,
    constraints: Vec<&'a mut ConstraintRow>,
}

impl<'a> SystemDescriptor<'a> {
    pub fn new(variables: &'a mut dyn VariableSet) -> Self {
        SystemDescriptor {
            variables,
            constraints: Vec::new(),
        }
    }

    /// Register a row, returning its index in the descriptor.
    pub fn insert_constraint(&mut self, row: &'a mut ConstraintRow) -> usize {
        let i = self.constraints.len();
        self.constraints.push(row);
        i
    }

    /// The index the next inserted row will receive.
    pub fn next_constraint_index(&self) -> usize {
        self.constraints.len()
    }

    pub fn constraints(&self) -> &[&'a mut ConstraintRow] {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut [&'a mut ConstraintRow] {
        &mut self.constraints
    }

    pub fn variables(&self) -> &dyn VariableSet {
        &*self.variables
    }

    pub fn variables_mut(&mut self) -> &mut dyn VariableSet {
        &mut *self.variables
    }

    /// Borrow the variables and the rows at the same time, as sweeps need.
    pub fn split_mut(&mut self) -> (&mut dyn VariableSet, &mut [&'a mut ConstraintRow]) {
        (&mut *self.variables, &mut self.constraints)
    }

    pub fn count_active_constraints(&self) -> usize {
        self.constraints.iter().filter(|c| c.active).count()
    }

    /// Lay the variable blocks out one after the other in the global state
    /// vectors. Returns the total number of degrees of freedom.
    pub fn update_count_and_offsets(&mut self) -> usize {
        let mut offset = 0;
        for i in 0..self.variables.len() {
            if let Some(v) = self.variables.get_mut(VarIndex(i)) {
                v.set_offset(offset);
                offset += v.ndof();
            }
        }
        debug!(
            variables = self.variables.len(),
            dofs = offset,
            constraints = self.constraints.len(),
            "descriptor offsets updated"
        );
        offset
    }

    /// Verify that every row refers to registered variable blocks, and that
    /// every cone refers to registered rows.
    pub fn check(&self) -> LcpResult<()> {
        let len = self.constraints.len();
        for (i, row) in self.constraints.iter().enumerate() {
            for &index in [row.variables_a, row.variables_b].iter() {
                if self.variables.get(index).is_none() {
                    return Err(LcpError::UnknownVariables(index));
                }
            }
            if let Some(cone) = row.cone {
                let [u, v] = cone.members();
                let coupled = [Some(u), Some(v), cone.normal()];
                for &index in coupled.iter().flatten() {
                    if index >= len {
                        return Err(LcpError::InvalidCone { row: i, index });
                    }
                }
            }
        }
        Ok(())
    }
}
