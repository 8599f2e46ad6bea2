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

use thiserror::Error;

use crate::descriptor::VarIndex;

/// Errors raised while building or solving a complementarity problem.
#[derive(Copy, Clone, Debug, PartialEq, Error)]
pub enum LcpError {
    /// A vector handed to a block or a global vector has the wrong length.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        expected: usize,
        found: usize,
    },

    /// The mass matrix could not be inverted.
    #[error("mass matrix is singular")]
    SingularMass,

    /// The contact normal has (nearly) zero length or is not finite.
    #[error("degenerate contact normal [{0}, {1}, {2}]")]
    DegenerateNormal(f32, f32, f32),

    /// A constraint row refers to a variable block that is not registered.
    #[error("no variables registered at {0:?}")]
    UnknownVariables(VarIndex),

    /// The cone of row `row` couples it to a row the descriptor doesn't hold.
    #[error("cone of constraint {row} refers to missing constraint {index}")]
    InvalidCone {
        row: usize,
        index: usize,
    },
}

pub type LcpResult<T> = Result<T, LcpError>;

/// Returns a `DimensionMismatch` unless `found == expected`.
#[inline]
pub(crate) fn check_dim(expected: usize, found: usize) -> LcpResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(LcpError::DimensionMismatch { expected, found })
    }
}

/// Returns a `DimensionMismatch` unless `count` slots starting at `offset`
/// fit in a vector of length `len`.
#[inline]
pub(crate) fn check_slots(len: usize, offset: usize, count: usize) -> LcpResult<()> {
    if offset + count <= len {
        Ok(())
    } else {
        Err(LcpError::DimensionMismatch { expected: offset + count, found: len })
    }
}
