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

/// Contact properties of a single surface.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialSurface {
    pub static_friction: f32,
    pub rolling_friction: f32,
    pub spinning_friction: f32,
    pub cohesion: f32,
    pub restitution: f32,
    pub dampingf: f32,
    pub compliance: f32,
    pub compliance_t: f32,
}

impl Default for MaterialSurface {
    fn default() -> Self {
        MaterialSurface {
            static_friction: 0.6,
            rolling_friction: 0.0,
            spinning_friction: 0.0,
            cohesion: 0.0,
            restitution: 0.0,
            dampingf: 0.0,
            compliance: 0.0,
            compliance_t: 0.0,
        }
    }
}

/// The material parameters of a pair of surfaces in contact.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialCouple {
    /// Coulomb friction coefficient.
    pub static_friction: f32,
    /// Rolling friction coefficient, a length.
    pub rolling_friction: f32,
    /// Spinning friction coefficient, a length.
    pub spinning_friction: f32,
    /// Largest attractive normal force the contact can hold.
    pub cohesion: f32,
    /// Ratio of rebound speed to approach speed.
    pub restitution: f32,
    /// Rayleigh damping factor of the compliant contact, `R = dampingf K`.
    pub dampingf: f32,
    /// Normal compliance, the inverse of stiffness. Zero is rigid.
    pub compliance: f32,
    /// Tangential compliance.
    pub compliance_t: f32,
}

impl Default for MaterialCouple {
    fn default() -> Self {
        MaterialCouple::from(MaterialSurface::default())
    }
}

impl From<MaterialSurface> for MaterialCouple {
    fn from(s: MaterialSurface) -> Self {
        MaterialCouple {
            static_friction: s.static_friction,
            rolling_friction: s.rolling_friction,
            spinning_friction: s.spinning_friction,
            cohesion: s.cohesion,
            restitution: s.restitution,
            dampingf: s.dampingf,
            compliance: s.compliance,
            compliance_t: s.compliance_t,
        }
    }
}

impl MaterialCouple {
    /// Mix the properties of two surfaces.
    ///
    /// Friction coefficients are mixed with the geometric mean and restitution
    /// takes the larger of both. Compliances are in series, so they add up.
    /// The weaker cohesion and the stronger damping win.
    pub fn combine(a: &MaterialSurface, b: &MaterialSurface) -> Self {
        MaterialCouple {
            static_friction: (a.static_friction * b.static_friction).sqrt(),
            rolling_friction: (a.rolling_friction * b.rolling_friction).sqrt(),
            spinning_friction: (a.spinning_friction * b.spinning_friction).sqrt(),
            cohesion: a.cohesion.min(b.cohesion),
            restitution: a.restitution.max(b.restitution),
            dampingf: a.dampingf.max(b.dampingf),
            compliance: a.compliance + b.compliance,
            compliance_t: a.compliance_t + b.compliance_t,
        }
    }
}

#[cfg(test)]
mod tests {
    mod material {
        use approx::assert_relative_eq;

        use crate::material::*;

        #[test]
        fn test_defaults() {
            let m = MaterialCouple::default();
            assert_eq!(m.static_friction, 0.6);
            assert_eq!(m.rolling_friction, 0.0);
            assert_eq!(m.spinning_friction, 0.0);
            assert_eq!(m.cohesion, 0.0);
            assert_eq!(m.restitution, 0.0);
            assert_eq!(m.compliance, 0.0);
        }

        #[test]
        fn test_combine() {
            let a = MaterialSurface {
                static_friction: 0.4,
                rolling_friction: 0.01,
                cohesion: 0.5,
                restitution: 0.2,
                compliance: 1.0e-5,
                ..MaterialSurface::default()
            };
            let b = MaterialSurface {
                static_friction: 0.9,
                rolling_friction: 0.04,
                cohesion: 0.1,
                restitution: 0.7,
                dampingf: 0.3,
                compliance: 2.0e-5,
                ..MaterialSurface::default()
            };
            let m = MaterialCouple::combine(&a, &b);
            assert_relative_eq!(m.static_friction, 0.6, epsilon = 1.0e-6);
            assert_relative_eq!(m.rolling_friction, 0.02, epsilon = 1.0e-6);
            assert_eq!(m.spinning_friction, 0.0);
            assert_eq!(m.cohesion, 0.1);
            assert_eq!(m.restitution, 0.7);
            assert_eq!(m.dampingf, 0.3);
            assert_relative_eq!(m.compliance, 3.0e-5, epsilon = 1.0e-9);
        }

        #[test]
        fn test_deserialize_partial() {
            let m: MaterialCouple = serde_json::from_str(r#"{ "restitution": 0.5 }"#).unwrap();
            assert_eq!(m.restitution, 0.5);
            assert_eq!(m.static_friction, 0.6);
        }
    }
}
