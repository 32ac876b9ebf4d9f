// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Support Recentring
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Circular recentring of the field and support on the support's centre
//! of mass.
//!
//! The centre of mass is measured in fftshifted coordinates and moved to
//! the half-dimension voxel there, which is voxel (0, 0, 0) of the
//! unshifted arrays.

use bcdi_math::shift::{fftshift_amount, roll_inplace, roll_into, shift_to};
use bcdi_types::error::{BcdiError, BcdiResult};
use bcdi_types::grid::Grid3D;
use log::debug;
use ndarray::{Array3, Zip};
use num_complex::Complex64;

use crate::operator::{share, Operator, SharedOperator};
use crate::state::State;

pub struct Center {
    grid: Grid3D,
    coords: [Array3<f64>; 3],
    target: [f64; 3],
    shifted: Array3<bool>,
    field_scratch: Array3<Complex64>,
    support_scratch: Array3<bool>,
}

impl Center {
    pub fn new(state: &State<'_>) -> Self {
        let grid = state.grid();
        let dim = grid.dim();
        Center {
            grid,
            coords: grid.index_grids(),
            target: grid.center_voxel(),
            shifted: Array3::from_elem(dim, false),
            field_scratch: Array3::zeros(dim),
            support_scratch: Array3::from_elem(dim, false),
        }
    }

    /// Centre of mass of the fftshifted support.
    pub fn support_com(&mut self, support: &Array3<bool>) -> BcdiResult<[f64; 3]> {
        self.grid.check("center support", support.shape())?;
        roll_into(support, &mut self.shifted, fftshift_amount(&self.grid.shape));
        let count = self.shifted.iter().filter(|&&s| s).count();
        if count == 0 {
            return Err(BcdiError::InvalidArgument(
                "cannot centre an empty support".to_string(),
            ));
        }
        let mut com = [0.0; 3];
        for (c, coord) in com.iter_mut().zip(self.coords.iter()) {
            let moment = Zip::from(coord)
                .and(&self.shifted)
                .fold(0.0, |acc, &x, &s| if s { acc + x } else { acc });
            *c = moment / count as f64;
        }
        Ok(com)
    }

    fn recenter(&mut self, field: &mut Array3<Complex64>, support: &mut Array3<bool>) -> BcdiResult<()> {
        self.grid.check("center field", field.shape())?;
        let com = self.support_com(support)?;
        let shift = shift_to(com, self.target);
        debug!("Center: support centre of mass {com:.2?}, shift {shift:?}");
        roll_inplace(field, &mut self.field_scratch, shift);
        roll_inplace(support, &mut self.support_scratch, shift);
        Ok(())
    }
}

impl Operator for Center {
    fn name(&self) -> &'static str {
        "Center"
    }

    fn apply<'s, 'e>(&mut self, state: &'s mut State<'e>) -> BcdiResult<&'s mut State<'e>> {
        let (field, support, _) = state.parts_mut();
        self.recenter(field, support)
            .map_err(|e| e.in_operator("Center"))?;
        Ok(state)
    }

    fn into_steps(self: Box<Self>) -> Vec<SharedOperator> {
        share(*self)
    }
}
