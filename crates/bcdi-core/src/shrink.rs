// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Shrinkwrap
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Shrinkwrap support update: threshold a Gaussian-smoothed magnitude of
//! the current field, relative to its own maximum.

use bcdi_math::fft::{to_complex, Fft3};
use bcdi_math::kernel::periodic_gaussian;
use bcdi_types::error::{BcdiError, BcdiResult};
use bcdi_types::grid::Grid3D;
use log::{debug, warn};
use ndarray::{Array3, Zip};
use num_complex::Complex64;

use crate::operator::{share, Operator, SharedOperator};
use crate::state::State;

pub struct Shrink {
    threshold: f64,
    sigma: f64,
    grid: Grid3D,
    fft: Fft3,
    /// Forward transform of the normalized periodic Gaussian.
    kernel: Array3<Complex64>,
    smoothed: Array3<Complex64>,
}

impl Shrink {
    /// Precompute the kernel transform for the state's grid.
    pub fn new(threshold: f64, sigma: f64, state: &State<'_>) -> BcdiResult<Self> {
        if !threshold.is_finite() {
            return Err(BcdiError::InvalidArgument(format!(
                "shrinkwrap threshold must be finite, got {threshold}"
            )));
        }
        let grid = state.grid();
        let fft = state.engine().fft().clone();
        let mut kernel = to_complex(&periodic_gaussian(grid, sigma)?);
        fft.forward(&mut kernel)?;
        Ok(Shrink {
            threshold,
            sigma,
            grid,
            fft,
            kernel,
            smoothed: Array3::zeros(grid.dim()),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Circular convolution of `|field|` with the kernel, as magnitudes.
    pub fn smooth(&mut self, field: &Array3<Complex64>) -> BcdiResult<Array3<f64>> {
        self.grid.check("shrinkwrap field", field.shape())?;
        Zip::from(&mut self.smoothed)
            .and(field)
            .for_each(|s, f| *s = Complex64::new(f.norm(), 0.0));
        self.fft.forward(&mut self.smoothed)?;
        Zip::from(&mut self.smoothed)
            .and(&self.kernel)
            .for_each(|s, &k| *s *= k);
        self.fft.inverse(&mut self.smoothed)?;
        Ok(self.smoothed.mapv(|c| c.norm()))
    }

    fn update(&mut self, field: &Array3<Complex64>, support: &mut Array3<bool>) -> BcdiResult<()> {
        let smoothed = self.smooth(field)?;
        let peak = smoothed.iter().cloned().fold(0.0_f64, f64::max);
        let cutoff = self.threshold * peak;
        Zip::from(support)
            .and(&smoothed)
            .for_each(|s, &m| *s = m > cutoff);

        let count = smoothed.iter().filter(|&&m| m > cutoff).count();
        if count == 0 {
            warn!("Shrink: support is empty (peak {peak:.3e}, threshold {})", self.threshold);
        } else {
            debug!("Shrink: {count} support voxels at cutoff {cutoff:.3e}");
        }
        Ok(())
    }
}

impl Operator for Shrink {
    fn name(&self) -> &'static str {
        "Shrink"
    }

    fn apply<'s, 'e>(&mut self, state: &'s mut State<'e>) -> BcdiResult<&'s mut State<'e>> {
        let (field, support, _) = state.parts_mut();
        self.update(field, support)
            .map_err(|e| e.in_operator("Shrink"))?;
        Ok(state)
    }

    fn into_steps(self: Box<Self>) -> Vec<SharedOperator> {
        share(*self)
    }
}
