// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Loss Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Fourier-magnitude loss and its gradient with respect to the real-space
//! field.
//!
//! With `ψ = F ρ` (unnormalized forward FFT), measured amplitudes `a` and
//! trusted-voxel mask `m`:
//!
//!   L(ρ)  = (1/N) Σ_k m_k (|ψ_k| − a_k)²
//!   ∇L(ρ) = 2 F⁻¹[ m (ψ − a ψ/|ψ|) ]
//!
//! so that `ρ − ∇L/2` is exactly the Fourier magnitude projection on the
//! trusted voxels. Where `|ψ| = 0` the phase is taken as 1.

use bcdi_math::fft::Fft3;
use bcdi_types::error::{BcdiError, BcdiResult};
use bcdi_types::grid::Grid3D;
use ndarray::{Array3, Zip};
use num_complex::Complex64;

use crate::regularizer::Regularizer;

/// Owner of the measured data, the transform plan and the cached gradient.
///
/// Built once by the driver and borrowed by a [`crate::state::State`].
#[derive(Debug, Clone)]
pub struct Engine {
    grid: Grid3D,
    fft: Fft3,
    amplitudes: Array3<f64>,
    rec_mask: Array3<bool>,
    /// Forward transform of the last evaluated field.
    recip: Array3<Complex64>,
    gradient: Array3<Complex64>,
    bound: bool,
}

impl Engine {
    pub fn new(grid: Grid3D) -> Self {
        let dim = grid.dim();
        Engine {
            grid,
            fft: Fft3::new(grid),
            amplitudes: Array3::zeros(dim),
            rec_mask: Array3::from_elem(dim, false),
            recip: Array3::zeros(dim),
            gradient: Array3::zeros(dim),
            bound: false,
        }
    }

    /// Attach measured amplitudes (`sqrt` of intensities, already centred)
    /// and the trusted-voxel mask.
    pub fn bind(&mut self, amplitudes: Array3<f64>, rec_mask: Array3<bool>) -> BcdiResult<()> {
        self.grid.check("engine amplitudes", amplitudes.shape())?;
        self.grid.check("engine reciprocal mask", rec_mask.shape())?;
        if amplitudes.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(BcdiError::InvalidArgument(
                "amplitudes must be finite and non-negative".to_string(),
            ));
        }
        self.amplitudes = amplitudes;
        self.rec_mask = rec_mask;
        self.bound = true;
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn grid(&self) -> Grid3D {
        self.grid
    }

    pub fn fft(&self) -> &Fft3 {
        &self.fft
    }

    pub fn amplitudes(&self) -> &Array3<f64> {
        &self.amplitudes
    }

    pub fn rec_mask(&self) -> &Array3<bool> {
        &self.rec_mask
    }

    /// Gradient cached by the last `loss(.., want_gradient = true, ..)`,
    /// plus anything added by `modify_deriv` since.
    pub fn gradient(&self) -> &Array3<Complex64> {
        &self.gradient
    }

    /// Far field `F ρ` of the last evaluated field.
    pub fn far_field(&self) -> &Array3<Complex64> {
        &self.recip
    }

    /// Evaluate the magnitude loss at `field`.
    ///
    /// Refreshes the cached gradient when `want_gradient` is set; returns
    /// the loss value when `want_value` is set and 0.0 otherwise.
    pub fn loss(
        &mut self,
        field: &Array3<Complex64>,
        want_gradient: bool,
        want_value: bool,
    ) -> BcdiResult<f64> {
        self.grid.check("loss field", field.shape())?;
        if !self.bound {
            return Err(BcdiError::EngineFailure(
                "no measured data bound to the engine".to_string(),
            ));
        }
        self.recip.assign(field);
        self.fft.forward(&mut self.recip)?;

        let mut total = 0.0;
        if want_value {
            total = Zip::from(&self.recip)
                .and(&self.amplitudes)
                .and(&self.rec_mask)
                .fold(0.0, |acc, psi, &a, &m| {
                    if m {
                        let r = psi.norm() - a;
                        acc + r * r
                    } else {
                        acc
                    }
                });
        }

        if want_gradient {
            Zip::from(&mut self.gradient)
                .and(&self.recip)
                .and(&self.amplitudes)
                .and(&self.rec_mask)
                .for_each(|g, &psi, &a, &m| {
                    *g = if m { psi - unit_phase(psi) * a } else { Complex64::new(0.0, 0.0) };
                });
            self.fft.inverse(&mut self.gradient)?;
            self.gradient.mapv_inplace(|g| g * 2.0);
        }

        Ok(total / self.grid.len() as f64)
    }

    /// Value of an additional penalty term at `field`.
    pub fn modify_loss(&self, field: &Array3<Complex64>, reg: &dyn Regularizer) -> BcdiResult<f64> {
        self.grid.check("regularized field", field.shape())?;
        Ok(reg.value(field))
    }

    /// Add the gradient of a penalty term to the cached gradient.
    pub fn modify_deriv(&mut self, field: &Array3<Complex64>, reg: &dyn Regularizer) -> BcdiResult<()> {
        self.grid.check("regularized field", field.shape())?;
        reg.add_gradient(field, &mut self.gradient);
        Ok(())
    }
}

#[inline]
fn unit_phase(psi: Complex64) -> Complex64 {
    let r = psi.norm();
    if r > 0.0 {
        psi / r
    } else {
        Complex64::new(1.0, 0.0)
    }
}
