// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Reconstruction State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reconstruction state threaded through every operator.

use std::f64::consts::TAU;

use bcdi_math::fft::to_complex;
use bcdi_math::shift::{center_of_mass, roll, shift_to};
use bcdi_types::constants::DEFAULT_SUPPORT_FRACTION;
use bcdi_types::error::{BcdiError, BcdiResult};
use bcdi_types::grid::Grid3D;
use log::info;
use ndarray::{Array3, Zip};
use num_complex::Complex64;
use rand::Rng;

use crate::engine::Engine;

/// Current iterate, support and peak shift, bound to an [`Engine`].
///
/// The engine is borrowed for the lifetime of the state; its measured
/// data stay fixed while the state exists.
#[derive(Debug)]
pub struct State<'e> {
    pub(crate) field: Array3<Complex64>,
    pub(crate) support: Array3<bool>,
    shift: [isize; 3],
    pub(crate) engine: &'e mut Engine,
}

impl<'e> State<'e> {
    /// Build the starting state from measured intensities.
    ///
    /// Centres the diffraction peak on voxel (0, 0, 0), derives a support
    /// from the autocorrelation when none is given, draws random phases
    /// for the initial field, and binds the centred data to `engine`.
    pub fn create<R: Rng + ?Sized>(
        engine: &'e mut Engine,
        intensities: &Array3<f64>,
        rec_mask: &Array3<bool>,
        support: Option<&Array3<bool>>,
        rng: &mut R,
    ) -> BcdiResult<Self> {
        let grid = engine.grid();
        grid.check("intensities", intensities.shape())?;
        grid.check("reciprocal mask", rec_mask.shape())?;
        if let Some(s) = support {
            grid.check("support", s.shape())?;
        }
        if let Some(bad) = intensities.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(BcdiError::InvalidArgument(format!(
                "intensities must be finite and non-negative, found {bad}"
            )));
        }

        let amplitudes = intensities.mapv(f64::sqrt);
        let com = center_of_mass(&amplitudes).ok_or_else(|| {
            BcdiError::InvalidArgument("intensities are identically zero".to_string())
        })?;
        let shift = shift_to(com, [0.0; 3]);
        let amplitudes = roll(&amplitudes, shift);
        let rec_mask = roll(rec_mask, shift);

        let support = match support {
            Some(s) => s.clone(),
            None => autocorrelation_support(engine, &roll(intensities, shift))?,
        };

        let mut field = Zip::from(&amplitudes)
            .and(&rec_mask)
            .map_collect(|&a, &m| {
                if m {
                    Complex64::from_polar(a, rng.gen_range(0.0..TAU))
                } else {
                    Complex64::new(0.0, 0.0)
                }
            });
        engine.fft().inverse(&mut field)?;
        engine.bind(amplitudes, rec_mask)?;

        let state = State {
            field,
            support,
            shift,
            engine,
        };
        info!(
            "reconstruction state {:?}: peak shift {:?}, {} support voxels",
            grid.shape,
            shift,
            state.support_count()
        );
        Ok(state)
    }

    /// Wrap an existing iterate. The engine must already hold measured data.
    pub fn from_parts(
        engine: &'e mut Engine,
        field: Array3<Complex64>,
        support: Array3<bool>,
    ) -> BcdiResult<Self> {
        let grid = engine.grid();
        grid.check("field", field.shape())?;
        grid.check("support", support.shape())?;
        if !engine.is_bound() {
            return Err(BcdiError::EngineFailure(
                "no measured data bound to the engine".to_string(),
            ));
        }
        Ok(State {
            field,
            support,
            shift: [0; 3],
            engine,
        })
    }

    pub fn grid(&self) -> Grid3D {
        self.engine.grid()
    }

    pub fn field(&self) -> &Array3<Complex64> {
        &self.field
    }

    pub fn support(&self) -> &Array3<bool> {
        &self.support
    }

    /// Circular shift applied to the measured data to centre the peak.
    pub fn shift(&self) -> [isize; 3] {
        self.shift
    }

    pub fn engine(&self) -> &Engine {
        &*self.engine
    }

    pub fn support_count(&self) -> usize {
        self.support.iter().filter(|&&s| s).count()
    }

    pub fn set_field(&mut self, field: Array3<Complex64>) -> BcdiResult<()> {
        self.grid().check("field", field.shape())?;
        self.field = field;
        Ok(())
    }

    pub fn set_support(&mut self, support: Array3<bool>) -> BcdiResult<()> {
        self.grid().check("support", support.shape())?;
        self.support = support;
        Ok(())
    }

    /// Magnitude loss of the current iterate.
    pub fn loss(&mut self) -> BcdiResult<f64> {
        self.engine.loss(&self.field, false, true)
    }

    /// Disjoint mutable access for operators.
    pub(crate) fn parts_mut(&mut self) -> (&mut Array3<Complex64>, &mut Array3<bool>, &mut Engine) {
        (&mut self.field, &mut self.support, &mut *self.engine)
    }

    pub fn into_parts(self) -> (Array3<Complex64>, Array3<bool>) {
        (self.field, self.support)
    }
}

/// Support from the autocorrelation: inverse transform of the intensity,
/// thresholded at a fixed fraction of its maximum magnitude.
fn autocorrelation_support(engine: &Engine, intensities: &Array3<f64>) -> BcdiResult<Array3<bool>> {
    let mut autocorr = to_complex(intensities);
    engine.fft().inverse(&mut autocorr)?;
    let magnitude = autocorr.mapv(|c| c.norm());
    let peak = magnitude.iter().cloned().fold(0.0_f64, f64::max);
    let cutoff = DEFAULT_SUPPORT_FRACTION * peak;
    Ok(magnitude.mapv(|m| m > cutoff))
}
