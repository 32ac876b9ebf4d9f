//! 3D FFT wrappers around rustfft.
//!
//! Convention matches numpy:
//! - Forward FFT (fftn): unnormalized
//! - Inverse FFT (ifftn): normalized by 1/(nx*ny*nz)

use std::sync::Arc;

use bcdi_types::error::BcdiResult;
use bcdi_types::grid::Grid3D;
use ndarray::{Array3, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// Planned in-place 3D transform for one fixed grid.
///
/// Plans are built once and shared by `Arc`, so cloning is cheap and
/// every operator that needs a transform can hold its own handle.
#[derive(Clone)]
pub struct Fft3 {
    grid: Grid3D,
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
}

impl std::fmt::Debug for Fft3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft3").field("grid", &self.grid).finish()
    }
}

impl Fft3 {
    pub fn new(grid: Grid3D) -> Self {
        let mut planner = FftPlanner::new();
        let [nx, ny, nz] = grid.shape;
        Fft3 {
            grid,
            forward: [
                planner.plan_fft_forward(nx),
                planner.plan_fft_forward(ny),
                planner.plan_fft_forward(nz),
            ],
            inverse: [
                planner.plan_fft_inverse(nx),
                planner.plan_fft_inverse(ny),
                planner.plan_fft_inverse(nz),
            ],
        }
    }

    pub fn grid(&self) -> Grid3D {
        self.grid
    }

    /// Forward transform in place. Matches `numpy.fft.fftn()`.
    pub fn forward(&self, data: &mut Array3<Complex64>) -> BcdiResult<()> {
        self.grid.check("forward FFT input", data.shape())?;
        transform_axes(data, &self.forward);
        Ok(())
    }

    /// Inverse transform in place. Matches `numpy.fft.ifftn()`.
    pub fn inverse(&self, data: &mut Array3<Complex64>) -> BcdiResult<()> {
        self.grid.check("inverse FFT input", data.shape())?;
        transform_axes(data, &self.inverse);
        let norm = 1.0 / self.grid.len() as f64;
        data.mapv_inplace(|c| c * norm);
        Ok(())
    }
}

/// Apply one 1D plan along every lane of each axis.
///
/// Lanes along the first two axes are strided, so each lane is gathered
/// into a contiguous buffer, transformed, and scattered back.
fn transform_axes(data: &mut Array3<Complex64>, plans: &[Arc<dyn Fft<f64>>; 3]) {
    for (axis, plan) in plans.iter().enumerate() {
        let n = data.len_of(Axis(axis));
        if n <= 1 {
            continue;
        }
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];
        let mut scratch = vec![Complex64::new(0.0, 0.0); plan.get_inplace_scratch_len()];
        for mut lane in data.lanes_mut(Axis(axis)) {
            for (b, v) in buffer.iter_mut().zip(lane.iter()) {
                *b = *v;
            }
            plan.process_with_scratch(&mut buffer, &mut scratch);
            for (v, b) in lane.iter_mut().zip(buffer.iter()) {
                *v = *b;
            }
        }
    }
}

/// Forward 3D FFT of a copy of `input`.
pub fn fftn(input: &Array3<Complex64>) -> BcdiResult<Array3<Complex64>> {
    let grid = Grid3D::from_dim(input.shape())?;
    let mut data = input.clone();
    Fft3::new(grid).forward(&mut data)?;
    Ok(data)
}

/// Inverse 3D FFT of a copy of `input`.
pub fn ifftn(input: &Array3<Complex64>) -> BcdiResult<Array3<Complex64>> {
    let grid = Grid3D::from_dim(input.shape())?;
    let mut data = input.clone();
    Fft3::new(grid).inverse(&mut data)?;
    Ok(data)
}

/// Lift a real array to complex.
pub fn to_complex(input: &Array3<f64>) -> Array3<Complex64> {
    input.mapv(|v| Complex64::new(v, 0.0))
}
