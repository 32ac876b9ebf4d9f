//! Smoothing kernels on periodic voxel grids.

use bcdi_types::error::{BcdiError, BcdiResult};
use bcdi_types::grid::{wrapped_distance, Grid3D};
use ndarray::Array3;

/// Normalized real-space Gaussian centred on voxel (0, 0, 0).
///
/// Distances use the minimum-image convention per axis, so the kernel
/// wraps around the box the same way a circular convolution does.
pub fn periodic_gaussian(grid: Grid3D, sigma: f64) -> BcdiResult<Array3<f64>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(BcdiError::InvalidArgument(format!(
            "gaussian sigma must be finite and > 0, got {sigma}"
        )));
    }
    let [nx, ny, nz] = grid.shape;
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);
    let mut kernel = Array3::from_shape_fn(grid.dim(), |(i, j, k)| {
        let dx = wrapped_distance(i, nx);
        let dy = wrapped_distance(j, ny);
        let dz = wrapped_distance(k, nz);
        (-(dx * dx + dy * dy + dz * dz) * inv_two_sigma_sq).exp()
    });
    let total: f64 = kernel.sum();
    kernel.mapv_inplace(|v| v / total);
    Ok(kernel)
}
