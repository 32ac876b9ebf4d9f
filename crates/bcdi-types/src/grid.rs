// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Grid
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::Array3;

use crate::error::{BcdiError, BcdiResult};

/// Voxel grid shared by the real-space field and its reciprocal transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid3D {
    pub shape: [usize; 3],
}

impl Grid3D {
    pub fn new(shape: [usize; 3]) -> BcdiResult<Self> {
        if shape.iter().any(|&n| n == 0) {
            return Err(BcdiError::InvalidArgument(format!(
                "grid dimensions must all be >= 1, got {shape:?}"
            )));
        }
        Ok(Grid3D { shape })
    }

    /// Grid matching an ndarray shape slice.
    pub fn from_dim(dim: &[usize]) -> BcdiResult<Self> {
        if dim.len() != 3 {
            return Err(BcdiError::InvalidArgument(format!(
                "expected a 3D array, got {} dimensions",
                dim.len()
            )));
        }
        Self::new([dim[0], dim[1], dim[2]])
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        (self.shape[0], self.shape[1], self.shape[2])
    }

    /// Fail with `DimensionMismatch` unless `found` equals this grid.
    pub fn check(&self, context: &str, found: &[usize]) -> BcdiResult<()> {
        if found != &self.shape[..] {
            return Err(BcdiError::shape(context, &self.shape, found));
        }
        Ok(())
    }

    /// Integer voxel coordinates, one array per axis.
    /// `coords[a][[i, j, k]]` is the index along axis `a`.
    pub fn index_grids(&self) -> [Array3<f64>; 3] {
        [
            Array3::from_shape_fn(self.dim(), |(i, _, _)| i as f64),
            Array3::from_shape_fn(self.dim(), |(_, j, _)| j as f64),
            Array3::from_shape_fn(self.dim(), |(_, _, k)| k as f64),
        ]
    }

    /// Half-dimension voxel `n / 2` per axis (rounded down for odd `n`),
    /// which is where `fftshift` places the origin.
    ///
    /// Floor rather than round-to-nearest keeps the target on the fftshift
    /// origin; the two can differ for odd `n`.
    pub fn center_voxel(&self) -> [f64; 3] {
        [
            (self.shape[0] / 2) as f64,
            (self.shape[1] / 2) as f64,
            (self.shape[2] / 2) as f64,
        ]
    }
}

/// Minimum-image (periodic) distance of index `i` from 0 on a ring of `n`.
pub fn wrapped_distance(i: usize, n: usize) -> f64 {
    let i = i % n;
    i.min(n - i) as f64
}
