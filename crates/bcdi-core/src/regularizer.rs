// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Regularizers
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Penalty terms added to the magnitude loss by the optimization-driven
//! operators.
//!
//! Gradients follow the engine convention `∂R/∂Re ρ + i ∂R/∂Im ρ`.

use bcdi_types::config::RegularizerConfig;
use ndarray::{Array3, Zip};
use num_complex::Complex64;

pub trait Regularizer {
    fn name(&self) -> &'static str;

    /// Penalty value at `field`.
    fn value(&self, field: &Array3<Complex64>) -> f64;

    /// Add the penalty gradient at `field` into `gradient`.
    fn add_gradient(&self, field: &Array3<Complex64>, gradient: &mut Array3<Complex64>);
}

/// Build the regularizer named by a config section. `None` disables it.
pub fn from_config(config: &RegularizerConfig) -> Option<Box<dyn Regularizer>> {
    match *config {
        RegularizerConfig::None => None,
        RegularizerConfig::TotalVariation { lambda, epsilon } => {
            Some(Box::new(TotalVariation::new(lambda, epsilon)))
        }
    }
}

/// Smoothed isotropic total variation with periodic forward differences:
///
///   R(ρ) = λ Σ_x sqrt(Σ_a |ρ(x + e_a) − ρ(x)|² + ε)
#[derive(Debug, Clone, Copy)]
pub struct TotalVariation {
    pub lambda: f64,
    pub epsilon: f64,
}

impl TotalVariation {
    pub fn new(lambda: f64, epsilon: f64) -> Self {
        TotalVariation { lambda, epsilon }
    }

    /// Forward differences along the three axes and the smoothed norm.
    fn differences(&self, field: &Array3<Complex64>) -> ([Array3<Complex64>; 3], Array3<f64>) {
        let (nx, ny, nz) = field.dim();
        let dx = Array3::from_shape_fn((nx, ny, nz), |(i, j, k)| {
            field[[(i + 1) % nx, j, k]] - field[[i, j, k]]
        });
        let dy = Array3::from_shape_fn((nx, ny, nz), |(i, j, k)| {
            field[[i, (j + 1) % ny, k]] - field[[i, j, k]]
        });
        let dz = Array3::from_shape_fn((nx, ny, nz), |(i, j, k)| {
            field[[i, j, (k + 1) % nz]] - field[[i, j, k]]
        });
        let mut norm = Array3::zeros((nx, ny, nz));
        Zip::from(&mut norm)
            .and(&dx)
            .and(&dy)
            .and(&dz)
            .for_each(|s, a, b, c| {
                *s = (a.norm_sqr() + b.norm_sqr() + c.norm_sqr() + self.epsilon).sqrt();
            });
        ([dx, dy, dz], norm)
    }
}

impl Regularizer for TotalVariation {
    fn name(&self) -> &'static str {
        "TotalVariation"
    }

    fn value(&self, field: &Array3<Complex64>) -> f64 {
        let (_, norm) = self.differences(field);
        self.lambda * norm.sum()
    }

    fn add_gradient(&self, field: &Array3<Complex64>, gradient: &mut Array3<Complex64>) {
        let (nx, ny, nz) = field.dim();
        let ([mut wx, mut wy, mut wz], norm) = self.differences(field);
        for w in [&mut wx, &mut wy, &mut wz] {
            Zip::from(w).and(&norm).for_each(|d, &s| *d /= s);
        }
        // ∂/∂ρ(y) picks up +w_a(y − e_a) and −w_a(y).
        for ((i, j, k), g) in gradient.indexed_iter_mut() {
            let ip = (i + nx - 1) % nx;
            let jp = (j + ny - 1) % ny;
            let kp = (k + nz - 1) % nz;
            let term = wx[[ip, j, k]] - wx[[i, j, k]] + wy[[i, jp, k]] - wy[[i, j, k]]
                + wz[[i, j, kp]]
                - wz[[i, j, k]];
            *g += term * self.lambda;
        }
    }
}

/// Density penalty outside the support: `R(ρ) = α Σ_{x ∉ S} |ρ(x)|²`.
///
/// The excluded region is a scratch mask owned by the penalty and reset
/// from the current support before each use.
#[derive(Debug, Clone)]
pub struct ComplementPenalty {
    pub alpha: f64,
    outside: Array3<bool>,
}

impl ComplementPenalty {
    pub fn new(alpha: f64, shape: (usize, usize, usize)) -> Self {
        ComplementPenalty {
            alpha,
            outside: Array3::from_elem(shape, false),
        }
    }

    /// Penalize everything not in `support`.
    pub fn set_support(&mut self, support: &Array3<bool>) {
        Zip::from(&mut self.outside)
            .and(support)
            .for_each(|o, &s| *o = !s);
    }

    pub fn outside(&self) -> &Array3<bool> {
        &self.outside
    }
}

impl Regularizer for ComplementPenalty {
    fn name(&self) -> &'static str {
        "ComplementPenalty"
    }

    fn value(&self, field: &Array3<Complex64>) -> f64 {
        let total = Zip::from(field)
            .and(&self.outside)
            .fold(0.0, |acc, v, &o| if o { acc + v.norm_sqr() } else { acc });
        self.alpha * total
    }

    fn add_gradient(&self, field: &Array3<Complex64>, gradient: &mut Array3<Complex64>) {
        let scale = 2.0 * self.alpha;
        Zip::from(gradient)
            .and(field)
            .and(&self.outside)
            .for_each(|g, &v, &o| {
                if o {
                    *g += v * scale;
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_field() -> Array3<Complex64> {
        Array3::from_shape_fn((4, 3, 5), |(i, j, k)| {
            let t = (i * 15 + j * 5 + k) as f64;
            Complex64::new((t * 0.4).sin() + 0.3, (t * 0.7).cos())
        })
    }

    /// Central finite-difference check of the gradient along a few voxels.
    fn check_gradient(reg: &dyn Regularizer, field: &Array3<Complex64>) {
        let mut grad = Array3::zeros(field.dim());
        reg.add_gradient(field, &mut grad);
        let h = 1e-6;
        for idx in [[0, 0, 0], [1, 2, 3], [3, 1, 4], [2, 0, 1]] {
            for dir in [Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0)] {
                let mut plus = field.clone();
                let mut minus = field.clone();
                plus[idx] += dir * h;
                minus[idx] -= dir * h;
                let fd = (reg.value(&plus) - reg.value(&minus)) / (2.0 * h);
                let analytic = grad[idx].re * dir.re + grad[idx].im * dir.im;
                assert!(
                    (fd - analytic).abs() < 1e-5 * (1.0 + analytic.abs()),
                    "{} gradient at {idx:?} {dir}: fd {fd} vs analytic {analytic}",
                    reg.name()
                );
            }
        }
    }

    #[test]
    fn test_tv_gradient_matches_finite_difference() {
        check_gradient(&TotalVariation::new(0.7, 1e-3), &test_field());
    }

    #[test]
    fn test_tv_constant_field_is_flat() {
        let tv = TotalVariation::new(1.0, 1e-8);
        let field = Array3::from_elem((3, 3, 3), Complex64::new(2.0, -1.0));
        assert!((tv.value(&field) - 27.0 * 1e-4).abs() < 1e-12);
        let mut grad = Array3::zeros((3, 3, 3));
        tv.add_gradient(&field, &mut grad);
        assert!(grad.iter().all(|g| g.norm() < 1e-12));
    }

    #[test]
    fn test_complement_penalty_gradient() {
        let mut penalty = ComplementPenalty::new(0.4, (4, 3, 5));
        let support = Array3::from_shape_fn((4, 3, 5), |(i, j, _)| i == 1 || j == 2);
        penalty.set_support(&support);
        check_gradient(&penalty, &test_field());
    }

    #[test]
    fn test_complement_penalty_ignores_support() {
        let mut penalty = ComplementPenalty::new(1.0, (2, 2, 2));
        penalty.set_support(&Array3::from_elem((2, 2, 2), true));
        let field = Array3::from_elem((2, 2, 2), Complex64::new(5.0, 5.0));
        assert_eq!(penalty.value(&field), 0.0);
        assert!(penalty.outside().iter().all(|&o| !o));
    }

    #[test]
    fn test_from_config() {
        assert!(from_config(&RegularizerConfig::None).is_none());
        let reg = from_config(&RegularizerConfig::default()).unwrap();
        assert_eq!(reg.name(), "TotalVariation");
    }
}
