// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Line Search
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Single-iteration backtracking line search over complex voxel fields.
//!
//! One call is one iteration of a quasi-Newton minimizer started from the
//! identity Hessian: the caller supplies the (possibly masked) descent
//! direction, the search picks the step length.
//!
//! Gradients use the real-coordinate convention
//! `g = ∂f/∂Re ρ + i ∂f/∂Im ρ`, so the directional derivative along `d`
//! is `Re Σ conj(g)·d`.

use bcdi_types::config::LineSearchConfig;
use bcdi_types::error::{BcdiError, BcdiResult};
use ndarray::{Array3, Zip};
use num_complex::Complex64;

/// Outcome of one line search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchResult {
    /// Step length actually taken (0 when `d` is not a descent direction).
    pub step: f64,
    /// Objective value at `x0 + step·d`.
    pub value: f64,
    /// Number of objective evaluations.
    pub evaluations: usize,
}

/// `Re Σ conj(a)·b`, the real inner product of two complex fields.
pub fn real_inner(a: &Array3<Complex64>, b: &Array3<Complex64>) -> f64 {
    Zip::from(a)
        .and(b)
        .fold(0.0, |acc, x, y| acc + x.re * y.re + x.im * y.im)
}

/// `out = x0 + t·d`
fn step_into(out: &mut Array3<Complex64>, x0: &Array3<Complex64>, d: &Array3<Complex64>, t: f64) {
    Zip::from(out)
        .and(x0)
        .and(d)
        .for_each(|o, &x, &dv| *o = x + dv * t);
}

/// Find a step `t` along `direction` satisfying the Armijo condition
/// `f(x0 + t·d) ≤ f0 + c·t·⟨g, d⟩`.
///
/// Starts at `config.initial_step` and backtracks with a safeguarded
/// quadratic interpolant, clamped to `[0.1·t, 0.5·t]`. On success
/// `trial` holds `x0 + step·d`. A direction that is not a descent
/// direction returns step 0 without evaluating the objective.
pub fn backtracking_step<F>(
    x0: &Array3<Complex64>,
    f0: f64,
    gradient: &Array3<Complex64>,
    direction: &Array3<Complex64>,
    trial: &mut Array3<Complex64>,
    config: &LineSearchConfig,
    mut objective: F,
) -> BcdiResult<LineSearchResult>
where
    F: FnMut(&Array3<Complex64>) -> BcdiResult<f64>,
{
    config.validate()?;
    if x0.shape() != gradient.shape()
        || x0.shape() != direction.shape()
        || x0.shape() != trial.shape()
    {
        return Err(BcdiError::shape(
            "line search buffers",
            x0.shape(),
            direction.shape(),
        ));
    }
    if !f0.is_finite() {
        return Err(BcdiError::EngineFailure(format!(
            "line search started from non-finite objective {f0}"
        )));
    }

    let slope = real_inner(gradient, direction);
    if !slope.is_finite() || slope >= 0.0 {
        trial.assign(x0);
        return Ok(LineSearchResult {
            step: 0.0,
            value: f0,
            evaluations: 0,
        });
    }

    let mut t = config.initial_step;
    let mut evaluations = 0;
    for _ in 0..=config.max_backtracks {
        step_into(trial, x0, direction, t);
        let f = objective(trial)?;
        evaluations += 1;

        if f.is_finite() && f <= f0 + config.armijo * t * slope {
            return Ok(LineSearchResult {
                step: t,
                value: f,
                evaluations,
            });
        }

        t = if f.is_finite() {
            // Minimizer of the quadratic through f0, slope and f(t).
            let curvature = f - f0 - slope * t;
            let t_quad = -slope * t * t / (2.0 * curvature);
            t_quad.clamp(0.1 * t, 0.5 * t)
        } else {
            0.5 * t
        };
    }

    Err(BcdiError::EngineFailure(format!(
        "line search found no sufficient decrease after {evaluations} evaluations"
    )))
}
