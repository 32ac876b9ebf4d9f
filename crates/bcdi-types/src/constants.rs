// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

/// Fraction of the autocorrelation maximum used for the default support.
pub const DEFAULT_SUPPORT_FRACTION: f64 = 0.1;

/// Fixed gradient step that turns the magnitude-loss gradient into a
/// Fourier magnitude projection.
pub const PROJECTION_STEP: f64 = 0.5;

/// Default HIO feedback parameter.
pub const DEFAULT_BETA: f64 = 0.9;

/// Default shrinkwrap relative threshold.
pub const DEFAULT_SHRINK_THRESHOLD: f64 = 0.1;

/// Default shrinkwrap Gaussian width in voxels.
pub const DEFAULT_SHRINK_SIGMA: f64 = 1.0;

/// Default complement-penalty weight for HIOOpt.
pub const DEFAULT_HIO_OPT_ALPHA: f64 = 0.1;

/// Default total-variation weight.
pub const DEFAULT_TV_LAMBDA: f64 = 1e-3;

/// Smoothing of |∇ρ| in the total-variation term.
pub const DEFAULT_TV_EPSILON: f64 = 1e-8;

/// Armijo sufficient-decrease constant.
pub const ARMIJO_C: f64 = 1e-4;

/// Upper bound on the operator applications one recipe may expand to.
pub const MAX_RECIPE_APPLICATIONS: usize = 1_000_000;
