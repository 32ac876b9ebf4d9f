// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Error Reduction
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Error Reduction: magnitude projection followed by support projection.

use bcdi_math::line_search::backtracking_step;
use bcdi_types::config::{LineSearchConfig, RegularizerConfig};
use bcdi_types::constants::PROJECTION_STEP;
use bcdi_types::error::BcdiResult;
use bcdi_types::grid::Grid3D;
use log::{debug, warn};
use ndarray::{Array3, Zip};
use num_complex::Complex64;

use crate::engine::Engine;
use crate::operator::{share, Operator, SharedOperator};
use crate::regularizer::{self, Regularizer};
use crate::state::State;

/// Fixed-step Error Reduction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Er;

impl Er {
    pub fn new() -> Self {
        Er
    }
}

impl Operator for Er {
    fn name(&self) -> &'static str {
        "ER"
    }

    fn apply<'s, 'e>(&mut self, state: &'s mut State<'e>) -> BcdiResult<&'s mut State<'e>> {
        let (field, support, engine) = state.parts_mut();
        engine
            .loss(field, true, false)
            .map_err(|e| e.in_operator("ER"))?;
        Zip::from(field)
            .and(engine.gradient())
            .and(&*support)
            .for_each(|f, &g, &s| {
                *f = if s {
                    *f - g * PROJECTION_STEP
                } else {
                    Complex64::new(0.0, 0.0)
                };
            });
        Ok(state)
    }

    fn into_steps(self: Box<Self>) -> Vec<SharedOperator> {
        share(*self)
    }
}

/// Line-search buffers shared by the optimization-driven operators.
#[derive(Debug, Clone)]
pub(crate) struct OptScratch {
    pub grid: Grid3D,
    pub base: Array3<Complex64>,
    pub gradient: Array3<Complex64>,
    pub direction: Array3<Complex64>,
    pub trial: Array3<Complex64>,
}

impl OptScratch {
    pub fn new(grid: Grid3D) -> Self {
        let dim = grid.dim();
        OptScratch {
            grid,
            base: Array3::zeros(dim),
            gradient: Array3::zeros(dim),
            direction: Array3::zeros(dim),
            trial: Array3::zeros(dim),
        }
    }
}

/// Regularized Error Reduction.
///
/// Takes one line-search step on `loss + R` along the negative gradient
/// restricted to the support, then projects onto the support.
pub struct ErOpt {
    regularizer: Option<Box<dyn Regularizer>>,
    line_search: LineSearchConfig,
    scratch: Option<OptScratch>,
}

impl ErOpt {
    /// Line-search buffers are sized on first application and reused.
    pub fn new(regularizer: Option<Box<dyn Regularizer>>, line_search: LineSearchConfig) -> BcdiResult<Self> {
        line_search.validate()?;
        Ok(ErOpt {
            regularizer,
            line_search,
            scratch: None,
        })
    }

    pub fn from_config(regularizer: &RegularizerConfig, line_search: LineSearchConfig) -> BcdiResult<Self> {
        Self::new(regularizer::from_config(regularizer), line_search)
    }

    fn step(&mut self, field: &mut Array3<Complex64>, support: &Array3<bool>, engine: &mut Engine) -> BcdiResult<()> {
        let grid = engine.grid();
        let scratch = match &mut self.scratch {
            Some(s) => {
                s.grid.check("EROpt scratch", &grid.shape)?;
                s
            }
            empty => empty.insert(OptScratch::new(grid)),
        };
        let reg = self.regularizer.as_deref();

        let mut f0 = engine.loss(field, true, true)?;
        if let Some(r) = reg {
            f0 += engine.modify_loss(field, r)?;
            engine.modify_deriv(field, r)?;
        }
        scratch.base.assign(field);
        scratch.gradient.assign(engine.gradient());
        Zip::from(&mut scratch.direction)
            .and(&scratch.gradient)
            .and(support)
            .for_each(|d, &g, &s| *d = if s { -g } else { Complex64::new(0.0, 0.0) });

        let result = backtracking_step(
            &scratch.base,
            f0,
            &scratch.gradient,
            &scratch.direction,
            &mut scratch.trial,
            &self.line_search,
            |x| {
                let mut f = engine.loss(x, false, true)?;
                if let Some(r) = reg {
                    f += engine.modify_loss(x, r)?;
                }
                Ok(f)
            },
        )?;
        debug!(
            "EROpt: objective {f0:.6e} -> {:.6e}, step {:.3e}, {} evaluations",
            result.value, result.step, result.evaluations
        );
        if result.step == 0.0 {
            warn!("EROpt: gradient on the support is not a descent direction");
        }

        Zip::from(field)
            .and(&scratch.trial)
            .and(support)
            .for_each(|f, &t, &s| *f = if s { t } else { Complex64::new(0.0, 0.0) });
        Ok(())
    }
}

impl Operator for ErOpt {
    fn name(&self) -> &'static str {
        "EROpt"
    }

    fn apply<'s, 'e>(&mut self, state: &'s mut State<'e>) -> BcdiResult<&'s mut State<'e>> {
        let (field, support, engine) = state.parts_mut();
        self.step(field, support, engine)
            .map_err(|e| e.in_operator("EROpt"))?;
        Ok(state)
    }

    fn into_steps(self: Box<Self>) -> Vec<SharedOperator> {
        share(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regularizer::TotalVariation;
    use bcdi_math::fft::{fftn, ifftn};
    use bcdi_types::error::BcdiError;

    fn grid() -> Grid3D {
        Grid3D::new([4, 4, 4]).unwrap()
    }

    fn engine() -> Engine {
        let amplitudes = Array3::from_shape_fn((4, 4, 4), |(i, j, k)| {
            1.0 + ((i * 3 + j * 5 + k) % 4) as f64
        });
        let mut engine = Engine::new(grid());
        engine
            .bind(amplitudes, Array3::from_elem((4, 4, 4), true))
            .unwrap();
        engine
    }

    fn start_field() -> Array3<Complex64> {
        Array3::from_shape_fn((4, 4, 4), |(i, j, k)| {
            let t = (i * 16 + j * 4 + k) as f64;
            Complex64::new((t * 0.9).sin(), (t * 0.4).cos())
        })
    }

    #[test]
    fn test_er_full_support_is_magnitude_projection() {
        let mut engine = engine();
        let field = start_field();
        let spectrum = fftn(&field).unwrap();
        let expected = ifftn(&Zip::from(&spectrum)
            .and(engine.amplitudes())
            .map_collect(|psi, &a| Complex64::from_polar(a, psi.arg())))
        .unwrap();

        let mut state =
            State::from_parts(&mut engine, field, Array3::from_elem((4, 4, 4), true)).unwrap();
        Er::new().apply(&mut state).unwrap();
        for (f, e) in state.field().iter().zip(expected.iter()) {
            assert!((f - e).norm() < 1e-12, "{f} vs {e}");
        }
    }

    #[test]
    fn test_er_zeroes_outside_support() {
        let mut engine = engine();
        let support = Array3::from_shape_fn((4, 4, 4), |(i, j, k)| i < 2 && j < 3 && k > 0);
        let mut state = State::from_parts(&mut engine, start_field(), support.clone()).unwrap();
        Er::new().apply(&mut state).unwrap();
        for (f, &s) in state.field().iter().zip(support.iter()) {
            if !s {
                assert_eq!(*f, Complex64::new(0.0, 0.0));
            }
        }
    }

    #[test]
    fn test_er_reduces_loss() {
        let mut engine = engine();
        let support = Array3::from_shape_fn((4, 4, 4), |(i, _, _)| i < 3);
        let mut state = State::from_parts(&mut engine, start_field(), support).unwrap();
        let mut er = Er::new();
        er.apply(&mut state).unwrap();
        let first = state.loss().unwrap();
        for _ in 0..10 {
            er.apply(&mut state).unwrap();
        }
        let last = state.loss().unwrap();
        assert!(last <= first + 1e-12, "ER increased loss: {first} -> {last}");
    }

    #[test]
    fn test_er_opt_decreases_objective() {
        let mut engine = engine();
        let support = Array3::from_shape_fn((4, 4, 4), |(i, j, _)| i < 3 && j < 3);
        let mut state = State::from_parts(&mut engine, start_field(), support.clone()).unwrap();
        Er::new().apply(&mut state).unwrap();

        let tv = TotalVariation::new(1e-3, 1e-6);
        let before = state.loss().unwrap() + tv.value(state.field());
        let mut op = ErOpt::new(Some(Box::new(tv)), LineSearchConfig::default()).unwrap();
        op.apply(&mut state).unwrap();
        let after = state.loss().unwrap() + tv.value(state.field());
        assert!(after <= before, "EROpt increased objective: {before} -> {after}");
        for (f, &s) in state.field().iter().zip(support.iter()) {
            if !s {
                assert_eq!(*f, Complex64::new(0.0, 0.0));
            }
        }
    }

    #[test]
    fn test_er_opt_without_regularizer_matches_er_on_full_support() {
        let mut e1 = engine();
        let mut e2 = engine();
        let full = Array3::from_elem((4, 4, 4), true);
        let mut s1 = State::from_parts(&mut e1, start_field(), full.clone()).unwrap();
        let mut s2 = State::from_parts(&mut e2, start_field(), full).unwrap();
        Er::new().apply(&mut s1).unwrap();
        ErOpt::new(None, LineSearchConfig::default())
            .unwrap()
            .apply(&mut s2)
            .unwrap();
        for (a, b) in s1.field().iter().zip(s2.field().iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn test_er_opt_rejects_resized_state() {
        let mut op = ErOpt::new(None, LineSearchConfig::default()).unwrap();
        let mut e1 = engine();
        let mut s1 =
            State::from_parts(&mut e1, start_field(), Array3::from_elem((4, 4, 4), true)).unwrap();
        op.apply(&mut s1).unwrap();

        let mut e2 = Engine::new(Grid3D::new([2, 2, 2]).unwrap());
        e2.bind(Array3::ones((2, 2, 2)), Array3::from_elem((2, 2, 2), true))
            .unwrap();
        let mut s2 = State::from_parts(
            &mut e2,
            Array3::zeros((2, 2, 2)),
            Array3::from_elem((2, 2, 2), true),
        )
        .unwrap();
        let err = op.apply(&mut s2).unwrap_err();
        match err {
            BcdiError::Operator { operator, source } => {
                assert_eq!(operator, "EROpt");
                assert!(matches!(*source, BcdiError::DimensionMismatch { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
