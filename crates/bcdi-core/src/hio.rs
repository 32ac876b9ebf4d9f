// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Hybrid Input-Output
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Hybrid Input-Output and its line-search variant.

use bcdi_math::line_search::{backtracking_step, LineSearchResult};
use bcdi_types::config::LineSearchConfig;
use bcdi_types::constants::PROJECTION_STEP;
use bcdi_types::error::{BcdiError, BcdiResult};
use bcdi_types::grid::Grid3D;
use log::{debug, warn};
use ndarray::{Array3, Zip};
use num_complex::Complex64;

use crate::engine::Engine;
use crate::er::OptScratch;
use crate::operator::{share, Operator, SharedOperator};
use crate::regularizer::{ComplementPenalty, Regularizer};
use crate::state::State;

/// Fixed-feedback HIO.
///
/// Inside the support the field takes the magnitude projection
/// `ρ − g/2`; outside it is pushed by `β·g/2` instead of being zeroed.
#[derive(Debug, Clone, Copy)]
pub struct Hio {
    pub beta: f64,
}

impl Hio {
    pub fn new(beta: f64) -> Self {
        Hio { beta }
    }
}

impl Operator for Hio {
    fn name(&self) -> &'static str {
        "HIO"
    }

    fn apply<'s, 'e>(&mut self, state: &'s mut State<'e>) -> BcdiResult<&'s mut State<'e>> {
        let (field, support, engine) = state.parts_mut();
        engine
            .loss(field, true, false)
            .map_err(|e| e.in_operator("HIO"))?;
        let feedback = self.beta * PROJECTION_STEP;
        Zip::from(field)
            .and(engine.gradient())
            .and(&*support)
            .for_each(|f, &g, &s| {
                if s {
                    *f -= g * PROJECTION_STEP;
                } else {
                    *f += g * feedback;
                }
            });
        Ok(state)
    }

    fn into_steps(self: Box<Self>) -> Vec<SharedOperator> {
        share(*self)
    }
}

/// HIO with adaptive step lengths.
///
/// Minimizes `loss + α Σ_{x ∉ S} |ρ(x)|²` with two independent line
/// searches from the same point: one along the negative gradient on the
/// support, one along it on the complement. Each partition moves by its
/// own step.
pub struct HioOpt {
    penalty: ComplementPenalty,
    line_search: LineSearchConfig,
    scratch: OptScratch,
    outside: Array3<Complex64>,
    inside_trial: Array3<Complex64>,
}

impl HioOpt {
    pub fn new(alpha: f64, state: &State<'_>) -> BcdiResult<Self> {
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(BcdiError::InvalidArgument(format!(
                "HIOOpt alpha must be finite and >= 0, got {alpha}"
            )));
        }
        let grid = state.grid();
        Ok(HioOpt {
            penalty: ComplementPenalty::new(alpha, grid.dim()),
            line_search: LineSearchConfig::default(),
            scratch: OptScratch::new(grid),
            outside: Array3::zeros(grid.dim()),
            inside_trial: Array3::zeros(grid.dim()),
        })
    }

    pub fn with_line_search(mut self, line_search: LineSearchConfig) -> BcdiResult<Self> {
        line_search.validate()?;
        self.line_search = line_search;
        Ok(self)
    }

    pub fn alpha(&self) -> f64 {
        self.penalty.alpha
    }

    fn grid(&self) -> Grid3D {
        self.scratch.grid
    }

    fn step(
        &mut self,
        field: &mut Array3<Complex64>,
        support: &Array3<bool>,
        engine: &mut Engine,
    ) -> BcdiResult<()> {
        self.grid().check("HIOOpt field", field.shape())?;
        self.penalty.set_support(support);
        let penalty = &self.penalty;
        let scratch = &mut self.scratch;

        let f0 = engine.loss(field, true, true)? + engine.modify_loss(field, penalty)?;
        engine.modify_deriv(field, penalty)?;
        scratch.base.assign(field);
        scratch.gradient.assign(engine.gradient());
        let zero = Complex64::new(0.0, 0.0);
        Zip::from(&mut scratch.direction)
            .and(&mut self.outside)
            .and(&scratch.gradient)
            .and(support)
            .for_each(|d_in, d_out, &g, &s| {
                if s {
                    *d_in = -g;
                    *d_out = zero;
                } else {
                    *d_in = zero;
                    *d_out = -g;
                }
            });

        let mut objective = |x: &Array3<Complex64>| -> BcdiResult<f64> {
            Ok(engine.loss(x, false, true)? + penalty.value(x))
        };

        // Both searches start from `base`; `field` is only written once both succeed.
        let inner = backtracking_step(
            &scratch.base,
            f0,
            &scratch.gradient,
            &scratch.direction,
            &mut self.inside_trial,
            &self.line_search,
            &mut objective,
        )?;
        let outer = backtracking_step(
            &scratch.base,
            f0,
            &scratch.gradient,
            &self.outside,
            &mut scratch.trial,
            &self.line_search,
            &mut objective,
        )?;
        Zip::from(&mut *field)
            .and(&self.inside_trial)
            .and(&scratch.trial)
            .and(support)
            .for_each(|f, &t_in, &t_out, &s| *f = if s { t_in } else { t_out });

        log_steps(f0, &inner, &outer);
        Ok(())
    }
}

fn log_steps(f0: f64, inner: &LineSearchResult, outer: &LineSearchResult) {
    debug!(
        "HIOOpt: objective {f0:.6e}, support step {:.3e} -> {:.6e}, complement step {:.3e} -> {:.6e}",
        inner.step, inner.value, outer.step, outer.value
    );
    if inner.step == 0.0 && outer.step == 0.0 {
        warn!("HIOOpt: no descent direction on either partition");
    }
}

impl Operator for HioOpt {
    fn name(&self) -> &'static str {
        "HIOOpt"
    }

    fn apply<'s, 'e>(&mut self, state: &'s mut State<'e>) -> BcdiResult<&'s mut State<'e>> {
        let (field, support, engine) = state.parts_mut();
        self.step(field, support, engine)
            .map_err(|e| e.in_operator("HIOOpt"))?;
        Ok(state)
    }

    fn into_steps(self: Box<Self>) -> Vec<SharedOperator> {
        share(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::er::Er;

    const SHAPE: (usize, usize, usize) = (4, 4, 4);

    fn engine() -> Engine {
        let amplitudes = Array3::from_shape_fn(SHAPE, |(i, j, k)| 0.5 + ((i + 2 * j + 3 * k) % 5) as f64);
        let mut engine = Engine::new(Grid3D::new([4, 4, 4]).unwrap());
        engine
            .bind(amplitudes, Array3::from_elem(SHAPE, true))
            .unwrap();
        engine
    }

    fn start_field() -> Array3<Complex64> {
        Array3::from_shape_fn(SHAPE, |(i, j, k)| {
            let t = (i * 16 + j * 4 + k) as f64;
            Complex64::new((t * 0.37).cos(), (t * 0.21).sin())
        })
    }

    fn support() -> Array3<bool> {
        Array3::from_shape_fn(SHAPE, |(i, j, k)| i < 2 && j < 3 && k != 3)
    }

    #[test]
    fn test_hio_partition_formula() {
        let beta = 0.8;
        let field = start_field();
        let mut reference = engine();
        reference.loss(&field, true, false).unwrap();
        let g = reference.gradient().clone();

        let mut engine = engine();
        let mut state = State::from_parts(&mut engine, field.clone(), support()).unwrap();
        Hio::new(beta).apply(&mut state).unwrap();

        for (idx, &s) in support().indexed_iter() {
            let projected = field[idx] - g[idx] * 0.5;
            let expected = if s {
                projected
            } else {
                field[idx] - (projected - field[idx]) * beta
            };
            assert!((state.field()[idx] - expected).norm() < 1e-12, "voxel {idx:?}");
        }
    }

    #[test]
    fn test_hio_full_support_matches_er() {
        let full = Array3::from_elem(SHAPE, true);
        let mut e1 = engine();
        let mut e2 = engine();
        let mut s1 = State::from_parts(&mut e1, start_field(), full.clone()).unwrap();
        let mut s2 = State::from_parts(&mut e2, start_field(), full).unwrap();
        Hio::new(0.9).apply(&mut s1).unwrap();
        Er::new().apply(&mut s2).unwrap();
        for (a, b) in s1.field().iter().zip(s2.field().iter()) {
            assert!((a - b).norm() < 1e-14);
        }
    }

    #[test]
    fn test_hio_keeps_support() {
        let mut engine = engine();
        let mut state = State::from_parts(&mut engine, start_field(), support()).unwrap();
        Hio::new(0.9).apply(&mut state).unwrap();
        assert_eq!(state.support(), &support());
    }

    #[test]
    fn test_hio_opt_rejects_negative_alpha() {
        let mut engine = engine();
        let state = State::from_parts(&mut engine, start_field(), support()).unwrap();
        assert!(matches!(
            HioOpt::new(-1.0, &state),
            Err(BcdiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_hio_opt_full_support_matches_er() {
        let full = Array3::from_elem(SHAPE, true);
        let mut e1 = engine();
        let mut e2 = engine();
        let mut s1 = State::from_parts(&mut e1, start_field(), full.clone()).unwrap();
        let mut s2 = State::from_parts(&mut e2, start_field(), full).unwrap();
        HioOpt::new(0.5, &s1).unwrap().apply(&mut s1).unwrap();
        Er::new().apply(&mut s2).unwrap();
        for (a, b) in s1.field().iter().zip(s2.field().iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn test_hio_opt_partitions_each_descend() {
        let alpha = 0.3;
        let field = start_field();
        let support = support();
        let mut penalty = ComplementPenalty::new(alpha, SHAPE);
        penalty.set_support(&support);
        let mut reference = engine();
        let objective = |e: &mut Engine, x: &Array3<Complex64>| {
            e.loss(x, false, true).unwrap() + penalty.value(x)
        };
        let f0 = objective(&mut reference, &field);

        let mut engine = engine();
        let mut state = State::from_parts(&mut engine, field.clone(), support.clone()).unwrap();
        let mut op = HioOpt::new(alpha, &state).unwrap();
        op.apply(&mut state).unwrap();
        let updated = state.field().clone();

        // Each partition's move alone satisfies sufficient decrease.
        let inside_only = Zip::from(&updated)
            .and(&field)
            .and(&support)
            .map_collect(|&u, &f, &s| if s { u } else { f });
        let outside_only = Zip::from(&updated)
            .and(&field)
            .and(&support)
            .map_collect(|&u, &f, &s| if s { f } else { u });
        assert!(objective(&mut reference, &inside_only) <= f0);
        assert!(objective(&mut reference, &outside_only) <= f0);
        assert_ne!(updated, field);
    }

    #[test]
    fn test_hio_opt_failed_search_leaves_field_untouched() {
        let field = start_field();
        let mut engine = engine();
        let mut state = State::from_parts(&mut engine, field.clone(), support()).unwrap();
        // A stiff complement penalty makes the single allowed trial step overshoot.
        let mut op = HioOpt::new(10.0, &state)
            .unwrap()
            .with_line_search(LineSearchConfig {
                max_backtracks: 0,
                ..LineSearchConfig::default()
            })
            .unwrap();
        let err = op.apply(&mut state).unwrap_err();
        assert!(err.to_string().contains("HIOOpt"), "{err}");
        assert_eq!(state.field(), &field);
        assert_eq!(state.support(), &support());
    }

    #[test]
    fn test_hio_opt_rejects_other_grid() {
        let mut e1 = engine();
        let s1 = State::from_parts(&mut e1, start_field(), support()).unwrap();
        let mut op = HioOpt::new(0.1, &s1).unwrap();

        let mut e2 = Engine::new(Grid3D::new([2, 2, 2]).unwrap());
        e2.bind(Array3::ones((2, 2, 2)), Array3::from_elem((2, 2, 2), true))
            .unwrap();
        let mut s2 = State::from_parts(
            &mut e2,
            Array3::zeros((2, 2, 2)),
            Array3::from_elem((2, 2, 2), false),
        )
        .unwrap();
        let err = op.apply(&mut s2).unwrap_err();
        assert!(err.to_string().contains("HIOOpt"), "{err}");
    }
}
