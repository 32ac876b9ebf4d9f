// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Operator Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use bcdi_core::center::Center;
use bcdi_core::engine::Engine;
use bcdi_core::er::{Er, ErOpt};
use bcdi_core::hio::{Hio, HioOpt};
use bcdi_core::operator::Operator;
use bcdi_core::regularizer::TotalVariation;
use bcdi_core::shrink::Shrink;
use bcdi_core::state::State;
use bcdi_math::fft::fftn;
use bcdi_types::config::LineSearchConfig;
use bcdi_types::grid::Grid3D;
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array3;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::hint::black_box;

const N: usize = 32;

/// Gaussian random object on a centred cube of half the box width.
fn intensities(rng: &mut StdRng) -> Array3<f64> {
    let object = Array3::from_shape_fn((N, N, N), |(i, j, k)| {
        let inside = [i, j, k].iter().all(|&x| (N / 4..3 * N / 4).contains(&x));
        if inside {
            Complex64::new(rng.sample(StandardNormal), rng.sample(StandardNormal))
        } else {
            Complex64::new(0.0, 0.0)
        }
    });
    fftn(&object).unwrap().mapv(|c| c.norm_sqr())
}

fn bench_operators(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let intens = intensities(&mut rng);
    let mask = Array3::from_elem((N, N, N), true);
    let mut engine = Engine::new(Grid3D::new([N, N, N]).unwrap());
    let mut state = State::create(&mut engine, &intens, &mask, None, &mut rng).unwrap();

    let mut er = Er::new();
    let mut hio = Hio::new(0.9);
    let mut shrink = Shrink::new(0.1, 1.0, &state).unwrap();
    let mut center = Center::new(&state);
    let mut er_opt = ErOpt::new(
        Some(Box::new(TotalVariation::new(1e-3, 1e-8))),
        LineSearchConfig::default(),
    )
    .unwrap();
    let mut hio_opt = HioOpt::new(0.1, &state).unwrap();

    let mut group = c.benchmark_group("operators_32");
    group.sample_size(20);
    group.bench_function("er", |b| {
        b.iter(|| black_box(er.apply(&mut state).unwrap().support_count()))
    });
    group.bench_function("hio", |b| {
        b.iter(|| black_box(hio.apply(&mut state).unwrap().support_count()))
    });
    group.bench_function("shrink", |b| {
        b.iter(|| black_box(shrink.apply(&mut state).unwrap().support_count()))
    });
    group.bench_function("center", |b| {
        b.iter(|| black_box(center.apply(&mut state).unwrap().support_count()))
    });
    group.bench_function("er_opt", |b| {
        b.iter(|| black_box(er_opt.apply(&mut state).unwrap().support_count()))
    });
    group.bench_function("hio_opt", |b| {
        b.iter(|| black_box(hio_opt.apply(&mut state).unwrap().support_count()))
    });
    group.finish();
}

criterion_group!(benches, bench_operators);
criterion_main!(benches);
