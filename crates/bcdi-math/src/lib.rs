//! Numerical primitives for BCDI phase retrieval.

pub mod fft;
pub mod kernel;
pub mod line_search;
pub mod shift;
