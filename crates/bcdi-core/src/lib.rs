//! Reconstruction state, loss engine and projection operators.
//!
//! An [`engine::Engine`] owns the measured data and the transform plan;
//! a [`state::State`] borrows it and carries the evolving field and
//! support; operators from [`er`], [`hio`], [`shrink`] and [`center`]
//! are composed with [`operator::sequence`] / [`operator::repeat`] (or
//! from a [`recipe`] string) and applied to the state in place.

pub mod center;
pub mod engine;
pub mod er;
pub mod hio;
pub mod io;
pub mod operator;
pub mod recipe;
pub mod regularizer;
pub mod shrink;
pub mod state;
