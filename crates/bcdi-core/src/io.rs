// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Dataset I/O
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! NPZ archives for measured datasets and reconstruction results.
//!
//! Dataset keys: `intensities` (f64), `rec_support` (u8) and an optional
//! `support` (u8). Result keys: `field_re`, `field_im` (f64), `support`
//! (u8) and `shift` (i64, length 3). Masks are stored as 0/1 bytes.

use std::fs::File;

use bcdi_types::error::{BcdiError, BcdiResult};
use bcdi_types::grid::Grid3D;
use ndarray::{Array1, Array3, ArrayBase, Dimension, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, WritableElement};
use rand::Rng;

use crate::engine::Engine;
use crate::state::State;

/// Measured diffraction data with its masks.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub intensities: Array3<f64>,
    /// Trusted reciprocal-space voxels.
    pub rec_support: Array3<bool>,
    /// Initial real-space support; derived from the autocorrelation when absent.
    pub support: Option<Array3<bool>>,
}

impl Dataset {
    pub fn new(
        intensities: Array3<f64>,
        rec_support: Array3<bool>,
        support: Option<Array3<bool>>,
    ) -> BcdiResult<Self> {
        let grid = Grid3D::from_dim(intensities.shape())?;
        grid.check("dataset rec_support", rec_support.shape())?;
        if let Some(s) = &support {
            grid.check("dataset support", s.shape())?;
        }
        Ok(Dataset {
            intensities,
            rec_support,
            support,
        })
    }

    pub fn grid(&self) -> BcdiResult<Grid3D> {
        Grid3D::from_dim(self.intensities.shape())
    }

    pub fn from_npz(path: &str) -> BcdiResult<Self> {
        let file = File::open(path)?;
        let mut npz = NpzReader::new(file)
            .map_err(|e| BcdiError::Npz(format!("failed to open dataset archive '{path}': {e}")))?;
        let names = npz
            .names()
            .map_err(|e| BcdiError::Npz(format!("failed to list '{path}': {e}")))?;

        let intensities = read_array3_f64(&mut npz, "intensities")?;
        let rec_support = read_mask(&mut npz, "rec_support")?;
        let support = if names.iter().any(|n| n == "support" || n == "support.npy") {
            Some(read_mask(&mut npz, "support")?)
        } else {
            None
        };
        Self::new(intensities, rec_support, support)
    }

    pub fn to_npz(&self, path: &str) -> BcdiResult<()> {
        let mut writer = NpzWriter::new(File::create(path)?);
        add(&mut writer, "intensities", &self.intensities)?;
        add(&mut writer, "rec_support", &mask_bytes(&self.rec_support))?;
        if let Some(s) = &self.support {
            add(&mut writer, "support", &mask_bytes(s))?;
        }
        writer
            .finish()
            .map_err(|e| BcdiError::Npz(format!("failed to finish '{path}': {e}")))?;
        Ok(())
    }

    /// Bind this dataset to `engine` and draw the starting state.
    pub fn create_state<'e, R: Rng + ?Sized>(
        &self,
        engine: &'e mut Engine,
        rng: &mut R,
    ) -> BcdiResult<State<'e>> {
        State::create(
            engine,
            &self.intensities,
            &self.rec_support,
            self.support.as_ref(),
            rng,
        )
    }
}

/// Write the current iterate, support and peak shift of `state`.
pub fn save_state_npz(state: &State<'_>, path: &str) -> BcdiResult<()> {
    let mut writer = NpzWriter::new(File::create(path)?);
    add(&mut writer, "field_re", &state.field().mapv(|c| c.re))?;
    add(&mut writer, "field_im", &state.field().mapv(|c| c.im))?;
    add(&mut writer, "support", &mask_bytes(state.support()))?;
    let shift: Array1<i64> = state.shift().iter().map(|&s| s as i64).collect();
    add(&mut writer, "shift", &shift)?;
    writer
        .finish()
        .map_err(|e| BcdiError::Npz(format!("failed to finish '{path}': {e}")))?;
    Ok(())
}

fn add<A, D>(writer: &mut NpzWriter<File>, key: &str, array: &ArrayBase<OwnedRepr<A>, D>) -> BcdiResult<()>
where
    A: WritableElement,
    D: Dimension,
{
    writer
        .add_array(key, array)
        .map_err(|e| BcdiError::Npz(format!("failed to write key '{key}': {e}")))
}

fn read_array3_f64(npz: &mut NpzReader<File>, key: &str) -> BcdiResult<Array3<f64>> {
    npz.by_name::<OwnedRepr<f64>, Ix3>(&format!("{key}.npy"))
        .or_else(|_| npz.by_name::<OwnedRepr<f64>, Ix3>(key))
        .map_err(|e| BcdiError::Npz(format!("failed to read key '{key}': {e}")))
}

fn read_mask(npz: &mut NpzReader<File>, key: &str) -> BcdiResult<Array3<bool>> {
    let bytes = npz
        .by_name::<OwnedRepr<u8>, Ix3>(&format!("{key}.npy"))
        .or_else(|_| npz.by_name::<OwnedRepr<u8>, Ix3>(key))
        .map_err(|e| BcdiError::Npz(format!("failed to read mask '{key}': {e}")))?;
    Ok(bytes.mapv(|b| b != 0))
}

fn mask_bytes(mask: &Array3<bool>) -> Array3<u8> {
    mask.mapv(u8::from)
}
