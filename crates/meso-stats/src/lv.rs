//! Local coefficient of variation of inter-spike intervals.
//!
//! `LV = 3/(n-1) · Σ (isi_i - isi_{i+1})² / (isi_i + isi_{i+1})²`
//! (Shinomoto et al. 2003). LV is 0 for a regular train and 1 for a Poisson
//! process.

use meso_core::SparseMatrix;
use meso_preprocess::SpikeCount;
use ndarray::Array1;

/// LV of a sequence of intervals; NaN if there are fewer than two.
pub fn local_variation(isis: &[f64]) -> f64 {
    if isis.len() < 2 {
        return f64::NAN;
    }
    let sum: f64 = isis
        .windows(2)
        .map(|w| {
            let r = (w[0] - w[1]) / (w[0] + w[1]);
            r * r
        })
        .sum();
    3.0 * sum / (isis.len() - 1) as f64
}

/// LV per row, with intervals in units of time bins.
///
/// Bins with several spikes count as one spike time.
pub fn local_variations(sptrains: &SparseMatrix<SpikeCount>) -> Array1<f64> {
    Array1::from_iter((0..sptrains.rows()).map(|row| {
        let isis: Vec<f64> = sptrains
            .row_cols(row)
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64)
            .collect();
        local_variation(&isis)
    }))
}
