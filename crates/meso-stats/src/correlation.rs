//! Distance-resolved pairwise spike train correlations.

use meso_core::{AnalysisError, Millimeter, PositionRecord, Result, SparseMatrix};
use meso_preprocess::SpikeCount;
use ndarray::{Array1, Array2, Axis};

/// Sampling and binning of the pairwise correlations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationConfig {
    /// Number of spiking neurons sampled
    pub num_neurons: usize,
    /// Fine time bins summed into one correlation window
    pub window_bins: usize,
    /// Side length of the network (mm)
    pub extent: Millimeter,
    /// Use minimum-image distances on the torus
    pub periodic: bool,
}

/// Pearson coefficients of the first `num_neurons` spiking neurons and the
/// distances of the correlated pairs.
///
/// Pairs are ordered row-major over the strict upper triangle, `(0,1), (0,2),
/// ..., (1,2), ...`, for both outputs. The very last time bin is discarded,
/// as is a trailing window shorter than `window_bins`.
pub fn ccs_distances(
    sptrains: &SparseMatrix<SpikeCount>,
    positions: &PositionRecord,
    config: &CorrelationConfig,
) -> Result<(Array1<f64>, Array1<f64>)> {
    if config.window_bins == 0 {
        return Err(AnalysisError::Configuration(
            "correlation window must span at least one time bin".into(),
        ));
    }
    let n_steps = sptrains.cols().saturating_sub(1);
    let n_windows = n_steps / config.window_bins;
    let kept = n_windows * config.window_bins;

    let mut windows: Vec<Array1<f64>> = Vec::with_capacity(config.num_neurons);
    let mut xy = Vec::with_capacity(config.num_neurons);
    for neuron in 0..sptrains.rows() {
        if windows.len() == config.num_neurons {
            break;
        }
        let mut binned = Array1::<f64>::zeros(n_windows);
        let mut spiked = false;
        for (col, count) in sptrains.row_entries(neuron) {
            if col >= kept {
                break;
            }
            binned[col / config.window_bins] += f64::from(count);
            spiked = true;
        }
        if spiked {
            let pos = positions.get(neuron).ok_or_else(|| {
                AnalysisError::DataConsistency(format!("neuron {neuron} has no position"))
            })?;
            windows.push(binned);
            xy.push(pos);
        }
    }

    if windows.len() < config.num_neurons {
        tracing::warn!(
            requested = config.num_neurons,
            found = windows.len(),
            "computing correlations from fewer neurons because not all sampled neurons spiked"
        );
    }

    let n = windows.len();
    let mut spt = Array2::<f64>::zeros((n, n_windows));
    for (mut row, binned) in spt.axis_iter_mut(Axis(0)).zip(&windows) {
        row.assign(binned);
    }

    let ccs = upper_triangle(&pearson(&spt));
    let distances = pairwise_distances(&xy, config.extent, config.periodic);
    Ok((ccs, distances))
}

/// Correlation coefficient matrix of the rows of `x`.
///
/// Rows without variance give NaN coefficients.
fn pearson(x: &Array2<f64>) -> Array2<f64> {
    let n_cols = x.ncols();
    let mut centered = x.clone();
    if n_cols > 0 {
        for mut row in centered.axis_iter_mut(Axis(0)) {
            let mean = row.sum() / n_cols as f64;
            row -= mean;
        }
    }
    let cov = centered.dot(&centered.t());
    let std = cov.diag().mapv(f64::sqrt);
    let mut corr = cov;
    for ((i, j), c) in corr.indexed_iter_mut() {
        *c /= std[i] * std[j];
    }
    corr
}

fn upper_triangle(m: &Array2<f64>) -> Array1<f64> {
    let n = m.nrows();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            out.push(m[[i, j]]);
        }
    }
    Array1::from(out)
}

/// Condensed pairwise Euclidean distances in row-major upper-triangle order.
///
/// With `periodic` set, every axis uses the minimum image
/// `min(|d|, extent - |d|)`.
pub fn pairwise_distances(
    xy: &[(Millimeter, Millimeter)],
    extent: Millimeter,
    periodic: bool,
) -> Array1<f64> {
    let axis = |a: f64, b: f64| {
        let d = (a - b).abs();
        if periodic {
            d.min(extent - d)
        } else {
            d
        }
    };
    let n = xy.len();
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = axis(xy[i].0, xy[j].0);
            let dy = axis(xy[i].1, xy[j].1);
            out.push(dx.hypot(dy));
        }
    }
    Array1::from(out)
}
