//! Distance-dependent cross-correlation with a reference population.
//!
//! The reference signal marks every time bin in which any reference neuron
//! spiked. It is correlated with the spike count signal of the grid cells on
//! both diagonals, grouped in rings around the network centre.

use meso_core::{AnalysisError, Millimeter, Result, SparseMatrix, SpatialGrid, Time};
use meso_preprocess::CellSpikeCount;
use ndarray::{Array1, Array2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CcFuncConfig {
    /// Requested number of diagonal rings, capped at half the grid side
    pub n_rings: usize,
    /// Maximum lag in time bins
    pub max_lag_bins: usize,
    pub binsize_time: Time,
    pub binsize_space: Millimeter,
}

/// Zero mean, unit variance; a constant signal maps to zeros.
pub fn z_standardize(x: &Array1<f64>) -> Array1<f64> {
    let n = x.len();
    if n == 0 {
        return x.clone();
    }
    let mean = x.sum() / n as f64;
    let std = (x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    if std == 0.0 {
        return Array1::zeros(n);
    }
    x.mapv(|v| (v - mean) / std)
}

/// `Σ_n a[n]·b[n+τ]` for `τ` in `[-max_lag, max_lag]`; terms outside `b` are zero.
fn lagged_products(a: &Array1<f64>, b: &Array1<f64>, max_lag: usize) -> Array1<f64> {
    let n = a.len().min(b.len()) as i64;
    let max_lag = max_lag as i64;
    Array1::from_iter((-max_lag..=max_lag).map(|tau| {
        let lo = (-tau).max(0);
        let hi = (n - tau).min(n);
        (lo..hi.max(lo))
            .map(|i| a[i as usize] * b[(i + tau) as usize])
            .sum::<f64>()
    }))
}

/// Cross-correlation functions per ring, with ring distances and lags.
///
/// Returns `(cc_funcs, distances_mm, lags_ms)` with `cc_funcs` of shape
/// `rings × (2·max_lag + 1)`. Every function is the mean over the four cells
/// of the ring minus its mean at negative lags.
pub fn reference_cc_funcs(
    grid: &SpatialGrid,
    cells: &SparseMatrix<CellSpikeCount>,
    reference: &SparseMatrix<CellSpikeCount>,
    config: &CcFuncConfig,
) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>)> {
    for (what, m) in [("population", cells), ("reference", reference)] {
        if m.rows() != grid.n_cells() {
            return Err(AnalysisError::DataConsistency(format!(
                "{what} cell matrix has {} rows, grid has {} cells",
                m.rows(),
                grid.n_cells()
            )));
        }
    }
    if cells.cols() != reference.cols() {
        return Err(AnalysisError::DataConsistency(format!(
            "population and reference cover {} and {} time bins",
            cells.cols(),
            reference.cols()
        )));
    }

    let rings = grid.diagonal_rings(config.n_rings)?;
    if rings.len() != config.n_rings {
        tracing::debug!(
            requested = config.n_rings,
            used = rings.len(),
            "number of diagonal rings capped by the grid"
        );
    }

    let indicator = reference
        .col_sums()
        .mapv(|s| if s > 0.0 { 1.0 } else { 0.0 });
    let n_bins = indicator.len().max(1) as f64;
    let ref_signal = z_standardize(&indicator) / n_bins;

    let l = config.max_lag_bins;
    let n_lags = 2 * l + 1;
    let mut cc_funcs = Array2::<f64>::zeros((rings.len(), n_lags));
    for (k, ring) in rings.iter().enumerate() {
        let mut mean = Array1::<f64>::zeros(n_lags);
        for &cell in ring {
            let signal = z_standardize(&cells.row_dense(cell));
            mean += &lagged_products(&ref_signal, &signal, l);
        }
        mean /= ring.len() as f64;

        let baseline = if l == 0 {
            0.0
        } else {
            mean.iter().take(l).sum::<f64>() / l as f64
        };
        cc_funcs.row_mut(k).assign(&(mean - baseline));
    }

    let step = std::f64::consts::SQRT_2 * config.binsize_space;
    let distances = Array1::from_iter((0..rings.len()).map(|k| (k as f64 + 0.5) * step));
    let lags = Array1::from_iter((0..n_lags).map(|i| (i as f64 - l as f64) * config.binsize_time));
    Ok((cc_funcs, distances, lags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use meso_core::TripletBuilder;

    fn config(n_rings: usize) -> CcFuncConfig {
        CcFuncConfig {
            n_rings,
            max_lag_bins: 3,
            binsize_time: 0.5,
            binsize_space: 1.0,
        }
    }

    #[test]
    fn test_z_standardize() {
        let z = z_standardize(&Array1::from(vec![1.0, 3.0]));
        assert_relative_eq!(z[0], -1.0);
        assert_relative_eq!(z[1], 1.0);
        assert_eq!(z_standardize(&Array1::from(vec![2.0; 4])), Array1::<f64>::zeros(4));
    }

    #[test]
    fn test_lagged_products() {
        let a = Array1::from(vec![0.0, 1.0, 0.0, 0.0]);
        let b = Array1::from(vec![0.0, 0.0, 0.0, 2.0]);
        let cc = lagged_products(&a, &b, 2);
        assert_eq!(cc.to_vec(), vec![0.0, 0.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_delayed_response_peaks_at_delay() {
        let grid = SpatialGrid::new(4.0, 1.0).unwrap();
        let mut reference = TripletBuilder::new(16, 20);
        reference.push(0, 5, 1).unwrap();
        reference.push(3, 12, 2).unwrap();

        let mut cells = TripletBuilder::new(16, 20);
        for cell in grid.diagonal_rings(1).unwrap()[0] {
            cells.push(cell, 7, 1).unwrap();
            cells.push(cell, 14, 1).unwrap();
        }

        let (cc, distances, lags) = reference_cc_funcs(
            &grid,
            &cells.build().unwrap(),
            &reference.build().unwrap(),
            &config(4),
        )
        .unwrap();

        // capped at half the grid side
        assert_eq!(cc.shape(), &[2, 7]);
        assert_relative_eq!(distances[0], std::f64::consts::SQRT_2 / 2.0);
        assert_eq!(lags.to_vec(), vec![-1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5]);

        let peak = cc
            .row(0)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(lags[peak], 1.0);

        // silent ring: constant signals stay finite
        assert!(cc.row(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_grid_mismatch() {
        let grid = SpatialGrid::new(4.0, 1.0).unwrap();
        let small = SparseMatrix::<CellSpikeCount>::zeros(4, 10);
        let full = SparseMatrix::<CellSpikeCount>::zeros(16, 10);
        let err = reference_cc_funcs(&grid, &full, &small, &config(2));
        assert!(matches!(err, Err(AnalysisError::DataConsistency(_))));
    }
}
