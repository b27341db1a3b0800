//! Per-cell neuron counts and rate normalization.

use crate::binning::CellSpikeCount;
use meso_core::{AnalysisError, PositionRecord, Result, SparseMatrix, SpatialGrid, Time};
use ndarray::Array2;

/// 2D histogram of neurons per cell, indexed `[iy, ix]`.
///
/// Uses [`SpatialGrid::cell_of`], the same lookup as the spike projection, so
/// flattening the histogram row-major gives counts aligned with the rows of
/// the cell×time matrices.
pub fn neuron_count_per_cell(
    grid: &SpatialGrid,
    positions: &PositionRecord,
) -> Result<Array2<u32>> {
    let g = grid.side();
    let mut hist = Array2::<u32>::zeros((g, g));
    for (id, x, y) in positions.rows() {
        let cell = grid.cell_of(x, y).ok_or_else(|| {
            AnalysisError::DataConsistency(format!(
                "neuron outside configured grid: neuron {id} at ({x}, {y}) mm"
            ))
        })?;
        let (ix, iy) = grid.cell_coords(cell);
        hist[[iy, ix]] += 1;
    }
    Ok(hist)
}

/// Cell×time spike counts → spikes/s per neuron.
///
/// Counts are divided by the bin width in seconds and by the number of
/// neurons of the cell. Cells without neurons stay zero.
pub fn instantaneous_rates(
    cell_sptrains: &SparseMatrix<CellSpikeCount>,
    binsize_time: Time,
    neuron_count: &Array2<u32>,
) -> Result<SparseMatrix<f64>> {
    if neuron_count.len() != cell_sptrains.rows() {
        return Err(AnalysisError::DataConsistency(format!(
            "neuron count histogram has {} cells, spike matrix has {} rows",
            neuron_count.len(),
            cell_sptrains.rows()
        )));
    }
    let per_cell: Vec<u32> = neuron_count.iter().copied().collect();
    let bin_s = binsize_time * 1e-3;

    Ok(cell_sptrains.map_values(|cell, count| match per_cell[cell] {
        0 => 0.0,
        n => f64::from(count) / bin_s / f64::from(n),
    }))
}
