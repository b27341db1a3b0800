//! Spike train binning.
//!
//! Sparse matrix layout of the binned datasets:
//! - value: spike count in the bin
//! - row:   node id (neuron matrices) or flat cell index (cell matrices)
//! - col:   time index; multiply by the bin width for the time in ms

use meso_core::{
    AnalysisError, PositionRecord, Result, SparseMatrix, SpatialGrid, SpikeRecord, Time,
    TripletBuilder,
};

/// Count type of neuron×time matrices
pub type SpikeCount = u16;

/// Count type of cell×time matrices
pub type CellSpikeCount = u32;

/// Time bin of `t` for bins `[k·dt, (k+1)·dt)`.
///
/// Edges are evaluated as `k as f64 * dt` so that on-grid spike times are
/// assigned consistently with the edges themselves.
pub fn time_bin_index(t: Time, dt: Time) -> Option<usize> {
    if !(t >= 0.0) {
        return None;
    }
    let mut k = (t / dt).floor();
    if (k + 1.0) * dt <= t {
        k += 1.0;
    } else if k * dt > t {
        k -= 1.0;
    }
    Some(k as usize)
}

/// Neuron×time spike counts with `n_bins` columns of width `dt`.
///
/// Spikes before time zero or after the last bin are discarded. An empty
/// spike record gives an empty matrix of the full shape.
pub fn time_binned_sptrains(
    n_neurons: usize,
    spikes: &SpikeRecord,
    n_bins: usize,
    dt: Time,
) -> Result<SparseMatrix<SpikeCount>> {
    if spikes.is_empty() {
        return Ok(SparseMatrix::zeros(n_neurons, n_bins));
    }

    let mut builder = TripletBuilder::with_capacity(n_neurons, n_bins, spikes.len());
    let mut discarded = 0usize;
    for ev in &spikes.events {
        match time_bin_index(ev.time_ms, dt).filter(|&k| k < n_bins) {
            Some(col) => builder.push(ev.node_id, col, 1)?,
            None => discarded += 1,
        }
    }
    if discarded > 0 {
        tracing::warn!(
            discarded,
            n_bins,
            dt,
            "spikes outside the analysed time window were discarded"
        );
    }

    builder.build()
}

/// Cell×time spike counts: every neuron row is added to the row of the cell
/// containing the neuron.
///
/// Fails if a spiking neuron has no position or lies outside the grid, and
/// if the total spike count is not conserved.
pub fn space_binned_sptrains(
    grid: &SpatialGrid,
    positions: &PositionRecord,
    sptrains: &SparseMatrix<SpikeCount>,
) -> Result<SparseMatrix<CellSpikeCount>> {
    sptrains.check_canonical()?;

    let (n_neurons, n_bins) = sptrains.shape();
    let mut builder = TripletBuilder::with_capacity(grid.n_cells(), n_bins, sptrains.nnz());
    for neuron in 0..n_neurons {
        if sptrains.row_cols(neuron).is_empty() {
            continue;
        }
        let (x, y) = positions.get(neuron).ok_or_else(|| {
            AnalysisError::DataConsistency(format!("neuron {neuron} has no position"))
        })?;
        let cell = grid.cell_of(x, y).ok_or_else(|| {
            AnalysisError::DataConsistency(format!(
                "neuron outside configured grid: neuron {neuron} at ({x}, {y}) mm"
            ))
        })?;
        for (col, count) in sptrains.row_entries(neuron) {
            builder.push(cell, col, CellSpikeCount::from(count))?;
        }
    }
    let binned = builder.build()?;

    if binned.sum() != sptrains.sum() {
        return Err(AnalysisError::DataConsistency(format!(
            "spike count not conserved by spatial binning: {} before, {} after",
            sptrains.sum(),
            binned.sum()
        )));
    }
    Ok(binned)
}
