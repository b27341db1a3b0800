//! # Meso Core
//!
//! Shared types and utilities for the spatio-temporal spike analysis of
//! large layered network simulations.
//!
//! ## Derived Datasets
//!
//! | Dataset | Rows | Columns | Values |
//! |---------|------|---------|--------|
//! | `sptrains` | neuron id | simulation time step | spike count |
//! | `sptrains_bintime` | neuron id | analysis time bin | spike count |
//! | `sptrains_bintime_binspace` | spatial cell | analysis time bin | spike count |
//! | `neuron_count_binspace` | grid row (y) | grid column (x) | neurons |
//! | `inst_rates_bintime_binspace` | spatial cell | analysis time bin | spikes/s per neuron |
//!
//! ## Design Philosophy
//!
//! 1. Sparse storage is canonical: sorted, duplicate-free, no explicit zeros
//! 2. One digitization rule for every spatial lookup
//! 3. Empty populations produce empty, correctly shaped data, never errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod grid;
pub mod params;
pub mod sparse;

pub use grid::SpatialGrid;
pub use params::{
    AnalysisParams, AsciiFormat, PreprocessDatatype, SampleSize, SortingAxis, StatisticDatatype,
};
pub use sparse::{SparseMatrix, TripletBuilder};

/// Common errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data consistency error: {0}")]
    DataConsistency(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Time point (ms)
pub type Time = f64;

/// Length (mm)
pub type Millimeter = f64;

/// Population-local neuron identifier, contiguous in `[0, N)`
pub type NodeId = usize;

/// Flattened spatial cell index `iy * G + ix`
pub type CellId = usize;

/// A named population of the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    pub name: String,
    pub size: usize,
}

impl Population {
    pub fn new(name: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            size,
        }
    }
}

/// Column a plain record is sorted by before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortKey {
    #[serde(rename = "nodeid")]
    NodeId,
    #[serde(rename = "time_ms")]
    Time,
}

/// Single spike event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub node_id: NodeId,
    pub time_ms: Time,
}

/// Recorded spike events of one population
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpikeRecord {
    pub events: Vec<SpikeEvent>,
}

impl SpikeRecord {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn from_events(events: Vec<SpikeEvent>) -> Self {
        Self { events }
    }

    pub fn record(&mut self, node_id: NodeId, time_ms: Time) {
        self.events.push(SpikeEvent { node_id, time_ms });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Stable sort by the given key; ties are broken by the other column.
    pub fn sort_by_key(&mut self, key: SortKey) {
        match key {
            SortKey::Time => self.events.sort_by(|a, b| {
                a.time_ms
                    .total_cmp(&b.time_ms)
                    .then(a.node_id.cmp(&b.node_id))
            }),
            SortKey::NodeId => self.events.sort_by(|a, b| {
                a.node_id
                    .cmp(&b.node_id)
                    .then(a.time_ms.total_cmp(&b.time_ms))
            }),
        }
    }

    /// Number of spikes per neuron for a population of size `n`
    pub fn counts_per_neuron(&self, n: usize) -> Vec<usize> {
        let mut counts = vec![0; n];
        for ev in &self.events {
            if ev.node_id < n {
                counts[ev.node_id] += 1;
            }
        }
        counts
    }
}

/// Planar neuron positions indexed by local node id.
///
/// Construction guarantees one entry per id in `[0, N)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub x: Vec<Millimeter>,
    pub y: Vec<Millimeter>,
}

impl PositionRecord {
    /// Build from `(node_id, x, y)` rows in any order.
    pub fn from_rows(mut rows: Vec<(NodeId, Millimeter, Millimeter)>) -> Result<Self> {
        rows.sort_by_key(|r| r.0);
        for (expected, row) in rows.iter().enumerate() {
            if row.0 != expected {
                return Err(AnalysisError::DataConsistency(format!(
                    "position ids must cover [0, {}) exactly once, found id {} at rank {}",
                    rows.len(),
                    row.0,
                    expected
                )));
            }
        }
        Ok(Self {
            x: rows.iter().map(|r| r.1).collect(),
            y: rows.iter().map(|r| r.2).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<(Millimeter, Millimeter)> {
        Some((*self.x.get(id)?, *self.y.get(id)?))
    }

    /// Rows in id order
    pub fn rows(&self) -> impl Iterator<Item = (NodeId, Millimeter, Millimeter)> + '_ {
        self.x
            .iter()
            .zip(self.y.iter())
            .enumerate()
            .map(|(id, (&x, &y))| (id, x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spike_record_sorting() {
        let mut rec = SpikeRecord::new();
        rec.record(2, 5.0);
        rec.record(0, 7.5);
        rec.record(1, 5.0);

        rec.sort_by_key(SortKey::Time);
        let ids: Vec<_> = rec.events.iter().map(|e| e.node_id).collect();
        assert_eq!(ids, vec![1, 2, 0]);

        rec.sort_by_key(SortKey::NodeId);
        let ids: Vec<_> = rec.events.iter().map(|e| e.node_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_counts_per_neuron() {
        let mut rec = SpikeRecord::new();
        rec.record(1, 1.0);
        rec.record(1, 2.0);
        rec.record(3, 2.0);
        assert_eq!(rec.counts_per_neuron(4), vec![0, 2, 0, 1]);
    }

    #[test]
    fn test_position_record_requires_contiguous_ids() {
        let pos = PositionRecord::from_rows(vec![(1, 0.5, 0.5), (0, -0.5, 0.1)]).unwrap();
        assert_eq!(pos.len(), 2);
        assert_eq!(pos.get(0), Some((-0.5, 0.1)));

        let err = PositionRecord::from_rows(vec![(0, 0.0, 0.0), (2, 0.0, 0.0)]);
        assert!(matches!(err, Err(AnalysisError::DataConsistency(_))));

        let dup = PositionRecord::from_rows(vec![(0, 0.0, 0.0), (0, 1.0, 0.0)]);
        assert!(dup.is_err());
    }
}
