//! Central disc extraction.

use meso_core::{NodeId, PositionRecord, SpikeRecord};

/// Keeps the neurons with `x² + y² ≤ area / π`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscExtractor {
    pub area: f64,
}

/// Result of restricting one population to the disc
#[derive(Debug, Clone)]
pub struct DiscExtraction {
    pub spikes: SpikeRecord,
    pub positions: PositionRecord,
    /// Original local id → id inside the disc
    pub lookup: Vec<Option<NodeId>>,
}

impl DiscExtraction {
    pub fn num_neurons(&self) -> usize {
        self.positions.len()
    }
}

impl DiscExtractor {
    pub fn new(area: f64) -> Self {
        Self { area }
    }

    pub fn radius(&self) -> f64 {
        self.radius_sq().sqrt()
    }

    fn radius_sq(&self) -> f64 {
        self.area / std::f64::consts::PI
    }

    /// Kept neurons get contiguous ids in order of their original id; spikes
    /// of dropped neurons are removed, spike order is preserved.
    pub fn extract(&self, spikes: &SpikeRecord, positions: &PositionRecord) -> DiscExtraction {
        let r_sq = self.radius_sq();
        let mut lookup = vec![None; positions.len()];
        let mut kept = PositionRecord::default();
        for (id, x, y) in positions.rows() {
            if x * x + y * y <= r_sq {
                lookup[id] = Some(kept.len());
                kept.x.push(x);
                kept.y.push(y);
            }
        }

        let mut kept_spikes = SpikeRecord::new();
        for ev in &spikes.events {
            if let Some(Some(new_id)) = lookup.get(ev.node_id) {
                kept_spikes.record(*new_id, ev.time_ms);
            }
        }

        DiscExtraction {
            spikes: kept_spikes,
            positions: kept,
            lookup,
        }
    }
}
