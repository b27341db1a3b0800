//! Per-neuron firing rates.

use meso_core::{SparseMatrix, Time};
use meso_preprocess::SpikeCount;
use ndarray::Array1;

/// Spike count of every row divided by `duration` (ms), in spikes/s.
pub fn firing_rates(sptrains: &SparseMatrix<SpikeCount>, duration: Time) -> Array1<f64> {
    sptrains.row_sums() * 1e3 / duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use meso_core::TripletBuilder;

    #[test]
    fn test_rates() {
        let mut b = TripletBuilder::new(3, 10);
        b.push(0, 1, 1).unwrap();
        b.push(0, 5, 2).unwrap();
        b.push(2, 9, 1).unwrap();
        let rates = firing_rates(&b.build().unwrap(), 500.0);
        assert_relative_eq!(rates[0], 6.0);
        assert_relative_eq!(rates[1], 0.0);
        assert_relative_eq!(rates[2], 2.0);
    }
}
