//! # Meso Stats
//!
//! Summary statistics of one population, computed from the preprocessed
//! spike matrices after the startup transient has been removed.
//!
//! | Statistic | Input | Result |
//! |-----------|-------|--------|
//! | `FRs` | fine spike matrix | rate per neuron (spikes/s) |
//! | `LVs` | fine spike matrix | local variation per neuron, NaN if < 2 ISIs |
//! | `CCs_distances` | fine spike matrix, positions | Pearson coefficient per neuron pair and pair distance |
//! | `PSDs` | coarse spike matrix | Welch power spectrum of the population signal |
//! | `CCfuncs_reference` | cell×time matrices | cross-correlation with a reference population per diagonal ring |
//!
//! A population without any spike yields [`StatisticResult::Empty`] for every
//! statistic.

use ndarray::{Array1, Array2};

pub mod ccfuncs;
pub mod correlation;
pub mod engine;
pub mod lv;
pub mod psd;
pub mod rates;

pub use ccfuncs::{reference_cc_funcs, CcFuncConfig};
pub use correlation::{ccs_distances, pairwise_distances, CorrelationConfig};
pub use engine::{StatisticsEngine, StatisticsInputs};
pub use lv::{local_variation, local_variations};
pub use psd::{population_psd, welch_psd};
pub use rates::firing_rates;

/// Result of one statistic for one population
#[derive(Debug, Clone, PartialEq)]
pub enum StatisticResult {
    /// Spikes/s per neuron
    Rates(Array1<f64>),
    /// Local variation per neuron; NaN marks neurons with fewer than two ISIs
    LocalVariations(Array1<f64>),
    /// Pairwise correlation coefficients and the distances of the pairs
    CorrelationDistances {
        ccs: Array1<f64>,
        distances_mm: Array1<f64>,
    },
    /// Frequencies (1/s) and power spectral densities (s^-2/Hz)
    PowerSpectrum {
        frequencies: Array1<f64>,
        psds: Array1<f64>,
    },
    /// Ring × lag cross-correlation functions
    CcFuncs {
        cc_funcs: Array2<f64>,
        distances_mm: Array1<f64>,
        lags_ms: Array1<f64>,
    },
    /// Nothing to compute for this population
    Empty,
}

impl StatisticResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
