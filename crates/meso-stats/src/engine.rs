//! Runs the configured statistics of one population.

use crate::ccfuncs::{reference_cc_funcs, CcFuncConfig};
use crate::correlation::{ccs_distances, CorrelationConfig};
use crate::lv::local_variations;
use crate::psd::population_psd;
use crate::rates::firing_rates;
use crate::StatisticResult;
use meso_core::{
    AnalysisError, AnalysisParams, PositionRecord, Result, SparseMatrix, SpatialGrid,
    StatisticDatatype,
};
use meso_preprocess::{CellSpikeCount, SpikeCount};

/// Preprocessed datasets of one population as persisted, transient included
#[derive(Debug, Clone, Copy)]
pub struct StatisticsInputs<'a> {
    pub sptrains: &'a SparseMatrix<SpikeCount>,
    pub sptrains_bintime: Option<&'a SparseMatrix<SpikeCount>>,
    pub sptrains_bintime_binspace: Option<&'a SparseMatrix<CellSpikeCount>>,
    pub positions: Option<&'a PositionRecord>,
}

fn missing(statistic: StatisticDatatype, dataset: &str) -> AnalysisError {
    AnalysisError::DataConsistency(format!("statistic '{statistic}' needs dataset '{dataset}'"))
}

/// Statistics of every population share one engine.
#[derive(Debug, Clone)]
pub struct StatisticsEngine<'a> {
    params: &'a AnalysisParams,
    grid: SpatialGrid,
    ccs_num_neurons: usize,
}

impl<'a> StatisticsEngine<'a> {
    /// `smallest_population` is the smallest analysed population size; it
    /// bounds the number of neurons sampled for correlations.
    pub fn new(params: &'a AnalysisParams, smallest_population: usize) -> Result<Self> {
        let ccs_num_neurons = params.ccs_num_neurons.resolve(smallest_population);
        tracing::info!(
            neurons = ccs_num_neurons,
            "sampling neurons per population for pairwise correlations"
        );
        Ok(Self {
            params,
            grid: params.grid()?,
            ccs_num_neurons,
        })
    }

    pub fn ccs_num_neurons(&self) -> usize {
        self.ccs_num_neurons
    }

    /// All configured statistics in order.
    ///
    /// `reference` holds the cell×time matrix of the reference population,
    /// transient included; it is only read for the reference
    /// cross-correlation of other populations.
    pub fn compute(
        &self,
        population: &str,
        inputs: &StatisticsInputs<'_>,
        reference: Option<&SparseMatrix<CellSpikeCount>>,
    ) -> Result<Vec<(StatisticDatatype, StatisticResult)>> {
        let p = self.params;
        let fine_start = p.min_time_index(p.sim_resolution);
        let coarse_start = p.min_time_index(p.binsize_time);

        let sptrains = inputs.sptrains.slice_cols_from(fine_start);
        if sptrains.nnz() == 0 {
            tracing::debug!(population, "no spikes after the transient, all statistics empty");
            return Ok(p
                .datatypes_statistics
                .iter()
                .map(|&s| (s, StatisticResult::Empty))
                .collect());
        }

        let mut results = Vec::with_capacity(p.datatypes_statistics.len());
        for &statistic in &p.datatypes_statistics {
            tracing::debug!(population, %statistic, "computing");
            let result = match statistic {
                StatisticDatatype::FiringRates => {
                    StatisticResult::Rates(firing_rates(&sptrains, p.time_statistics()))
                }
                StatisticDatatype::LocalVariations => {
                    StatisticResult::LocalVariations(local_variations(&sptrains))
                }
                StatisticDatatype::CorrelationDistances => {
                    let positions = inputs
                        .positions
                        .ok_or_else(|| missing(statistic, "positions"))?;
                    let config = CorrelationConfig {
                        num_neurons: self.ccs_num_neurons,
                        window_bins: (p.ccs_time_interval / p.sim_resolution).round() as usize,
                        extent: p.extent,
                        periodic: p.periodic_boundaries,
                    };
                    let (ccs, distances_mm) = ccs_distances(&sptrains, positions, &config)?;
                    StatisticResult::CorrelationDistances { ccs, distances_mm }
                }
                StatisticDatatype::PowerSpectra => {
                    let coarse = inputs
                        .sptrains_bintime
                        .ok_or_else(|| missing(statistic, "sptrains_bintime"))?
                        .slice_cols_from(coarse_start);
                    let (frequencies, psds) =
                        population_psd(&coarse, p.binsize_time, p.psd_nfft)?;
                    StatisticResult::PowerSpectrum { frequencies, psds }
                }
                StatisticDatatype::ReferenceCrossCorrelation => {
                    self.reference_cc(population, inputs, reference, coarse_start)?
                }
            };
            results.push((statistic, result));
        }
        Ok(results)
    }

    fn reference_cc(
        &self,
        population: &str,
        inputs: &StatisticsInputs<'_>,
        reference: Option<&SparseMatrix<CellSpikeCount>>,
        coarse_start: usize,
    ) -> Result<StatisticResult> {
        let p = self.params;
        let statistic = StatisticDatatype::ReferenceCrossCorrelation;
        match p.reference_population.as_deref() {
            Some(name) if name != population => {
                let reference = reference.ok_or_else(|| {
                    missing(statistic, &format!("sptrains_bintime_binspace of {name}"))
                })?;
                let cells = inputs
                    .sptrains_bintime_binspace
                    .ok_or_else(|| missing(statistic, "sptrains_bintime_binspace"))?;
                let config = CcFuncConfig {
                    n_rings: p.cc_funcs_nbins_diag,
                    max_lag_bins: (p.cc_funcs_tau / p.binsize_time).round() as usize,
                    binsize_time: p.binsize_time,
                    binsize_space: p.binsize_space,
                };
                let (cc_funcs, distances_mm, lags_ms) = reference_cc_funcs(
                    &self.grid,
                    &cells.slice_cols_from(coarse_start),
                    &reference.slice_cols_from(coarse_start),
                    &config,
                )?;
                Ok(StatisticResult::CcFuncs {
                    cc_funcs,
                    distances_mm,
                    lags_ms,
                })
            }
            _ => Ok(StatisticResult::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use meso_core::SpikeRecord;
    use meso_preprocess::{space_binned_sptrains, time_binned_sptrains};

    fn params() -> AnalysisParams {
        AnalysisParams {
            populations: vec!["E".into(), "TC".into()],
            num_neurons: vec![10, 4],
            extent: 2.0,
            binsize_space: 1.0,
            sim_resolution: 0.5,
            binsize_time: 1.0,
            t_sim: 100.0,
            t_transient: 20.0,
            ccs_time_interval: 2.0,
            psd_nfft: 16,
            cc_funcs_tau: 3.0,
            datatypes_statistics: StatisticDatatype::ALL.to_vec(),
            reference_population: Some("TC".into()),
            ..Default::default()
        }
    }

    /// Neurons cycling through the four quadrants of a 2x2 grid
    fn positions(n: usize) -> PositionRecord {
        let coord = |low: bool| if low { -0.5 } else { 0.5 };
        PositionRecord::from_rows(
            (0..n)
                .map(|i| (i, coord(i % 2 == 0), coord(i % 4 < 2)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_population() {
        let params = params();
        let engine = StatisticsEngine::new(&params, 4).unwrap();
        let fine = SparseMatrix::zeros(10, 200);
        let pos = positions(10);
        let inputs = StatisticsInputs {
            sptrains: &fine,
            sptrains_bintime: None,
            sptrains_bintime_binspace: None,
            positions: Some(&pos),
        };
        let results = engine.compute("E", &inputs, None).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|(_, r)| r.is_empty()));
    }

    #[test]
    fn test_spikes_only_in_transient_count_as_empty() {
        let params = params();
        let engine = StatisticsEngine::new(&params, 4).unwrap();
        let mut spikes = SpikeRecord::new();
        spikes.record(0, 5.0);
        let fine = time_binned_sptrains(10, &spikes, 200, 0.5).unwrap();
        let inputs = StatisticsInputs {
            sptrains: &fine,
            sptrains_bintime: None,
            sptrains_bintime_binspace: None,
            positions: None,
        };
        let results = engine.compute("E", &inputs, None).unwrap();
        assert!(results.iter().all(|(_, r)| r.is_empty()));
    }

    #[test]
    fn test_all_statistics() {
        let params = params();
        let grid = params.grid().unwrap();
        let engine = StatisticsEngine::new(&params, 4).unwrap();
        assert_eq!(engine.ccs_num_neurons(), 4);

        let pos = positions(10);
        let mut spikes = SpikeRecord::new();
        for id in 0..10 {
            for k in 0..20 {
                spikes.record(id, 1.0 + 5.0 * k as f64 + 0.5 * (id % 3) as f64);
            }
        }
        let fine = time_binned_sptrains(10, &spikes, 200, 0.5).unwrap();
        let coarse = time_binned_sptrains(10, &spikes, 100, 1.0).unwrap();
        let cells = space_binned_sptrains(&grid, &pos, &coarse).unwrap();

        let tc_pos = positions(4);
        let mut tc_spikes = SpikeRecord::new();
        for k in 0..10 {
            tc_spikes.record(k % 4, 10.0 * k as f64);
        }
        let tc_coarse = time_binned_sptrains(4, &tc_spikes, 100, 1.0).unwrap();
        let tc_cells = space_binned_sptrains(&grid, &tc_pos, &tc_coarse).unwrap();

        let inputs = StatisticsInputs {
            sptrains: &fine,
            sptrains_bintime: Some(&coarse),
            sptrains_bintime_binspace: Some(&cells),
            positions: Some(&pos),
        };
        let results = engine.compute("E", &inputs, Some(&tc_cells)).unwrap();
        let order: Vec<_> = results.iter().map(|(s, _)| *s).collect();
        assert_eq!(order, StatisticDatatype::ALL.to_vec());

        match &results[0].1 {
            // 16 of 20 spikes after the transient, over 80 ms
            StatisticResult::Rates(r) => assert_relative_eq!(r[0], 200.0, max_relative = 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        match &results[1].1 {
            StatisticResult::LocalVariations(lv) => assert_relative_eq!(lv[3], 0.0),
            other => panic!("unexpected {other:?}"),
        }
        match &results[2].1 {
            StatisticResult::CorrelationDistances { ccs, distances_mm } => {
                assert_eq!(ccs.len(), 6);
                assert_eq!(distances_mm.len(), 6);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &results[3].1 {
            StatisticResult::PowerSpectrum { frequencies, psds } => {
                assert_eq!(frequencies.len(), 9);
                assert_eq!(psds.len(), 9);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &results[4].1 {
            StatisticResult::CcFuncs { cc_funcs, .. } => assert_eq!(cc_funcs.shape(), &[1, 7]),
            other => panic!("unexpected {other:?}"),
        }

        // the reference population itself gets no cross-correlation
        let own = engine.compute("TC", &inputs, Some(&tc_cells)).unwrap();
        assert!(own[4].1.is_empty());
    }

    #[test]
    fn test_periodic_boundaries_shorten_edge_pairs() {
        let pos = PositionRecord::from_rows(vec![(0, -0.9, 0.0), (1, 0.9, 0.0)]).unwrap();
        let mut spikes = SpikeRecord::new();
        for t in [30.0, 40.5, 51.0, 77.0] {
            spikes.record(0, t);
            spikes.record(1, t);
        }
        let fine = time_binned_sptrains(2, &spikes, 200, 0.5).unwrap();
        let inputs = StatisticsInputs {
            sptrains: &fine,
            sptrains_bintime: None,
            sptrains_bintime_binspace: None,
            positions: Some(&pos),
        };

        let distance = |periodic: bool| {
            let params = AnalysisParams {
                periodic_boundaries: periodic,
                datatypes_statistics: vec![StatisticDatatype::CorrelationDistances],
                reference_population: None,
                ..params()
            };
            let engine = StatisticsEngine::new(&params, 2).unwrap();
            match engine.compute("E", &inputs, None).unwrap().remove(0).1 {
                StatisticResult::CorrelationDistances { ccs, distances_mm } => {
                    assert_eq!(ccs.len(), 1);
                    distances_mm[0]
                }
                other => panic!("unexpected result {other:?}"),
            }
        };

        assert_relative_eq!(distance(false), 1.8, epsilon = 1e-12);
        assert_relative_eq!(distance(true), 0.2, epsilon = 1e-12);
    }
}
