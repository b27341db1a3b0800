//! Ordered preprocessing stages of one population.
//!
//! Stages run in the configured order; each reads the typed outputs of
//! earlier stages from [`PopulationDatasets`] and hands its own output to a
//! [`DatasetSink`] right after it is computed.

use crate::binning::{space_binned_sptrains, time_binned_sptrains, CellSpikeCount, SpikeCount};
use crate::normalize::{instantaneous_rates, neuron_count_per_cell};
use crate::sorting::pos_sorting_array;
use meso_core::{
    AnalysisError, AnalysisParams, NodeId, Population, PositionRecord, PreprocessDatatype, Result,
    SparseMatrix, SpatialGrid, SpikeRecord,
};
use ndarray::Array2;

/// Borrowed view of one derived dataset
#[derive(Debug, Clone, Copy)]
pub enum DatasetRef<'a> {
    Positions(&'a PositionRecord),
    SpikeCounts(&'a SparseMatrix<SpikeCount>),
    CellSpikeCounts(&'a SparseMatrix<CellSpikeCount>),
    NeuronCount(&'a Array2<u32>),
    Rates(&'a SparseMatrix<f64>),
    SortingArray(&'a [NodeId]),
}

/// Receives every dataset as soon as its stage has finished.
pub trait DatasetSink {
    fn store(&mut self, datatype: PreprocessDatatype, dataset: DatasetRef<'_>) -> Result<()>;
}

/// Outputs of the stages that ran so far
#[derive(Debug, Clone, Default)]
pub struct PopulationDatasets {
    pub positions: Option<PositionRecord>,
    pub sptrains: Option<SparseMatrix<SpikeCount>>,
    pub sptrains_bintime: Option<SparseMatrix<SpikeCount>>,
    pub sptrains_bintime_binspace: Option<SparseMatrix<CellSpikeCount>>,
    pub neuron_count_binspace: Option<Array2<u32>>,
    pub inst_rates_bintime_binspace: Option<SparseMatrix<f64>>,
    pub pos_sorting_arrays: Option<Vec<NodeId>>,
}

impl PopulationDatasets {
    pub fn get(&self, datatype: PreprocessDatatype) -> Option<DatasetRef<'_>> {
        use PreprocessDatatype as P;
        match datatype {
            P::Positions => self.positions.as_ref().map(DatasetRef::Positions),
            P::SpikeTrains => self.sptrains.as_ref().map(DatasetRef::SpikeCounts),
            P::SpikeTrainsBinTime => self.sptrains_bintime.as_ref().map(DatasetRef::SpikeCounts),
            P::SpikeTrainsBinTimeBinSpace => self
                .sptrains_bintime_binspace
                .as_ref()
                .map(DatasetRef::CellSpikeCounts),
            P::NeuronCountBinSpace => self
                .neuron_count_binspace
                .as_ref()
                .map(DatasetRef::NeuronCount),
            P::InstRatesBinTimeBinSpace => self
                .inst_rates_bintime_binspace
                .as_ref()
                .map(DatasetRef::Rates),
            P::PosSortingArrays => self
                .pos_sorting_arrays
                .as_deref()
                .map(DatasetRef::SortingArray),
        }
    }
}

fn require<'b, T>(
    slot: &'b Option<T>,
    stage: PreprocessDatatype,
    input: PreprocessDatatype,
) -> Result<&'b T> {
    slot.as_ref().ok_or_else(|| {
        AnalysisError::Configuration(format!(
            "stage '{stage}' requires '{input}' computed earlier in the same task"
        ))
    })
}

/// Everything one population task needs
#[derive(Debug, Clone, Copy)]
pub struct PreprocessContext<'a> {
    /// Population with its analysed size
    pub population: &'a Population,
    pub grid: &'a SpatialGrid,
    pub params: &'a AnalysisParams,
}

impl<'a> PreprocessContext<'a> {
    pub fn new(
        population: &'a Population,
        grid: &'a SpatialGrid,
        params: &'a AnalysisParams,
    ) -> Self {
        Self {
            population,
            grid,
            params,
        }
    }

    /// Run the configured stages in order.
    pub fn run(
        &self,
        spikes: &SpikeRecord,
        positions: &PositionRecord,
        sink: &mut dyn DatasetSink,
    ) -> Result<PopulationDatasets> {
        if positions.len() != self.population.size {
            return Err(AnalysisError::DataConsistency(format!(
                "{}: {} positions for {} neurons",
                self.population.name,
                positions.len(),
                self.population.size
            )));
        }

        let mut datasets = PopulationDatasets::default();
        for &stage in &self.params.datatypes_preprocess {
            tracing::debug!(population = %self.population.name, %stage, "processing");
            self.compute(stage, spikes, positions, &mut datasets)?;
            let dataset = datasets.get(stage).ok_or_else(|| {
                AnalysisError::DataConsistency(format!("stage '{stage}' produced no output"))
            })?;
            sink.store(stage, dataset)?;
        }
        Ok(datasets)
    }

    fn compute(
        &self,
        stage: PreprocessDatatype,
        spikes: &SpikeRecord,
        positions: &PositionRecord,
        d: &mut PopulationDatasets,
    ) -> Result<()> {
        use PreprocessDatatype as P;
        let n = self.population.size;
        let params = self.params;

        match stage {
            P::Positions => {
                d.positions = Some(positions.clone());
            }
            P::SpikeTrains => {
                let dt = params.sim_resolution;
                d.sptrains = Some(time_binned_sptrains(n, spikes, params.n_time_bins(dt), dt)?);
            }
            P::SpikeTrainsBinTime => {
                let dt = params.binsize_time;
                d.sptrains_bintime =
                    Some(time_binned_sptrains(n, spikes, params.n_time_bins(dt), dt)?);
            }
            P::SpikeTrainsBinTimeBinSpace => {
                let pos = require(&d.positions, stage, P::Positions)?;
                let sptrains = require(&d.sptrains_bintime, stage, P::SpikeTrainsBinTime)?;
                d.sptrains_bintime_binspace =
                    Some(space_binned_sptrains(self.grid, pos, sptrains)?);
            }
            P::NeuronCountBinSpace => {
                let pos = require(&d.positions, stage, P::Positions)?;
                d.neuron_count_binspace = Some(neuron_count_per_cell(self.grid, pos)?);
            }
            P::InstRatesBinTimeBinSpace => {
                let cells = require(
                    &d.sptrains_bintime_binspace,
                    stage,
                    P::SpikeTrainsBinTimeBinSpace,
                )?;
                let counts = require(&d.neuron_count_binspace, stage, P::NeuronCountBinSpace)?;
                d.inst_rates_bintime_binspace =
                    Some(instantaneous_rates(cells, params.binsize_time, counts)?);
            }
            P::PosSortingArrays => {
                let pos = require(&d.positions, stage, P::Positions)?;
                d.pos_sorting_arrays = Some(pos_sorting_array(pos, params.sorting_axis));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        stored: Vec<(PreprocessDatatype, usize)>,
    }

    impl DatasetSink for Recorder {
        fn store(&mut self, datatype: PreprocessDatatype, dataset: DatasetRef<'_>) -> Result<()> {
            let size = match dataset {
                DatasetRef::Positions(p) => p.len(),
                DatasetRef::SpikeCounts(m) => m.nnz(),
                DatasetRef::CellSpikeCounts(m) => m.nnz(),
                DatasetRef::NeuronCount(h) => h.len(),
                DatasetRef::Rates(m) => m.nnz(),
                DatasetRef::SortingArray(a) => a.len(),
            };
            self.stored.push((datatype, size));
            Ok(())
        }
    }

    fn params() -> AnalysisParams {
        AnalysisParams {
            populations: vec!["E".into()],
            num_neurons: vec![4],
            extent: 2.0,
            binsize_space: 1.0,
            sim_resolution: 0.5,
            binsize_time: 1.0,
            t_sim: 4.0,
            t_transient: 0.0,
            ..Default::default()
        }
    }

    fn quadrants() -> PositionRecord {
        PositionRecord::from_rows(vec![
            (0, -0.5, -0.5),
            (1, 0.5, -0.5),
            (2, -0.5, 0.5),
            (3, 0.5, 0.5),
        ])
        .unwrap()
    }

    #[test]
    fn test_all_stages_in_order() {
        let params = params();
        let grid = params.grid().unwrap();
        let pop = Population::new("E", 4);
        let mut spikes = SpikeRecord::new();
        for id in 0..4 {
            spikes.record(id, id as f64);
        }

        let mut sink = Recorder::default();
        let d = PreprocessContext::new(&pop, &grid, &params)
            .run(&spikes, &quadrants(), &mut sink)
            .unwrap();

        let order: Vec<_> = sink.stored.iter().map(|s| s.0).collect();
        assert_eq!(order, PreprocessDatatype::ALL.to_vec());
        assert_eq!(d.sptrains.as_ref().unwrap().shape(), (4, 8));
        assert_eq!(d.sptrains_bintime.as_ref().unwrap().shape(), (4, 4));
        assert_eq!(d.sptrains_bintime_binspace.as_ref().unwrap().nnz(), 4);
        assert_eq!(
            d.neuron_count_binspace.unwrap(),
            ndarray::arr2(&[[1u32, 1], [1, 1]])
        );
        assert_eq!(d.pos_sorting_arrays.unwrap(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_missing_input_stage_is_rejected() {
        let params = AnalysisParams {
            datatypes_preprocess: vec![PreprocessDatatype::NeuronCountBinSpace],
            ..params()
        };
        let grid = params.grid().unwrap();
        let pop = Population::new("E", 4);
        let err = PreprocessContext::new(&pop, &grid, &params).run(
            &SpikeRecord::new(),
            &quadrants(),
            &mut Recorder::default(),
        );
        assert!(matches!(err, Err(AnalysisError::Configuration(_))));
    }

    #[test]
    fn test_empty_population_yields_shaped_outputs() {
        let params = params();
        let grid = params.grid().unwrap();
        let pop = Population::new("E", 4);
        let d = PreprocessContext::new(&pop, &grid, &params)
            .run(&SpikeRecord::new(), &quadrants(), &mut Recorder::default())
            .unwrap();
        assert_eq!(d.sptrains.unwrap().shape(), (4, 8));
        let rates = d.inst_rates_bintime_binspace.unwrap();
        assert_eq!(rates.shape(), (4, 4));
        assert_eq!(rates.nnz(), 0);
    }
}
