//! The analysis phases on a fixed worker pool.
//!
//! Phase order: raw conversion, optional disc extraction, preprocessing,
//! statistics, merging. Each phase partitions its work by population (or by
//! datatype for merging) and returns only after every task has finished.
//! The first failing task fails the phase.

use crate::artifact::Dataset;
use crate::merge::ArtifactMerger;
use crate::store::ProcessedStore;
use crate::text;
use meso_core::{AnalysisError, AnalysisParams, Population, Result, StatisticDatatype};
use meso_preprocess::{
    check_neuron_counts, DiscExtractor, IdentifierRemapper, PreprocessContext, RawIdTable,
};
use meso_stats::StatisticsEngine;
use rayon::prelude::*;
use std::path::PathBuf;

/// Records of one population after id conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSummary {
    pub population: String,
    pub num_neurons: usize,
    pub num_spikes: usize,
}

/// One row of the first-glance table
#[derive(Debug, Clone, PartialEq)]
pub struct FirstGlanceRow {
    pub population: String,
    pub num_neurons: usize,
    /// Mean rate over warm-up and simulation (spikes/s)
    pub rate: f64,
}

/// Mean rate per population over the full recorded duration.
pub fn first_glance(
    params: &AnalysisParams,
    conversions: &[ConversionSummary],
) -> Vec<FirstGlanceRow> {
    let duration_s = (params.t_sim + params.t_presim) / 1000.0;
    conversions
        .iter()
        .map(|c| FirstGlanceRow {
            population: c.population.clone(),
            num_neurons: c.num_neurons,
            rate: if c.num_neurons == 0 {
                0.0
            } else {
                c.num_spikes as f64 / c.num_neurons as f64 / duration_s
            },
        })
        .collect()
}

/// Outcome of the preprocessing phases
#[derive(Debug, Clone)]
pub struct PreprocessReport {
    pub conversions: Vec<ConversionSummary>,
    /// Population sizes entering the analysis
    pub analysed: Vec<Population>,
    pub first_glance: Vec<FirstGlanceRow>,
}

pub struct Workflow {
    params: AnalysisParams,
    store: ProcessedStore,
    pool: rayon::ThreadPool,
}

impl Workflow {
    pub fn new(params: AnalysisParams) -> Result<Self> {
        params.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.workers)
            .build()
            .map_err(|e| AnalysisError::Configuration(format!("worker pool: {e}")))?;
        let store = ProcessedStore::create(&params.processed_data_dir)?;
        tracing::debug!(workers = pool.current_num_threads(), "worker pool ready");
        Ok(Self {
            params,
            store,
            pool,
        })
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    pub fn store(&self) -> &ProcessedStore {
        &self.store
    }

    /// Convert raw ids and times of every population and write the plain
    /// per-population records.
    pub fn convert_raw(&self) -> Result<Vec<ConversionSummary>> {
        tracing::info!("converting raw node ids");
        let nodeids_path = self.params.nodeids_path();
        let table = RawIdTable::parse(&std::fs::read_to_string(&nodeids_path)?)?;
        let populations = self.params.populations();
        if table.len() != populations.len() {
            return Err(AnalysisError::DataConsistency(format!(
                "{} lists {} populations, {} configured",
                nodeids_path.display(),
                table.len(),
                populations.len()
            )));
        }

        let table = &table;
        let summaries = self.pool.install(|| {
            populations
                .par_iter()
                .enumerate()
                .map(|(i, pop)| self.convert_population(i, pop, table))
                .collect::<Result<Vec<_>>>()
        })?;

        let counts: Vec<usize> = summaries.iter().map(|s| s.num_neurons).collect();
        check_neuron_counts(&populations, &counts)?;
        Ok(summaries)
    }

    fn convert_population(
        &self,
        index: usize,
        pop: &Population,
        table: &RawIdTable,
    ) -> Result<ConversionSummary> {
        let raw_dir = &self.params.raw_data_dir;
        let formats = &self.params.write_ascii;
        let remapper = IdentifierRemapper::new(table.get(index)?, self.params.t_presim);

        let raw_spikes = text::read_raw_spikes(&raw_dir.join(text::spikes_file_name(&pop.name)))?;
        let spikes = remapper.remap_spikes(&raw_spikes, formats.spike_recorder.sortby)?;
        let raw_positions =
            text::read_raw_positions(&raw_dir.join(text::positions_file_name(&pop.name)))?;
        let positions = remapper.remap_positions(&raw_positions)?;

        let num_spikes = text::write_spikes(
            &self.store.spikes_path(&pop.name),
            &spikes,
            &formats.spike_recorder,
        )?;
        let num_neurons = text::write_positions(
            &self.store.positions_path(&pop.name),
            &positions,
            &formats.positions,
        )?;
        tracing::debug!(population = %pop.name, num_neurons, num_spikes, "converted");
        Ok(ConversionSummary {
            population: pop.name.clone(),
            num_neurons,
            num_spikes,
        })
    }

    /// Keep only the neurons inside the central disc and rewrite the plain
    /// records with contiguous ids. Returns the extracted population sizes.
    pub fn extract_disc(&self) -> Result<Vec<Population>> {
        let extractor = DiscExtractor::new(self.params.disc_area);
        tracing::info!(radius_mm = extractor.radius(), "extracting central disc");
        let formats = &self.params.write_ascii;
        let populations = self.params.populations();
        self.pool.install(|| {
            populations
                .par_iter()
                .map(|pop| {
                    let spikes = self.store.read_spikes(&pop.name)?;
                    let positions = self.store.read_positions(&pop.name)?;
                    let extracted = extractor.extract(&spikes, &positions);
                    text::write_spikes(
                        &self.store.spikes_path(&pop.name),
                        &extracted.spikes,
                        &formats.spike_recorder,
                    )?;
                    text::write_positions(
                        &self.store.positions_path(&pop.name),
                        &extracted.positions,
                        &formats.positions,
                    )?;
                    Ok(Population::new(&pop.name, extracted.num_neurons()))
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Run the configured preprocessing stages of every population.
    pub fn preprocess_populations(&self, analysed: &[Population]) -> Result<()> {
        tracing::info!("preprocessing");
        let grid = self.params.grid()?;
        let grid = &grid;
        self.pool.install(|| {
            analysed.par_iter().try_for_each(|pop| {
                let spikes = self.store.read_spikes(&pop.name)?;
                let positions = self.store.read_positions(&pop.name)?;
                let mut sink = self.store.sink(&pop.name);
                PreprocessContext::new(pop, grid, &self.params).run(
                    &spikes,
                    &positions,
                    &mut sink,
                )?;
                Ok(())
            })
        })
    }

    /// Conversion, optional disc extraction and preprocessing.
    pub fn preprocess(&self) -> Result<PreprocessReport> {
        let conversions = self.convert_raw()?;
        let analysed = if self.params.extract_disc {
            self.extract_disc()?
        } else {
            self.params.populations()
        };
        self.store.write_populations(&analysed)?;
        let first_glance = first_glance(&self.params, &conversions);
        self.preprocess_populations(&analysed)?;
        Ok(PreprocessReport {
            conversions,
            analysed,
            first_glance,
        })
    }

    /// Compute and write the configured statistics of every population.
    pub fn compute_statistics(&self) -> Result<()> {
        tracing::info!("computing statistics");
        let analysed = self.store.read_populations()?;
        let smallest = analysed.iter().map(|p| p.size).min().unwrap_or(0);
        let engine = StatisticsEngine::new(&self.params, smallest)?;

        let reference = match &self.params.reference_population {
            Some(name)
                if self
                    .params
                    .datatypes_statistics
                    .contains(&StatisticDatatype::ReferenceCrossCorrelation) =>
            {
                Some(self.store.read_cell_sptrains(name)?)
            }
            _ => None,
        };
        let engine = &engine;
        let reference = reference.as_ref();

        self.pool.install(|| {
            analysed.par_iter().try_for_each(|pop| {
                let inputs = self.store.load_statistics_inputs(&pop.name, &self.params)?;
                let results = engine.compute(&pop.name, &inputs.as_inputs(), reference)?;
                for (statistic, result) in &results {
                    self.store.write_dataset(
                        statistic.name(),
                        &pop.name,
                        Dataset::from_statistic(result),
                    )?;
                }
                Ok(())
            })
        })
    }

    /// Merge every preprocessed and statistics datatype across populations.
    pub fn merge(&self) -> Result<Vec<PathBuf>> {
        tracing::info!("merging artifacts of all populations");
        let datatypes: Vec<&str> = self
            .params
            .datatypes_preprocess
            .iter()
            .map(|d| d.name())
            .chain(self.params.datatypes_statistics.iter().map(|s| s.name()))
            .collect();
        let merger = ArtifactMerger::new(&self.store);
        let populations = &self.params.populations;
        self.pool.install(|| {
            datatypes
                .par_iter()
                .map(|datatype| merger.merge(datatype, populations))
                .collect::<Result<Vec<_>>>()
        })
    }

    /// All phases in order.
    pub fn run(&self) -> Result<PreprocessReport> {
        let report = self.preprocess()?;
        self.compute_statistics()?;
        self.merge()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_glance_rates() {
        let params = AnalysisParams {
            t_presim: 500.0,
            t_sim: 1500.0,
            ..Default::default()
        };
        let rows = first_glance(
            &params,
            &[
                ConversionSummary {
                    population: "E".into(),
                    num_neurons: 10,
                    num_spikes: 100,
                },
                ConversionSummary {
                    population: "I".into(),
                    num_neurons: 0,
                    num_spikes: 0,
                },
            ],
        );
        assert_relative_eq!(rows[0].rate, 5.0);
        assert_eq!(rows[1].rate, 0.0);
    }
}
