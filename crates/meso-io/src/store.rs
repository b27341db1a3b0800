//! Processed data directory.
//!
//! Every population task writes to its own files (`<datatype>_<X>.json`,
//! `spike_recorder_<X>.dat`, `positions_<X>.dat`), so tasks never share a
//! file.

use crate::artifact::{artifact_file_name, merged_file_name, Artifact, Dataset};
use crate::text;
use meso_core::{
    AnalysisError, AnalysisParams, Population, PositionRecord, PreprocessDatatype, Result,
    SparseMatrix, SpikeRecord,
};
use meso_preprocess::{CellSpikeCount, DatasetRef, DatasetSink, SpikeCount};
use meso_stats::StatisticsInputs;
use std::path::{Path, PathBuf};

/// Analysed population sizes, written after conversion and disc extraction
pub const POPULATIONS_FILE: &str = "analysed_populations.json";

#[derive(Debug, Clone)]
pub struct ProcessedStore {
    dir: PathBuf,
}

impl ProcessedStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open and create the directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        std::fs::create_dir_all(&store.dir)?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, datatype: &str, population: &str) -> PathBuf {
        self.dir.join(artifact_file_name(datatype, population))
    }

    pub fn merged_path(&self, datatype: &str) -> PathBuf {
        self.dir.join(merged_file_name(datatype))
    }

    pub fn spikes_path(&self, population: &str) -> PathBuf {
        self.dir.join(text::spikes_file_name(population))
    }

    pub fn positions_path(&self, population: &str) -> PathBuf {
        self.dir.join(text::positions_file_name(population))
    }

    pub fn write_dataset(
        &self,
        datatype: &str,
        population: &str,
        dataset: Dataset,
    ) -> Result<PathBuf> {
        let path = self.artifact_path(datatype, population);
        Artifact::single(datatype, population, dataset).write(&path)?;
        Ok(path)
    }

    pub fn read_dataset(&self, datatype: &str, population: &str) -> Result<Dataset> {
        let path = self.artifact_path(datatype, population);
        let mut artifact = Artifact::read(&path)?;
        let index = artifact
            .entries
            .iter()
            .position(|e| e.population == population)
            .ok_or_else(|| {
                AnalysisError::DataConsistency(format!(
                    "{} has no entry for population {population}",
                    path.display()
                ))
            })?;
        Ok(artifact.entries.swap_remove(index).dataset)
    }

    pub fn read_spikes(&self, population: &str) -> Result<SpikeRecord> {
        text::read_spikes(&self.spikes_path(population))
    }

    pub fn read_positions(&self, population: &str) -> Result<PositionRecord> {
        text::read_positions(&self.positions_path(population))
    }

    pub fn write_populations(&self, populations: &[Population]) -> Result<()> {
        let json = serde_json::to_string_pretty(populations)
            .map_err(|e| AnalysisError::ParseError(e.to_string()))?;
        std::fs::write(self.dir.join(POPULATIONS_FILE), json)?;
        Ok(())
    }

    pub fn read_populations(&self) -> Result<Vec<Population>> {
        let path = self.dir.join(POPULATIONS_FILE);
        let json = std::fs::read_to_string(&path)?;
        serde_json::from_str(&json)
            .map_err(|e| AnalysisError::ParseError(format!("{}: {e}", path.display())))
    }

    pub fn sink<'a>(&'a self, population: &'a str) -> PopulationSink<'a> {
        PopulationSink {
            store: self,
            population,
        }
    }

    /// Reload the datasets the configured statistics read.
    pub fn load_statistics_inputs(
        &self,
        population: &str,
        params: &AnalysisParams,
    ) -> Result<LoadedInputs> {
        let needed = |dt: PreprocessDatatype| {
            params
                .datatypes_statistics
                .iter()
                .any(|s| s.requires().contains(&dt))
        };
        let sparse = |dt: PreprocessDatatype| self.read_dataset(dt.name(), population);

        Ok(LoadedInputs {
            sptrains: sparse(PreprocessDatatype::SpikeTrains)?.to_sparse()?,
            sptrains_bintime: if needed(PreprocessDatatype::SpikeTrainsBinTime) {
                Some(sparse(PreprocessDatatype::SpikeTrainsBinTime)?.to_sparse()?)
            } else {
                None
            },
            sptrains_bintime_binspace: if needed(PreprocessDatatype::SpikeTrainsBinTimeBinSpace) {
                Some(self.read_cell_sptrains(population)?)
            } else {
                None
            },
            positions: if needed(PreprocessDatatype::Positions) {
                Some(sparse(PreprocessDatatype::Positions)?.to_positions()?)
            } else {
                None
            },
        })
    }

    pub fn read_cell_sptrains(&self, population: &str) -> Result<SparseMatrix<CellSpikeCount>> {
        self.read_dataset(PreprocessDatatype::SpikeTrainsBinTimeBinSpace.name(), population)?
            .to_sparse()
    }
}

/// Writes every finished preprocessing stage of one population.
#[derive(Debug)]
pub struct PopulationSink<'a> {
    store: &'a ProcessedStore,
    population: &'a str,
}

impl DatasetSink for PopulationSink<'_> {
    fn store(&mut self, datatype: PreprocessDatatype, dataset: DatasetRef<'_>) -> Result<()> {
        let path = self.store.write_dataset(
            datatype.name(),
            self.population,
            Dataset::from_preprocessed(dataset),
        )?;
        tracing::debug!(path = %path.display(), "wrote dataset");
        Ok(())
    }
}

/// Owned statistics inputs of one population
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    pub sptrains: SparseMatrix<SpikeCount>,
    pub sptrains_bintime: Option<SparseMatrix<SpikeCount>>,
    pub sptrains_bintime_binspace: Option<SparseMatrix<CellSpikeCount>>,
    pub positions: Option<PositionRecord>,
}

impl LoadedInputs {
    pub fn as_inputs(&self) -> StatisticsInputs<'_> {
        StatisticsInputs {
            sptrains: &self.sptrains,
            sptrains_bintime: self.sptrains_bintime.as_ref(),
            sptrains_bintime_binspace: self.sptrains_bintime_binspace.as_ref(),
            positions: self.positions.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meso_core::TripletBuilder;

    #[test]
    fn test_sink_writes_one_file_per_stage() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessedStore::create(dir.path().join("processed")).unwrap();
        let mut b = TripletBuilder::<SpikeCount>::new(2, 4);
        b.push(1, 3, 2).unwrap();
        let m = b.build().unwrap();

        let mut sink = store.sink("E");
        sink.store(PreprocessDatatype::SpikeTrains, DatasetRef::SpikeCounts(&m))
            .unwrap();
        assert!(store.artifact_path("sptrains", "E").exists());
        let back: SparseMatrix<SpikeCount> = store
            .read_dataset("sptrains", "E")
            .unwrap()
            .to_sparse()
            .unwrap();
        assert_eq!(back, m);
        assert!(store.read_dataset("sptrains", "I").is_err());
    }

    #[test]
    fn test_populations_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessedStore::create(dir.path()).unwrap();
        let pops = vec![Population::new("E", 80), Population::new("I", 20)];
        store.write_populations(&pops).unwrap();
        assert_eq!(store.read_populations().unwrap(), pops);
    }
}
