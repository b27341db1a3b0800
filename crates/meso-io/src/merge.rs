//! Merging per-population artifacts into one file per datatype.

use crate::artifact::Artifact;
use crate::store::ProcessedStore;
use meso_core::{AnalysisError, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub struct ArtifactMerger<'a> {
    store: &'a ProcessedStore,
}

impl<'a> ArtifactMerger<'a> {
    pub fn new(store: &'a ProcessedStore) -> Self {
        Self { store }
    }

    /// Union the artifacts of `datatype` in population order into
    /// `all_<datatype>.json`, then remove the inputs.
    pub fn merge(&self, datatype: &str, populations: &[String]) -> Result<PathBuf> {
        let mut merged = Artifact {
            datatype: datatype.to_string(),
            entries: Vec::with_capacity(populations.len()),
        };
        let mut inputs = Vec::with_capacity(populations.len());
        for population in populations {
            let path = self.store.artifact_path(datatype, population);
            let artifact = Artifact::read(&path)?;
            if artifact.datatype != datatype {
                return Err(AnalysisError::DataConsistency(format!(
                    "{} holds '{}', expected '{datatype}'",
                    path.display(),
                    artifact.datatype
                )));
            }
            merged.entries.extend(artifact.entries);
            inputs.push(path);
        }

        let out = self.store.merged_path(datatype);
        merged.write(&out)?;
        for path in inputs {
            std::fs::remove_file(&path)?;
        }
        tracing::debug!(datatype, entries = merged.entries.len(), "merged artifacts");
        Ok(out)
    }
}
