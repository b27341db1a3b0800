//! # Meso IO
//!
//! Everything that touches the file system, plus the phase orchestration:
//!
//! - [`text`]: tab-delimited raw and converted spike/position records
//! - [`artifact`]: JSON files holding one datatype per population or merged
//! - [`store`]: the processed data directory and the per-population sink
//! - [`merge`]: one file per datatype across all populations
//! - [`workflow`]: conversion, disc extraction, preprocessing, statistics and
//!   merging on a fixed-size worker pool
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use meso_core::AnalysisParams;
//! use meso_io::Workflow;
//!
//! let params = AnalysisParams::load(None)?;
//! let report = Workflow::new(params)?.run()?;
//! for row in &report.first_glance {
//!     println!("{} {} {:.2}", row.population, row.num_neurons, row.rate);
//! }
//! ```

pub mod artifact;
pub mod merge;
pub mod store;
pub mod text;
pub mod workflow;

pub use artifact::{Artifact, Dataset, Dtype, Entry};
pub use merge::ArtifactMerger;
pub use store::{LoadedInputs, PopulationSink, ProcessedStore};
pub use workflow::{first_glance, ConversionSummary, FirstGlanceRow, PreprocessReport, Workflow};
