//! # Meso Preprocess
//!
//! Turns raw per-population spike and position records into the derived
//! datasets consumed by the statistics:
//!
//! - Raw global node ids are mapped to contiguous population-local ids and the
//!   warm-up duration is subtracted from spike times ([`remap`])
//! - Optionally only the neurons inside a central disc are kept ([`disc`])
//! - Spikes are binned into sparse neuron×time matrices at the simulation
//!   resolution and at the analysis resolution, and projected onto the
//!   spatial grid ([`binning`])
//! - Neurons are counted per grid cell and cell spike counts are turned into
//!   per-neuron rates ([`normalize`])
//! - Neuron ids are sorted along a spatial axis for raster display ([`sorting`])
//!
//! The stages of one population run in a fixed order through [`pipeline`].

pub mod binning;
pub mod disc;
pub mod normalize;
pub mod pipeline;
pub mod remap;
pub mod sorting;

pub use binning::{space_binned_sptrains, time_binned_sptrains, CellSpikeCount, SpikeCount};
pub use disc::{DiscExtraction, DiscExtractor};
pub use normalize::{instantaneous_rates, neuron_count_per_cell};
pub use pipeline::{DatasetRef, DatasetSink, PopulationDatasets, PreprocessContext};
pub use remap::{check_neuron_counts, IdentifierRemapper, RawIdRange, RawIdTable};
pub use sorting::pos_sorting_array;
