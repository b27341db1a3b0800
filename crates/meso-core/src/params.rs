//! Analysis parameters.
//!
//! Loaded from a TOML file, validated once before any processing starts.
//! Every option has a default so partial files are accepted.

use crate::{AnalysisError, Millimeter, Population, Result, SortKey, SpatialGrid, Time};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default configuration file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "meso_analysis.toml";

/// Environment variable pointing to a configuration file
pub const CONFIG_PATH_ENV: &str = "MESO_CONFIG_PATH";

// ============================================================================
// DATATYPES
// ============================================================================

/// Datasets derived per population during preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreprocessDatatype {
    #[serde(rename = "positions")]
    Positions,
    #[serde(rename = "sptrains")]
    SpikeTrains,
    #[serde(rename = "sptrains_bintime")]
    SpikeTrainsBinTime,
    #[serde(rename = "sptrains_bintime_binspace")]
    SpikeTrainsBinTimeBinSpace,
    #[serde(rename = "neuron_count_binspace")]
    NeuronCountBinSpace,
    #[serde(rename = "inst_rates_bintime_binspace")]
    InstRatesBinTimeBinSpace,
    #[serde(rename = "pos_sorting_arrays")]
    PosSortingArrays,
}

impl PreprocessDatatype {
    pub const ALL: [PreprocessDatatype; 7] = [
        Self::Positions,
        Self::SpikeTrains,
        Self::SpikeTrainsBinTime,
        Self::SpikeTrainsBinTimeBinSpace,
        Self::NeuronCountBinSpace,
        Self::InstRatesBinTimeBinSpace,
        Self::PosSortingArrays,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Positions => "positions",
            Self::SpikeTrains => "sptrains",
            Self::SpikeTrainsBinTime => "sptrains_bintime",
            Self::SpikeTrainsBinTimeBinSpace => "sptrains_bintime_binspace",
            Self::NeuronCountBinSpace => "neuron_count_binspace",
            Self::InstRatesBinTimeBinSpace => "inst_rates_bintime_binspace",
            Self::PosSortingArrays => "pos_sorting_arrays",
        }
    }

    /// Datasets that must be computed earlier in the same task
    pub fn requires(&self) -> &'static [PreprocessDatatype] {
        match self {
            Self::SpikeTrainsBinTimeBinSpace => &[Self::Positions, Self::SpikeTrainsBinTime],
            Self::NeuronCountBinSpace => &[Self::Positions],
            Self::InstRatesBinTimeBinSpace => {
                &[Self::SpikeTrainsBinTimeBinSpace, Self::NeuronCountBinSpace]
            }
            Self::PosSortingArrays => &[Self::Positions],
            Self::Positions | Self::SpikeTrains | Self::SpikeTrainsBinTime => &[],
        }
    }

    /// Whether the persisted form is a sparse matrix
    pub fn is_sparse(&self) -> bool {
        matches!(
            self,
            Self::SpikeTrains
                | Self::SpikeTrainsBinTime
                | Self::SpikeTrainsBinTimeBinSpace
                | Self::InstRatesBinTimeBinSpace
        )
    }
}

impl fmt::Display for PreprocessDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Statistics computed per population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatisticDatatype {
    #[serde(rename = "FRs")]
    FiringRates,
    #[serde(rename = "LVs")]
    LocalVariations,
    #[serde(rename = "CCs_distances")]
    CorrelationDistances,
    #[serde(rename = "PSDs")]
    PowerSpectra,
    #[serde(rename = "CCfuncs_reference", alias = "CCfuncs_thalamic_pulses")]
    ReferenceCrossCorrelation,
}

impl StatisticDatatype {
    pub const ALL: [StatisticDatatype; 5] = [
        Self::FiringRates,
        Self::LocalVariations,
        Self::CorrelationDistances,
        Self::PowerSpectra,
        Self::ReferenceCrossCorrelation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FiringRates => "FRs",
            Self::LocalVariations => "LVs",
            Self::CorrelationDistances => "CCs_distances",
            Self::PowerSpectra => "PSDs",
            Self::ReferenceCrossCorrelation => "CCfuncs_reference",
        }
    }

    /// Preprocessed datasets read back by this statistic
    pub fn requires(&self) -> &'static [PreprocessDatatype] {
        use PreprocessDatatype as P;
        match self {
            Self::FiringRates | Self::LocalVariations => &[P::SpikeTrains],
            Self::CorrelationDistances => &[P::SpikeTrains, P::Positions],
            Self::PowerSpectra => &[P::SpikeTrains, P::SpikeTrainsBinTime],
            Self::ReferenceCrossCorrelation => {
                &[P::SpikeTrains, P::SpikeTrainsBinTimeBinSpace]
            }
        }
    }
}

impl fmt::Display for StatisticDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// OPTION TYPES
// ============================================================================

/// Axis used for the position sorting array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SortingAxis {
    X,
    Y,
    None,
}

impl FromStr for SortingAxis {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "none" | "None" | "" => Ok(Self::None),
            other => Err(AnalysisError::Configuration(format!(
                "sorting axis is not 'x', 'y' or 'none': '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for SortingAxis {
    type Error = AnalysisError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SortingAxis> for String {
    fn from(axis: SortingAxis) -> Self {
        match axis {
            SortingAxis::X => "x".into(),
            SortingAxis::Y => "y".into(),
            SortingAxis::None => "none".into(),
        }
    }
}

/// Marker accepting the literal `"auto"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMarker {
    Auto,
}

/// Number of neurons sampled for pairwise correlations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleSize {
    Fixed(usize),
    Auto(AutoMarker),
}

impl SampleSize {
    /// Effective sample size given the smallest population size
    pub fn resolve(&self, smallest_population: usize) -> usize {
        match self {
            Self::Fixed(n) => (*n).min(smallest_population),
            Self::Auto(_) => smallest_population,
        }
    }
}

/// Plain-text layout of one record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsciiFormat {
    /// Column the rows are sorted by
    pub sortby: SortKey,
    /// Decimal places of floating point columns
    pub decimals: usize,
}

/// Plain-text layouts of the per-population records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsciiFormats {
    pub spike_recorder: AsciiFormat,
    pub positions: AsciiFormat,
}

impl Default for AsciiFormats {
    fn default() -> Self {
        Self {
            spike_recorder: AsciiFormat {
                sortby: SortKey::Time,
                decimals: 3,
            },
            positions: AsciiFormat {
                sortby: SortKey::NodeId,
                decimals: 6,
            },
        }
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// All options recognised by the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Population names in processing order
    pub populations: Vec<String>,
    /// Population sizes of the simulated network
    pub num_neurons: Vec<usize>,

    /// Side length of the square network (mm)
    pub extent: Millimeter,
    /// Use minimum-image distances for pairwise correlations
    pub periodic_boundaries: bool,

    /// Simulation time step (ms)
    pub sim_resolution: Time,
    /// Warm-up duration subtracted from all spike times (ms)
    pub t_presim: Time,
    /// Recorded simulation duration after warm-up (ms)
    pub t_sim: Time,
    /// Startup transient excluded from statistics (ms)
    pub t_transient: Time,

    /// Temporal bin size of the coarse matrices (ms)
    pub binsize_time: Time,
    /// Spatial bin size (mm)
    pub binsize_space: Millimeter,

    pub datatypes_preprocess: Vec<PreprocessDatatype>,
    pub datatypes_statistics: Vec<StatisticDatatype>,

    pub sorting_axis: SortingAxis,

    pub ccs_num_neurons: SampleSize,
    /// Window width of the correlation binning (ms)
    pub ccs_time_interval: Time,

    /// FFT window length of the power spectrum
    pub psd_nfft: usize,

    /// Maximum lag of the reference cross-correlation (ms)
    pub cc_funcs_tau: Time,
    /// Number of diagonal rings of the reference cross-correlation
    pub cc_funcs_nbins_diag: usize,
    /// Population used as reference signal (e.g. thalamic pulses)
    pub reference_population: Option<String>,

    pub extract_disc: bool,
    /// Area of the central disc (mm^2)
    pub disc_area: f64,

    pub write_ascii: AsciiFormats,

    pub raw_data_dir: PathBuf,
    pub processed_data_dir: PathBuf,
    /// File in `raw_data_dir` with the first and last raw id per population
    pub fname_nodeids: String,

    /// Worker threads, 0 for one per available core
    pub workers: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            populations: ["L23E", "L23I", "L4E", "L4I", "L5E", "L5I", "L6E", "L6I"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            num_neurons: vec![20683, 5834, 21915, 5479, 4850, 1065, 14395, 2948],
            extent: 1.0,
            periodic_boundaries: true,
            sim_resolution: 0.1,
            t_presim: 500.0,
            t_sim: 1000.0,
            t_transient: 200.0,
            binsize_time: 0.5,
            binsize_space: 0.1,
            datatypes_preprocess: PreprocessDatatype::ALL.to_vec(),
            datatypes_statistics: vec![
                StatisticDatatype::FiringRates,
                StatisticDatatype::LocalVariations,
                StatisticDatatype::CorrelationDistances,
                StatisticDatatype::PowerSpectra,
            ],
            sorting_axis: SortingAxis::X,
            ccs_num_neurons: SampleSize::Auto(AutoMarker::Auto),
            ccs_time_interval: 2.0,
            psd_nfft: 512,
            cc_funcs_tau: 25.0,
            cc_funcs_nbins_diag: 4,
            reference_population: None,
            extract_disc: false,
            disc_area: 1.0,
            write_ascii: AsciiFormats::default(),
            raw_data_dir: PathBuf::from("raw_data"),
            processed_data_dir: PathBuf::from("processed_data"),
            fname_nodeids: "population_nodeids.dat".into(),
            workers: 0,
        }
    }
}

impl AnalysisParams {
    /// Parse from TOML text and validate.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let params: Self = toml::from_str(content)
            .map_err(|e| AnalysisError::Configuration(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Load from `path`, else from `$MESO_CONFIG_PATH`, else from
    /// `./meso_analysis.toml`; falls back to defaults if none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file()?,
        };
        match path {
            Some(p) => {
                tracing::debug!(path = %p.display(), "loading analysis parameters");
                let content = fs::read_to_string(&p)?;
                Self::from_toml_str(&content)
            }
            None => {
                tracing::debug!("no configuration file found, using defaults");
                let params = Self::default();
                params.validate()?;
                Ok(params)
            }
        }
    }

    /// Pre-flight checks. Every violation is a fatal configuration error.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(AnalysisError::Configuration(msg));

        if self.populations.is_empty() {
            return fail("at least one population is required".into());
        }
        if self.populations.len() != self.num_neurons.len() {
            return fail(format!(
                "{} population names but {} population sizes",
                self.populations.len(),
                self.num_neurons.len()
            ));
        }
        for (i, name) in self.populations.iter().enumerate() {
            if self.populations[..i].contains(name) {
                return fail(format!("population '{name}' listed twice"));
            }
        }
        for (name, value) in [
            ("sim_resolution", self.sim_resolution),
            ("t_sim", self.t_sim),
            ("binsize_time", self.binsize_time),
            ("ccs_time_interval", self.ccs_time_interval),
            ("disc_area", self.disc_area),
        ] {
            if !(value > 0.0) {
                return fail(format!("{name} must be positive, got {value}"));
            }
        }
        if self.t_presim < 0.0 || self.t_transient < 0.0 || self.cc_funcs_tau < 0.0 {
            return fail("t_presim, t_transient and cc_funcs_tau must not be negative".into());
        }
        if self.t_transient >= self.t_sim {
            return fail(format!(
                "transient ({} ms) must be shorter than the simulation ({} ms)",
                self.t_transient, self.t_sim
            ));
        }
        if self.binsize_time < self.sim_resolution {
            return fail("binsize_time must not be smaller than sim_resolution".into());
        }
        if self.ccs_time_interval < self.sim_resolution {
            return fail("ccs_time_interval must not be smaller than sim_resolution".into());
        }
        if self.psd_nfft < 2 {
            return fail(format!("psd_nfft must be at least 2, got {}", self.psd_nfft));
        }

        self.grid()?;

        if self.extract_disc && self.extent <= 2.0 * self.disc_radius() {
            return fail(format!(
                "disc of {} mm^2 cannot be extracted because the extent length {} mm is too small",
                self.disc_area, self.extent
            ));
        }

        if let Some(reference) = &self.reference_population {
            if !self.populations.contains(reference) {
                return fail(format!(
                    "reference population '{reference}' is not a configured population"
                ));
            }
        }

        for (i, dt) in self.datatypes_preprocess.iter().enumerate() {
            if self.datatypes_preprocess[..i].contains(dt) {
                return fail(format!("preprocess datatype '{dt}' listed twice"));
            }
            for req in dt.requires() {
                if !self.datatypes_preprocess[..i].contains(req) {
                    return fail(format!("preprocess datatype '{dt}' requires '{req}' earlier"));
                }
            }
        }
        for st in &self.datatypes_statistics {
            for req in st.requires() {
                if !self.datatypes_preprocess.contains(req) {
                    return fail(format!("statistic '{st}' requires preprocess datatype '{req}'"));
                }
            }
        }
        Ok(())
    }

    pub fn grid(&self) -> Result<SpatialGrid> {
        SpatialGrid::new(self.extent, self.binsize_space)
    }

    pub fn populations(&self) -> Vec<Population> {
        self.populations
            .iter()
            .zip(&self.num_neurons)
            .map(|(name, &size)| Population::new(name, size))
            .collect()
    }

    pub fn population_index(&self, name: &str) -> Option<usize> {
        self.populations.iter().position(|p| p == name)
    }

    /// Number of time bins of width `dt` covering the simulation
    pub fn n_time_bins(&self, dt: Time) -> usize {
        (self.t_sim / dt).round() as usize
    }

    /// First column kept after removing the startup transient
    pub fn min_time_index(&self, dt: Time) -> usize {
        (self.t_transient / dt).round() as usize
    }

    /// Duration of the data entering the statistics (ms)
    pub fn time_statistics(&self) -> Time {
        self.t_sim - self.t_transient
    }

    /// Radius of the central disc with area `disc_area`
    pub fn disc_radius(&self) -> Millimeter {
        (self.disc_area / std::f64::consts::PI).sqrt()
    }

    pub fn nodeids_path(&self) -> PathBuf {
        self.raw_data_dir.join(&self.fname_nodeids)
    }
}

/// Locate the configuration file.
///
/// Search order:
/// 1. `MESO_CONFIG_PATH` environment variable
/// 2. `./meso_analysis.toml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(AnalysisError::Configuration(format!(
            "config file specified by {CONFIG_PATH_ENV} not found: {}",
            path.display()
        )));
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    Ok(local.exists().then_some(local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = AnalysisParams::default();
        params.validate().unwrap();
        assert_eq!(params.grid().unwrap().side(), 10);
        assert_eq!(params.n_time_bins(params.sim_resolution), 10000);
        assert_eq!(params.min_time_index(params.binsize_time), 400);
        assert_eq!(params.time_statistics(), 800.0);
    }

    #[test]
    fn test_partial_toml() {
        let params = AnalysisParams::from_toml_str(
            r#"
            populations = ["E", "I"]
            num_neurons = [80, 20]
            extent = 2.0
            binsize_space = 0.5
            sorting_axis = "y"
            ccs_num_neurons = 50
            datatypes_statistics = ["FRs", "CCfuncs_thalamic_pulses"]
            reference_population = "I"
            "#,
        )
        .unwrap();
        assert_eq!(params.sorting_axis, SortingAxis::Y);
        assert_eq!(params.ccs_num_neurons, SampleSize::Fixed(50));
        assert_eq!(params.ccs_num_neurons.resolve(20), 20);
        assert_eq!(
            params.datatypes_statistics[1],
            StatisticDatatype::ReferenceCrossCorrelation
        );
        assert_eq!(params.psd_nfft, 512);
    }

    #[test]
    fn test_auto_sample_size() {
        let params = AnalysisParams::from_toml_str(r#"ccs_num_neurons = "auto""#).unwrap();
        assert_eq!(params.ccs_num_neurons.resolve(1065), 1065);
    }

    #[test]
    fn test_invalid_sorting_axis() {
        let err = AnalysisParams::from_toml_str(r#"sorting_axis = "z""#);
        assert!(matches!(err, Err(AnalysisError::Configuration(_))));
        assert!("z".parse::<SortingAxis>().is_err());
    }

    #[test]
    fn test_disc_too_large() {
        let params = AnalysisParams {
            extract_disc: true,
            extent: 1.0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(AnalysisError::Configuration(_))));

        let params = AnalysisParams {
            extract_disc: true,
            extent: 2.0,
            ..Default::default()
        };
        params.validate().unwrap();
    }

    #[test]
    fn test_odd_grid_rejected() {
        let params = AnalysisParams {
            extent: 1.5,
            binsize_space: 0.5,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(AnalysisError::Configuration(_))));
    }

    #[test]
    fn test_stage_order_checked() {
        let params = AnalysisParams {
            datatypes_preprocess: vec![
                PreprocessDatatype::SpikeTrainsBinTimeBinSpace,
                PreprocessDatatype::Positions,
                PreprocessDatatype::SpikeTrainsBinTime,
            ],
            datatypes_statistics: vec![],
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_statistic_requirements_checked() {
        let params = AnalysisParams {
            datatypes_preprocess: vec![PreprocessDatatype::Positions],
            datatypes_statistics: vec![StatisticDatatype::FiringRates],
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
