//! JSON artifacts of derived datasets and statistics.
//!
//! One artifact file holds one datatype. Per-population files carry a single
//! entry; merged files carry one entry per population in configured order.
//!
//! ```json
//! {"datatype": "sptrains", "entries": [{"population": "L23E",
//!   "dataset": {"kind": "sparse", "dtype": "uint16", "shape": [4, 10000],
//!               "data": [1.0], "row": [2], "col": [417]}}]}
//! ```
//!
//! Missing values (NaN) are stored as `null`.

use meso_core::sparse::SparseValue;
use meso_core::{AnalysisError, PositionRecord, Result, SparseMatrix};
use meso_preprocess::DatasetRef;
use meso_stats::StatisticResult;
use ndarray::{Array1, Array2};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Declared element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Uint16,
    Uint32,
    Uint64,
    Float64,
}

/// One stored dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dataset {
    /// Coordinate triplets of a sparse matrix
    Sparse {
        dtype: Dtype,
        shape: [usize; 2],
        data: Vec<f64>,
        row: Vec<usize>,
        col: Vec<usize>,
    },
    /// Dense row-major array
    Array {
        dtype: Dtype,
        shape: Vec<usize>,
        values: Vec<Option<f64>>,
    },
    /// Named columns
    Group { members: Vec<Member> },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub dataset: Dataset,
}

fn kind_error(expected: &str, found: &Dataset) -> AnalysisError {
    let found = match found {
        Dataset::Sparse { .. } => "sparse",
        Dataset::Array { .. } => "array",
        Dataset::Group { .. } => "group",
        Dataset::Empty => "empty",
    };
    AnalysisError::ParseError(format!("expected {expected} dataset, found {found}"))
}

fn stored(v: f64) -> Option<f64> {
    (!v.is_nan()).then_some(v)
}

impl Dataset {
    pub fn sparse<T: SparseValue>(matrix: &SparseMatrix<T>, dtype: Dtype) -> Self {
        let (rows, cols) = matrix.shape();
        let (data, row, col) = matrix.to_triplets();
        Self::Sparse {
            dtype,
            shape: [rows, cols],
            data: data.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect(),
            row,
            col,
        }
    }

    pub fn vector(dtype: Dtype, values: impl IntoIterator<Item = f64>) -> Self {
        let values: Vec<Option<f64>> = values.into_iter().map(stored).collect();
        Self::Array {
            dtype,
            shape: vec![values.len()],
            values,
        }
    }

    pub fn matrix(dtype: Dtype, values: &Array2<f64>) -> Self {
        Self::Array {
            dtype,
            shape: values.shape().to_vec(),
            values: values.iter().copied().map(stored).collect(),
        }
    }

    pub fn group(members: Vec<(&str, Dataset)>) -> Self {
        Self::Group {
            members: members
                .into_iter()
                .map(|(name, dataset)| Member {
                    name: name.to_string(),
                    dataset,
                })
                .collect(),
        }
    }

    /// Positions as `x-position_mm` and `y-position_mm` columns in id order
    pub fn positions(positions: &PositionRecord) -> Self {
        Self::group(vec![
            ("x-position_mm", Self::vector(Dtype::Float64, positions.x.iter().copied())),
            ("y-position_mm", Self::vector(Dtype::Float64, positions.y.iter().copied())),
        ])
    }

    pub fn from_preprocessed(dataset: DatasetRef<'_>) -> Self {
        match dataset {
            DatasetRef::Positions(p) => Self::positions(p),
            DatasetRef::SpikeCounts(m) => Self::sparse(m, Dtype::Uint16),
            DatasetRef::CellSpikeCounts(m) => Self::sparse(m, Dtype::Uint32),
            DatasetRef::NeuronCount(h) => Self::matrix(Dtype::Uint32, &h.mapv(|n| n as f64)),
            DatasetRef::Rates(m) => Self::sparse(m, Dtype::Float64),
            DatasetRef::SortingArray(ids) => {
                Self::vector(Dtype::Uint64, ids.iter().map(|&i| i as f64))
            }
        }
    }

    pub fn from_statistic(result: &StatisticResult) -> Self {
        let v = |a: &Array1<f64>| Self::vector(Dtype::Float64, a.iter().copied());
        match result {
            StatisticResult::Rates(r) => v(r),
            StatisticResult::LocalVariations(lv) => v(lv),
            StatisticResult::CorrelationDistances { ccs, distances_mm } => {
                Self::group(vec![("ccs", v(ccs)), ("distances_mm", v(distances_mm))])
            }
            StatisticResult::PowerSpectrum { frequencies, psds } => Self::group(vec![
                ("frequencies_s-1", v(frequencies)),
                ("psds_s^-2_Hz-1", v(psds)),
            ]),
            StatisticResult::CcFuncs {
                cc_funcs,
                distances_mm,
                lags_ms,
            } => Self::group(vec![
                ("cc_funcs", Self::matrix(Dtype::Float64, cc_funcs)),
                ("distances_mm", v(distances_mm)),
                ("lags_ms", v(lags_ms)),
            ]),
            StatisticResult::Empty => Self::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Rebuild a sparse matrix; values must fit `T` exactly.
    pub fn to_sparse<T: SparseValue + NumCast>(&self) -> Result<SparseMatrix<T>> {
        let Self::Sparse {
            shape,
            data,
            row,
            col,
            ..
        } = self
        else {
            return Err(kind_error("sparse", self));
        };
        let values = data
            .iter()
            .map(|&v| {
                <T as NumCast>::from(v)
                    .filter(|t| t.to_f64() == Some(v))
                    .ok_or_else(|| {
                        AnalysisError::ParseError(format!(
                            "value {v} does not fit the element type"
                        ))
                    })
            })
            .collect::<Result<Vec<T>>>()?;
        SparseMatrix::from_triplets((shape[0], shape[1]), &values, row, col)
    }

    /// Dense values with `null` read back as NaN.
    pub fn to_vector(&self) -> Result<Array1<f64>> {
        match self {
            Self::Array { values, .. } => {
                Ok(values.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            }
            other => Err(kind_error("array", other)),
        }
    }

    pub fn to_matrix(&self) -> Result<Array2<f64>> {
        match self {
            Self::Array { shape, values, .. } if shape.len() == 2 => {
                Array2::from_shape_vec(
                    (shape[0], shape[1]),
                    values.iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
                )
                .map_err(|e| AnalysisError::ParseError(e.to_string()))
            }
            other => Err(kind_error("2-D array", other)),
        }
    }

    pub fn member(&self, name: &str) -> Result<&Dataset> {
        match self {
            Self::Group { members } => members
                .iter()
                .find(|m| m.name == name)
                .map(|m| &m.dataset)
                .ok_or_else(|| AnalysisError::ParseError(format!("group has no member '{name}'"))),
            other => Err(kind_error("group", other)),
        }
    }

    pub fn to_positions(&self) -> Result<PositionRecord> {
        let x = self.member("x-position_mm")?.to_vector()?;
        let y = self.member("y-position_mm")?.to_vector()?;
        if x.len() != y.len() {
            return Err(AnalysisError::DataConsistency(format!(
                "{} x positions but {} y positions",
                x.len(),
                y.len()
            )));
        }
        Ok(PositionRecord {
            x: x.to_vec(),
            y: y.to_vec(),
        })
    }
}

/// Dataset of one population inside an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub population: String,
    pub dataset: Dataset,
}

/// Contents of one artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub datatype: String,
    pub entries: Vec<Entry>,
}

/// `<datatype>_<X>.json`
pub fn artifact_file_name(datatype: &str, population: &str) -> String {
    format!("{datatype}_{population}.json")
}

/// `all_<datatype>.json`
pub fn merged_file_name(datatype: &str) -> String {
    format!("all_{datatype}.json")
}

impl Artifact {
    pub fn single(datatype: &str, population: &str, dataset: Dataset) -> Self {
        Self {
            datatype: datatype.to_string(),
            entries: vec![Entry {
                population: population.to_string(),
                dataset,
            }],
        }
    }

    pub fn get(&self, population: &str) -> Option<&Dataset> {
        self.entries
            .iter()
            .find(|e| e.population == population)
            .map(|e| &e.dataset)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut w, self).map_err(|e| {
            AnalysisError::ParseError(format!("{}: {e}", path.display()))
        })?;
        w.flush()?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let r = BufReader::new(File::open(path)?);
        serde_json::from_reader(r)
            .map_err(|e| AnalysisError::ParseError(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meso_core::TripletBuilder;

    #[test]
    fn test_sparse_dataset_rebuilds_matrix() {
        let mut b = TripletBuilder::<u16>::new(3, 5);
        b.push(2, 4, 3).unwrap();
        b.push(0, 1, 1).unwrap();
        let m = b.build().unwrap();
        let ds = Dataset::sparse(&m, Dtype::Uint16);
        assert_eq!(ds.to_sparse::<u16>().unwrap(), m);
    }

    #[test]
    fn test_sparse_values_must_fit() {
        let ds = Dataset::Sparse {
            dtype: Dtype::Uint16,
            shape: [1, 1],
            data: vec![0.5],
            row: vec![0],
            col: vec![0],
        };
        assert!(ds.to_sparse::<u16>().is_err());
    }

    #[test]
    fn test_neuron_count_stored_as_dense_matrix() {
        let hist = ndarray::arr2(&[[3u32, 0], [1, 7]]);
        let ds = Dataset::from_preprocessed(DatasetRef::NeuronCount(&hist));
        let Dataset::Array { dtype, ref shape, .. } = ds else {
            panic!("expected dense array, got {ds:?}");
        };
        assert_eq!(dtype, Dtype::Uint32);
        assert_eq!(shape, &vec![2, 2]);
        assert_eq!(ds.to_matrix().unwrap(), hist.mapv(|n| n as f64));
    }

    #[test]
    fn test_nan_stored_as_null() {
        let ds = Dataset::vector(Dtype::Float64, [1.0, f64::NAN]);
        let json = serde_json::to_string(&ds).unwrap();
        assert!(json.contains("null"));
        let back: Dataset = serde_json::from_str(&json).unwrap();
        let v = back.to_vector().unwrap();
        assert_eq!(v[0], 1.0);
        assert!(v[1].is_nan());
    }

    #[test]
    fn test_statistic_groups() {
        let ds = Dataset::from_statistic(&StatisticResult::CorrelationDistances {
            ccs: Array1::from(vec![0.5]),
            distances_mm: Array1::from(vec![0.2]),
        });
        assert_eq!(ds.member("distances_mm").unwrap().to_vector().unwrap()[0], 0.2);
        assert!(ds.member("missing").is_err());
        assert!(Dataset::from_statistic(&StatisticResult::Empty).is_empty());
    }

    #[test]
    fn test_artifact_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(artifact_file_name("FRs", "E"));
        let artifact = Artifact::single("FRs", "E", Dataset::vector(Dtype::Float64, [2.0, 3.0]));
        artifact.write(&path).unwrap();
        let back = Artifact::read(&path).unwrap();
        assert_eq!(back, artifact);
        assert!(back.get("I").is_none());
    }
}
