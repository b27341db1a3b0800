//! Sparse spike-count matrices.
//!
//! Storage is compressed sparse row. Matrices are only created through
//! [`TripletBuilder`], which accumulates `(row, col, value)` coordinates and
//! canonicalizes them once: entries sorted by `(row, col)`, duplicates summed,
//! zeros dropped.

use crate::{AnalysisError, Result};
use ndarray::{Array1, Array2};
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Value type storable in a [`SparseMatrix`]
pub trait SparseValue: Copy + Zero + AddAssign + ToPrimitive + PartialEq {}

impl<T: Copy + Zero + AddAssign + ToPrimitive + PartialEq> SparseValue for T {}

// ---------------------------------------------------------------------------
// SparseMatrix<T>
// ---------------------------------------------------------------------------

/// Compressed sparse row matrix.
///
/// - `row_ptr` has length `rows + 1`
/// - `col_indices` and `values` each have length `nnz`
/// - Row `i` spans `row_ptr[i]..row_ptr[i+1]`, columns strictly increasing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix<T> {
    rows: usize,
    cols: usize,
    row_ptr: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<T>,
}

impl<T: SparseValue> SparseMatrix<T> {
    /// Explicitly shaped matrix without stored entries
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Rebuild from parallel coordinate arrays (the persisted layout).
    pub fn from_triplets(
        shape: (usize, usize),
        data: &[T],
        row: &[usize],
        col: &[usize],
    ) -> Result<Self> {
        if data.len() != row.len() || data.len() != col.len() {
            return Err(AnalysisError::ParseError(format!(
                "triplet arrays differ in length: data={}, row={}, col={}",
                data.len(),
                row.len(),
                col.len()
            )));
        }
        let mut builder = TripletBuilder::with_capacity(shape.0, shape.1, data.len());
        for ((&v, &r), &c) in data.iter().zip(row).zip(col) {
            builder.push(r, c, v)?;
        }
        builder.build()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over `(col, value)` pairs of one row.
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Row-major `(row, col, value)` iteration over stored entries.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.rows).flat_map(move |r| self.row_entries(r).map(move |(c, v)| (r, c, v)))
    }

    /// Parallel `(data, row, col)` arrays in row-major order.
    pub fn to_triplets(&self) -> (Vec<T>, Vec<usize>, Vec<usize>) {
        let mut data = Vec::with_capacity(self.nnz());
        let mut row = Vec::with_capacity(self.nnz());
        let mut col = Vec::with_capacity(self.nnz());
        for (r, c, v) in self.triplets() {
            data.push(v);
            row.push(r);
            col.push(c);
        }
        (data, row, col)
    }

    /// Sum of all stored values
    pub fn sum(&self) -> f64 {
        self.values.iter().filter_map(|v| v.to_f64()).sum()
    }

    pub fn row_sums(&self) -> Array1<f64> {
        Array1::from_iter((0..self.rows).map(|r| {
            self.row_entries(r)
                .filter_map(|(_, v)| v.to_f64())
                .sum::<f64>()
        }))
    }

    pub fn col_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.cols);
        for (&c, v) in self.col_indices.iter().zip(&self.values) {
            sums[c] += v.to_f64().unwrap_or(0.0);
        }
        sums
    }

    /// Stored column indices of one row
    pub fn row_cols(&self, row: usize) -> &[usize] {
        &self.col_indices[self.row_ptr[row]..self.row_ptr[row + 1]]
    }

    /// One row as a dense vector
    pub fn row_dense(&self, row: usize) -> Array1<f64> {
        let mut out = Array1::zeros(self.cols);
        for (c, v) in self.row_entries(row) {
            out[c] = v.to_f64().unwrap_or(0.0);
        }
        out
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.rows, self.cols));
        for (r, c, v) in self.triplets() {
            out[[r, c]] = v.to_f64().unwrap_or(0.0);
        }
        out
    }

    /// Drop the leading `start` columns, shifting the rest to the left.
    pub fn slice_cols_from(&self, start: usize) -> Self {
        let start = start.min(self.cols);
        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for r in 0..self.rows {
            for (c, v) in self.row_entries(r) {
                if c >= start {
                    col_indices.push(c - start);
                    values.push(v);
                }
            }
            row_ptr.push(col_indices.len());
        }
        Self {
            rows: self.rows,
            cols: self.cols - start,
            row_ptr,
            col_indices,
            values,
        }
    }

    /// Apply `f` to every stored value; entries mapped to zero are dropped.
    pub fn map_values<U: SparseValue>(&self, mut f: impl FnMut(usize, T) -> U) -> SparseMatrix<U> {
        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        let mut col_indices = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());
        row_ptr.push(0);
        for r in 0..self.rows {
            for (c, v) in self.row_entries(r) {
                let mapped = f(r, v);
                if !mapped.is_zero() {
                    col_indices.push(c);
                    values.push(mapped);
                }
            }
            row_ptr.push(col_indices.len());
        }
        SparseMatrix {
            rows: self.rows,
            cols: self.cols,
            row_ptr,
            col_indices,
            values,
        }
    }

    /// Check that row-major iteration yields non-decreasing rows and strictly
    /// increasing columns within each row.
    pub fn check_canonical(&self) -> Result<()> {
        if self.row_ptr.len() != self.rows + 1 || self.row_ptr[self.rows] != self.nnz() {
            return Err(AnalysisError::DataConsistency(
                "row pointer does not match stored entries".into(),
            ));
        }
        let mut last: Option<(usize, usize)> = None;
        for (r, c, _) in self.triplets() {
            if let Some((lr, lc)) = last {
                if r < lr || (r == lr && c <= lc) {
                    return Err(AnalysisError::DataConsistency(format!(
                        "row indices must be increasing: ({lr}, {lc}) followed by ({r}, {c})"
                    )));
                }
            }
            last = Some((r, c));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TripletBuilder<T>
// ---------------------------------------------------------------------------

/// Coordinate accumulator; the only way to obtain a [`SparseMatrix`].
#[derive(Debug, Clone)]
pub struct TripletBuilder<T> {
    rows: usize,
    cols: usize,
    entries: Vec<(usize, usize, T)>,
}

impl<T: SparseValue> TripletBuilder<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::with_capacity(rows, cols, 0)
    }

    pub fn with_capacity(rows: usize, cols: usize, capacity: usize) -> Self {
        Self {
            rows,
            cols,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(AnalysisError::DataConsistency(format!(
                "entry ({row}, {col}) outside matrix shape ({}, {})",
                self.rows, self.cols
            )));
        }
        self.entries.push((row, col, value));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort, sum duplicate coordinates, drop zeros and compress.
    pub fn build(self) -> Result<SparseMatrix<T>> {
        let Self {
            rows,
            cols,
            mut entries,
        } = self;
        entries.sort_by_key(|&(r, c, _)| (r, c));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_indices: Vec<usize> = Vec::with_capacity(entries.len());
        let mut values: Vec<T> = Vec::with_capacity(entries.len());
        let mut row_of_last: Option<usize> = None;

        for (r, c, v) in entries {
            let same_coord = row_of_last == Some(r) && col_indices.last() == Some(&c);
            if same_coord {
                if let Some(last) = values.last_mut() {
                    *last += v;
                }
            } else {
                col_indices.push(c);
                values.push(v);
                row_ptr[r + 1] += 1;
                row_of_last = Some(r);
            }
        }

        // drop explicit zeros (including sums that cancelled)
        let mut kept_ptr = vec![0usize; rows + 1];
        let mut kept_cols = Vec::with_capacity(col_indices.len());
        let mut kept_vals = Vec::with_capacity(values.len());
        let mut offset = 0;
        for r in 0..rows {
            let n = row_ptr[r + 1];
            for idx in offset..offset + n {
                if !values[idx].is_zero() {
                    kept_cols.push(col_indices[idx]);
                    kept_vals.push(values[idx]);
                }
            }
            offset += n;
            kept_ptr[r + 1] = kept_cols.len();
        }

        let matrix = SparseMatrix {
            rows,
            cols,
            row_ptr: kept_ptr,
            col_indices: kept_cols,
            values: kept_vals,
        };
        matrix.check_canonical()?;
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builder_canonicalizes() {
        let mut b = TripletBuilder::<u16>::new(3, 4);
        b.push(2, 1, 1).unwrap();
        b.push(0, 3, 1).unwrap();
        b.push(2, 1, 1).unwrap();
        b.push(1, 0, 0).unwrap();
        b.push(0, 0, 1).unwrap();
        let m = b.build().unwrap();

        assert_eq!(m.shape(), (3, 4));
        assert_eq!(m.nnz(), 3);
        let t: Vec<_> = m.triplets().collect();
        assert_eq!(t, vec![(0, 0, 1), (0, 3, 1), (2, 1, 2)]);
        m.check_canonical().unwrap();
    }

    #[test]
    fn test_out_of_shape_rejected() {
        let mut b = TripletBuilder::<u8>::new(2, 2);
        assert!(b.push(2, 0, 1).is_err());
        assert!(b.push(0, 2, 1).is_err());
    }

    #[test]
    fn test_zeros_keeps_shape() {
        let m = SparseMatrix::<u8>::zeros(10, 7);
        assert_eq!(m.shape(), (10, 7));
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.row_sums().len(), 10);
        assert_eq!(m.col_sums().len(), 7);
        assert_eq!(m.to_dense().dim(), (10, 7));
    }

    #[test]
    fn test_sums() {
        let m = SparseMatrix::from_triplets((2, 3), &[1u16, 2, 3], &[0, 1, 1], &[2, 0, 2]).unwrap();
        assert_relative_eq!(m.sum(), 6.0);
        assert_eq!(m.row_sums().to_vec(), vec![1.0, 5.0]);
        assert_eq!(m.col_sums().to_vec(), vec![2.0, 0.0, 4.0]);
        assert_eq!(m.row_dense(1).to_vec(), vec![2.0, 0.0, 3.0]);
    }

    #[test]
    fn test_slice_cols_from() {
        let m = SparseMatrix::from_triplets((2, 5), &[1u8, 1, 1], &[0, 0, 1], &[0, 3, 4]).unwrap();
        let s = m.slice_cols_from(2);
        assert_eq!(s.shape(), (2, 3));
        let t: Vec<_> = s.triplets().collect();
        assert_eq!(t, vec![(0, 1, 1), (1, 2, 1)]);
        s.check_canonical().unwrap();
    }

    #[test]
    fn test_map_values_and_triplet_arrays() {
        let m = SparseMatrix::from_triplets((2, 2), &[2u16, 4], &[1, 0], &[0, 1]).unwrap();
        let halved = m.map_values(|_, v| v as f64 / 2.0);
        let (data, row, col) = halved.to_triplets();
        assert_eq!(data, vec![2.0, 1.0]);
        assert_eq!(row, vec![0, 1]);
        assert_eq!(col, vec![1, 0]);
    }
}
