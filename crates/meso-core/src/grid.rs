//! Square spatial grid over the simulated extent.
//!
//! Cells are left-closed `[e_k, e_{k+1})`; the far edge `e_G` is folded into
//! the last cell so that every coordinate of the closed extent maps somewhere.
//! Both the spike projection and the neuron-count histogram go through
//! [`SpatialGrid::cell_of`].

use crate::{AnalysisError, CellId, Millimeter, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialGrid {
    extent: Millimeter,
    bin_size: Millimeter,
    side: usize,
    edges: Vec<Millimeter>,
}

impl SpatialGrid {
    /// Grid centred on the origin covering `[-extent/2, extent/2]` on both axes.
    pub fn new(extent: Millimeter, bin_size: Millimeter) -> Result<Self> {
        if !(extent > 0.0) || !(bin_size > 0.0) {
            return Err(AnalysisError::Configuration(format!(
                "extent ({extent}) and spatial bin size ({bin_size}) must be positive"
            )));
        }
        let side = (extent / bin_size).round() as usize;
        if side == 0 {
            return Err(AnalysisError::Configuration(format!(
                "spatial bin size {bin_size} mm is larger than the extent {extent} mm"
            )));
        }
        if side % 2 != 0 {
            return Err(AnalysisError::Configuration(format!(
                "grid side length must be even, got {side} cells ({extent} mm / {bin_size} mm)"
            )));
        }

        let half = extent / 2.0;
        let edges = (0..=side)
            .map(|i| -half + extent * i as f64 / side as f64)
            .collect();

        Ok(Self {
            extent,
            bin_size,
            side,
            edges,
        })
    }

    /// Number of cells per axis (`G`)
    pub fn side(&self) -> usize {
        self.side
    }

    pub fn n_cells(&self) -> usize {
        self.side * self.side
    }

    pub fn extent(&self) -> Millimeter {
        self.extent
    }

    pub fn bin_size(&self) -> Millimeter {
        self.bin_size
    }

    /// The `G + 1` bin edges shared by both axes
    pub fn edges(&self) -> &[Millimeter] {
        &self.edges
    }

    /// Bin index of a single coordinate, `None` outside the closed extent.
    pub fn digitize(&self, v: Millimeter) -> Option<usize> {
        let first = self.edges[0];
        let last = self.edges[self.side];
        if v.is_nan() || v < first || v > last {
            return None;
        }
        let above = self.edges.partition_point(|&e| e <= v);
        Some((above - 1).min(self.side - 1))
    }

    /// Flattened cell of a position: `iy * G + ix`.
    pub fn cell_of(&self, x: Millimeter, y: Millimeter) -> Option<CellId> {
        let ix = self.digitize(x)?;
        let iy = self.digitize(y)?;
        Some(iy * self.side + ix)
    }

    /// `(ix, iy)` of a flattened cell
    pub fn cell_coords(&self, cell: CellId) -> (usize, usize) {
        (cell % self.side, cell / self.side)
    }

    /// Cells on both grid diagonals, grouped by ring distance from the centre.
    ///
    /// Ring `k` holds four cells: the two on the main diagonal and the two on
    /// the anti-diagonal that are `k` cells away from the four central cells.
    pub fn diagonal_rings(&self, n_rings: usize) -> Result<Vec<[CellId; 4]>> {
        if self.side % 2 != 0 {
            return Err(AnalysisError::Configuration(format!(
                "diagonal rings need an even grid side, got {}",
                self.side
            )));
        }
        let g = self.side;
        let c = g / 2;
        let flat = |ix: usize, iy: usize| iy * g + ix;
        Ok((0..n_rings.min(c))
            .map(|k| {
                let lo = c - 1 - k;
                let hi = c + k;
                [flat(lo, lo), flat(hi, hi), flat(g - 1 - lo, lo), flat(g - 1 - hi, hi)]
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_edges_cover_extent() {
        let grid = SpatialGrid::new(4.0, 0.1).unwrap();
        assert_eq!(grid.side(), 40);
        assert_eq!(grid.edges().len(), 41);
        assert_relative_eq!(grid.edges()[0], -2.0);
        assert_relative_eq!(grid.edges()[40], 2.0);
    }

    #[test]
    fn test_odd_side_rejected() {
        let err = SpatialGrid::new(3.0, 1.0);
        assert!(matches!(err, Err(AnalysisError::Configuration(_))));
    }

    #[test]
    fn test_digitize_edge_convention() {
        let grid = SpatialGrid::new(2.0, 1.0).unwrap();
        assert_eq!(grid.digitize(-1.0), Some(0));
        assert_eq!(grid.digitize(-0.5), Some(0));
        // interior edge belongs to the upper cell
        assert_eq!(grid.digitize(0.0), Some(1));
        // far edge folds into the last cell
        assert_eq!(grid.digitize(1.0), Some(1));
        assert_eq!(grid.digitize(1.0001), None);
        assert_eq!(grid.digitize(-1.0001), None);
        assert_eq!(grid.digitize(f64::NAN), None);
    }

    #[test]
    fn test_cell_of_is_row_major_in_y() {
        let grid = SpatialGrid::new(2.0, 1.0).unwrap();
        assert_eq!(grid.cell_of(-0.5, -0.5), Some(0));
        assert_eq!(grid.cell_of(0.5, -0.5), Some(1));
        assert_eq!(grid.cell_of(-0.5, 0.5), Some(2));
        assert_eq!(grid.cell_of(0.5, 0.5), Some(3));
        assert_eq!(grid.cell_coords(2), (0, 1));
    }

    #[test]
    fn test_diagonal_rings() {
        let grid = SpatialGrid::new(4.0, 1.0).unwrap();
        let rings = grid.diagonal_rings(5).unwrap();
        // clipped to G/2
        assert_eq!(rings.len(), 2);
        // innermost ring: the four central cells of a 4x4 grid
        let mut inner = rings[0].to_vec();
        inner.sort();
        assert_eq!(inner, vec![5, 6, 9, 10]);
        let mut outer = rings[1].to_vec();
        outer.sort();
        assert_eq!(outer, vec![0, 3, 12, 15]);
    }
}
