//! Position sorting arrays for raster plots.

use meso_core::{NodeId, PositionRecord, SortingAxis};

/// Node ids ordered by position along `axis`; ties keep id order.
pub fn pos_sorting_array(positions: &PositionRecord, axis: SortingAxis) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = (0..positions.len()).collect();
    let coord = match axis {
        SortingAxis::X => &positions.x,
        SortingAxis::Y => &positions.y,
        SortingAxis::None => return ids,
    };
    ids.sort_by(|&a, &b| coord[a].total_cmp(&coord[b]));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorting_axes() {
        let pos = PositionRecord::from_rows(vec![
            (0, 0.4, -0.1),
            (1, -0.2, 0.3),
            (2, 0.1, -0.4),
        ])
        .unwrap();
        assert_eq!(pos_sorting_array(&pos, SortingAxis::X), vec![1, 2, 0]);
        assert_eq!(pos_sorting_array(&pos, SortingAxis::Y), vec![2, 0, 1]);
        assert_eq!(pos_sorting_array(&pos, SortingAxis::None), vec![0, 1, 2]);
    }
}
