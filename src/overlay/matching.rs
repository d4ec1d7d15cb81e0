//! Matching utilities for carrying slot identity across frames.

use ndarray::Array2;

use crate::detection::Rect;

/// Compute IoU distance matrix between previously shown boxes and detections.
pub fn iou_distance(previous: &[Rect], current: &[Rect]) -> Array2<f32> {
    let mut dists = Array2::zeros((previous.len(), current.len()));
    for (i, p) in previous.iter().enumerate() {
        for (j, c) in current.iter().enumerate() {
            dists[[i, j]] = 1.0 - p.iou(c);
        }
    }
    dists
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    /// `(previous, current)` index pairs
    pub matches: Vec<(usize, usize)>,
    /// Ascending, so rank order is preserved
    pub unmatched_current: Vec<usize>,
}

/// Minimum-cost assignment, accepting pairs with cost `<= thresh`.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: Vec::new(),
            unmatched_current: (0..num_cols).collect(),
        };
    }

    // lapjv needs a square matrix; padding cells are never accepted.
    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for ((i, j), &cost) in cost_matrix.indexed_iter() {
        padded[[i, j]] = cost as f64;
    }

    let mut matches = vec![];
    let mut unmatched_current_mask = vec![true; num_cols];

    // On solver failure nothing matches and every detection takes a free
    // slot.
    if let Ok((row_to_col, _)) = lapjv::lapjv(&padded) {
        for (row, &col) in row_to_col.iter().enumerate().take(num_rows) {
            if col < num_cols && cost_matrix[[row, col]] <= thresh {
                matches.push((row, col));
                unmatched_current_mask[col] = false;
            }
        }
    }

    let unmatched_current = unmatched_current_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| u.then_some(i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapped_order_matches_back() {
        let previous = [Rect::new(0.0, 0.0, 0.2, 0.2), Rect::new(0.5, 0.5, 0.7, 0.7)];
        let current = [Rect::new(0.51, 0.5, 0.71, 0.7), Rect::new(0.01, 0.0, 0.21, 0.2)];
        let result = linear_assignment(&iou_distance(&previous, &current), 0.7);
        let mut matches = result.matches.clone();
        matches.sort();
        assert_eq!(matches, vec![(0, 1), (1, 0)]);
        assert!(result.unmatched_current.is_empty());
    }

    #[test]
    fn test_far_boxes_stay_unmatched() {
        let previous = [Rect::new(0.0, 0.0, 0.1, 0.1)];
        let current = [Rect::new(0.8, 0.8, 0.9, 0.9), Rect::new(0.4, 0.4, 0.5, 0.5)];
        let result = linear_assignment(&iou_distance(&previous, &current), 0.7);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_current, vec![0, 1]);
    }

    #[test]
    fn test_empty_inputs() {
        let result = linear_assignment(&Array2::zeros((0, 3)), 0.7);
        assert_eq!(result.unmatched_current, vec![0, 1, 2]);
        let result = linear_assignment(&Array2::zeros((2, 0)), 0.7);
        assert!(result.matches.is_empty());
        assert!(result.unmatched_current.is_empty());
    }
}
