//! One-to-one assignment of predictions to ground truth across IoU thresholds.

use crate::types::{ClassId, CorrectnessMatrix};

/// A candidate pairing between a ground truth and a prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub gt_index: usize,
    pub pred_index: usize,
    pub iou: f64,
}

/// Greedily assign pairs with `iou >= threshold`, best overlap first.
///
/// `eligible(gt, pred)` filters pairs before assignment. Once a ground truth
/// or a prediction is taken it is removed from further consideration, so the
/// result is a one-to-one matching. Ties keep ground-truth-major order.
pub fn greedy_assign<F>(iou: &[Vec<f64>], threshold: f64, eligible: F) -> Vec<Match>
where
    F: Fn(usize, usize) -> bool,
{
    let mut candidates: Vec<Match> = Vec::new();
    for (gt_index, row) in iou.iter().enumerate() {
        for (pred_index, &value) in row.iter().enumerate() {
            if value >= threshold && eligible(gt_index, pred_index) {
                candidates.push(Match {
                    gt_index,
                    pred_index,
                    iou: value,
                });
            }
        }
    }

    // Stable sort keeps ties in scan order
    candidates.sort_by(|a, b| b.iou.total_cmp(&a.iou));

    let num_gt = iou.len();
    let num_pred = iou.first().map_or(0, Vec::len);
    let mut gt_taken = vec![false; num_gt];
    let mut pred_taken = vec![false; num_pred];
    let mut matches = Vec::new();

    for candidate in candidates {
        if gt_taken[candidate.gt_index] || pred_taken[candidate.pred_index] {
            continue;
        }
        gt_taken[candidate.gt_index] = true;
        pred_taken[candidate.pred_index] = true;
        matches.push(candidate);
    }

    matches
}

/// Build the correctness matrix for one sample.
///
/// # Arguments
///
/// * `iou` - Similarity matrix, `gt_classes.len()` rows by `pred_classes.len()` columns
/// * `pred_classes` - Class of each prediction
/// * `gt_classes` - Class of each ground truth
/// * `thresholds` - IoU thresholds, one matrix column each
///
/// # Returns
///
/// A `pred_classes.len() × thresholds.len()` matrix. A prediction is only
/// ever matched to a ground truth of its own class, and each threshold is
/// assigned independently.
///
/// # Example
///
/// ```
/// use obbseg_eval::matching::match_predictions;
///
/// let iou = vec![vec![0.7, 0.9]];
/// let correct = match_predictions(&iou, &[0, 0], &[0], &[0.5, 0.8]);
/// assert!(correct.get(1, 0) && correct.get(1, 1));
/// assert!(!correct.get(0, 0));
/// ```
pub fn match_predictions(
    iou: &[Vec<f64>],
    pred_classes: &[ClassId],
    gt_classes: &[ClassId],
    thresholds: &[f64],
) -> CorrectnessMatrix {
    let mut correct = CorrectnessMatrix::zeros(pred_classes.len(), thresholds.len());
    if gt_classes.is_empty() || pred_classes.is_empty() {
        return correct;
    }

    for (t, &threshold) in thresholds.iter().enumerate() {
        let same_class = |g: usize, p: usize| gt_classes[g] == pred_classes[p];
        for m in greedy_assign(iou, threshold, same_class) {
            correct.set(m.pred_index, t, true);
        }
    }

    correct
}
