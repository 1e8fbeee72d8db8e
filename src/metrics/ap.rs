//! Average Precision (AP) per class and threshold.

use crate::metrics::precision_recall::{f1, interp, linspace, precision_recall_curve, smooth, EPS};
use crate::types::{ClassId, CorrectnessMatrix};
use std::collections::BTreeMap;

/// Points of the confidence grid used for the P, R and F1 curves.
const CURVE_POINTS: usize = 1000;

/// Calculate Average Precision from one precision-recall curve.
///
/// The curve is closed with sentinels `(0, 1)` and `(1, 0)`, precision is
/// replaced by its monotone envelope, sampled at 101 recall levels and
/// integrated with the trapezoidal rule. A curve that reaches full recall
/// with full precision therefore scores `0.995`.
///
/// # Example
///
/// ```
/// use obbseg_eval::metrics::ap::compute_ap;
///
/// let ap = compute_ap(&[0.5, 1.0], &[1.0, 1.0]);
/// assert!((ap - 0.995).abs() < 1e-9);
/// ```
pub fn compute_ap(recall: &[f64], precision: &[f64]) -> f64 {
    if recall.is_empty() || precision.is_empty() {
        return 0.0;
    }

    let mut mrec = Vec::with_capacity(recall.len() + 2);
    mrec.push(0.0);
    mrec.extend_from_slice(recall);
    mrec.push(1.0);

    let mut mpre = Vec::with_capacity(precision.len() + 2);
    mpre.push(1.0);
    mpre.extend_from_slice(precision);
    mpre.push(0.0);

    for i in (0..mpre.len() - 1).rev() {
        mpre[i] = mpre[i].max(mpre[i + 1]);
    }

    let x = linspace(0.0, 1.0, 101);
    let y: Vec<f64> = x.iter().map(|&xi| interp(xi, &mrec, &mpre, mpre[0])).collect();
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// Mean of a set of AP values; `0.0` when empty.
pub fn calculate_map(aps: &[f64]) -> f64 {
    if aps.is_empty() {
        return 0.0;
    }
    aps.iter().sum::<f64>() / aps.len() as f64
}

/// Per-class results of [`ap_per_class`].
///
/// Rows follow `classes`, the sorted classes present in the ground truth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassMetrics {
    pub classes: Vec<ClassId>,
    /// True positives at the selected confidence, per class.
    pub tp: Vec<f64>,
    /// False positives at the selected confidence, per class.
    pub fp: Vec<f64>,
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f1: Vec<f64>,
    /// `classes.len() × thresholds` AP values.
    pub ap: Vec<Vec<f64>>,
    /// Confidence grid of the curves below.
    pub confidence_grid: Vec<f64>,
    pub precision_curve: Vec<Vec<f64>>,
    pub recall_curve: Vec<Vec<f64>>,
    pub f1_curve: Vec<Vec<f64>>,
}

/// Compute precision, recall and AP per class.
///
/// # Arguments
///
/// * `correct` - Correctness rows, one per prediction
/// * `confidence` - Confidence of each prediction
/// * `pred_classes` - Predicted class of each prediction
/// * `target_classes` - Class of every ground-truth instance in the run
///
/// Predictions are ranked by descending confidence. Precision and recall are
/// reported at the single confidence that maximizes the smoothed mean F1
/// across classes. Classes never seen in ground truth are ignored.
pub fn ap_per_class(
    correct: &CorrectnessMatrix,
    confidence: &[f64],
    pred_classes: &[ClassId],
    target_classes: &[ClassId],
) -> ClassMetrics {
    let num_thresholds = correct.thresholds();

    let mut order: Vec<usize> = (0..confidence.len()).collect();
    order.sort_by(|&a, &b| confidence[b].total_cmp(&confidence[a]));

    let mut counts: BTreeMap<ClassId, usize> = BTreeMap::new();
    for &c in target_classes {
        *counts.entry(c).or_default() += 1;
    }
    let classes: Vec<ClassId> = counts.keys().copied().collect();
    let nc = classes.len();

    let grid = linspace(0.0, 1.0, CURVE_POINTS);
    let mut metrics = ClassMetrics {
        classes,
        ap: vec![vec![0.0; num_thresholds]; nc],
        precision_curve: vec![vec![0.0; CURVE_POINTS]; nc],
        recall_curve: vec![vec![0.0; CURVE_POINTS]; nc],
        ..ClassMetrics::default()
    };

    for (ci, &class) in metrics.classes.iter().enumerate() {
        let n_labels = counts[&class];
        let members: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| pred_classes[i] == class)
            .collect();
        if members.is_empty() || n_labels == 0 {
            continue;
        }

        let neg_conf: Vec<f64> = members.iter().map(|&i| -confidence[i]).collect();
        for t in 0..num_thresholds {
            let hits: Vec<bool> = members.iter().map(|&i| correct.get(i, t)).collect();
            let (precision, recall) = precision_recall_curve(&hits, n_labels);

            if t == 0 {
                for (g, &x) in grid.iter().enumerate() {
                    metrics.recall_curve[ci][g] = interp(-x, &neg_conf, &recall, 0.0);
                    metrics.precision_curve[ci][g] = interp(-x, &neg_conf, &precision, 1.0);
                }
            }
            metrics.ap[ci][t] = compute_ap(&recall, &precision);
        }
    }

    metrics.f1_curve = metrics
        .precision_curve
        .iter()
        .zip(&metrics.recall_curve)
        .map(|(p, r)| p.iter().zip(r).map(|(&p, &r)| f1(p, r)).collect())
        .collect();

    let best = if nc == 0 {
        0
    } else {
        let mean_f1: Vec<f64> = (0..CURVE_POINTS)
            .map(|g| metrics.f1_curve.iter().map(|row| row[g]).sum::<f64>() / nc as f64)
            .collect();
        argmax(&smooth(&mean_f1, 0.1))
    };

    for (ci, &class) in metrics.classes.iter().enumerate() {
        let p = metrics.precision_curve[ci][best];
        let r = metrics.recall_curve[ci][best];
        let tp = (r * counts[&class] as f64).round();
        metrics.precision.push(p);
        metrics.recall.push(r);
        metrics.f1.push(metrics.f1_curve[ci][best]);
        metrics.tp.push(tp);
        metrics.fp.push((tp / (p + EPS) - tp).round());
    }
    metrics.confidence_grid = grid;

    metrics
}

/// Index of the first maximum.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_ap_empty_curve() {
        assert_eq!(compute_ap(&[], &[]), 0.0);
    }

    #[test]
    fn test_compute_ap_perfect() {
        let ap = compute_ap(&[0.25, 0.5, 0.75, 1.0], &[1.0; 4]);
        assert!((ap - 0.995).abs() < 1e-9);
    }

    #[test]
    fn test_compute_ap_half_recall() {
        // Precision 1 up to recall 0.5, then linear down to the (1, 0) sentinel
        let ap = compute_ap(&[0.5], &[1.0]);
        assert!((ap - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_map() {
        assert!((calculate_map(&[0.8, 0.9, 0.75, 0.85]) - 0.825).abs() < 1e-10);
        assert_eq!(calculate_map(&[]), 0.0);
    }

    #[test]
    fn test_ap_per_class_perfect() {
        let correct = CorrectnessMatrix::from_rows(&[vec![true, true], vec![true, true]]).unwrap();
        let metrics = ap_per_class(&correct, &[0.9, 0.8], &[0, 1], &[0, 1]);
        assert_eq!(metrics.classes, vec![0, 1]);
        for row in &metrics.ap {
            for &ap in row {
                assert!((ap - 0.995).abs() < 1e-9);
            }
        }
        assert!(metrics.precision.iter().all(|&p| p > 0.99));
        assert!(metrics.recall.iter().all(|&r| r > 0.99));
        assert_eq!(metrics.tp, vec![1.0, 1.0]);
        assert_eq!(metrics.fp, vec![0.0, 0.0]);
    }

    #[test]
    fn test_ap_per_class_ranks_by_confidence() {
        // The false positive outranks the true positive
        let correct = CorrectnessMatrix::from_rows(&[vec![true], vec![false]]).unwrap();
        let metrics = ap_per_class(&correct, &[0.3, 0.9], &[0, 0], &[0]);
        let ap = metrics.ap[0][0];
        assert!(ap > 0.4 && ap < 0.6, "ap = {}", ap);
    }

    #[test]
    fn test_ap_per_class_missing_predictions() {
        let correct = CorrectnessMatrix::zeros(0, 2);
        let metrics = ap_per_class(&correct, &[], &[], &[3, 3]);
        assert_eq!(metrics.classes, vec![3]);
        assert_eq!(metrics.ap, vec![vec![0.0, 0.0]]);
        assert_eq!(metrics.recall, vec![0.0]);
    }

    #[test]
    fn test_ap_per_class_no_targets() {
        let correct = CorrectnessMatrix::zeros(1, 1);
        let metrics = ap_per_class(&correct, &[0.5], &[0], &[]);
        assert!(metrics.classes.is_empty());
        assert!(metrics.ap.is_empty());
    }
}
