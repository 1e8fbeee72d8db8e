//! Precision, recall and the curve helpers shared by AP computation.

/// Guard added to denominators that may be zero.
pub const EPS: f64 = 1e-16;

/// Container for precision and recall values.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecisionRecall {
    pub precision: f64,
    pub recall: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

/// Calculate precision and recall from TP, FP, and FN counts.
///
/// # Example
///
/// ```
/// use obbseg_eval::metrics::precision_recall::calculate_precision_recall;
///
/// let pr = calculate_precision_recall(8, 2, 3);
/// assert_eq!(pr.precision, 0.8);
/// assert!((pr.recall - 0.7272).abs() < 0.001);
/// ```
pub fn calculate_precision_recall(
    true_positives: usize,
    false_positives: usize,
    false_negatives: usize,
) -> PrecisionRecall {
    let precision = if true_positives + false_positives > 0 {
        true_positives as f64 / (true_positives + false_positives) as f64
    } else {
        0.0
    };

    let recall = if true_positives + false_negatives > 0 {
        true_positives as f64 / (true_positives + false_negatives) as f64
    } else {
        0.0
    };

    PrecisionRecall {
        precision,
        recall,
        true_positives,
        false_positives,
        false_negatives,
    }
}

/// Harmonic mean of precision and recall.
pub fn f1(precision: f64, recall: f64) -> f64 {
    2.0 * precision * recall / (precision + recall + EPS)
}

/// Cumulative precision and recall over detections sorted by confidence.
///
/// Returns `(precision, recall)`, one point per detection.
pub fn precision_recall_curve(is_true_positive: &[bool], num_ground_truth: usize) -> (Vec<f64>, Vec<f64>) {
    let mut precisions = Vec::with_capacity(is_true_positive.len());
    let mut recalls = Vec::with_capacity(is_true_positive.len());
    let mut tp = 0usize;

    for (i, &is_tp) in is_true_positive.iter().enumerate() {
        if is_tp {
            tp += 1;
        }
        precisions.push(tp as f64 / (i + 1) as f64);
        recalls.push(if num_ground_truth > 0 {
            tp as f64 / num_ground_truth as f64
        } else {
            0.0
        });
    }

    (precisions, recalls)
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be non-decreasing. Points left of `xp[0]` take `left`; points
/// right of the last sample take the last value.
pub fn interp(x: f64, xp: &[f64], fp: &[f64], left: f64) -> f64 {
    let Some(&last) = xp.last() else {
        return left;
    };
    if x < xp[0] {
        return left;
    }
    if x >= last {
        return fp[fp.len() - 1];
    }
    // Largest j with xp[j] <= x, so xp[j] <= x < xp[j + 1]
    let j = xp.partition_point(|&v| v <= x) - 1;
    let (x0, x1) = (xp[j], xp[j + 1]);
    let t = (x - x0) / (x1 - x0);
    fp[j] + t * (fp[j + 1] - fp[j])
}

/// Moving-average smoothing with a box filter spanning `fraction` of the data.
///
/// Edges are padded with the first and last values so the output keeps the
/// input length.
pub fn smooth(y: &[f64], fraction: f64) -> Vec<f64> {
    if y.is_empty() {
        return Vec::new();
    }
    let nf = ((y.len() as f64 * fraction * 2.0).round() as usize) / 2 + 1;
    let half = nf / 2;
    let mut padded = Vec::with_capacity(y.len() + 2 * half);
    padded.extend(std::iter::repeat(y[0]).take(half));
    padded.extend_from_slice(y);
    padded.extend(std::iter::repeat(y[y.len() - 1]).take(half));

    padded
        .windows(nf)
        .map(|w| w.iter().sum::<f64>() / nf as f64)
        .collect()
}
