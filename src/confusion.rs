//! Detection confusion matrix with a background class.

use crate::matching::greedy_assign;
use crate::metrics::precision_recall::{calculate_precision_recall, PrecisionRecall};
use crate::metrics::probiou::batch_probiou;
use crate::types::{ClassId, Detection, RotatedBox};
use log::warn;
use serde::{Deserialize, Serialize};

/// `(nc + 1) × (nc + 1)` counts indexed `[predicted][actual]`.
///
/// Index `nc` is background: row `nc` counts missed ground truth, column
/// `nc` counts predictions that matched nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    num_classes: usize,
    conf: f64,
    iou_threshold: f64,
    matrix: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize, conf: f64, iou_threshold: f64) -> Self {
        Self {
            num_classes,
            conf,
            iou_threshold,
            matrix: vec![vec![0; num_classes + 1]; num_classes + 1],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Raw counts, `[predicted][actual]`.
    pub fn matrix(&self) -> &[Vec<u64>] {
        &self.matrix
    }

    fn bump(&mut self, predicted: ClassId, actual: ClassId) {
        self.matrix[predicted][actual] += 1;
    }

    /// Update with one image's native-space detections and ground truth.
    ///
    /// Detections below the confidence floor are ignored. Matching pairs
    /// boxes by probabilistic IoU above the matrix threshold, best first,
    /// regardless of class; a class mismatch then lands off the diagonal.
    /// Class ids outside the matrix are skipped with a warning.
    pub fn process_batch(
        &mut self,
        detections: &[Detection],
        gt_boxes: &[RotatedBox],
        gt_classes: &[ClassId],
    ) {
        let background = self.num_classes;
        let kept: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.confidence > self.conf)
            .filter(|d| {
                let known = d.class_id < background;
                if !known {
                    warn!("confusion matrix: skipping prediction of unknown class {}", d.class_id);
                }
                known
            })
            .collect();
        let (gt_boxes, gt_classes): (Vec<RotatedBox>, Vec<ClassId>) = gt_boxes
            .iter()
            .zip(gt_classes)
            .filter(|&(_, &c)| {
                let known = c < background;
                if !known {
                    warn!("confusion matrix: skipping label of unknown class {}", c);
                }
                known
            })
            .map(|(b, &c)| (*b, c))
            .unzip();

        if gt_classes.is_empty() {
            for d in kept {
                self.bump(d.class_id, background);
            }
            return;
        }
        if kept.is_empty() {
            for &gc in &gt_classes {
                self.bump(background, gc);
            }
            return;
        }

        let pred_boxes: Vec<RotatedBox> = kept.iter().map(|d| d.rbox).collect();
        let iou = batch_probiou(&gt_boxes, &pred_boxes);
        // Strictly above the threshold
        let threshold = self.iou_threshold;
        let matches = greedy_assign(&iou, threshold, |g, p| iou[g][p] > threshold);

        let mut pred_matched = vec![false; kept.len()];
        for (gi, &gc) in gt_classes.iter().enumerate() {
            match matches.iter().find(|m| m.gt_index == gi) {
                Some(m) => {
                    pred_matched[m.pred_index] = true;
                    self.bump(kept[m.pred_index].class_id, gc);
                }
                None => self.bump(background, gc),
            }
        }
        for (d, matched) in kept.iter().zip(pred_matched) {
            if !matched {
                self.bump(d.class_id, background);
            }
        }
    }

    /// True and false positives per class, background excluded.
    pub fn tp_fp(&self) -> (Vec<u64>, Vec<u64>) {
        let nc = self.num_classes;
        let tp: Vec<u64> = (0..nc).map(|i| self.matrix[i][i]).collect();
        let fp: Vec<u64> = (0..nc)
            .map(|i| self.matrix[i].iter().sum::<u64>() - self.matrix[i][i])
            .collect();
        (tp, fp)
    }

    /// Precision and recall of each class at the matrix operating point.
    pub fn precision_recall(&self) -> Vec<PrecisionRecall> {
        let nc = self.num_classes;
        (0..nc)
            .map(|i| {
                let tp = self.matrix[i][i];
                let predicted: u64 = self.matrix[i].iter().sum();
                let actual: u64 = self.matrix.iter().map(|row| row[i]).sum();
                calculate_precision_recall(tp as usize, (predicted - tp) as usize, (actual - tp) as usize)
            })
            .collect()
    }

    /// Column-normalized matrix (each actual class sums to 1).
    pub fn normalized(&self) -> Vec<Vec<f64>> {
        let size = self.num_classes + 1;
        let column_sums: Vec<u64> = (0..size)
            .map(|j| self.matrix.iter().map(|row| row[j]).sum())
            .collect();
        self.matrix
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&column_sums)
                    .map(|(&v, &sum)| if sum == 0 { 0.0 } else { v as f64 / sum as f64 })
                    .collect()
            })
            .collect()
    }
}
