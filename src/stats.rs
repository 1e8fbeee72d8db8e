//! Per-sample statistics records and their run-wide accumulation.
//!
//! A [`StatRecord`] is produced for every evaluated image. The
//! [`StatsAccumulator`] owned by the run appends records into
//! [`AccumulatedStats`], whose sequences stay row-aligned: row `i` of
//! `confidence`, `pred_classes`, `box_correct` and `mask_correct` describe
//! the same prediction.

use crate::error::{ObbSegError, Result};
use crate::types::{ClassId, CorrectnessMatrix};
use serde::{Deserialize, Serialize};

/// Statistics of one evaluated image.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub confidence: Vec<f64>,
    pub pred_classes: Vec<ClassId>,
    pub box_correct: CorrectnessMatrix,
    pub mask_correct: CorrectnessMatrix,
    pub target_classes: Vec<ClassId>,
    /// Distinct classes present in the image's ground truth, sorted.
    pub image_classes: Vec<ClassId>,
}

impl StatRecord {
    /// Record for an image without predictions.
    pub fn without_predictions(target_classes: Vec<ClassId>, num_thresholds: usize) -> Self {
        let image_classes = distinct(&target_classes);
        Self {
            confidence: Vec::new(),
            pred_classes: Vec::new(),
            box_correct: CorrectnessMatrix::zeros(0, num_thresholds),
            mask_correct: CorrectnessMatrix::zeros(0, num_thresholds),
            target_classes,
            image_classes,
        }
    }

    /// Number of prediction rows.
    pub fn num_predictions(&self) -> usize {
        self.confidence.len()
    }

    fn validate(&self, num_thresholds: usize) -> Result<()> {
        let n = self.confidence.len();
        if self.pred_classes.len() != n
            || self.box_correct.rows() != n
            || self.mask_correct.rows() != n
        {
            return Err(ObbSegError::ShapeMismatch(format!(
                "record rows disagree: {} confidences, {} classes, {} box rows, {} mask rows",
                n,
                self.pred_classes.len(),
                self.box_correct.rows(),
                self.mask_correct.rows()
            )));
        }
        if n > 0
            && (self.box_correct.thresholds() != num_thresholds
                || self.mask_correct.thresholds() != num_thresholds)
        {
            return Err(ObbSegError::ShapeMismatch(format!(
                "record has {}/{} threshold columns, run uses {}",
                self.box_correct.thresholds(),
                self.mask_correct.thresholds(),
                num_thresholds
            )));
        }
        Ok(())
    }
}

/// Sorted distinct values.
fn distinct(classes: &[ClassId]) -> Vec<ClassId> {
    let mut unique = classes.to_vec();
    unique.sort_unstable();
    unique.dedup();
    unique
}

/// Concatenated statistics of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedStats {
    pub confidence: Vec<f64>,
    pub pred_classes: Vec<ClassId>,
    pub box_correct: CorrectnessMatrix,
    pub mask_correct: CorrectnessMatrix,
    pub target_classes: Vec<ClassId>,
    /// Per-image distinct classes, concatenated.
    pub image_classes: Vec<ClassId>,
}

/// Counters describing the images seen by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Images evaluated.
    pub images_seen: usize,
    /// Images that had no predictions.
    pub images_without_predictions: usize,
    /// Images that had no ground truth.
    pub images_without_labels: usize,
}

/// Append-only owner of a run's statistics.
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    num_thresholds: usize,
    stats: AccumulatedStats,
    counters: RunCounters,
}

impl StatsAccumulator {
    /// Create an empty accumulator for `num_thresholds` IoU thresholds.
    pub fn new(num_thresholds: usize) -> Self {
        Self {
            num_thresholds,
            stats: AccumulatedStats {
                box_correct: CorrectnessMatrix::zeros(0, num_thresholds),
                mask_correct: CorrectnessMatrix::zeros(0, num_thresholds),
                ..AccumulatedStats::default()
            },
            counters: RunCounters::default(),
        }
    }

    /// Drop everything accumulated so far.
    pub fn reset(&mut self) {
        *self = Self::new(self.num_thresholds);
    }

    pub fn num_thresholds(&self) -> usize {
        self.num_thresholds
    }

    /// Append one image's record.
    pub fn push(&mut self, record: StatRecord) -> Result<()> {
        record.validate(self.num_thresholds)?;

        self.counters.images_seen += 1;
        if record.num_predictions() == 0 {
            self.counters.images_without_predictions += 1;
        }
        if record.target_classes.is_empty() {
            self.counters.images_without_labels += 1;
        }

        self.stats.box_correct.append(&record.box_correct)?;
        self.stats.mask_correct.append(&record.mask_correct)?;
        self.stats.confidence.extend(record.confidence);
        self.stats.pred_classes.extend(record.pred_classes);
        self.stats.target_classes.extend(record.target_classes);
        self.stats.image_classes.extend(record.image_classes);
        Ok(())
    }

    /// Append another accumulator's contents after this one's.
    pub fn merge(&mut self, other: StatsAccumulator) -> Result<()> {
        if other.num_thresholds != self.num_thresholds {
            return Err(ObbSegError::ShapeMismatch(format!(
                "cannot merge accumulators with {} and {} thresholds",
                self.num_thresholds, other.num_thresholds
            )));
        }
        let StatsAccumulator { stats, counters, .. } = other;
        self.stats.box_correct.append(&stats.box_correct)?;
        self.stats.mask_correct.append(&stats.mask_correct)?;
        self.stats.confidence.extend(stats.confidence);
        self.stats.pred_classes.extend(stats.pred_classes);
        self.stats.target_classes.extend(stats.target_classes);
        self.stats.image_classes.extend(stats.image_classes);
        self.counters.images_seen += counters.images_seen;
        self.counters.images_without_predictions += counters.images_without_predictions;
        self.counters.images_without_labels += counters.images_without_labels;
        Ok(())
    }

    /// Read access to the concatenated sequences.
    pub fn stats(&self) -> &AccumulatedStats {
        &self.stats
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// Ground-truth instances per class, for classes `0..num_classes`.
    pub fn instances_per_class(&self, num_classes: usize) -> Vec<usize> {
        bincount(&self.stats.target_classes, num_classes)
    }

    /// Images containing each class, for classes `0..num_classes`.
    pub fn images_per_class(&self, num_classes: usize) -> Vec<usize> {
        bincount(&self.stats.image_classes, num_classes)
    }

    /// Get a formatted string summary of the run.
    pub fn summary_string(&self) -> String {
        format!(
            "StatsAccumulator {{ images: {}, predictions: {}, instances: {}, empty_predictions: {}, empty_labels: {} }}",
            self.counters.images_seen,
            self.stats.confidence.len(),
            self.stats.target_classes.len(),
            self.counters.images_without_predictions,
            self.counters.images_without_labels
        )
    }
}

fn bincount(values: &[ClassId], minlength: usize) -> Vec<usize> {
    let len = values.iter().map(|&v| v + 1).max().unwrap_or(0).max(minlength);
    let mut counts = vec![0; len];
    for &v in values {
        counts[v] += 1;
    }
    counts
}
