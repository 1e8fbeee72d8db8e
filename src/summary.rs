//! Run-level metric summaries for boxes and masks.

use crate::config::EvalConfig;
use crate::error::Result;
use crate::metrics::ap::{ap_per_class, calculate_map, ClassMetrics};
use crate::stats::AccumulatedStats;
use crate::types::ClassId;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Precision, recall and AP of one task (boxes or masks).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metric {
    pub class_metrics: ClassMetrics,
    /// Column of the 0.75 threshold, when the run uses one.
    map75_column: Option<usize>,
}

impl Metric {
    pub fn new(class_metrics: ClassMetrics, thresholds: &[f64]) -> Self {
        let map75_column = thresholds.iter().position(|&t| (t - 0.75).abs() < 1e-9);
        Self {
            class_metrics,
            map75_column,
        }
    }

    /// Classes with results, sorted.
    pub fn classes(&self) -> &[ClassId] {
        &self.class_metrics.classes
    }

    /// AP at the first threshold, per class.
    pub fn ap50(&self) -> Vec<f64> {
        self.class_metrics
            .ap
            .iter()
            .map(|row| row.first().copied().unwrap_or(0.0))
            .collect()
    }

    /// AP averaged over thresholds, per class.
    pub fn ap(&self) -> Vec<f64> {
        self.class_metrics.ap.iter().map(|row| calculate_map(row)).collect()
    }

    /// Mean precision over classes.
    pub fn mp(&self) -> f64 {
        calculate_map(&self.class_metrics.precision)
    }

    /// Mean recall over classes.
    pub fn mr(&self) -> f64 {
        calculate_map(&self.class_metrics.recall)
    }

    pub fn map50(&self) -> f64 {
        calculate_map(&self.ap50())
    }

    /// Mean AP at 0.75; `0.0` when 0.75 is not among the thresholds.
    pub fn map75(&self) -> f64 {
        match self.map75_column {
            Some(column) => {
                let values: Vec<f64> = self
                    .class_metrics
                    .ap
                    .iter()
                    .filter_map(|row| row.get(column).copied())
                    .collect();
                calculate_map(&values)
            }
            None => 0.0,
        }
    }

    /// Mean AP over classes and thresholds.
    pub fn map(&self) -> f64 {
        calculate_map(&self.ap())
    }

    /// `[mp, mr, map50, map]`
    pub fn mean_results(&self) -> [f64; 4] {
        [self.mp(), self.mr(), self.map50(), self.map()]
    }

    /// `(p, r, ap50, ap)` of the `i`-th class with results.
    pub fn class_result(&self, i: usize) -> (f64, f64, f64, f64) {
        let cm = &self.class_metrics;
        (
            cm.precision[i],
            cm.recall[i],
            cm.ap[i].first().copied().unwrap_or(0.0),
            calculate_map(&cm.ap[i]),
        )
    }

    /// AP per class id for `num_classes` classes; classes without results get `map`.
    pub fn maps(&self, num_classes: usize) -> Vec<f64> {
        let len = self
            .classes()
            .iter()
            .map(|&c| c + 1)
            .max()
            .unwrap_or(0)
            .max(num_classes);
        let mut maps = vec![self.map(); len];
        for (&class, ap) in self.classes().iter().zip(self.ap()) {
            maps[class] = ap;
        }
        maps
    }

    /// Weighted combination `0.1·mAP50 + 0.9·mAP50-95`.
    pub fn fitness(&self) -> f64 {
        0.1 * self.map50() + 0.9 * self.map()
    }
}

/// Image and instance counts per class id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub images: Vec<usize>,
    pub instances: Vec<usize>,
    pub total_images: usize,
}

const KEYS: [&str; 8] = [
    "metrics/precision(B)",
    "metrics/recall(B)",
    "metrics/mAP50(B)",
    "metrics/mAP50-95(B)",
    "metrics/precision(M)",
    "metrics/recall(M)",
    "metrics/mAP50(M)",
    "metrics/mAP50-95(M)",
];

/// Box and mask metrics of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObbSegMetrics {
    pub boxes: Metric,
    pub masks: Metric,
}

impl ObbSegMetrics {
    /// Compute both tasks from accumulated statistics.
    pub fn process(stats: &AccumulatedStats, thresholds: &[f64]) -> Self {
        let boxes = ap_per_class(
            &stats.box_correct,
            &stats.confidence,
            &stats.pred_classes,
            &stats.target_classes,
        );
        let masks = ap_per_class(
            &stats.mask_correct,
            &stats.confidence,
            &stats.pred_classes,
            &stats.target_classes,
        );
        Self {
            boxes: Metric::new(boxes, thresholds),
            masks: Metric::new(masks, thresholds),
        }
    }

    pub fn keys() -> [&'static str; 8] {
        KEYS
    }

    /// Box then mask mean results.
    pub fn mean_results(&self) -> [f64; 8] {
        let b = self.boxes.mean_results();
        let m = self.masks.mean_results();
        [b[0], b[1], b[2], b[3], m[0], m[1], m[2], m[3]]
    }

    pub fn fitness(&self) -> f64 {
        self.boxes.fitness() + self.masks.fitness()
    }

    /// Mean results keyed by metric name, plus `fitness`.
    pub fn results_dict(&self) -> BTreeMap<String, f64> {
        let mut results: BTreeMap<String, f64> = KEYS
            .iter()
            .zip(self.mean_results())
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        results.insert("fitness".to_string(), self.fitness());
        results
    }

    /// Per-class table, led by an `all` row.
    ///
    /// Columns: `Class`, `Images`, `Instances`, then `P`, `R`, `mAP50` and
    /// `mAP50-95` for boxes (`(B)`) and masks (`(M)`).
    pub fn to_dataframe(&self, config: &EvalConfig, counts: &ClassCounts) -> Result<DataFrame> {
        let classes = self.boxes.classes();
        let mut names = vec!["all".to_string()];
        let mut images = vec![counts.total_images as u64];
        let mut instances = vec![counts.instances.iter().sum::<usize>() as u64];
        let mut columns: Vec<Vec<f64>> = self.mean_results().iter().map(|&v| vec![v]).collect();

        for (i, &class) in classes.iter().enumerate() {
            names.push(config.class_name(class));
            images.push(counts.images.get(class).copied().unwrap_or(0) as u64);
            instances.push(counts.instances.get(class).copied().unwrap_or(0) as u64);
            let (bp, br, b50, b) = self.boxes.class_result(i);
            let (mp, mr, m50, m) = self.masks.class_result(i);
            for (column, value) in columns.iter_mut().zip([bp, br, b50, b, mp, mr, m50, m]) {
                column.push(value);
            }
        }

        let mut series: Vec<Column> = vec![
            Series::new("Class".into(), names).into(),
            Series::new("Images".into(), images).into(),
            Series::new("Instances".into(), instances).into(),
        ];
        let headers = [
            "P(B)", "R(B)", "mAP50(B)", "mAP50-95(B)", "P(M)", "R(M)", "mAP50(M)", "mAP50-95(M)",
        ];
        for (header, values) in headers.iter().zip(columns) {
            series.push(Series::new((*header).into(), values).into());
        }
        Ok(DataFrame::new(series)?)
    }
}
