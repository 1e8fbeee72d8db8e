//! Run orchestration: batches of samples in, metrics and exports out.

use crate::confusion::ConfusionMatrix;
use crate::config::EvalConfig;
use crate::crosscheck::{CocoCrossCheck, CrossCheckStats};
use crate::decoder::{MaskDecoder, ProtoMaskDecoder};
use crate::error::{ObbSegError, Result};
use crate::evaluator::{SampleEvaluator, SampleOutcome};
use crate::export::{to_coco_records, to_txt_lines, CocoPrediction, MaskEncoder, TxtExport};
use crate::letterbox::scale_mask_to_native;
use crate::stats::{AccumulatedStats, RunCounters, StatsAccumulator};
use crate::summary::{ClassCounts, ObbSegMetrics};
use crate::types::{BinaryMask, GroundTruth, RawPredictions};
use log::{debug, info, warn};
use polars::prelude::DataFrame;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Results of a finished run.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub metrics: ObbSegMetrics,
    pub counters: RunCounters,
    pub counts: ClassCounts,
    pub confusion_matrix: Option<ConfusionMatrix>,
    /// External scores, when a cross-check ran and succeeded.
    pub cross_check: Option<CrossCheckStats>,
}

impl ValidationReport {
    pub fn results_dict(&self) -> BTreeMap<String, f64> {
        self.metrics.results_dict()
    }

    pub fn fitness(&self) -> f64 {
        self.metrics.fitness()
    }

    /// Per-class results table.
    pub fn table(&self, config: &EvalConfig) -> Result<DataFrame> {
        self.metrics.to_dataframe(config, &self.counts)
    }
}

/// Evaluates a dataset batch by batch.
///
/// # Example
///
/// ```
/// use obbseg_eval::config::EvalConfig;
/// use obbseg_eval::validator::Validator;
///
/// let mut validator = Validator::new(EvalConfig::default()).unwrap();
/// validator.update(&[], &[]).unwrap();
/// let report = validator.finalize().unwrap();
/// assert_eq!(report.metrics.boxes.map(), 0.0);
/// ```
pub struct Validator {
    config: EvalConfig,
    decoder: Box<dyn MaskDecoder>,
    cross_check: Option<Box<dyn CocoCrossCheck>>,
    accumulator: StatsAccumulator,
    confusion: Option<ConfusionMatrix>,
    encoder: Option<MaskEncoder>,
    records: Vec<CocoPrediction>,
    txt: Vec<TxtExport>,
}

impl Validator {
    /// Validate the config and start an empty run.
    pub fn new(config: EvalConfig) -> Result<Self> {
        config.validate()?;
        let encoder = if config.save_json {
            Some(MaskEncoder::new(config.workers)?)
        } else {
            None
        };
        info!(
            "validating {} classes at {} IoU thresholds, {:?} mask decoding",
            config.num_classes(),
            config.iou_thresholds.len(),
            config.decode_mode()
        );
        let mut validator = Self {
            accumulator: StatsAccumulator::new(config.iou_thresholds.len()),
            confusion: None,
            decoder: Box::new(ProtoMaskDecoder),
            cross_check: None,
            encoder,
            records: Vec::new(),
            txt: Vec::new(),
            config,
        };
        validator.reset();
        Ok(validator)
    }

    /// Replace the prototype mask decoder.
    pub fn with_decoder(mut self, decoder: Box<dyn MaskDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Attach an external COCO evaluator, consulted at finalize when exporting.
    pub fn with_cross_check(mut self, cross_check: Box<dyn CocoCrossCheck>) -> Self {
        if !self.config.save_json {
            warn!("cross-check attached but save_json is off; it will not run");
        }
        self.cross_check = Some(cross_check);
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Clear all accumulated state.
    pub fn reset(&mut self) {
        self.accumulator.reset();
        self.records.clear();
        self.txt.clear();
        self.confusion = self.config.confusion_matrix.then(|| {
            ConfusionMatrix::new(
                self.config.num_classes(),
                self.config.confusion_conf,
                self.config.confusion_iou,
            )
        });
    }

    /// Evaluate one batch of samples.
    ///
    /// Samples are evaluated in parallel and appended in input order. The
    /// first failing sample aborts the batch; its error carries the sample's
    /// index within the run.
    pub fn update(&mut self, ground_truths: &[GroundTruth], predictions: &[RawPredictions]) -> Result<()> {
        if ground_truths.len() != predictions.len() {
            return Err(ObbSegError::SampleCountMismatch {
                predictions: predictions.len(),
                ground_truths: ground_truths.len(),
            });
        }

        let offset = self.accumulator.counters().images_seen;
        let evaluator = SampleEvaluator::new(&self.config, self.decoder.as_ref());
        let outcomes: Vec<SampleOutcome> = ground_truths
            .par_iter()
            .zip(predictions.par_iter())
            .enumerate()
            .map(|(i, (gt, preds))| evaluator.evaluate(gt, preds).map_err(|e| e.in_sample(offset + i)))
            .collect::<Result<Vec<_>>>()?;

        let mut exported = Vec::new();
        if let Some(encoder) = &self.encoder {
            for (i, (gt, outcome)) in ground_truths.iter().zip(&outcomes).enumerate() {
                let records = self
                    .export_sample(encoder, gt, outcome)
                    .map_err(|e| e.in_sample(offset + i))?;
                exported.extend(records);
            }
        }

        let mut txt = Vec::new();
        if self.config.save_txt {
            for (gt, outcome) in ground_truths.iter().zip(&outcomes) {
                txt.push(TxtExport {
                    image_id: gt.image_id.clone(),
                    lines: to_txt_lines(
                        &outcome.predictions.detections,
                        gt.meta.original_shape,
                        self.config.save_conf,
                    ),
                });
            }
        }

        for (i, (gt, outcome)) in ground_truths.iter().zip(outcomes).enumerate() {
            if let Some(confusion) = &mut self.confusion {
                confusion.process_batch(
                    &outcome.predictions.detections,
                    &outcome.ground_truth.boxes,
                    &outcome.ground_truth.classes,
                );
            }
            debug!("{:?}: appended as sample {}", gt.image_id, offset + i);
            self.accumulator
                .push(outcome.record)
                .map_err(|e| e.in_sample(offset + i))?;
        }
        self.records.extend(exported);
        self.txt.extend(txt);
        Ok(())
    }

    fn export_sample(
        &self,
        encoder: &MaskEncoder,
        gt: &GroundTruth,
        outcome: &SampleOutcome,
    ) -> Result<Vec<CocoPrediction>> {
        let native: Vec<BinaryMask> = outcome
            .predictions
            .masks
            .iter()
            .map(|m| {
                scale_mask_to_native(
                    m,
                    &outcome.predictions.ratio_pad,
                    gt.meta.input_shape,
                    gt.meta.original_shape,
                )
            })
            .collect::<Result<_>>()?;
        let segmentations = encoder.encode_all(&native);
        to_coco_records(
            &gt.image_id,
            &outcome.predictions.detections,
            segmentations,
            &self.config,
        )
    }

    /// Statistics accumulated so far.
    pub fn stats(&self) -> &AccumulatedStats {
        self.accumulator.stats()
    }

    pub fn counters(&self) -> RunCounters {
        self.accumulator.counters()
    }

    pub fn confusion_matrix(&self) -> Option<&ConfusionMatrix> {
        self.confusion.as_ref()
    }

    /// COCO records collected so far (empty unless `save_json`).
    pub fn coco_records(&self) -> &[CocoPrediction] {
        &self.records
    }

    /// Text lines collected so far, one entry per image (empty unless `save_txt`).
    pub fn txt_exports(&self) -> &[TxtExport] {
        &self.txt
    }

    /// Summarize the run.
    pub fn finalize(&self) -> Result<ValidationReport> {
        let stats = self.accumulator.stats();
        let metrics = ObbSegMetrics::process(stats, &self.config.iou_thresholds);
        let counters = self.accumulator.counters();
        let nc = self.config.num_classes();
        let counts = ClassCounts {
            images: self.accumulator.images_per_class(nc),
            instances: self.accumulator.instances_per_class(nc),
            total_images: counters.images_seen,
        };

        info!("{}", self.accumulator.summary_string());
        if stats.target_classes.is_empty() {
            warn!("no labels found in the run, metrics are all zero");
        }

        let cross_check = self.run_cross_check();
        let report = ValidationReport {
            metrics,
            counters,
            counts,
            confusion_matrix: self.confusion.clone(),
            cross_check,
        };
        info!("{}", report.table(&self.config)?);
        Ok(report)
    }

    fn run_cross_check(&self) -> Option<CrossCheckStats> {
        if !self.config.save_json {
            return None;
        }
        let Some(cross_check) = &self.cross_check else {
            warn!("no COCO cross-check configured, skipping external scoring");
            return None;
        };
        match cross_check.evaluate(&self.records) {
            Ok(stats) => {
                info!(
                    "cross-check: box mAP50-95 {:.4}, mask mAP50-95 {:.4}",
                    stats.bbox.map50_95, stats.segm.map50_95
                );
                Some(stats)
            }
            Err(e) => {
                warn!("COCO cross-check failed, skipping: {}", e);
                None
            }
        }
    }
}
