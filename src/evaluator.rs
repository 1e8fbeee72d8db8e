//! Per-sample evaluation: coordinate preparation, box and mask matching.

use crate::config::EvalConfig;
use crate::decoder::MaskDecoder;
use crate::error::{ObbSegError, Result};
use crate::letterbox::{denormalize, resolve_ratio_pad, scale_box_to_native};
use crate::mask::prepare_ground_truth_masks;
use crate::matching::match_predictions;
use crate::metrics::mask_iou::mask_iou;
use crate::metrics::probiou::batch_probiou;
use crate::stats::StatRecord;
use crate::types::{
    BinaryMask, ClassId, CorrectnessMatrix, Detection, GroundTruth, PredictedMasks, RatioPad,
    RawPredictions, RotatedBox,
};
use log::debug;

/// Ground truth of one image in native pixels, boxes in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedGroundTruth {
    pub classes: Vec<ClassId>,
    pub boxes: Vec<RotatedBox>,
}

/// Predictions of one image: native-space detections and their masks.
///
/// Masks stay in letterboxed input space (or prototype space in fast mode);
/// they are only brought to native shape for export, with `ratio_pad`,
/// the same parameters the boxes were scaled with.
#[derive(Debug, Clone)]
pub struct PreparedPredictions {
    pub detections: Vec<Detection>,
    pub masks: Vec<BinaryMask>,
    pub ratio_pad: RatioPad,
}

/// Everything one evaluated image produces.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub record: StatRecord,
    pub ground_truth: PreparedGroundTruth,
    pub predictions: PreparedPredictions,
}

/// Evaluates single images against a fixed configuration.
pub struct SampleEvaluator<'a> {
    config: &'a EvalConfig,
    decoder: &'a dyn MaskDecoder,
}

impl<'a> SampleEvaluator<'a> {
    pub fn new(config: &'a EvalConfig, decoder: &'a dyn MaskDecoder) -> Self {
        Self { config, decoder }
    }

    /// Scale normalized ground-truth boxes to native pixels.
    pub fn prepare_ground_truth(&self, gt: &GroundTruth) -> Result<PreparedGroundTruth> {
        if gt.classes.len() != gt.boxes.len() {
            return Err(ObbSegError::ShapeMismatch(format!(
                "{} ground-truth classes for {} boxes",
                gt.classes.len(),
                gt.boxes.len()
            )));
        }
        let ratio_pad = resolve_ratio_pad(&gt.meta);
        let boxes = gt
            .boxes
            .iter()
            .map(|b| {
                let input = denormalize(b, gt.meta.input_shape);
                scale_box_to_native(&input, &ratio_pad, gt.meta.original_shape).canonical()
            })
            .collect();
        Ok(PreparedGroundTruth {
            classes: gt.classes.clone(),
            boxes,
        })
    }

    /// Parse prediction rows, decode their masks and scale boxes to native pixels.
    ///
    /// The predictions' own letterbox parameters win over the image's.
    pub fn prepare_predictions(
        &self,
        gt: &GroundTruth,
        preds: &RawPredictions,
    ) -> Result<PreparedPredictions> {
        let mut input_boxes = Vec::with_capacity(preds.rows.len());
        let mut coefficients = Vec::with_capacity(preds.rows.len());
        let mut detections = Vec::with_capacity(preds.rows.len());
        for row in &preds.rows {
            let (mut detection, coeffs) = Detection::parse_row(row, preds.num_coefficients)?;
            if self.config.single_cls {
                detection.class_id = 0;
            }
            input_boxes.push(detection.rbox);
            coefficients.push(coeffs);
            detections.push(detection);
        }

        let masks = match &preds.masks {
            PredictedMasks::Decoded(masks) => {
                if masks.len() != detections.len() {
                    return Err(ObbSegError::ShapeMismatch(format!(
                        "{} decoded masks for {} predictions",
                        masks.len(),
                        detections.len()
                    )));
                }
                masks.clone()
            }
            PredictedMasks::Prototypes(_) if detections.is_empty() => Vec::new(),
            PredictedMasks::Prototypes(prototypes) => self.decoder.decode(
                prototypes,
                &coefficients,
                &input_boxes,
                gt.meta.input_shape,
                self.config.decode_mode(),
            )?,
        };

        let ratio_pad = preds
            .ratio_pad
            .unwrap_or_else(|| resolve_ratio_pad(&gt.meta));
        for detection in &mut detections {
            detection.rbox =
                scale_box_to_native(&detection.rbox, &ratio_pad, gt.meta.original_shape).canonical();
        }

        Ok(PreparedPredictions {
            detections,
            masks,
            ratio_pad,
        })
    }

    /// Evaluate one image.
    pub fn evaluate(&self, gt: &GroundTruth, preds: &RawPredictions) -> Result<SampleOutcome> {
        let thresholds = &self.config.iou_thresholds;
        let ground_truth = self.prepare_ground_truth(gt)?;
        let predictions = self.prepare_predictions(gt, preds)?;
        let npr = predictions.detections.len();
        let nl = ground_truth.classes.len();

        if npr == 0 {
            debug!("{:?}: no predictions, {} labels", gt.image_id, nl);
            return Ok(SampleOutcome {
                record: StatRecord::without_predictions(ground_truth.classes.clone(), thresholds.len()),
                ground_truth,
                predictions,
            });
        }

        let pred_classes: Vec<ClassId> = predictions.detections.iter().map(|d| d.class_id).collect();
        let (box_correct, mask_correct) = if nl == 0 {
            (
                CorrectnessMatrix::zeros(npr, thresholds.len()),
                CorrectnessMatrix::zeros(npr, thresholds.len()),
            )
        } else {
            let pred_boxes: Vec<RotatedBox> = predictions.detections.iter().map(|d| d.rbox).collect();
            let box_iou = batch_probiou(&ground_truth.boxes, &pred_boxes);
            let box_correct =
                match_predictions(&box_iou, &pred_classes, &ground_truth.classes, thresholds);

            let target_shape = predictions.masks[0].shape();
            let gt_masks = prepare_ground_truth_masks(&gt.masks, nl, target_shape)?;
            let seg_iou = mask_iou(&gt_masks, &predictions.masks)?;
            let mask_correct =
                match_predictions(&seg_iou, &pred_classes, &ground_truth.classes, thresholds);
            (box_correct, mask_correct)
        };

        debug!(
            "{:?}: {} predictions, {} labels, {} box / {} mask hits at {:.2}",
            gt.image_id,
            npr,
            nl,
            box_correct.count_true(0),
            mask_correct.count_true(0),
            thresholds[0]
        );

        let record = StatRecord {
            confidence: predictions.detections.iter().map(|d| d.confidence).collect(),
            pred_classes,
            box_correct,
            mask_correct,
            image_classes: distinct(&ground_truth.classes),
            target_classes: ground_truth.classes.clone(),
        };
        Ok(SampleOutcome {
            record,
            ground_truth,
            predictions,
        })
    }
}

fn distinct(classes: &[ClassId]) -> Vec<ClassId> {
    let mut unique = classes.to_vec();
    unique.sort_unstable();
    unique.dedup();
    unique
}
