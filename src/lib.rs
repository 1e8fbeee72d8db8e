//! # obbseg-eval
//!
//! Evaluation metrics for models that predict oriented bounding boxes
//! together with per-instance segmentation masks.
//!
//! Every prediction is scored twice, once by box agreement (probabilistic
//! IoU between rotated boxes) and once by mask agreement (pixel IoU), across
//! a fixed set of IoU thresholds. The results are reported as:
//! - **Precision** and **Recall** at the confidence maximizing mean F1
//! - **mAP50** (Average Precision at the first IoU threshold)
//! - **mAP75**
//! - **mAP50-95** (mean over all thresholds)
//!
//! ## Pipeline
//!
//! 1. [`evaluator::SampleEvaluator`] brings one image's ground truth and
//!    predictions into comparable coordinates and decodes predicted masks.
//! 2. [`matching::match_predictions`] turns a similarity matrix into a
//!    per-threshold correctness matrix by greedy one-to-one assignment.
//! 3. [`stats::StatsAccumulator`] collects the per-image records.
//! 4. [`summary::ObbSegMetrics`] computes per-class AP and the summaries.
//!
//! [`validator::Validator`] drives all of this over batches, in parallel.
//!
//! ## Quick Start
//!
//! ```rust
//! use obbseg_eval::config::load_from_string;
//! use obbseg_eval::types::*;
//! use obbseg_eval::validator::Validator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_from_string(r#"{ "names": ["vehicle"] }"#)?;
//! let mut validator = Validator::new(config)?;
//!
//! let meta = ImageMeta { input_shape: (64, 64), original_shape: (64, 64), ratio_pad: None };
//! let mut mask = vec![0u8; 64 * 64];
//! for y in 28..36 {
//!     for x in 16..48 {
//!         mask[y * 64 + x] = 1;
//!     }
//! }
//! let mask = BinaryMask::new(64, 64, mask)?;
//! let gt = GroundTruth {
//!     image_id: ImageId::from_stem("000001"),
//!     classes: vec![0],
//!     boxes: vec![RotatedBox::new(0.5, 0.5, 0.5, 0.125, 0.0)],
//!     masks: GroundTruthMasks::PerInstance(vec![mask.clone()]),
//!     meta,
//! };
//! let preds = RawPredictions {
//!     rows: vec![vec![32.0, 32.0, 32.0, 8.0, 0.9, 0.0, 0.0]],
//!     num_coefficients: 0,
//!     masks: PredictedMasks::Decoded(vec![mask]),
//!     ratio_pad: None,
//! };
//!
//! validator.update(&[gt], &[preds])?;
//! let report = validator.finalize()?;
//! println!("box mAP50-95: {:.4}", report.metrics.boxes.map());
//! println!("mask mAP50-95: {:.4}", report.metrics.masks.map());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod threshold;
pub mod metrics;
pub mod mask;
pub mod letterbox;
pub mod decoder;
pub mod matching;
pub mod evaluator;
pub mod stats;
pub mod confusion;
pub mod summary;
pub mod export;
pub mod crosscheck;
pub mod validator;

// Re-export commonly used types and functions
pub use error::{ObbSegError, Result};
pub use types::{
    BinaryMask, BoundingBox, CorrectnessMatrix, Detection, GroundTruth, GroundTruthMasks,
    ImageId, ImageMeta, OverlapMask, PredictedMasks, Prototypes, RatioPad, RawPredictions,
    RotatedBox,
};
pub use config::{load_from_file, load_from_string, EvalConfig, MaskDecodeMode};
pub use matching::match_predictions;
pub use metrics::{batch_probiou, mask_iou, probiou};
pub use stats::{StatRecord, StatsAccumulator};
pub use summary::{Metric, ObbSegMetrics};
pub use threshold::{default_iou_thresholds, generate_threshold_range};
pub use validator::{ValidationReport, Validator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_compiles() {
        let rbox = RotatedBox::new(0.0, 0.0, 10.0, 4.0, 0.0);
        assert!(rbox.is_valid());
        assert_eq!(default_iou_thresholds().len(), 10);
    }
}
