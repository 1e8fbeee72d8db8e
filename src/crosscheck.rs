//! Optional external scoring of exported records with a COCO-style evaluator.
//!
//! The cross-check never feeds back into the run's own statistics; its
//! numbers are reported next to them.

use crate::error::Result;
use crate::export::CocoPrediction;
use serde::{Deserialize, Serialize};

/// mAP pair reported by an external evaluator for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossCheckScore {
    pub map50_95: f64,
    pub map50: f64,
}

/// External scores for boxes and masks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossCheckStats {
    pub bbox: CrossCheckScore,
    pub segm: CrossCheckScore,
}

/// Scores exported records against the dataset's own annotations.
///
/// Failures are reported as errors and downgraded to a warning by the
/// validator.
pub trait CocoCrossCheck: Send + Sync {
    fn evaluate(&self, predictions: &[CocoPrediction]) -> Result<CrossCheckStats>;
}
