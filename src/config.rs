//! Run configuration and its JSON loading.

use crate::error::{ObbSegError, Result};
use crate::threshold::{default_iou_thresholds, validate_iou_thresholds, validate_threshold};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// How predicted masks are decoded from prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskDecodeMode {
    /// Keep masks at prototype resolution; ground truth is resampled to it.
    Fast,
    /// Upsample to the network input resolution before cropping and thresholding.
    Accurate,
}

/// Evaluation settings, fixed for one run.
///
/// Every field has a default, so a JSON config only needs to name what it
/// changes.
///
/// # Example
///
/// ```
/// use obbseg_eval::config::{load_from_string, MaskDecodeMode};
///
/// let config = load_from_string(r#"{ "save_json": true, "names": ["plane", "ship"] }"#).unwrap();
/// assert_eq!(config.decode_mode(), MaskDecodeMode::Accurate);
/// assert_eq!(config.num_classes(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// IoU thresholds; the first is reported as mAP50.
    pub iou_thresholds: Vec<f64>,
    /// Explicit decode mode; when absent, accurate if exporting, else fast.
    pub mask_decode: Option<MaskDecodeMode>,
    /// Treat every prediction as class 0.
    pub single_cls: bool,
    /// Maintain a confusion matrix during the run.
    pub confusion_matrix: bool,
    /// Minimum confidence for a prediction to enter the confusion matrix.
    pub confusion_conf: f64,
    /// Minimum box similarity for a confusion-matrix match.
    pub confusion_iou: f64,
    /// Collect COCO-style export records during the run.
    pub save_json: bool,
    /// Collect normalized text lines per image during the run.
    pub save_txt: bool,
    /// Append the confidence to each text line.
    pub save_conf: bool,
    /// Worker threads for mask encoding; all cores when absent.
    pub workers: Option<usize>,
    /// Class names indexed by class id.
    pub names: Vec<String>,
    /// Dataset category id for each class id, used for export.
    pub class_map: Option<Vec<u64>>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            iou_thresholds: default_iou_thresholds(),
            mask_decode: None,
            single_cls: false,
            confusion_matrix: false,
            confusion_conf: 0.25,
            confusion_iou: 0.45,
            save_json: false,
            save_txt: false,
            save_conf: false,
            workers: None,
            names: Vec::new(),
            class_map: None,
        }
    }
}

impl EvalConfig {
    /// Decode mode for this run.
    pub fn decode_mode(&self) -> MaskDecodeMode {
        self.mask_decode.unwrap_or(if self.save_json || self.save_txt {
            MaskDecodeMode::Accurate
        } else {
            MaskDecodeMode::Fast
        })
    }

    /// Number of classes named by the config.
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Display name of a class, falling back to its index.
    pub fn class_name(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }

    /// Dataset category id for a class id.
    pub fn category_id(&self, class_id: usize) -> u64 {
        self.class_map
            .as_ref()
            .and_then(|map| map.get(class_id).copied())
            .unwrap_or(class_id as u64)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        validate_iou_thresholds(&self.iou_thresholds)?;
        validate_threshold(self.confusion_conf)?;
        validate_threshold(self.confusion_iou)?;
        if self.workers == Some(0) {
            return Err(ObbSegError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.confusion_matrix && self.names.is_empty() {
            return Err(ObbSegError::InvalidConfig(
                "confusion_matrix needs class names".to_string(),
            ));
        }
        if let Some(map) = &self.class_map {
            if !self.names.is_empty() && map.len() != self.names.len() {
                return Err(ObbSegError::InvalidConfig(format!(
                    "class_map has {} entries for {} names",
                    map.len(),
                    self.names.len()
                )));
            }
        }
        Ok(())
    }
}

/// Load a config from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<EvalConfig> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config: EvalConfig = serde_json::from_reader(reader)?;
    config.validate()?;
    Ok(config)
}

/// Load a config from a JSON string.
pub fn load_from_string(json_str: &str) -> Result<EvalConfig> {
    let config: EvalConfig = serde_json::from_str(json_str)?;
    config.validate()?;
    Ok(config)
}
