//! IoU and confidence threshold utilities.

use crate::error::{ObbSegError, Result};

/// The standard IoU thresholds `0.50:0.05:0.95`.
///
/// # Example
///
/// ```
/// use obbseg_eval::threshold::default_iou_thresholds;
///
/// let thresholds = default_iou_thresholds();
/// assert_eq!(thresholds.len(), 10);
/// assert!((thresholds[9] - 0.95).abs() < 1e-12);
/// ```
pub fn default_iou_thresholds() -> Vec<f64> {
    (0..10).map(|i| 0.5 + 0.05 * i as f64).collect()
}

/// Generate a range of threshold values.
///
/// # Arguments
///
/// * `start` - Starting threshold value (inclusive)
/// * `end` - Ending threshold value (inclusive)
/// * `steps` - Number of threshold values to generate
///
/// # Errors
///
/// Returns an error if `steps` is zero, either bound is outside `[0, 1]`, or
/// `start > end`.
///
/// # Example
///
/// ```
/// use obbseg_eval::threshold::generate_threshold_range;
///
/// let thresholds = generate_threshold_range(0.5, 0.95, 10).unwrap();
/// assert_eq!(thresholds.len(), 10);
/// assert_eq!(thresholds[0], 0.5);
/// ```
pub fn generate_threshold_range(start: f64, end: f64, steps: usize) -> Result<Vec<f64>> {
    if steps == 0 {
        return Err(ObbSegError::InvalidThreshold(
            "Number of steps must be greater than 0".to_string(),
        ));
    }

    validate_threshold(start)?;
    validate_threshold(end)?;

    if start > end {
        return Err(ObbSegError::InvalidThreshold(format!(
            "Start threshold ({}) must be <= end threshold ({})",
            start, end
        )));
    }

    if steps == 1 {
        return Ok(vec![start]);
    }

    let step_size = (end - start) / (steps - 1) as f64;
    Ok((0..steps).map(|i| start + step_size * i as f64).collect())
}

/// Validate that a threshold is in the valid range [0.0, 1.0].
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ObbSegError::InvalidThreshold(format!(
            "Threshold must be between 0.0 and 1.0, got {}",
            threshold
        )));
    }
    Ok(())
}

/// Validate a run's IoU thresholds: non-empty, in `(0, 1]`, strictly ascending.
///
/// The first threshold is the one reported as mAP50.
pub fn validate_iou_thresholds(thresholds: &[f64]) -> Result<()> {
    if thresholds.is_empty() {
        return Err(ObbSegError::InvalidThreshold(
            "At least one IoU threshold is required".to_string(),
        ));
    }
    for &t in thresholds {
        validate_threshold(t)?;
        if t == 0.0 {
            return Err(ObbSegError::InvalidThreshold(
                "IoU threshold 0.0 would match disjoint shapes".to_string(),
            ));
        }
    }
    if thresholds.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ObbSegError::InvalidThreshold(format!(
            "IoU thresholds must be strictly ascending, got {:?}",
            thresholds
        )));
    }
    Ok(())
}
