//! Pixel-mask Intersection over Union.

use crate::error::{ObbSegError, Result};
use crate::types::BinaryMask;
use rayon::prelude::*;

/// IoU matrix of shape `gt.len() × pred.len()` between binary masks.
///
/// Masks are compared as flattened bit vectors: the intersection is the dot
/// product of two rows and each mask's area is computed once. Two empty masks
/// have IoU `0`. All masks must share one resolution; resample beforehand
/// with [`crate::mask::resample_to`].
///
/// # Example
///
/// ```
/// use obbseg_eval::metrics::mask_iou::mask_iou;
/// use obbseg_eval::types::BinaryMask;
///
/// let a = BinaryMask::new(2, 2, vec![1, 1, 0, 0]).unwrap();
/// let iou = mask_iou(&[a.clone()], &[a]).unwrap();
/// assert_eq!(iou[0][0], 1.0);
/// ```
pub fn mask_iou(gt: &[BinaryMask], pred: &[BinaryMask]) -> Result<Vec<Vec<f64>>> {
    let shape = gt.first().or_else(|| pred.first()).map(BinaryMask::shape);
    if let Some(shape) = shape {
        if let Some(bad) = gt.iter().chain(pred).find(|m| m.shape() != shape) {
            return Err(ObbSegError::ShapeMismatch(format!(
                "mask IoU needs equal resolutions, got {:?} and {:?}",
                shape,
                bad.shape()
            )));
        }
    }

    let pred_areas: Vec<u64> = pred.iter().map(BinaryMask::area).collect();
    let matrix = gt
        .par_iter()
        .map(|g| {
            let g_area = g.area();
            pred.iter()
                .zip(&pred_areas)
                .map(|(p, &p_area)| {
                    let intersection = intersection_area(g, p);
                    let union = g_area + p_area - intersection;
                    if union == 0 {
                        0.0
                    } else {
                        intersection as f64 / union as f64
                    }
                })
                .collect()
        })
        .collect();
    Ok(matrix)
}

fn intersection_area(a: &BinaryMask, b: &BinaryMask) -> u64 {
    a.data
        .iter()
        .zip(&b.data)
        .map(|(&x, &y)| u64::from(x & y))
        .sum()
}
