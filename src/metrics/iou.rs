//! Axis-aligned Intersection over Union (IoU).
//!
//! Reference path only: oriented boxes are compared with
//! [`batch_probiou`](crate::metrics::probiou::batch_probiou).

use crate::types::{BoundingBox, RotatedBox};

/// Calculate the IoU between two axis-aligned boxes.
///
/// Returns a value between 0.0 (no overlap) and 1.0 (perfect overlap).
///
/// # Example
///
/// ```
/// use obbseg_eval::metrics::iou::box_iou;
/// use obbseg_eval::types::BoundingBox;
///
/// let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
/// let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
/// let iou = box_iou(&a, &b);
/// assert!(iou > 0.0 && iou < 1.0);
/// ```
pub fn box_iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let inter_w = (a.right().min(b.right()) - a.x.max(b.x)).max(0.0);
    let inter_h = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0.0);
    let intersection = inter_w * inter_h;

    let union = a.area() + b.area() - intersection;
    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

/// IoU matrix between two sets of boxes; `result[i][j]` pairs `a[i]` with `b[j]`.
pub fn box_iou_matrix(a: &[BoundingBox], b: &[BoundingBox]) -> Vec<Vec<f64>> {
    a.iter()
        .map(|bbox_a| b.iter().map(|bbox_b| box_iou(bbox_a, bbox_b)).collect())
        .collect()
}

/// IoU of the axis-aligned envelopes of two oriented boxes.
///
/// Ignores orientation beyond the envelope; useful as a coarse sanity check
/// against the probabilistic IoU.
pub fn envelope_iou(a: &RotatedBox, b: &RotatedBox) -> f64 {
    box_iou(&a.to_axis_aligned(), &b.to_axis_aligned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((box_iou(&a, &a) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_no_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(box_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        // 25 / (100 + 100 - 25)
        assert!((box_iou(&a, &b) - 25.0 / 175.0).abs() < 1e-10);
    }

    #[test]
    fn test_zero_area_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(box_iou(&a, &a), 0.0);
    }

    #[test]
    fn test_iou_matrix_shape() {
        let a = vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(5.0, 5.0, 10.0, 10.0),
        ];
        let b = vec![BoundingBox::new(0.0, 0.0, 10.0, 10.0)];
        let matrix = box_iou_matrix(&a, &b);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0].len(), 1);
        assert!((matrix[0][0] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_envelope_iou_unrotated() {
        let a = RotatedBox::new(5.0, 5.0, 10.0, 10.0, 0.0);
        let b = RotatedBox::new(10.0, 10.0, 10.0, 10.0, 0.0);
        assert!((envelope_iou(&a, &b) - 25.0 / 175.0).abs() < 1e-10);
    }
}
