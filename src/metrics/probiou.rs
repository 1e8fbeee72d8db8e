//! Probabilistic IoU between oriented boxes.
//!
//! Each rectangle is modelled as a 2-D Gaussian with covariance
//! `R(θ) · diag(w²/12, h²/12) · R(θ)ᵀ`. Two boxes are compared through the
//! Bhattacharyya distance `B` of their Gaussians, turned into the Hellinger
//! distance `sqrt(1 - exp(-B))`; the similarity is `1 - H`.

use crate::types::RotatedBox;
use rayon::prelude::*;

/// Floor applied to box sides so the covariance stays invertible.
pub const SIDE_EPS: f64 = 1e-7;

/// Upper clamp of the Bhattacharyya distance.
const MAX_DISTANCE: f64 = 100.0;

/// Covariance terms `(a, b, c)` of `[[a, c], [c, b]]`.
fn covariance(rbox: &RotatedBox) -> (f64, f64, f64) {
    let w = rbox.width.max(SIDE_EPS);
    let h = rbox.height.max(SIDE_EPS);
    let var_w = w * w / 12.0;
    let var_h = h * h / 12.0;
    let (sin, cos) = rbox.theta.sin_cos();
    let (cos2, sin2) = (cos * cos, sin * sin);
    (
        var_w * cos2 + var_h * sin2,
        var_w * sin2 + var_h * cos2,
        (var_w - var_h) * cos * sin,
    )
}

/// Probabilistic IoU of two oriented boxes, in `[0, 1]`.
///
/// # Example
///
/// ```
/// use obbseg_eval::metrics::probiou::probiou;
/// use obbseg_eval::types::RotatedBox;
///
/// let a = RotatedBox::new(100.0, 100.0, 50.0, 20.0, 0.3);
/// assert!((probiou(&a, &a) - 1.0).abs() < 1e-5);
/// ```
pub fn probiou(a: &RotatedBox, b: &RotatedBox) -> f64 {
    let (a1, b1, c1) = covariance(a);
    let (a2, b2, c2) = covariance(b);
    probiou_from_parts(a, (a1, b1, c1), b, (a2, b2, c2))
}

fn probiou_from_parts(
    p: &RotatedBox,
    (a1, b1, c1): (f64, f64, f64),
    q: &RotatedBox,
    (a2, b2, c2): (f64, f64, f64),
) -> f64 {
    let (sa, sb, sc) = (a1 + a2, b1 + b2, c1 + c2);
    let det_sum = (sa * sb - sc * sc).max(f64::MIN_POSITIVE);
    let dx = p.cx - q.cx;
    let dy = p.cy - q.cy;

    let t1 = (sa * dy * dy + sb * dx * dx) / det_sum * 0.25;
    let t2 = -(sc * dx * dy) / det_sum * 0.5;

    let det1 = (a1 * b1 - c1 * c1).max(0.0);
    let det2 = (a2 * b2 - c2 * c2).max(0.0);
    let norm = (4.0 * (det1 * det2).sqrt()).max(f64::MIN_POSITIVE);
    let t3 = (det_sum / norm).ln() * 0.5;

    let distance = t1 + t2 + t3;
    let distance = if distance.is_finite() {
        distance.clamp(0.0, MAX_DISTANCE)
    } else {
        MAX_DISTANCE
    };
    let hellinger = (-(-distance).exp_m1()).max(0.0).sqrt();
    1.0 - hellinger
}

/// Probabilistic IoU matrix of shape `gt.len() × pred.len()`.
///
/// Rows are computed in parallel; covariances are computed once per box.
pub fn batch_probiou(gt: &[RotatedBox], pred: &[RotatedBox]) -> Vec<Vec<f64>> {
    let pred_cov: Vec<(f64, f64, f64)> = pred.iter().map(covariance).collect();
    gt.par_iter()
        .map(|g| {
            let g_cov = covariance(g);
            pred.iter()
                .zip(&pred_cov)
                .map(|(p, &p_cov)| probiou_from_parts(g, g_cov, p, p_cov))
                .collect()
        })
        .collect()
}
