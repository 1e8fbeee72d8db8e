//! Mask preparation: overlap expansion, bilinear resampling and binarization.

use crate::error::{ObbSegError, Result};
use crate::types::{BinaryMask, GroundTruthMasks, OverlapMask};

/// Binarization threshold applied after resampling.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Source index and weights for one output coordinate.
fn source_taps(dst: usize, in_len: usize, out_len: usize) -> (usize, usize, f32, f32) {
    let scale = in_len as f32 / out_len as f32;
    let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
    let i0 = (src.floor() as usize).min(in_len - 1);
    let i1 = (i0 + 1).min(in_len - 1);
    let w1 = src - i0 as f32;
    (i0, i1, 1.0 - w1, w1)
}

/// Bilinearly resize a row-major plane.
///
/// Pixel centers are aligned at half-pixel offsets (no corner alignment), so
/// an `n`× upsample spreads each source pixel over an `n×n` block.
pub fn resize_bilinear(
    src: &[f32],
    (in_h, in_w): (usize, usize),
    (out_h, out_w): (usize, usize),
) -> Result<Vec<f32>> {
    if in_h == 0 || in_w == 0 || out_h == 0 || out_w == 0 {
        return Err(ObbSegError::ShapeMismatch(format!(
            "cannot resample {}x{} to {}x{}",
            in_h, in_w, out_h, out_w
        )));
    }
    if src.len() != in_h * in_w {
        return Err(ObbSegError::ShapeMismatch(format!(
            "plane of {}x{} needs {} values, got {}",
            in_h,
            in_w,
            in_h * in_w,
            src.len()
        )));
    }

    let cols: Vec<_> = (0..out_w).map(|x| source_taps(x, in_w, out_w)).collect();
    let mut out = Vec::with_capacity(out_h * out_w);
    for y in 0..out_h {
        let (y0, y1, wy0, wy1) = source_taps(y, in_h, out_h);
        let top = &src[y0 * in_w..(y0 + 1) * in_w];
        let bottom = &src[y1 * in_w..(y1 + 1) * in_w];
        for &(x0, x1, wx0, wx1) in &cols {
            let upper = top[x0] * wx0 + top[x1] * wx1;
            let lower = bottom[x0] * wx0 + bottom[x1] * wx1;
            out.push(upper * wy0 + lower * wy1);
        }
    }
    Ok(out)
}

/// Resample a binary mask to `shape` and binarize it at [`MASK_THRESHOLD`].
pub fn resample_to(mask: &BinaryMask, shape: (usize, usize)) -> Result<BinaryMask> {
    if mask.shape() == shape {
        return Ok(mask.clone());
    }
    let plane: Vec<f32> = mask.data.iter().map(|&v| f32::from(v)).collect();
    let resized = resize_bilinear(&plane, mask.shape(), shape)?;
    Ok(binarize(&resized, shape))
}

/// Threshold a probability plane into a binary mask.
pub fn binarize(plane: &[f32], (height, width): (usize, usize)) -> BinaryMask {
    BinaryMask {
        height,
        width,
        data: plane.iter().map(|&v| u8::from(v > MASK_THRESHOLD)).collect(),
    }
}

/// Split an overlap-encoded raster into one mask per instance.
///
/// Instance `i` owns the pixels whose value is `i + 1`.
pub fn expand_overlap(overlap: &OverlapMask, instances: usize) -> Vec<BinaryMask> {
    (0..instances)
        .map(|i| {
            let index = (i + 1) as u16;
            BinaryMask {
                height: overlap.height,
                width: overlap.width,
                data: overlap.data.iter().map(|&v| u8::from(v == index)).collect(),
            }
        })
        .collect()
}

/// Ground-truth masks, one per instance, at the predicted resolution.
pub fn prepare_ground_truth_masks(
    masks: &GroundTruthMasks,
    instances: usize,
    target: (usize, usize),
) -> Result<Vec<BinaryMask>> {
    let per_instance = match masks {
        GroundTruthMasks::Overlap(overlap) => {
            if let Some(&max) = overlap.data.iter().max() {
                if usize::from(max) > instances {
                    return Err(ObbSegError::ShapeMismatch(format!(
                        "overlap mask references instance {} but only {} labels exist",
                        max, instances
                    )));
                }
            }
            expand_overlap(overlap, instances)
        }
        GroundTruthMasks::PerInstance(list) => {
            if list.len() != instances {
                return Err(ObbSegError::ShapeMismatch(format!(
                    "{} ground-truth masks for {} labels",
                    list.len(),
                    instances
                )));
            }
            list.clone()
        }
    };
    per_instance
        .iter()
        .map(|m| resample_to(m, target))
        .collect()
}
