//! Mapping between letterboxed network-input space and native image space.

use crate::error::{ObbSegError, Result};
use crate::mask::{binarize, resize_bilinear};
use crate::types::{BinaryMask, ImageMeta, RatioPad, RotatedBox};

/// Letterbox parameters for an image, derived from its shapes when not given.
///
/// The derived padding is rounded the same way the letterbox transform pads,
/// so undoing it is bit-reproducible for a given pair of shapes.
pub fn resolve_ratio_pad(meta: &ImageMeta) -> RatioPad {
    if let Some(ratio_pad) = meta.ratio_pad {
        return ratio_pad;
    }
    let (in_h, in_w) = (meta.input_shape.0 as f64, meta.input_shape.1 as f64);
    let (orig_h, orig_w) = (meta.original_shape.0 as f64, meta.original_shape.1 as f64);
    let gain = (in_h / orig_h).min(in_w / orig_w);
    let pad_x = ((in_w - orig_w * gain) / 2.0 - 0.1).round();
    let pad_y = ((in_h - orig_h * gain) / 2.0 - 0.1).round();
    RatioPad {
        gain,
        pad: (pad_x, pad_y),
    }
}

/// Expand a box normalized to `[0, 1]` into input pixels.
pub fn denormalize(rbox: &RotatedBox, (in_h, in_w): (usize, usize)) -> RotatedBox {
    rbox.scaled(in_w as f64, in_h as f64)
}

/// Undo padding and scaling, then clip to the native image.
///
/// The center is clamped into the image and each side to the image extent
/// along its own axis; the angle is untouched.
pub fn scale_box_to_native(
    rbox: &RotatedBox,
    ratio_pad: &RatioPad,
    (orig_h, orig_w): (usize, usize),
) -> RotatedBox {
    let (pad_x, pad_y) = ratio_pad.pad;
    let gain = ratio_pad.gain;
    RotatedBox {
        cx: ((rbox.cx - pad_x) / gain).clamp(0.0, orig_w as f64),
        cy: ((rbox.cy - pad_y) / gain).clamp(0.0, orig_h as f64),
        width: (rbox.width / gain).clamp(0.0, orig_w as f64),
        height: (rbox.height / gain).clamp(0.0, orig_h as f64),
        theta: rbox.theta,
    }
}

/// Crop the letterbox padding off a mask and resize it to the native shape.
///
/// The mask may be at any resolution proportional to the network input
/// (prototype resolution in fast decode mode); padding is rescaled to match.
/// Pass the same `ratio_pad` the mask's boxes were scaled with.
pub fn scale_mask_to_native(
    mask: &BinaryMask,
    ratio_pad: &RatioPad,
    input_shape: (usize, usize),
    original_shape: (usize, usize),
) -> Result<BinaryMask> {
    let (mh, mw) = mask.shape();
    let sx = mw as f64 / input_shape.1 as f64;
    let sy = mh as f64 / input_shape.0 as f64;
    let (pad_x, pad_y) = (ratio_pad.pad.0 * sx, ratio_pad.pad.1 * sy);

    let top = (pad_y - 0.1).round().max(0.0) as usize;
    let left = (pad_x - 0.1).round().max(0.0) as usize;
    let bottom = mh.saturating_sub((pad_y + 0.1).round().max(0.0) as usize);
    let right = mw.saturating_sub((pad_x + 0.1).round().max(0.0) as usize);
    if bottom <= top || right <= left {
        return Err(ObbSegError::ShapeMismatch(format!(
            "letterbox padding {:?} leaves nothing of a {}x{} mask",
            ratio_pad.pad, mh, mw
        )));
    }

    let (crop_h, crop_w) = (bottom - top, right - left);
    let mut plane = Vec::with_capacity(crop_h * crop_w);
    for y in top..bottom {
        plane.extend(mask.data[y * mw + left..y * mw + right].iter().map(|&v| f32::from(v)));
    }
    let resized = resize_bilinear(&plane, (crop_h, crop_w), original_shape)?;
    Ok(binarize(&resized, original_shape))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ImageMeta {
        ImageMeta {
            input_shape: (640, 640),
            original_shape: (480, 640),
            ratio_pad: None,
        }
    }

    #[test]
    fn test_derived_ratio_pad() {
        let rp = resolve_ratio_pad(&meta());
        assert_eq!(rp.gain, 1.0);
        assert_eq!(rp.pad, (0.0, 80.0));
    }

    #[test]
    fn test_scale_box_undoes_letterbox() {
        let rp = RatioPad {
            gain: 0.5,
            pad: (0.0, 80.0),
        };
        let rbox = RotatedBox::new(100.0, 180.0, 20.0, 10.0, 0.3);
        let native = scale_box_to_native(&rbox, &rp, (800, 1280));
        assert_eq!(native.cx, 200.0);
        assert_eq!(native.cy, 200.0);
        assert_eq!(native.width, 40.0);
        assert_eq!(native.height, 20.0);
        assert_eq!(native.theta, 0.3);
    }

    #[test]
    fn test_scale_box_clips_center() {
        let rp = RatioPad {
            gain: 1.0,
            pad: (0.0, 0.0),
        };
        let rbox = RotatedBox::new(-5.0, 700.0, 20.0, 10.0, 0.0);
        let native = scale_box_to_native(&rbox, &rp, (480, 640));
        assert_eq!(native.cx, 0.0);
        assert_eq!(native.cy, 480.0);
    }

    #[test]
    fn test_denormalize() {
        let rbox = RotatedBox::new(0.5, 0.25, 0.1, 0.2, 1.0);
        let pixels = denormalize(&rbox, (400, 800));
        assert_eq!(pixels.cx, 400.0);
        assert_eq!(pixels.cy, 100.0);
        assert_eq!(pixels.width, 80.0);
        assert_eq!(pixels.height, 80.0);
    }

    #[test]
    fn test_scale_mask_crops_padding() {
        // 4x4 input with one padded row top and bottom, native 2x4
        let meta = ImageMeta {
            input_shape: (4, 4),
            original_shape: (2, 4),
            ratio_pad: None,
        };
        let mask = BinaryMask::new(
            4,
            4,
            vec![0, 0, 0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0],
        )
        .unwrap();
        let rp = resolve_ratio_pad(&meta);
        let native = scale_mask_to_native(&mask, &rp, meta.input_shape, meta.original_shape).unwrap();
        assert_eq!(native.shape(), (2, 4));
        assert_eq!(native.data, vec![1, 1, 0, 0, 1, 1, 0, 0]);
    }

    #[test]
    fn test_scale_mask_uses_given_padding() {
        // Same 4x4 mask, padding one column on the left instead of rows
        let mask = BinaryMask::new(
            4,
            4,
            vec![0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0],
        )
        .unwrap();
        let rp = RatioPad {
            gain: 1.0,
            pad: (1.0, 0.0),
        };
        let native = scale_mask_to_native(&mask, &rp, (4, 4), (4, 2)).unwrap();
        assert_eq!(native.shape(), (4, 2));
        assert_eq!(native.data, vec![1, 0, 1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_scale_box_clips_sides() {
        let rp = RatioPad {
            gain: 0.5,
            pad: (0.0, 0.0),
        };
        let rbox = RotatedBox::new(100.0, 100.0, 400.0, 300.0, 0.2);
        let native = scale_box_to_native(&rbox, &rp, (480, 640));
        assert_eq!(native.width, 640.0);
        assert_eq!(native.height, 480.0);
        assert_eq!(native.theta, 0.2);
    }
}
