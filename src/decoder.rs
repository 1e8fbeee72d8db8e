//! Decoding predicted masks from prototypes and per-instance coefficients.

use crate::config::MaskDecodeMode;
use crate::error::{ObbSegError, Result};
use crate::mask::{binarize, resize_bilinear};
use crate::types::{BinaryMask, Prototypes, RotatedBox};
use rayon::prelude::*;

/// Turns compact mask predictions into binary rasters.
///
/// `boxes` are in network-input pixels; `input_shape` is `(height, width)`
/// of the network input. Implementations return one mask per coefficient
/// row, in order.
pub trait MaskDecoder: Send + Sync {
    fn decode(
        &self,
        prototypes: &Prototypes,
        coefficients: &[Vec<f32>],
        boxes: &[RotatedBox],
        input_shape: (usize, usize),
        mode: MaskDecodeMode,
    ) -> Result<Vec<BinaryMask>>;
}

/// Linear combination of prototypes, sigmoid, rotated-box crop, threshold.
///
/// In [`MaskDecodeMode::Fast`] the mask stays at prototype resolution; in
/// [`MaskDecodeMode::Accurate`] the probabilities are upsampled to the input
/// resolution first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoMaskDecoder;

impl ProtoMaskDecoder {
    fn probabilities(prototypes: &Prototypes, coefficients: &[f32]) -> Vec<f32> {
        let mut logits = vec![0.0f32; prototypes.height * prototypes.width];
        for (c, &weight) in coefficients.iter().enumerate() {
            for (acc, &value) in logits.iter_mut().zip(prototypes.channel(c)) {
                *acc += weight * value;
            }
        }
        logits.iter().map(|&x| 1.0 / (1.0 + (-x).exp())).collect()
    }
}

/// Zero every pixel whose index coordinates fall outside `rbox`.
pub fn crop_to_box(plane: &mut [f32], (height, width): (usize, usize), rbox: &RotatedBox) {
    for y in 0..height {
        for x in 0..width {
            if !rbox.contains(x as f64, y as f64) {
                plane[y * width + x] = 0.0;
            }
        }
    }
}

impl MaskDecoder for ProtoMaskDecoder {
    fn decode(
        &self,
        prototypes: &Prototypes,
        coefficients: &[Vec<f32>],
        boxes: &[RotatedBox],
        input_shape: (usize, usize),
        mode: MaskDecodeMode,
    ) -> Result<Vec<BinaryMask>> {
        if coefficients.len() != boxes.len() {
            return Err(ObbSegError::ShapeMismatch(format!(
                "{} coefficient rows for {} boxes",
                coefficients.len(),
                boxes.len()
            )));
        }
        if let Some(row) = coefficients.iter().find(|c| c.len() != prototypes.channels) {
            return Err(ObbSegError::ShapeMismatch(format!(
                "{} mask coefficients for {} prototype channels",
                row.len(),
                prototypes.channels
            )));
        }
        if input_shape.0 == 0 || input_shape.1 == 0 {
            return Err(ObbSegError::ShapeMismatch(format!(
                "input shape {:?} has no pixels",
                input_shape
            )));
        }

        let proto_shape = (prototypes.height, prototypes.width);
        coefficients
            .par_iter()
            .zip(boxes.par_iter())
            .map(|(coeffs, rbox)| {
                let probs = Self::probabilities(prototypes, coeffs);
                match mode {
                    MaskDecodeMode::Fast => {
                        let sx = prototypes.width as f64 / input_shape.1 as f64;
                        let sy = prototypes.height as f64 / input_shape.0 as f64;
                        let mut plane = probs;
                        crop_to_box(&mut plane, proto_shape, &rbox.scaled(sx, sy));
                        Ok(binarize(&plane, proto_shape))
                    }
                    MaskDecodeMode::Accurate => {
                        let mut plane = resize_bilinear(&probs, proto_shape, input_shape)?;
                        crop_to_box(&mut plane, input_shape, rbox);
                        Ok(binarize(&plane, input_shape))
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prototypes() -> Prototypes {
        // One channel, all ones on a 4x4 grid
        Prototypes::new(1, 4, 4, vec![1.0; 16]).unwrap()
    }

    #[test]
    fn test_fast_mode_keeps_prototype_resolution() {
        let rbox = RotatedBox::new(8.0, 8.0, 16.0, 16.0, 0.0);
        let masks = ProtoMaskDecoder
            .decode(&prototypes(), &[vec![5.0]], &[rbox], (16, 16), MaskDecodeMode::Fast)
            .unwrap();
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].shape(), (4, 4));
        assert_eq!(masks[0].area(), 16);
    }

    #[test]
    fn test_accurate_mode_upsamples_and_crops() {
        let rbox = RotatedBox::new(4.0, 4.0, 8.0, 8.0, 0.0);
        let masks = ProtoMaskDecoder
            .decode(&prototypes(), &[vec![5.0]], &[rbox], (16, 16), MaskDecodeMode::Accurate)
            .unwrap();
        assert_eq!(masks[0].shape(), (16, 16));
        assert_eq!(masks[0].get(2, 2), 1);
        assert_eq!(masks[0].get(12, 12), 0);
    }

    #[test]
    fn test_negative_logits_are_background() {
        let rbox = RotatedBox::new(8.0, 8.0, 16.0, 16.0, 0.0);
        let masks = ProtoMaskDecoder
            .decode(&prototypes(), &[vec![-5.0]], &[rbox], (16, 16), MaskDecodeMode::Fast)
            .unwrap();
        assert_eq!(masks[0].area(), 0);
    }

    #[test]
    fn test_coefficient_count_checked() {
        let rbox = RotatedBox::new(8.0, 8.0, 16.0, 16.0, 0.0);
        let result = ProtoMaskDecoder.decode(
            &prototypes(),
            &[vec![1.0, 2.0]],
            &[rbox],
            (16, 16),
            MaskDecodeMode::Fast,
        );
        assert!(matches!(result, Err(ObbSegError::ShapeMismatch(_))));
    }
}
