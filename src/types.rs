//! Core data types for oriented boxes, masks and per-sample inputs.

use crate::error::{ObbSegError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Zero-based class index.
pub type ClassId = usize;

/// Represents an axis-aligned bounding box in COCO format (x, y, width, height).
///
/// Coordinates are in LTWH (Left-Top-Width-Height) format where:
/// - x: Left coordinate
/// - y: Top coordinate
/// - width: Box width
/// - height: Box height
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Get the area of the bounding box.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Get the right coordinate (x + width).
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Get the bottom coordinate (y + height).
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Check if the bounding box is valid (positive dimensions).
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// An oriented box: center, side lengths and rotation in radians.
///
/// The canonical form used throughout the crate has `width >= height` and
/// `theta` in `[0, π)`. See [`RotatedBox::canonical`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedBox {
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
    pub theta: f64,
}

impl RotatedBox {
    /// Create a rotated box without normalizing it.
    pub fn new(cx: f64, cy: f64, width: f64, height: f64, theta: f64) -> Self {
        Self {
            cx,
            cy,
            width,
            height,
            theta,
        }
    }

    /// Build a box from a `[cx, cy, w, h, theta]` tuple.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != 5 {
            return Err(ObbSegError::ShapeMismatch(format!(
                "rotated box expects 5 values, got {}",
                values.len()
            )));
        }
        Ok(Self::new(values[0], values[1], values[2], values[3], values[4]))
    }

    /// Normalize to `width >= height` and `theta ∈ [0, π)`.
    ///
    /// Swapping the sides while adding `π/2` describes the same rectangle, as
    /// does adding any multiple of `π`.
    pub fn canonical(&self) -> Self {
        let (width, height, theta) = if self.width >= self.height {
            (self.width, self.height, self.theta)
        } else {
            (self.height, self.width, self.theta + FRAC_PI_2)
        };
        let mut theta = theta.rem_euclid(PI);
        // rem_euclid can round up to exactly PI for tiny negative inputs
        if theta >= PI {
            theta = 0.0;
        }
        Self {
            cx: self.cx,
            cy: self.cy,
            width,
            height,
            theta,
        }
    }

    /// Area of the rectangle.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Check if the box has positive extent.
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// The four corners, counter-clockwise in image coordinates.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (sin, cos) = self.theta.sin_cos();
        let (hw, hh) = (self.width / 2.0, self.height / 2.0);
        let local = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];
        local.map(|(u, v)| (self.cx + u * cos - v * sin, self.cy + u * sin + v * cos))
    }

    /// Smallest axis-aligned box enclosing the rectangle.
    pub fn to_axis_aligned(&self) -> BoundingBox {
        let corners = self.corners();
        let (mut x1, mut y1) = (f64::INFINITY, f64::INFINITY);
        let (mut x2, mut y2) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            x1 = x1.min(x);
            y1 = y1.min(y);
            x2 = x2.max(x);
            y2 = y2.max(y);
        }
        BoundingBox::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Whether the point lies inside the rectangle (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (sin, cos) = self.theta.sin_cos();
        let (dx, dy) = (x - self.cx, y - self.cy);
        let u = dx * cos + dy * sin;
        let v = -dx * sin + dy * cos;
        u.abs() <= self.width / 2.0 && v.abs() <= self.height / 2.0
    }

    /// Scale center and sides independently along x and y.
    ///
    /// Only exact for `theta` multiples of `π/2` or uniform scales; used for
    /// mapping between input and prototype resolutions, which share aspect.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            cx: self.cx * sx,
            cy: self.cy * sy,
            width: self.width * sx,
            height: self.height * sy,
            theta: self.theta,
        }
    }
}

/// A binary raster stored row-major, one byte per pixel (0 or 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    pub height: usize,
    pub width: usize,
    pub data: Vec<u8>,
}

impl BinaryMask {
    /// Create a mask, checking that `data` covers `height * width` pixels.
    ///
    /// Any non-zero byte is stored as 1.
    pub fn new(height: usize, width: usize, data: Vec<u8>) -> Result<Self> {
        if data.len() != height * width {
            return Err(ObbSegError::ShapeMismatch(format!(
                "mask of {}x{} needs {} pixels, got {}",
                height,
                width,
                height * width,
                data.len()
            )));
        }
        let data = data.into_iter().map(|v| u8::from(v != 0)).collect();
        Ok(Self { height, width, data })
    }

    /// All-background mask.
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            data: vec![0; height * width],
        }
    }

    /// Resolution as `(height, width)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> u64 {
        self.data.iter().map(|&v| u64::from(v)).sum()
    }

    /// Pixel value at row `y`, column `x`.
    pub fn get(&self, y: usize, x: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

/// A single raster holding several non-overlapping instances.
///
/// Pixel value `k > 0` marks instance `k - 1`; `0` is background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapMask {
    pub height: usize,
    pub width: usize,
    pub data: Vec<u16>,
}

impl OverlapMask {
    /// Create an overlap mask, checking the pixel count.
    pub fn new(height: usize, width: usize, data: Vec<u16>) -> Result<Self> {
        if data.len() != height * width {
            return Err(ObbSegError::ShapeMismatch(format!(
                "overlap mask of {}x{} needs {} pixels, got {}",
                height,
                width,
                height * width,
                data.len()
            )));
        }
        Ok(Self { height, width, data })
    }
}

/// Ground-truth masks for one image.
#[derive(Debug, Clone)]
pub enum GroundTruthMasks {
    /// One raster shared by all instances.
    Overlap(OverlapMask),
    /// One raster per instance, in annotation order.
    PerInstance(Vec<BinaryMask>),
}

/// Mask prototypes `(channels, height, width)` stored channel-major.
#[derive(Debug, Clone)]
pub struct Prototypes {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Prototypes {
    /// Create prototypes, checking the buffer length.
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != channels * height * width {
            return Err(ObbSegError::ShapeMismatch(format!(
                "prototypes of {}x{}x{} need {} values, got {}",
                channels,
                height,
                width,
                channels * height * width,
                data.len()
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    /// Values of one channel, row-major.
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[c * plane..(c + 1) * plane]
    }
}

/// Letterbox parameters: resize gain and `(pad_x, pad_y)` in input pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioPad {
    pub gain: f64,
    pub pad: (f64, f64),
}

/// Geometry of one image through preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// Letterboxed network input shape `(height, width)`.
    pub input_shape: (usize, usize),
    /// Native image shape `(height, width)`.
    pub original_shape: (usize, usize),
    /// Explicit letterbox parameters; derived from the shapes when absent.
    pub ratio_pad: Option<RatioPad>,
}

/// Image identifier for export; numeric file stems become integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageId {
    Number(u64),
    Name(String),
}

impl ImageId {
    /// Derive an id from a file stem.
    pub fn from_stem(stem: &str) -> Self {
        match stem.parse::<u64>() {
            Ok(n) if stem.chars().all(|c| c.is_ascii_digit()) => ImageId::Number(n),
            _ => ImageId::Name(stem.to_string()),
        }
    }
}

/// One image's ground truth.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub image_id: ImageId,
    pub classes: Vec<ClassId>,
    /// Boxes with centers and sides normalized to the letterboxed input.
    pub boxes: Vec<RotatedBox>,
    pub masks: GroundTruthMasks,
    pub meta: ImageMeta,
}

/// Source of predicted masks.
#[derive(Debug, Clone)]
pub enum PredictedMasks {
    /// Decode from prototypes using each row's mask coefficients.
    Prototypes(Prototypes),
    /// Already-decoded binary masks, one per prediction row.
    Decoded(Vec<BinaryMask>),
}

/// One image's post-NMS predictions.
///
/// Each row is `cx, cy, w, h, conf, cls, K mask coefficients, angle` in
/// letterboxed input pixels.
#[derive(Debug, Clone)]
pub struct RawPredictions {
    pub rows: Vec<Vec<f32>>,
    pub num_coefficients: usize,
    pub masks: PredictedMasks,
    /// Letterbox parameters when they differ from the ground truth's.
    pub ratio_pad: Option<RatioPad>,
}

/// A finalized prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub rbox: RotatedBox,
    pub confidence: f64,
    pub class_id: ClassId,
}

impl Detection {
    /// Split a prediction row into the detection and its mask coefficients.
    pub fn parse_row(row: &[f32], num_coefficients: usize) -> Result<(Self, Vec<f32>)> {
        let expected = 6 + num_coefficients + 1;
        if row.len() != expected {
            return Err(ObbSegError::ShapeMismatch(format!(
                "prediction row expects {} values (6 + {} coefficients + angle), got {}",
                expected,
                num_coefficients,
                row.len()
            )));
        }
        let class = row[5];
        if !class.is_finite() || class < 0.0 {
            return Err(ObbSegError::ShapeMismatch(format!(
                "prediction class must be a non-negative index, got {}",
                class
            )));
        }
        let confidence = row[4];
        if !confidence.is_finite() {
            return Err(ObbSegError::ShapeMismatch(format!(
                "prediction confidence must be finite, got {}",
                confidence
            )));
        }
        let rbox = RotatedBox::new(
            f64::from(row[0]),
            f64::from(row[1]),
            f64::from(row[2]),
            f64::from(row[3]),
            f64::from(row[expected - 1]),
        );
        let detection = Detection {
            rbox,
            confidence: f64::from(confidence),
            class_id: class.round() as ClassId,
        };
        Ok((detection, row[6..6 + num_coefficients].to_vec()))
    }
}

/// Per-prediction, per-threshold true-positive flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CorrectnessMatrix {
    rows: usize,
    thresholds: usize,
    data: Vec<bool>,
}

impl CorrectnessMatrix {
    /// All-false matrix.
    pub fn zeros(rows: usize, thresholds: usize) -> Self {
        Self {
            rows,
            thresholds,
            data: vec![false; rows * thresholds],
        }
    }

    /// Build from row slices; every row must have the same length.
    pub fn from_rows(rows: &[Vec<bool>]) -> Result<Self> {
        let thresholds = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * thresholds);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != thresholds {
                return Err(ObbSegError::ShapeMismatch(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    thresholds
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            thresholds,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn thresholds(&self) -> usize {
        self.thresholds
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn get(&self, row: usize, threshold: usize) -> bool {
        self.data[row * self.thresholds + threshold]
    }

    pub fn set(&mut self, row: usize, threshold: usize, value: bool) {
        self.data[row * self.thresholds + threshold] = value;
    }

    /// Flags of one prediction across thresholds.
    pub fn row(&self, row: usize) -> &[bool] {
        &self.data[row * self.thresholds..(row + 1) * self.thresholds]
    }

    /// Number of true positives at one threshold.
    pub fn count_true(&self, threshold: usize) -> usize {
        (0..self.rows).filter(|&r| self.get(r, threshold)).count()
    }

    /// Append the rows of `other` below this matrix.
    ///
    /// An empty matrix adopts the column count of the first non-empty one.
    pub fn append(&mut self, other: &CorrectnessMatrix) -> Result<()> {
        if other.rows == 0 {
            return Ok(());
        }
        if self.rows == 0 {
            self.thresholds = other.thresholds;
        } else if self.thresholds != other.thresholds {
            return Err(ObbSegError::ShapeMismatch(format!(
                "cannot append {} threshold columns to {}",
                other.thresholds, self.thresholds
            )));
        }
        self.data.extend_from_slice(&other.data);
        self.rows += other.rows;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_swaps_sides() {
        let rbox = RotatedBox::new(0.0, 0.0, 10.0, 20.0, 0.0).canonical();
        assert_eq!(rbox.width, 20.0);
        assert_eq!(rbox.height, 10.0);
        assert!((rbox.theta - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_canonical_wraps_angle() {
        let rbox = RotatedBox::new(0.0, 0.0, 20.0, 10.0, -0.25).canonical();
        assert!((rbox.theta - (PI - 0.25)).abs() < 1e-12);
        let rbox = RotatedBox::new(0.0, 0.0, 20.0, 10.0, 3.0 * PI + 0.1).canonical();
        assert!((rbox.theta - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_axis_aligned_of_rotated_square() {
        let rbox = RotatedBox::new(0.0, 0.0, 2.0, 2.0, std::f64::consts::FRAC_PI_4);
        let bbox = rbox.to_axis_aligned();
        let diag = 2.0_f64.sqrt() * 2.0;
        assert!((bbox.width - diag).abs() < 1e-9);
        assert!((bbox.height - diag).abs() < 1e-9);
    }

    #[test]
    fn test_contains() {
        let rbox = RotatedBox::new(10.0, 10.0, 10.0, 2.0, FRAC_PI_2);
        assert!(rbox.contains(10.0, 14.0));
        assert!(!rbox.contains(14.0, 10.0));
    }

    #[test]
    fn test_parse_row_arity() {
        let row = vec![1.0, 2.0, 3.0, 4.0, 0.9, 1.0, 0.5, 0.5, 0.1];
        let (det, coeffs) = Detection::parse_row(&row, 2).unwrap();
        assert_eq!(det.class_id, 1);
        assert_eq!(coeffs, vec![0.5, 0.5]);
        assert!((det.rbox.theta - 0.1).abs() < 1e-6);

        assert!(Detection::parse_row(&row, 3).is_err());
    }

    #[test]
    fn test_parse_row_rejects_non_finite_confidence() {
        for confidence in [f32::NAN, f32::INFINITY] {
            let row = vec![1.0, 2.0, 3.0, 4.0, confidence, 0.0, 0.0];
            assert!(matches!(
                Detection::parse_row(&row, 0),
                Err(ObbSegError::ShapeMismatch(_))
            ));
        }
    }

    #[test]
    fn test_image_id_from_stem() {
        assert_eq!(ImageId::from_stem("000123"), ImageId::Number(123));
        assert_eq!(ImageId::from_stem("img_7"), ImageId::Name("img_7".into()));
    }

    #[test]
    fn test_correctness_append() {
        let mut acc = CorrectnessMatrix::default();
        let a = CorrectnessMatrix::from_rows(&[vec![true, false]]).unwrap();
        acc.append(&a).unwrap();
        acc.append(&CorrectnessMatrix::zeros(0, 2)).unwrap();
        acc.append(&a).unwrap();
        assert_eq!(acc.rows(), 2);
        assert_eq!(acc.count_true(0), 2);
        assert!(acc.append(&CorrectnessMatrix::zeros(1, 3)).is_err());
    }
}
