//! In-memory export of finalized detections: COCO-style records and text lines.
//!
//! Nothing here touches the filesystem; callers serialize the records.

use crate::config::EvalConfig;
use crate::error::{ObbSegError, Result};
use crate::types::{BinaryMask, Detection, ImageId};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

/// Run-length encoded mask in COCO layout (column-major, runs start with 0s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rle {
    pub height: usize,
    pub width: usize,
    pub counts: Vec<u32>,
}

/// Compressed RLE as stored in COCO result files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RleSegmentation {
    /// `[height, width]`
    pub size: [usize; 2],
    pub counts: String,
}

/// One COCO-style detection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoPrediction {
    pub image_id: ImageId,
    pub category_id: u64,
    /// Axis-aligned envelope `[x, y, width, height]`.
    pub bbox: [f64; 4],
    /// Oriented box `[cx, cy, width, height, theta]`.
    pub rbox: [f64; 5],
    pub score: f64,
    pub segmentation: RleSegmentation,
}

/// Text lines of one image, as produced by [`to_txt_lines`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxtExport {
    pub image_id: ImageId,
    pub lines: Vec<String>,
}

/// Encode a mask column by column.
pub fn encode_rle(mask: &BinaryMask) -> Rle {
    let mut counts = Vec::new();
    let mut current = 0u8;
    let mut run = 0u32;
    for x in 0..mask.width {
        for y in 0..mask.height {
            let v = mask.get(y, x);
            if v != current {
                counts.push(run);
                run = 0;
                current = v;
            }
            run += 1;
        }
    }
    counts.push(run);
    Rle {
        height: mask.height,
        width: mask.width,
        counts,
    }
}

/// Compress run counts into the COCO string form.
///
/// Counts after the third are stored as differences to the count two
/// positions earlier, each value in 5-bit groups offset by 48.
pub fn rle_to_string(rle: &Rle) -> String {
    let mut s = String::new();
    for (i, &count) in rle.counts.iter().enumerate() {
        let mut x = i64::from(count);
        if i > 2 {
            x -= i64::from(rle.counts[i - 2]);
        }
        loop {
            let mut c = (x & 0x1f) as u8;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            s.push(char::from(c + 48));
            if !more {
                break;
            }
        }
    }
    s
}

/// Bounded worker pool for mask encoding.
///
/// Results come back in input order so each encoding pairs with its
/// detection by index.
pub struct MaskEncoder {
    pool: ThreadPool,
}

impl MaskEncoder {
    /// Create a pool with `workers` threads, or one per core when `None`.
    pub fn new(workers: Option<usize>) -> Result<Self> {
        let workers = workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        });
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("mask-encoder-{}", i))
            .build()
            .map_err(|e| ObbSegError::InvalidConfig(format!("mask encoder pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Encode every mask, preserving order.
    pub fn encode_all(&self, masks: &[BinaryMask]) -> Vec<RleSegmentation> {
        self.pool.install(|| {
            masks
                .par_iter()
                .map(|mask| {
                    let rle = encode_rle(mask);
                    RleSegmentation {
                        size: [rle.height, rle.width],
                        counts: rle_to_string(&rle),
                    }
                })
                .collect()
        })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Pair native-space detections with their encoded masks.
pub fn to_coco_records(
    image_id: &ImageId,
    detections: &[Detection],
    segmentations: Vec<RleSegmentation>,
    config: &EvalConfig,
) -> Result<Vec<CocoPrediction>> {
    if detections.len() != segmentations.len() {
        return Err(ObbSegError::ShapeMismatch(format!(
            "{} detections for {} encoded masks",
            detections.len(),
            segmentations.len()
        )));
    }
    Ok(detections
        .iter()
        .zip(segmentations)
        .map(|(d, segmentation)| {
            let envelope = d.rbox.to_axis_aligned();
            let r = d.rbox.canonical();
            CocoPrediction {
                image_id: image_id.clone(),
                category_id: config.category_id(d.class_id),
                bbox: [envelope.x, envelope.y, envelope.width, envelope.height].map(|v| round_to(v, 3)),
                rbox: [r.cx, r.cy, r.width, r.height, r.theta].map(|v| round_to(v, 5)),
                score: round_to(d.confidence, 5),
                segmentation,
            }
        })
        .collect())
}

/// Plain-text lines `class cx cy w h theta [conf]`, coordinates normalized
/// to the native image shape.
pub fn to_txt_lines(detections: &[Detection], (height, width): (usize, usize), save_conf: bool) -> Vec<String> {
    let (h, w) = (height as f64, width as f64);
    detections
        .iter()
        .map(|d| {
            let r = d.rbox.canonical();
            let mut line = format!(
                "{} {:.6} {:.6} {:.6} {:.6} {:.6}",
                d.class_id,
                r.cx / w,
                r.cy / h,
                r.width / w,
                r.height / h,
                r.theta
            );
            if save_conf {
                line.push_str(&format!(" {:.6}", d.confidence));
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RotatedBox;

    #[test]
    fn test_encode_rle_column_major() {
        // Row-major 2x3: [[0, 1, 1], [0, 1, 0]]; columns: (0,0), (1,1), (1,0)
        let mask = BinaryMask::new(2, 3, vec![0, 1, 1, 0, 1, 0]).unwrap();
        let rle = encode_rle(&mask);
        assert_eq!(rle.counts, vec![2, 3, 1]);
    }

    #[test]
    fn test_encode_rle_starts_with_zero_run() {
        let mask = BinaryMask::new(1, 2, vec![1, 1]).unwrap();
        assert_eq!(encode_rle(&mask).counts, vec![0, 2]);
    }

    #[test]
    fn test_rle_to_string_small_counts() {
        let rle = Rle {
            height: 2,
            width: 3,
            counts: vec![2, 3, 1],
        };
        assert_eq!(rle_to_string(&rle), "231");
    }

    #[test]
    fn test_rle_to_string_delta_and_groups() {
        // 40 needs two groups; the fourth count is stored relative to the second
        let rle = Rle {
            height: 10,
            width: 10,
            counts: vec![40, 5, 10, 5],
        };
        // 40 = 0b01000 + (1 << 5): first group 8 | 0x20 -> 'X', then 1 -> '1'
        assert_eq!(rle_to_string(&rle), "X15:0");
    }

    #[test]
    fn test_encoder_preserves_order() {
        let encoder = MaskEncoder::new(Some(2)).unwrap();
        assert_eq!(encoder.workers(), 2);
        let masks: Vec<BinaryMask> = (0..8)
            .map(|i| {
                let mut data = vec![0u8; 16];
                data[i] = 1;
                BinaryMask::new(4, 4, data).unwrap()
            })
            .collect();
        let encoded = encoder.encode_all(&masks);
        for (mask, seg) in masks.iter().zip(&encoded) {
            assert_eq!(seg.counts, rle_to_string(&encode_rle(mask)));
            assert_eq!(seg.size, [4, 4]);
        }
    }

    #[test]
    fn test_coco_records() {
        let config = EvalConfig {
            class_map: Some(vec![5, 9]),
            ..EvalConfig::default()
        };
        let detections = vec![Detection {
            rbox: RotatedBox::new(10.0, 20.0, 4.0, 2.0, 0.0),
            confidence: 0.123456789,
            class_id: 1,
        }];
        let segmentation = RleSegmentation {
            size: [4, 4],
            counts: "0".into(),
        };
        let records =
            to_coco_records(&ImageId::Number(3), &detections, vec![segmentation], &config).unwrap();
        assert_eq!(records[0].category_id, 9);
        assert_eq!(records[0].bbox, [8.0, 19.0, 4.0, 2.0]);
        assert_eq!(records[0].score, 0.12346);

        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["image_id"], 3);
        assert_eq!(json["segmentation"]["size"][0], 4);
    }

    #[test]
    fn test_records_need_one_mask_per_detection() {
        let config = EvalConfig::default();
        let detections = vec![Detection {
            rbox: RotatedBox::new(1.0, 1.0, 1.0, 1.0, 0.0),
            confidence: 0.5,
            class_id: 0,
        }];
        assert!(to_coco_records(&ImageId::Number(1), &detections, Vec::new(), &config).is_err());
    }

    #[test]
    fn test_txt_lines() {
        let detections = vec![Detection {
            rbox: RotatedBox::new(50.0, 25.0, 10.0, 20.0, 0.0),
            confidence: 0.5,
            class_id: 2,
        }];
        let lines = to_txt_lines(&detections, (50, 100), true);
        // Canonical form swaps the sides and rotates by π/2
        assert_eq!(lines[0], "2 0.500000 0.500000 0.200000 0.200000 1.570796 0.500000");
    }
}
