//! Edge case tests: empty inputs, class gating, one-to-one assignment and
//! overlap-encoded masks.

use obbseg_eval::config::EvalConfig;
use obbseg_eval::mask::{expand_overlap, prepare_ground_truth_masks};
use obbseg_eval::matching::match_predictions;
use obbseg_eval::metrics::{batch_probiou, mask_iou, probiou};
use obbseg_eval::types::*;
use obbseg_eval::validator::Validator;

fn rect_mask(size: usize, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> BinaryMask {
    let mut data = vec![0u8; size * size];
    for y in rows {
        for x in cols.clone() {
            data[y * size + x] = 1;
        }
    }
    BinaryMask::new(size, size, data).unwrap()
}

fn meta() -> ImageMeta {
    ImageMeta {
        input_shape: (100, 100),
        original_shape: (100, 100),
        ratio_pad: None,
    }
}

fn ground_truth(classes: Vec<usize>, boxes: Vec<RotatedBox>, masks: Vec<BinaryMask>) -> GroundTruth {
    GroundTruth {
        image_id: ImageId::from_stem("0"),
        classes,
        boxes,
        masks: GroundTruthMasks::PerInstance(masks),
        meta: meta(),
    }
}

fn decoded(rows: Vec<Vec<f32>>, masks: Vec<BinaryMask>) -> RawPredictions {
    RawPredictions {
        rows,
        num_coefficients: 0,
        masks: PredictedMasks::Decoded(masks),
        ratio_pad: None,
    }
}

// ============================================================================
// Empty inputs
// ============================================================================

#[test]
fn test_empty_batch() {
    let mut validator = Validator::new(EvalConfig::default()).unwrap();
    validator.update(&[], &[]).unwrap();
    let report = validator.finalize().unwrap();
    assert_eq!(report.counters.images_seen, 0);
    assert_eq!(report.metrics.boxes.map50(), 0.0);
}

#[test]
fn test_image_without_labels() {
    let gt = ground_truth(Vec::new(), Vec::new(), Vec::new());
    let preds = decoded(
        vec![vec![30.0, 30.0, 20.0, 10.0, 0.9, 0.0, 0.0]],
        vec![rect_mask(100, 25..35, 20..40)],
    );
    let mut validator = Validator::new(EvalConfig::default()).unwrap();
    validator.update(&[gt], &[preds]).unwrap();

    let stats = validator.stats();
    assert_eq!(stats.box_correct.rows(), 1);
    assert_eq!(stats.box_correct.row(0), &[false; 10]);
    assert_eq!(stats.mask_correct.row(0), &[false; 10]);
    assert_eq!(validator.counters().images_without_labels, 1);

    let report = validator.finalize().unwrap();
    assert_eq!(report.metrics.boxes.map(), 0.0);
    assert!(report.metrics.boxes.classes().is_empty());
}

#[test]
fn test_image_without_predictions_counts_instances() {
    let gt = ground_truth(
        vec![1, 1],
        vec![
            RotatedBox::new(0.3, 0.3, 0.2, 0.1, 0.0),
            RotatedBox::new(0.7, 0.7, 0.2, 0.1, 0.0),
        ],
        vec![rect_mask(100, 25..35, 20..40), rect_mask(100, 65..75, 60..80)],
    );
    let mut validator = Validator::new(EvalConfig::default()).unwrap();
    validator.update(&[gt], &[decoded(Vec::new(), Vec::new())]).unwrap();

    assert_eq!(validator.stats().box_correct.rows(), 0);
    assert_eq!(validator.stats().target_classes, vec![1, 1]);
    let report = validator.finalize().unwrap();
    assert_eq!(report.counts.instances, vec![0, 2]);
    assert_eq!(report.counts.images, vec![0, 1]);
    assert_eq!(report.metrics.boxes.map(), 0.0);
    assert_eq!(report.metrics.boxes.mr(), 0.0);
}

#[test]
fn test_prototype_source_without_rows() {
    let gt = ground_truth(
        vec![0],
        vec![RotatedBox::new(0.3, 0.3, 0.2, 0.1, 0.0)],
        vec![rect_mask(100, 25..35, 20..40)],
    );
    let preds = RawPredictions {
        rows: Vec::new(),
        num_coefficients: 4,
        masks: PredictedMasks::Prototypes(Prototypes::new(4, 25, 25, vec![0.0; 4 * 625]).unwrap()),
        ratio_pad: None,
    };
    let mut validator = Validator::new(EvalConfig::default()).unwrap();
    validator.update(&[gt], &[preds]).unwrap();
    assert_eq!(validator.counters().images_without_predictions, 1);
}

// ============================================================================
// Matching rules
// ============================================================================

#[test]
fn test_wrong_class_never_matches() {
    let gt = ground_truth(
        vec![0],
        vec![RotatedBox::new(0.3, 0.3, 0.2, 0.1, 0.0)],
        vec![rect_mask(100, 25..35, 20..40)],
    );
    let preds = decoded(
        vec![vec![30.0, 30.0, 20.0, 10.0, 0.9, 1.0, 0.0]],
        vec![rect_mask(100, 25..35, 20..40)],
    );
    let mut validator = Validator::new(EvalConfig::default()).unwrap();
    validator.update(&[gt], &[preds]).unwrap();
    assert_eq!(validator.stats().box_correct.count_true(0), 0);
    assert_eq!(validator.stats().mask_correct.count_true(0), 0);
}

#[test]
fn test_duplicate_predictions_one_to_one() {
    let gt = ground_truth(
        vec![0],
        vec![RotatedBox::new(0.3, 0.3, 0.2, 0.1, 0.0)],
        vec![rect_mask(100, 25..35, 20..40)],
    );
    let row = vec![30.0, 30.0, 20.0, 10.0, 0.9, 0.0, 0.0];
    let preds = decoded(
        vec![row.clone(), row],
        vec![rect_mask(100, 25..35, 20..40), rect_mask(100, 25..35, 20..40)],
    );
    let mut validator = Validator::new(EvalConfig::default()).unwrap();
    validator.update(&[gt], &[preds]).unwrap();
    let stats = validator.stats();
    for t in 0..10 {
        assert_eq!(stats.box_correct.count_true(t), 1);
        assert_eq!(stats.mask_correct.count_true(t), 1);
    }
    // Ties go to the earlier prediction
    assert!(stats.box_correct.get(0, 0));
}

#[test]
fn test_single_class_mode_matches_across_labels() {
    let gt = ground_truth(
        vec![0],
        vec![RotatedBox::new(0.3, 0.3, 0.2, 0.1, 0.0)],
        vec![rect_mask(100, 25..35, 20..40)],
    );
    let preds = decoded(
        vec![vec![30.0, 30.0, 20.0, 10.0, 0.9, 4.0, 0.0]],
        vec![rect_mask(100, 25..35, 20..40)],
    );
    let config = EvalConfig {
        single_cls: true,
        ..EvalConfig::default()
    };
    let mut validator = Validator::new(config).unwrap();
    validator.update(&[gt], &[preds]).unwrap();
    assert_eq!(validator.stats().box_correct.count_true(9), 1);
}

#[test]
fn test_matcher_no_ground_truth_and_no_predictions() {
    let none = match_predictions(&[], &[0, 0], &[], &[0.5]);
    assert_eq!(none.rows(), 2);
    assert_eq!(none.count_true(0), 0);

    let empty = match_predictions(&[vec![]], &[], &[0], &[0.5]);
    assert_eq!(empty.rows(), 0);
}

// ============================================================================
// Geometry
// ============================================================================

#[test]
fn test_degenerate_boxes_stay_finite() {
    let line = RotatedBox::new(10.0, 10.0, 0.0, 5.0, 0.0);
    let point = RotatedBox::new(10.0, 10.0, 0.0, 0.0, 0.0);
    for value in batch_probiou(&[line, point], &[line, point]).iter().flatten() {
        assert!(value.is_finite());
        assert!((0.0..=1.0).contains(value));
    }
}

#[test]
fn test_swapped_sides_same_box() {
    let a = RotatedBox::new(50.0, 50.0, 40.0, 10.0, 0.0);
    let b = RotatedBox::new(50.0, 50.0, 10.0, 40.0, std::f64::consts::FRAC_PI_2);
    assert!((probiou(&a, &b) - 1.0).abs() < 1e-5);
    assert!((probiou(&a, &b.canonical()) - 1.0).abs() < 1e-5);
}

#[test]
fn test_empty_masks_have_zero_iou() {
    let empty = BinaryMask::zeros(4, 4);
    let iou = mask_iou(&[empty.clone()], &[empty]).unwrap();
    assert_eq!(iou[0][0], 0.0);
}

#[test]
fn test_mask_iou_empty_sets() {
    assert!(mask_iou(&[], &[]).unwrap().is_empty());
    let iou = mask_iou(&[BinaryMask::zeros(2, 2)], &[]).unwrap();
    assert_eq!(iou, vec![Vec::<f64>::new()]);
}

// ============================================================================
// Overlap-encoded ground truth
// ============================================================================

#[test]
fn test_overlap_expansion_is_disjoint() {
    let overlap = OverlapMask::new(3, 3, vec![1, 1, 0, 2, 2, 3, 0, 3, 3]).unwrap();
    let masks = expand_overlap(&overlap, 3);
    assert_eq!(masks.len(), 3);
    for y in 0..3 {
        for x in 0..3 {
            let owners: u8 = masks.iter().map(|m| m.get(y, x)).sum();
            assert!(owners <= 1);
        }
    }
    assert_eq!(masks[2].area(), 3);
}

#[test]
fn test_overlap_instance_without_pixels() {
    // Instance 2 is fully hidden by instance 1
    let overlap = OverlapMask::new(1, 4, vec![1, 1, 0, 0]).unwrap();
    let masks = prepare_ground_truth_masks(&GroundTruthMasks::Overlap(overlap), 2, (1, 4)).unwrap();
    assert_eq!(masks[1].area(), 0);
}

#[test]
fn test_overlap_ground_truth_end_to_end() {
    let mut data = vec![0u16; 100 * 100];
    for y in 25..35 {
        for x in 20..40 {
            data[y * 100 + x] = 1;
        }
    }
    for y in 65..75 {
        for x in 60..80 {
            data[y * 100 + x] = 2;
        }
    }
    let gt = GroundTruth {
        image_id: ImageId::from_stem("5"),
        classes: vec![0, 0],
        boxes: vec![
            RotatedBox::new(0.3, 0.3, 0.2, 0.1, 0.0),
            RotatedBox::new(0.7, 0.7, 0.2, 0.1, 0.0),
        ],
        masks: GroundTruthMasks::Overlap(OverlapMask::new(100, 100, data).unwrap()),
        meta: meta(),
    };
    // Only the second instance is predicted
    let preds = decoded(
        vec![vec![70.0, 70.0, 20.0, 10.0, 0.9, 0.0, 0.0]],
        vec![rect_mask(100, 65..75, 60..80)],
    );
    let mut validator = Validator::new(EvalConfig::default()).unwrap();
    validator.update(&[gt], &[preds]).unwrap();
    assert_eq!(validator.stats().mask_correct.count_true(9), 1);
}
