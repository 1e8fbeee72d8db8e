//! Basic evaluation example: one run over a couple of synthetic images.

use obbseg_eval::{
    load_from_string, probiou, BinaryMask, GroundTruth, GroundTruthMasks, ImageId, ImageMeta,
    PredictedMasks, RawPredictions, RotatedBox, Validator,
};

fn rect_mask(size: usize, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> BinaryMask {
    let mut data = vec![0u8; size * size];
    for y in rows {
        for x in cols.clone() {
            data[y * size + x] = 1;
        }
    }
    BinaryMask::new(size, size, data).expect("mask buffer matches its shape")
}

fn sample(stem: &str, shift: f32) -> (GroundTruth, RawPredictions) {
    let gt = GroundTruth {
        image_id: ImageId::from_stem(stem),
        classes: vec![0, 1],
        boxes: vec![
            RotatedBox::new(0.3, 0.3, 0.2, 0.1, 0.0),
            RotatedBox::new(0.7, 0.7, 0.2, 0.1, 0.0),
        ],
        masks: GroundTruthMasks::PerInstance(vec![
            rect_mask(100, 25..35, 20..40),
            rect_mask(100, 65..75, 60..80),
        ]),
        meta: ImageMeta {
            input_shape: (100, 100),
            original_shape: (100, 100),
            ratio_pad: None,
        },
    };
    let preds = RawPredictions {
        rows: vec![
            vec![30.0 + shift, 30.0, 20.0, 10.0, 0.92, 0.0, 0.0],
            vec![70.0, 70.0 - shift, 20.0, 10.0, 0.81, 1.0, 0.05],
        ],
        num_coefficients: 0,
        masks: PredictedMasks::Decoded(vec![
            rect_mask(100, 25..35, 20..40),
            rect_mask(100, 65..75, 60..80),
        ]),
        ratio_pad: None,
    };
    (gt, preds)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== OBB + Segmentation Evaluation Example ===\n");

    // Example 1: probabilistic IoU
    println!("1. Probabilistic IoU");
    let a = RotatedBox::new(50.0, 50.0, 40.0, 10.0, 0.0);
    let b = RotatedBox::new(52.0, 50.0, 40.0, 10.0, 0.1);
    println!("   probiou between nearby rotated boxes: {:.4}", probiou(&a, &b));
    println!();

    // Example 2: configuration
    println!("2. Loading Configuration");
    let config = load_from_string(
        r#"{
            "names": ["car", "ship"],
            "save_json": true,
            "save_txt": true,
            "confusion_matrix": true,
            "workers": 2
        }"#,
    )?;
    println!("   Classes: {:?}", config.names);
    println!("   Mask decoding: {:?}", config.decode_mode());
    println!();

    // Example 3: run over two batches
    println!("3. Running Validation");
    let mut validator = Validator::new(config.clone())?;
    for (batch, shift) in [(0, 0.0), (1, 3.0)] {
        let (gt, preds) = sample(&batch.to_string(), shift);
        validator.update(&[gt], &[preds])?;
    }
    println!("   Images seen: {}", validator.counters().images_seen);
    println!();

    // Example 4: results
    println!("4. Results");
    let report = validator.finalize()?;
    for (key, value) in report.results_dict() {
        println!("   {:<24} {:.4}", key, value);
    }
    println!("\n{}", report.table(&config)?);
    println!();

    // Example 5: exports
    println!("5. Exports");
    println!("   COCO records: {}", validator.coco_records().len());
    println!("   {}", serde_json::to_string(&validator.coco_records()[0])?);
    for export in validator.txt_exports() {
        println!("   {:?}:", export.image_id);
        for line in &export.lines {
            println!("     {}", line);
        }
    }

    Ok(())
}
