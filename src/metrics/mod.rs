//! Geometry kernels and precision/recall/AP computation.

pub mod iou;
pub mod probiou;
pub mod mask_iou;
pub mod ap;
pub mod precision_recall;

pub use iou::{box_iou, box_iou_matrix};
pub use probiou::{batch_probiou, probiou};
pub use mask_iou::mask_iou;
pub use ap::{ap_per_class, calculate_map, compute_ap, ClassMetrics};
pub use precision_recall::{calculate_precision_recall, f1, PrecisionRecall};
