use crate::detect::result::RawDetection;

/// Intersection over union of two boxes. Zero when the union is empty.
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.area() + b.area() - inter;
    if union > f32::EPSILON {
        inter / union
    } else {
        0.0
    }
}

/// Greedy non-maximum suppression.
///
/// Output is ordered by descending confidence. A box is dropped when its IoU
/// with an already kept box exceeds `iou_threshold`.
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len().min(100));
    for candidate in detections {
        if kept
            .iter()
            .all(|existing| iou(existing, &candidate) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_stays_empty() {
        assert!(non_max_suppression(vec![], 0.5).is_empty());
    }

    #[test]
    fn overlapping_boxes_keep_the_stronger() {
        let weak = RawDetection::person(0.0, 0.0, 10.0, 10.0, 0.6);
        let strong = RawDetection::person(1.0, 1.0, 11.0, 11.0, 0.9);
        let kept = non_max_suppression(vec![weak, strong.clone()], 0.5);
        assert_eq!(kept, vec![strong]);
    }

    #[test]
    fn disjoint_boxes_survive_in_confidence_order() {
        let a = RawDetection::person(0.0, 0.0, 10.0, 10.0, 0.4);
        let b = RawDetection::person(50.0, 50.0, 60.0, 60.0, 0.8);
        let kept = non_max_suppression(vec![a.clone(), b.clone()], 0.2);
        assert_eq!(kept, vec![b, a]);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = RawDetection::person(0.0, 0.0, 4.0, 4.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_degenerate_boxes_is_zero() {
        let a = RawDetection::person(3.0, 3.0, 3.0, 3.0, 1.0);
        assert_eq!(iou(&a, &a), 0.0);
    }
}
