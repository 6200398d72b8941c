// src/detector.rs

use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use std::cmp::Ordering;
use tracing::{debug, info};

const INPUT_SIZE: usize = 640;
const NUM_CLASSES: usize = 80;

// COCO class ids for vehicles: car, motorcycle, bus, truck.
const VEHICLE_CLASSES: [usize; 4] = [2, 3, 5, 7];

#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in source image coordinates
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

/// YOLOv8 vehicle detector over ONNX Runtime.
pub struct VehicleDetector {
    session: Session,
    confidence_threshold: f32,
    nms_iou: f32,
}

impl VehicleDetector {
    pub fn new(
        model_path: &str,
        num_threads: usize,
        confidence_threshold: f32,
        nms_iou: f32,
    ) -> Result<Self> {
        info!("Loading detection model: {}", model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)
            .context("Failed to load detection model")?;

        info!("✓ Vehicle detector ready");
        Ok(Self {
            session,
            confidence_threshold,
            nms_iou,
        })
    }

    /// Detect vehicles in one RGB frame.
    pub fn detect(&mut self, frame: &[u8], width: usize, height: usize) -> Result<Vec<Detection>> {
        let (input, scale, pad_x, pad_y) = letterbox(frame, width, height);
        let output = self.infer(&input)?;
        let detections = self.decode(&output, scale, pad_x, pad_y);
        let detections = nms(detections, self.nms_iou);
        debug!("Detected {} vehicle(s)", detections.len());
        Ok(detections)
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, INPUT_SIZE, INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    /// Parse the `[1, 4+classes, N]` output layout back into boxes in
    /// source image coordinates, keeping only confident vehicle classes.
    fn decode(&self, output: &[f32], scale: f32, pad_x: f32, pad_y: f32) -> Vec<Detection> {
        let num_preds = output.len() / (4 + NUM_CLASSES);
        let mut detections = Vec::new();

        for i in 0..num_preds {
            let cx = output[i];
            let cy = output[num_preds + i];
            let w = output[num_preds * 2 + i];
            let h = output[num_preds * 3 + i];

            let mut best_conf = 0.0f32;
            let mut best_class = 0;
            for c in 0..NUM_CLASSES {
                let conf = output[num_preds * (4 + c) + i];
                if conf > best_conf {
                    best_conf = conf;
                    best_class = c;
                }
            }

            if best_conf < self.confidence_threshold || !VEHICLE_CLASSES.contains(&best_class) {
                continue;
            }

            // Center format -> corners, then undo the letterbox transform.
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            detections.push(Detection {
                bbox: [x1, y1, x2, y2],
                confidence: best_conf,
                class_id: best_class,
                class_name: class_name(best_class).to_string(),
            });
        }

        detections
    }
}

pub fn class_name(class_id: usize) -> &'static str {
    match class_id {
        2 => "car",
        3 => "motorcycle",
        5 => "bus",
        7 => "truck",
        _ => "unknown",
    }
}

/// Scale the frame into a 640x640 gray-padded canvas, normalized CHW.
/// Returns the tensor plus the scale and padding needed to map boxes back.
fn letterbox(src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, f32, f32, f32) {
    let target = INPUT_SIZE;
    let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;
    let pad_x = (target - scaled_w) as f32 / 2.0;
    let pad_y = (target - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![114u8; target * target * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_idx = ((y + pad_y as usize) * target + x + pad_x as usize) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    let mut input = vec![0.0f32; 3 * target * target];
    for c in 0..3 {
        for h in 0..target {
            for w in 0..target {
                let hwc_idx = (h * target + w) * 3 + c;
                let chw_idx = c * target * target + h * target + w;
                input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
            }
        }
    }

    (input, scale, pad_x, pad_y)
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep
            .iter()
            .all(|kept| crate::tracker::bbox_iou(&det.bbox, &kept.bbox) < iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], confidence: f32) -> Detection {
        Detection {
            bbox,
            confidence,
            class_id: 2,
            class_name: "car".to_string(),
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping_lower_confidence() {
        let kept = nms(
            vec![
                det([0.0, 0.0, 100.0, 100.0], 0.6),
                det([5.0, 5.0, 105.0, 105.0], 0.9),
                det([300.0, 300.0, 400.0, 400.0], 0.5),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].bbox, [300.0, 300.0, 400.0, 400.0]);
    }

    #[test]
    fn test_nms_keeps_everything_when_disjoint() {
        let kept = nms(
            vec![
                det([0.0, 0.0, 10.0, 10.0], 0.5),
                det([100.0, 100.0, 110.0, 110.0], 0.4),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_letterbox_dimensions_and_padding() {
        // 200x100 source into 640x640: scale 3.2, vertical padding.
        let src = vec![0u8; 200 * 100 * 3];
        let (input, scale, pad_x, pad_y) = letterbox(&src, 200, 100);
        assert_eq!(input.len(), 3 * INPUT_SIZE * INPUT_SIZE);
        assert!((scale - 3.2).abs() < 1e-6);
        assert_eq!(pad_x, 0.0);
        assert!((pad_y - 160.0).abs() < 1.0);
    }

    #[test]
    fn test_class_names() {
        assert_eq!(class_name(2), "car");
        assert_eq!(class_name(7), "truck");
        assert_eq!(class_name(0), "unknown");
    }
}
