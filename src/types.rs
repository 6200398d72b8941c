// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub inference: InferenceConfig,
    pub tracking: TrackingConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub confidence_threshold: f32,
    pub nms_iou: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub iou_threshold: f32,
    pub max_missing: u32,
    pub detection_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub save_annotated: bool,
    pub display: bool,
    pub frame_period_ms: u64,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// One decoded RGB frame. `index` starts at 0 and increments once per
/// frame read from the source; it is never reset during a session.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

/// One row of the session table. Immutable once created; serialized
/// directly by the CSV writer, column order is declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrafficSample {
    #[serde(rename = "Frame Number")]
    pub frame_index: u64,
    #[serde(rename = "Flow (vehicles/window)")]
    pub flow: usize,
    #[serde(rename = "Density (vehicles/frame)")]
    pub density: usize,
}
