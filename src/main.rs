// src/main.rs

mod annotate;
mod config;
mod detector;
mod estimator;
mod perception;
mod pipeline;
mod recorder;
mod tracker;
mod types;
mod video_source;

use anyhow::Result;
use detector::VehicleDetector;
use perception::VehiclePerception;
use std::path::{Path, PathBuf};
use tracker::IouTracker;
use tracing::{error, info, warn};
use types::Config;
use video_source::VideoSource;

fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "traffic_monitor={},ort=warn",
            config.logging.level
        ))
        .init();

    info!("🚗 Traffic Flow Monitor Starting");
    info!("✓ Configuration loaded");

    let source = VideoSource::new(config.video.clone());
    let video_files = source.find_video_files()?;

    if video_files.is_empty() {
        // Starting with nothing to process is tolerated, not fatal.
        error!("No video files found in {}", config.video.input_dir);
        return Ok(());
    }

    for (idx, video_path) in video_files.iter().enumerate() {
        info!(
            "Processing video {}/{}: {}",
            idx + 1,
            video_files.len(),
            video_path.display()
        );

        match process_video(video_path, &source, &config) {
            Ok(()) => info!("✓ Video processed successfully"),
            Err(e) => error!("Failed to process video: {}", e),
        }
    }

    Ok(())
}

fn process_video(video_path: &Path, source: &VideoSource, config: &Config) -> Result<()> {
    let reader = source.open_video(video_path)?;
    let writer = source.create_writer(video_path, reader.width, reader.height, reader.fps)?;

    let detector = VehicleDetector::new(
        &config.model.path,
        config.inference.num_threads,
        config.model.confidence_threshold,
        config.model.nms_iou,
    )?;
    let tracker = IouTracker::new(
        config.tracking.iou_threshold,
        config.tracking.max_missing,
    );
    let perception = VehiclePerception::new(detector, tracker, config.tracking.detection_interval);

    let report = pipeline::run(reader, perception, writer, &config.video)?;

    if report.stopped_early {
        warn!("Session stopped early from the preview window");
    }

    // Persist the session table; a write failure here is fatal.
    std::fs::create_dir_all(&config.video.output_dir)?;
    let video_name = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let csv_path =
        PathBuf::from(&config.video.output_dir).join(format!("{}_traffic.csv", video_name));
    report.recorder.flush(&csv_path)?;

    info!("📊 Session Report:");
    info!("  Frames processed: {}", report.frames);
    info!("  Rows recorded: {}", report.recorder.len());
    info!("  Peak flow: {} vehicle(s)/window", report.recorder.peak_flow());
    info!(
        "  Mean density: {:.2} vehicle(s)/frame",
        report.recorder.mean_density()
    );
    info!("  Processing Speed: {:.1} FPS", report.avg_fps);

    Ok(())
}
