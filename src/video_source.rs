// src/video_source.rs

use crate::types::{Frame, VideoConfig};
use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

pub struct VideoSource {
    config: VideoConfig,
}

impl VideoSource {
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    /// Discover video files under the configured input directory,
    /// restricted to common container extensions.
    pub fn find_video_files(&self) -> Result<Vec<PathBuf>> {
        let mut videos = Vec::new();

        let video_extensions = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

        for entry in WalkDir::new(&self.config.input_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if let Some(ext) = path.extension() {
                if video_extensions.contains(&ext.to_str().unwrap_or("")) {
                    videos.push(path.to_path_buf());
                }
            }
        }

        videos.sort();
        info!("Found {} video file(s)", videos.len());
        Ok(videos)
    }

    pub fn open_video(&self, path: &Path) -> Result<VideoReader> {
        info!("Opening video: {}", path.display());

        let path_str = path
            .to_str()
            .with_context(|| format!("Non-UTF8 video path: {}", path.display()))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video file: {}", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as u64;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(VideoReader {
            cap,
            fps,
            total_frames,
            next_index: 0,
            width,
            height,
        })
    }

    /// Annotated-output writer, if enabled in config.
    pub fn create_writer(
        &self,
        input_path: &Path,
        width: i32,
        height: i32,
        fps: f64,
    ) -> Result<Option<VideoWriter>> {
        if !self.config.save_annotated {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.config.output_dir)?;

        let input_name = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let output_path = PathBuf::from(&self.config.output_dir)
            .join(format!("{}_annotated.mp4", input_name));

        info!("Annotated output: {}", output_path.display());

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            output_path
                .to_str()
                .context("Output path is not valid UTF-8")?,
            fourcc,
            fps,
            core::Size::new(width, height),
            true,
        )?;

        Ok(Some(writer))
    }
}

pub struct VideoReader {
    cap: VideoCapture,
    pub fps: f64,
    pub total_frames: u64,
    next_index: u64,
    pub width: i32,
    pub height: i32,
}

impl VideoReader {
    /// Read the next frame as RGB. `Ok(None)` is the normal end-of-stream
    /// signal, not an error.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();

        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;
        let timestamp_ms = if self.fps > 0.0 {
            (index as f64 / self.fps) * 1000.0
        } else {
            0.0
        };

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb_mat.data_bytes()?.to_vec();

        Ok(Some(Frame {
            index,
            data,
            width: self.width as usize,
            height: self.height as usize,
            timestamp_ms,
        }))
    }

    pub fn frames_read(&self) -> u64 {
        self.next_index
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.next_index as f32 / self.total_frames as f32) * 100.0
    }
}
