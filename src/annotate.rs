// src/annotate.rs

use crate::tracker::Track;
use crate::types::{Frame, TrafficSample};
use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};

/// Render one annotated BGR frame: tracked vehicle boxes with ID labels
/// plus a HUD line with the frame's statistics. Output has the same pixel
/// dimensions as the input.
pub fn render(
    frame: &Frame,
    tracks: &[Track],
    sample: &TrafficSample,
    processing_fps: f64,
) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data)?;
    let mat = mat.reshape(3, frame.height as i32)?;

    let mut bgr = Mat::default();
    imgproc::cvt_color(&mat, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    let mut output = bgr.try_clone()?;

    draw_tracks(&mut output, tracks)?;
    draw_hud(&mut output, sample, processing_fps)?;

    Ok(output)
}

fn draw_tracks(frame: &mut Mat, tracks: &[Track]) -> Result<()> {
    let color = core::Scalar::new(0.0, 255.0, 0.0, 0.0);
    for track in tracks {
        let [x1, y1, x2, y2] = track.bbox;
        let rect = core::Rect::new(
            x1 as i32,
            y1 as i32,
            (x2 - x1).max(1.0) as i32,
            (y2 - y1).max(1.0) as i32,
        );
        imgproc::rectangle(frame, rect, color, 2, imgproc::LINE_8, 0)?;

        let label = format!("{} #{}", track.class_name, track.id);
        let origin = core::Point::new(rect.x, (rect.y - 6).max(12));
        imgproc::put_text(
            frame,
            &label,
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            1,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

fn draw_hud(frame: &mut Mat, sample: &TrafficSample, processing_fps: f64) -> Result<()> {
    imgproc::rectangle(
        frame,
        core::Rect::new(5, 5, 460, 32),
        core::Scalar::new(40.0, 40.0, 40.0, 0.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;

    let text = format!(
        "Frame {} | Flow: {} | Density: {} | FPS: {:.1}",
        sample.frame_index, sample.flow, sample.density, processing_fps
    );
    imgproc::put_text(
        frame,
        &text,
        core::Point::new(12, 27),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        core::Scalar::new(0.0, 255.0, 0.0, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}
