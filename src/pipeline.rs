// src/pipeline.rs
//
// Message-passing session loop: a decode thread feeds frames into a
// bounded channel, an analysis thread runs perception + estimation +
// recording and emits annotated frames, and the caller's thread is the
// render sink. Backpressure is a blocking send on the bounded frame
// queue; frames are never dropped, so the session table keeps one row
// per source frame.

use crate::annotate;
use crate::estimator::TrafficEstimator;
use crate::perception::Perception;
use crate::recorder::SessionRecorder;
use crate::types::VideoConfig;
use crate::video_source::VideoReader;
use anyhow::{anyhow, Result};
use crossbeam::channel::bounded;
use opencv::core::Mat;
use opencv::highgui;
use opencv::videoio::VideoWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const WINDOW_NAME: &str = "traffic-monitor";

pub struct PipelineReport {
    pub recorder: SessionRecorder,
    pub frames: u64,
    pub avg_fps: f64,
    pub stopped_early: bool,
}

struct AnnotatedFrame {
    mat: Mat,
}

pub fn run<P>(
    mut reader: VideoReader,
    mut perception: P,
    mut writer: Option<VideoWriter>,
    config: &VideoConfig,
) -> Result<PipelineReport>
where
    P: Perception + Send + 'static,
{
    let queue_depth = config.queue_depth.max(1);
    let (frame_tx, frame_rx) = bounded(queue_depth);
    let (annot_tx, annot_rx) = bounded::<AnnotatedFrame>(queue_depth);

    let mut display = config.display;
    if display {
        if let Err(err) = highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE) {
            warn!("Failed to open preview window: {}. Running headless.", err);
            display = false;
        }
    }
    let render_enabled = display || writer.is_some();

    let stop = Arc::new(AtomicBool::new(false));
    let period = Duration::from_millis(config.frame_period_ms);
    let total_frames = reader.total_frames;
    let session_started = Instant::now();

    // Decode at the nominal cadence; sleep the remainder of each period.
    // If decode plus send overrun the period there is nothing to sleep
    // and the producer simply runs flat out.
    let producer_stop = Arc::clone(&stop);
    let producer = thread::spawn(move || -> Result<u64> {
        loop {
            if producer_stop.load(Ordering::Relaxed) {
                break;
            }
            let tick_started = Instant::now();
            match reader.read_frame()? {
                Some(frame) => {
                    let index = frame.index;
                    if frame_tx.send(frame).is_err() {
                        break;
                    }
                    if index > 0 && index % 50 == 0 {
                        info!(
                            "Progress: {:.1}% ({}/{})",
                            reader.progress(),
                            reader.frames_read(),
                            total_frames
                        );
                    }
                }
                // Source exhausted: normal termination, not an error.
                None => break,
            }
            if let Some(remaining) = period.checked_sub(tick_started.elapsed()) {
                thread::sleep(remaining);
            }
        }
        Ok(reader.frames_read())
    });

    // Analysis owns the estimator and recorder for the whole session.
    let analysis = thread::spawn(move || -> Result<SessionRecorder> {
        let mut estimator = TrafficEstimator::new();
        let mut recorder = SessionRecorder::new();
        let analysis_started = Instant::now();

        while let Ok(frame) = frame_rx.recv() {
            let index = frame.index;
            let observation = perception.process(&frame)?;
            let sample = estimator.observe(observation.identities, index);
            recorder.append(sample);

            if index % 50 == 0 {
                debug!(
                    "Frame {} ({:.2}s): flow={} density={}",
                    index,
                    frame.timestamp_ms / 1000.0,
                    sample.flow,
                    sample.density
                );
            }

            if render_enabled {
                let elapsed = analysis_started.elapsed().as_secs_f64();
                let fps = if elapsed > 0.0 {
                    recorder.len() as f64 / elapsed
                } else {
                    0.0
                };
                let mat = annotate::render(&frame, &observation.tracks, &sample, fps)?;
                if annot_tx.send(AnnotatedFrame { mat }).is_err() {
                    break;
                }
            }
        }

        Ok(recorder)
    });

    // Render sink on the caller's thread.
    let mut stopped_early = false;
    if render_enabled {
        for annotated in annot_rx.iter() {
            if let Some(w) = writer.as_mut() {
                use opencv::videoio::VideoWriterTrait;
                w.write(&annotated.mat)?;
            }
            if display {
                highgui::imshow(WINDOW_NAME, &annotated.mat)?;
                let key = highgui::wait_key(1)?;
                if key == 27 || key == 113 {
                    info!("Stop requested from preview window");
                    stop.store(true, Ordering::Relaxed);
                    stopped_early = true;
                }
            }
        }
    }

    let frames = producer
        .join()
        .map_err(|_| anyhow!("Decode thread panicked"))??;
    let recorder = analysis
        .join()
        .map_err(|_| anyhow!("Analysis thread panicked"))??;

    if display {
        let _ = highgui::destroy_window(WINDOW_NAME);
    }

    let elapsed = session_started.elapsed().as_secs_f64();
    let avg_fps = if elapsed > 0.0 {
        frames as f64 / elapsed
    } else {
        0.0
    };

    Ok(PipelineReport {
        recorder,
        frames,
        avg_fps,
        stopped_early,
    })
}
