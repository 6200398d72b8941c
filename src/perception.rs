// src/perception.rs
//
// The detection/tracking model as a capability. Everything downstream of
// this trait (estimator, recorder, pipeline) can run against a scripted
// stub instead of a real model.

use crate::detector::VehicleDetector;
use crate::tracker::{IouTracker, Track};
use crate::types::Frame;
use anyhow::Result;
use std::collections::HashSet;
use tracing::warn;

/// What perception reports for one frame. The identity set may be empty
/// when nothing is tracked; callers must not assume otherwise. Bounding
/// boxes are carried for rendering only.
#[derive(Debug, Clone, Default)]
pub struct FrameObservation {
    pub identities: HashSet<u32>,
    pub tracks: Vec<Track>,
}

pub trait Perception {
    fn process(&mut self, frame: &Frame) -> Result<FrameObservation>;
}

/// Real perception: YOLO detection plus IoU identity tracking.
///
/// Detection can be throttled to every Nth frame; on skipped frames the
/// previous tracks coast unchanged, so the identity set stays stable.
pub struct VehiclePerception {
    detector: VehicleDetector,
    tracker: IouTracker,
    detection_interval: u64,
    frames_seen: u64,
}

impl VehiclePerception {
    pub fn new(detector: VehicleDetector, tracker: IouTracker, detection_interval: u64) -> Self {
        Self {
            detector,
            tracker,
            detection_interval: detection_interval.max(1),
            frames_seen: 0,
        }
    }
}

impl Perception for VehiclePerception {
    fn process(&mut self, frame: &Frame) -> Result<FrameObservation> {
        let run_detection = self.frames_seen % self.detection_interval == 0;
        self.frames_seen += 1;

        if run_detection {
            match self.detector.detect(&frame.data, frame.width, frame.height) {
                Ok(detections) => self.tracker.update(&detections),
                Err(e) => {
                    // Degrade to "nothing tracked this frame" rather than
                    // failing the session.
                    warn!("Detection failed on frame {}: {}", frame.index, e);
                    self.tracker.update(&[]);
                }
            }
        }

        Ok(FrameObservation {
            identities: self.tracker.visible_identities(),
            tracks: self.tracker.visible_tracks(),
        })
    }
}

#[cfg(test)]
pub mod stub {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted perception: replays a fixed sequence of identity sets,
    /// then reports empty frames.
    pub struct ScriptedPerception {
        script: VecDeque<HashSet<u32>>,
    }

    impl ScriptedPerception {
        pub fn new<I>(script: I) -> Self
        where
            I: IntoIterator<Item = HashSet<u32>>,
        {
            Self {
                script: script.into_iter().collect(),
            }
        }
    }

    impl Perception for ScriptedPerception {
        fn process(&mut self, _frame: &Frame) -> Result<FrameObservation> {
            let identities = self.script.pop_front().unwrap_or_default();
            Ok(FrameObservation {
                identities,
                tracks: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::ScriptedPerception;
    use super::*;
    use crate::estimator::TrafficEstimator;

    fn frame(index: u64) -> Frame {
        Frame {
            index,
            data: Vec::new(),
            width: 0,
            height: 0,
            timestamp_ms: index as f64 * 30.0,
        }
    }

    #[test]
    fn test_scripted_perception_drives_estimator() {
        let mut perception = ScriptedPerception::new(vec![
            [1, 2, 3].into_iter().collect::<HashSet<u32>>(),
            [3, 4].into_iter().collect(),
            HashSet::new(),
        ]);
        let mut estimator = TrafficEstimator::new();

        let obs = perception.process(&frame(0)).unwrap();
        let sample = estimator.observe(obs.identities, 0);
        assert_eq!((sample.flow, sample.density), (3, 3));

        let obs = perception.process(&frame(1)).unwrap();
        let sample = estimator.observe(obs.identities, 1);
        assert_eq!((sample.flow, sample.density), (4, 2));

        // Script exhausted: empty set, flow unchanged.
        let obs = perception.process(&frame(2)).unwrap();
        assert!(obs.identities.is_empty());
        let sample = estimator.observe(obs.identities, 2);
        assert_eq!((sample.flow, sample.density), (4, 0));
    }
}
