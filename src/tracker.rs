// src/tracker.rs

use crate::detector::Detection;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A currently visible tracked vehicle.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub bbox: [f32; 4],
    pub class_name: String,
}

struct TrackState {
    id: u32,
    bbox: [f32; 4],
    class_name: String,
    missing: u32,
}

/// Greedy IoU tracker: associates each frame's detections with existing
/// tracks by highest IoU, spawns new identities for unmatched detections,
/// and drops a track once it has gone unmatched for `max_missing` frames.
/// Identities are stable `u32` labels, never reused within a session.
pub struct IouTracker {
    tracks: HashMap<u32, TrackState>,
    next_id: u32,
    iou_threshold: f32,
    max_missing: u32,
}

impl IouTracker {
    pub fn new(iou_threshold: f32, max_missing: u32) -> Self {
        Self {
            tracks: HashMap::new(),
            next_id: 0,
            iou_threshold,
            max_missing,
        }
    }

    /// Advance the tracker by one frame of detections.
    pub fn update(&mut self, detections: &[Detection]) {
        // Score every track/detection pair above zero overlap.
        let mut pairs: Vec<(f32, u32, usize)> = Vec::new();
        for track in self.tracks.values() {
            for (det_idx, det) in detections.iter().enumerate() {
                let iou = bbox_iou(&track.bbox, &det.bbox);
                if iou > 0.0 {
                    pairs.push((iou, track.id, det_idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        // Greedy assignment, best overlap first.
        let mut matched_tracks: HashSet<u32> = HashSet::new();
        let mut matched_detections: HashSet<usize> = HashSet::new();
        for (iou, track_id, det_idx) in pairs {
            if iou < self.iou_threshold
                || matched_tracks.contains(&track_id)
                || matched_detections.contains(&det_idx)
            {
                continue;
            }
            if let Some(track) = self.tracks.get_mut(&track_id) {
                let det = &detections[det_idx];
                track.bbox = det.bbox;
                track.class_name = det.class_name.clone();
                track.missing = 0;
            }
            matched_tracks.insert(track_id);
            matched_detections.insert(det_idx);
        }

        // Unmatched tracks coast on their last box and accrue a miss.
        for track in self.tracks.values_mut() {
            if !matched_tracks.contains(&track.id) {
                track.missing = track.missing.saturating_add(1);
            }
        }

        // Unmatched detections become new identities.
        for (det_idx, det) in detections.iter().enumerate() {
            if matched_detections.contains(&det_idx) {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.insert(
                id,
                TrackState {
                    id,
                    bbox: det.bbox,
                    class_name: det.class_name.clone(),
                    missing: 0,
                },
            );
            debug!("New track #{} ({})", id, det.class_name);
        }

        // Reap tracks that have been gone too long.
        let max_missing = self.max_missing;
        self.tracks.retain(|_, t| t.missing <= max_missing);
    }

    /// Tracks matched in the most recent frame, sorted by identity.
    pub fn visible_tracks(&self) -> Vec<Track> {
        let mut tracks: Vec<Track> = self
            .tracks
            .values()
            .filter(|t| t.missing == 0)
            .map(|t| Track {
                id: t.id,
                bbox: t.bbox,
                class_name: t.class_name.clone(),
            })
            .collect();
        tracks.sort_by_key(|t| t.id);
        tracks
    }

    /// Identity set for the current frame: ids of visible tracks only.
    pub fn visible_identities(&self) -> HashSet<u32> {
        self.tracks
            .values()
            .filter(|t| t.missing == 0)
            .map(|t| t.id)
            .collect()
    }

    /// Total identities ever assigned this session.
    pub fn total_unique(&self) -> u32 {
        self.next_id
    }
}

fn bbox_area(bbox: &[f32; 4]) -> f32 {
    (bbox[2] - bbox[0]).max(0.0) * (bbox[3] - bbox[1]).max(0.0)
}

pub fn bbox_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = bbox_area(a) + bbox_area(b) - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4]) -> Detection {
        Detection {
            bbox,
            confidence: 0.9,
            class_id: 2,
            class_name: "car".to_string(),
        }
    }

    #[test]
    fn test_identity_stable_across_small_motion() {
        let mut tracker = IouTracker::new(0.3, 2);
        tracker.update(&[det([100.0, 100.0, 200.0, 200.0])]);
        let first: Vec<u32> = tracker.visible_identities().into_iter().collect();
        assert_eq!(first, vec![0]);

        // Shifted a little: same identity.
        tracker.update(&[det([110.0, 105.0, 210.0, 205.0])]);
        assert!(tracker.visible_identities().contains(&0));
        assert_eq!(tracker.total_unique(), 1);
    }

    #[test]
    fn test_disjoint_detection_spawns_new_identity() {
        let mut tracker = IouTracker::new(0.3, 2);
        tracker.update(&[det([0.0, 0.0, 50.0, 50.0])]);
        tracker.update(&[det([500.0, 500.0, 600.0, 600.0])]);
        assert_eq!(tracker.total_unique(), 2);
        assert!(tracker.visible_identities().contains(&1));
    }

    #[test]
    fn test_missing_track_leaves_identity_set_then_reaps() {
        let mut tracker = IouTracker::new(0.3, 1);
        tracker.update(&[det([0.0, 0.0, 50.0, 50.0])]);
        assert_eq!(tracker.visible_identities().len(), 1);

        // No detections: the track is missing, so the frame's identity
        // set must be empty (never fatal, just empty).
        tracker.update(&[]);
        assert!(tracker.visible_identities().is_empty());

        // Gone past max_missing: reaped; reappearing box is a new id.
        tracker.update(&[]);
        tracker.update(&[det([0.0, 0.0, 50.0, 50.0])]);
        assert_eq!(tracker.visible_identities().into_iter().max(), Some(1));
    }

    #[test]
    fn test_greedy_prefers_highest_overlap() {
        let mut tracker = IouTracker::new(0.05, 2);
        tracker.update(&[det([0.0, 0.0, 200.0, 100.0]), det([180.0, 0.0, 380.0, 100.0])]);

        // One detection overlapping both tracks above the threshold, but
        // mostly the second: greedy assignment must pick the second.
        tracker.update(&[det([170.0, 0.0, 370.0, 100.0])]);
        let visible = tracker.visible_tracks();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, 1);
    }

    #[test]
    fn test_iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert!((bbox_iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(bbox_iou(&a, &b), 0.0);
    }
}
