// src/estimator.rs

use crate::types::TrafficSample;
use std::collections::HashSet;

/// Number of most-recent frames whose identity sets contribute to flow.
pub const WINDOW_FRAMES: usize = 25;

/// Rolling flow/density estimator over per-frame identity sets.
///
/// Keeps the last `WINDOW_FRAMES` identity sets in a fixed arena with a
/// write cursor (strict FIFO eviction). Flow is the number of distinct
/// identities across the whole window; density is the size of the current
/// frame's set alone. The union is recomputed from scratch on every call —
/// O(W) per frame, which keeps eviction trivial at this window size.
pub struct TrafficEstimator {
    slots: Vec<HashSet<u32>>,
    cursor: usize,
}

impl TrafficEstimator {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(WINDOW_FRAMES),
            cursor: 0,
        }
    }

    /// Fold the current frame's identity set into the window and return
    /// the sample for this frame.
    ///
    /// An empty set is valid input: density is 0 and flow reflects only
    /// whatever the window already holds. Output depends solely on this
    /// and the previous ≤ W−1 calls, in arrival order.
    pub fn observe(&mut self, identities: HashSet<u32>, frame_index: u64) -> TrafficSample {
        let density = identities.len();

        if self.slots.len() < WINDOW_FRAMES {
            self.slots.push(identities);
        } else {
            // Window full: the cursor points at the oldest slot.
            self.slots[self.cursor] = identities;
            self.cursor = (self.cursor + 1) % WINDOW_FRAMES;
        }

        let mut distinct: HashSet<u32> = HashSet::new();
        for set in &self.slots {
            distinct.extend(set.iter());
        }

        TrafficSample {
            frame_index,
            flow: distinct.len(),
            density,
        }
    }

    /// Number of identity sets currently held in the window.
    pub fn window_len(&self) -> usize {
        self.slots.len()
    }

    /// Reset the window (e.g. when a new video starts).
    pub fn reset(&mut self) {
        self.slots.clear();
        self.cursor = 0;
    }
}

impl Default for TrafficEstimator {
    fn default() -> Self {
        Self::new()
    }
}
