//! Per-frame landmark snapshots handed over by the external extractor.

use serde::{Deserialize, Serialize};

// hand (21 points)
pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

pub const HAND_POINTS: usize = 21;

// face mesh
pub const FACE_NOSE_TIP: usize = 1;
pub const FACE_FOREHEAD: usize = 10;
pub const FACE_UPPER_LIP_BOTTOM: usize = 13;
pub const FACE_LOWER_LIP_TOP: usize = 14;
pub const FACE_LEFT_EYE: usize = 33;
pub const FACE_CHIN: usize = 152;
pub const FACE_RIGHT_EYE: usize = 263;

// body pose
pub const POSE_LEFT_SHOULDER: usize = 11;
pub const POSE_RIGHT_SHOULDER: usize = 12;
pub const POSE_LEFT_HIP: usize = 23;
pub const POSE_RIGHT_HIP: usize = 24;

/// Normalized point, x/y in [0,1] of the (mirrored) camera frame, y grows downward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    #[cfg(test)]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar distance; depth from a monocular model is too noisy to use.
    pub fn dist(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Landmarks of one detected body part. Lookups never panic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet(pub Vec<Landmark>);

impl LandmarkSet {
    pub fn get(&self, idx: usize) -> Option<Landmark> {
        self.0.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub timestamp_ms: u64,
    pub face: Option<LandmarkSet>,
    pub hands: Vec<LandmarkSet>,
    pub pose: Option<LandmarkSet>,
}

impl Frame {
    /// Resolve (left, right) by wrist x. A lone hand is the right (aiming) hand.
    pub fn split_hands(&self) -> (Option<&LandmarkSet>, Option<&LandmarkSet>) {
        match self.hands.as_slice() {
            [] => (None, None),
            [only] => (None, Some(only)),
            [a, b, ..] => {
                let ax = a.get(WRIST).map(|w| w.x);
                let bx = b.get(WRIST).map(|w| w.x);
                match (ax, bx) {
                    (Some(ax), Some(bx)) if bx < ax => (Some(b), Some(a)),
                    _ => (Some(a), Some(b)),
                }
            }
        }
    }
}
