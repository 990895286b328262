//! Scalar features derived from one frame's landmarks.
//!
//! Everything here is pure and total: a missing or short landmark set yields
//! the conservative answer (`false` / `0.0`) instead of an error, so a single
//! corrupt frame can neither crash the loop nor latch a control.

use serde::Serialize;

use crate::config::FeatureConfig;
use crate::landmarks::*;

/// Angle in degrees at `b` between `a` and `c`.
pub fn joint_angle(a: Landmark, b: Landmark, c: Landmark) -> f32 {
    let v1 = (a.x - b.x, a.y - b.y);
    let v2 = (c.x - b.x, c.y - b.y);
    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    let mag = (v1.0 * v1.0 + v1.1 * v1.1).sqrt() * (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    let cos = (dot / (mag + 1e-6)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Finger straight enough at the PIP joint. This angle test is the only
/// extension test used in the crate.
pub fn finger_extended(set: &LandmarkSet, tip: usize, pip: usize, mcp: usize, angle_deg: f32) -> bool {
    let angle = || Some(joint_angle(set.get(tip)?, set.get(pip)?, set.get(mcp)?));
    angle().is_some_and(|a| a > angle_deg)
}

const FINGERS: [(usize, usize, usize); 5] = [
    (THUMB_TIP, THUMB_IP, THUMB_MCP),
    (INDEX_TIP, INDEX_PIP, INDEX_MCP),
    (MIDDLE_TIP, MIDDLE_PIP, MIDDLE_MCP),
    (RING_TIP, RING_PIP, RING_MCP),
    (PINKY_TIP, PINKY_PIP, PINKY_MCP),
];

pub fn fingers_extended(set: &LandmarkSet, angle_deg: f32) -> [bool; 5] {
    FINGERS.map(|(tip, pip, mcp)| finger_extended(set, tip, pip, mcp, angle_deg))
}

/// Index out, middle/ring/pinky in. Strict test used to acquire the gun lock.
pub fn gun_shape(set: &LandmarkSet, angle_deg: f32) -> bool {
    if set.len() < HAND_POINTS {
        return false;
    }
    let [_, index, middle, ring, pinky] = fingers_extended(set, angle_deg);
    index && !middle && !ring && !pinky
}

/// Rotation-tolerant grip test: at least two of middle/ring/pinky have their
/// tip closer to the wrist than `ratio` times their MCP-to-wrist distance.
pub fn bottom_three_curled(set: &LandmarkSet, ratio: f32) -> bool {
    let Some(wrist) = set.get(WRIST) else {
        return false;
    };
    let curled = [
        (MIDDLE_TIP, MIDDLE_MCP),
        (RING_TIP, RING_MCP),
        (PINKY_TIP, PINKY_MCP),
    ]
    .iter()
    .filter(|(tip, mcp)| match (set.get(*tip), set.get(*mcp)) {
        (Some(t), Some(m)) => t.dist(&wrist) < m.dist(&wrist) * ratio,
        _ => false,
    })
    .count();
    curled >= 2
}

/// Thumb lowered onto the hand: tip below its IP joint, or pulled in towards
/// the wrist. Either one suffices.
pub fn thumb_down(set: &LandmarkSet, ratio: f32) -> bool {
    let test = || {
        let tip = set.get(THUMB_TIP)?;
        let ip = set.get(THUMB_IP)?;
        let wrist = set.get(WRIST)?;
        let index_mcp = set.get(INDEX_MCP)?;
        let below = tip.y > ip.y;
        let close = tip.dist(&wrist) < index_mcp.dist(&wrist) * ratio;
        Some(below || close)
    };
    test().unwrap_or(false)
}

/// Count of fingers folded down (palm towards the camera).
pub fn fingers_down(set: &LandmarkSet, angle_deg: f32) -> u8 {
    if set.len() < HAND_POINTS {
        return 0;
    }
    fingers_extended(set, angle_deg)
        .iter()
        .filter(|e| !**e)
        .count() as u8
}

/// (yaw, pitch) in rough percent units; (0, 0) without a usable face.
pub fn head_pose(face: &LandmarkSet) -> (f32, f32) {
    let pose = || {
        let nose = face.get(FACE_NOSE_TIP)?;
        let left_eye = face.get(FACE_LEFT_EYE)?;
        let right_eye = face.get(FACE_RIGHT_EYE)?;
        let chin = face.get(FACE_CHIN)?;
        let forehead = face.get(FACE_FOREHEAD)?;

        let eye_center_x = (left_eye.x + right_eye.x) / 2.0;
        let yaw = (nose.x - eye_center_x) * 100.0;

        let face_height = chin.y - forehead.y;
        let nose_pos = if face_height > 0.0 {
            (nose.y - forehead.y) / face_height
        } else {
            0.5
        };
        let pitch = (nose_pos - 0.5) * 100.0;
        Some((yaw, pitch))
    };
    pose().unwrap_or((0.0, 0.0))
}

/// Torso offset from frame center; positive leans right.
pub fn body_lean(pose: &LandmarkSet) -> f32 {
    let lean = || {
        let ls = pose.get(POSE_LEFT_SHOULDER)?;
        let rs = pose.get(POSE_RIGHT_SHOULDER)?;
        let lh = pose.get(POSE_LEFT_HIP)?;
        let rh = pose.get(POSE_RIGHT_HIP)?;
        let shoulder_x = (ls.x + rs.x) / 2.0;
        let hip_x = (lh.x + rh.x) / 2.0;
        Some(((shoulder_x + hip_x) / 2.0 - 0.5) * 100.0)
    };
    lean().unwrap_or(0.0)
}

pub fn mouth_separation(face: &LandmarkSet) -> f32 {
    match (face.get(FACE_UPPER_LIP_BOTTOM), face.get(FACE_LOWER_LIP_TOP)) {
        (Some(upper), Some(lower)) => (upper.y - lower.y).abs(),
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HandFeatures {
    pub finger_extended: [bool; 5],
    pub fingers_down: u8,
    pub gun_shape: bool,
    pub bottom_three_curled: bool,
    pub thumb_down: bool,
    pub index_tip: Option<Landmark>,
}

impl HandFeatures {
    pub fn extract(set: &LandmarkSet, cfg: &FeatureConfig) -> Self {
        Self {
            finger_extended: fingers_extended(set, cfg.extension_angle_deg),
            fingers_down: fingers_down(set, cfg.extension_angle_deg),
            gun_shape: gun_shape(set, cfg.extension_angle_deg),
            bottom_three_curled: bottom_three_curled(set, cfg.curl_ratio),
            thumb_down: thumb_down(set, cfg.thumb_wrist_ratio),
            index_tip: set.get(INDEX_TIP),
        }
    }
}

/// Everything the controllers read for one frame. Absent body parts stay
/// `None` / zero; controllers treat that as tracking loss, not as an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureSet {
    pub yaw: f32,
    pub pitch: f32,
    pub lean: f32,
    pub mouth_separation: f32,
    pub mouth_open: Option<bool>,
    pub left: Option<HandFeatures>,
    pub right: Option<HandFeatures>,
}

impl FeatureSet {
    pub fn extract(frame: &Frame, cfg: &FeatureConfig) -> Self {
        let (left, right) = frame.split_hands();
        let (yaw, pitch) = frame.face.as_ref().map(head_pose).unwrap_or((0.0, 0.0));
        let mouth_separation = frame.face.as_ref().map(mouth_separation).unwrap_or(0.0);
        Self {
            yaw,
            pitch,
            lean: frame.pose.as_ref().map(body_lean).unwrap_or(0.0),
            mouth_separation,
            mouth_open: frame
                .face
                .as_ref()
                .map(|_| mouth_separation > cfg.mouth_separation),
            left: left.map(|h| HandFeatures::extract(h, cfg)),
            right: right.map(|h| HandFeatures::extract(h, cfg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::*;

    fn cfg() -> FeatureConfig {
        FeatureConfig::default()
    }

    #[test]
    fn test_joint_angle() {
        let a = Landmark::new(0.0, 0.0);
        let b = Landmark::new(0.5, 0.0);
        assert!((joint_angle(a, b, Landmark::new(1.0, 0.0)) - 180.0).abs() < 1.0);
        assert!((joint_angle(a, b, Landmark::new(0.5, 0.5)) - 90.0).abs() < 1.0);
    }

    #[test]
    fn test_open_hand() {
        let h = open_hand(0.5);
        assert_eq!(fingers_extended(&h, 130.0), [true; 5]);
        assert_eq!(fingers_down(&h, 130.0), 0);
        assert!(!gun_shape(&h, 130.0));
        assert!(!bottom_three_curled(&h, 1.8));
        assert!(!thumb_down(&h, 0.8));
    }

    #[test]
    fn test_gun_hand() {
        let h = gun_hand(0.5);
        assert!(gun_shape(&h, 130.0));
        assert!(bottom_three_curled(&h, 1.8));
        assert_eq!(fingers_down(&h, 130.0), 3);
    }

    #[test]
    fn test_thumb_down_below_ip() {
        let mut h = gun_hand(0.5);
        h.0[THUMB_TIP] = Landmark::new(0.45, 0.85);
        assert!(thumb_down(&h, 0.8));
    }

    #[test]
    fn test_missing_landmarks_are_conservative() {
        let short = LandmarkSet(vec![Landmark::new(0.5, 0.5); 4]);
        assert!(!gun_shape(&short, 130.0));
        assert!(!bottom_three_curled(&short, 1.8));
        assert!(!thumb_down(&short, 0.8));
        assert_eq!(fingers_down(&short, 130.0), 0);
        assert_eq!(head_pose(&short), (0.0, 0.0));
        assert_eq!(body_lean(&short), 0.0);
        assert_eq!(mouth_separation(&short), 0.0);
    }

    fn face(nose: (f32, f32), lip_gap: f32) -> LandmarkSet {
        let mut pts = vec![Landmark::new(0.5, 0.5); 300];
        pts[FACE_NOSE_TIP] = Landmark::new(nose.0, nose.1);
        pts[FACE_LEFT_EYE] = Landmark::new(0.45, 0.4);
        pts[FACE_RIGHT_EYE] = Landmark::new(0.55, 0.4);
        pts[FACE_FOREHEAD] = Landmark::new(0.5, 0.3);
        pts[FACE_CHIN] = Landmark::new(0.5, 0.7);
        pts[FACE_UPPER_LIP_BOTTOM] = Landmark::new(0.5, 0.6);
        pts[FACE_LOWER_LIP_TOP] = Landmark::new(0.5, 0.6 + lip_gap);
        LandmarkSet(pts)
    }

    #[test]
    fn test_head_pose() {
        let (yaw, pitch) = head_pose(&face((0.53, 0.5), 0.0));
        assert!((yaw - 3.0).abs() < 1e-3);
        assert!(pitch.abs() < 1e-3);

        let (_, pitch) = head_pose(&face((0.5, 0.42), 0.0));
        assert!((pitch + 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_body_lean() {
        let mut pts = vec![Landmark::new(0.5, 0.5); 33];
        pts[POSE_LEFT_SHOULDER] = Landmark::new(0.55, 0.3);
        pts[POSE_RIGHT_SHOULDER] = Landmark::new(0.75, 0.3);
        pts[POSE_LEFT_HIP] = Landmark::new(0.55, 0.7);
        pts[POSE_RIGHT_HIP] = Landmark::new(0.75, 0.7);
        assert!((body_lean(&LandmarkSet(pts)) - 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_feature_set_extract() {
        let frame = Frame {
            timestamp_ms: 0,
            face: Some(face((0.5, 0.5), 0.03)),
            hands: vec![gun_hand(0.7), open_hand(0.2)],
            pose: None,
        };
        let fs = FeatureSet::extract(&frame, &cfg());
        assert_eq!(fs.mouth_open, Some(true));
        assert!(fs.right.unwrap().gun_shape);
        assert_eq!(fs.left.unwrap().fingers_down, 0);
        assert_eq!(fs.lean, 0.0);
    }

    #[test]
    fn test_no_face_means_unknown_mouth() {
        let fs = FeatureSet::extract(&Frame::default(), &cfg());
        assert_eq!(fs.mouth_open, None);
        assert!(fs.left.is_none() && fs.right.is_none());
    }
}
