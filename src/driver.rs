//! Per-frame composition of the controllers.
//!
//! Controllers only ever see the extracted `FeatureSet`; none of them reads
//! another's state. The driver owns them all and is rebuilt from scratch on a
//! profile switch, after `release_all`.

use log::info;
use serde::Serialize;
use std::fmt;

use crate::actions::{InputSink, Key};
use crate::config::{FeatureConfig, Profile, StrafeSignal};
use crate::features::FeatureSet;
use crate::gestures::{AuxGestureController, AuxStatus, LeftHandGesture, MouthGesture};
use crate::gun::GunGestureLatch;
use crate::landmarks::Frame;
use crate::movement::{KeyStates, MovementAxisController};
use crate::pointer::{PointerController, PointerStatus};
use crate::trigger::{TriggerController, TriggerStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum FrameEvent {
    GunLocked,
    GunUnlocked,
    Fire,
    AuxPress { source: &'static str, key: Key },
}

impl fmt::Display for FrameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameEvent::GunLocked => f.write_str("gun up"),
            FrameEvent::GunUnlocked => f.write_str("gun down"),
            FrameEvent::Fire => f.write_str("fire"),
            FrameEvent::AuxPress { source, key } => write!(f, "{source} {key:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameStatus {
    pub timestamp_ms: u64,
    pub control_enabled: bool,
    pub gun_active: bool,
    pub trigger: TriggerStatus,
    pub pointer: PointerStatus,
    pub keys: KeyStates,
    pub left_hand: AuxStatus,
    pub mouth: AuxStatus,
    pub features: FeatureSet,
    pub events: Vec<FrameEvent>,
}

#[derive(Debug, Clone)]
pub struct FrameDriver {
    features: FeatureConfig,
    strafe_signal: StrafeSignal,
    gun: GunGestureLatch,
    trigger: TriggerController,
    pointer: PointerController,
    movement: MovementAxisController,
    left_hand: AuxGestureController<LeftHandGesture>,
    mouth: AuxGestureController<MouthGesture>,
}

impl FrameDriver {
    pub fn from_profile(p: &Profile) -> Self {
        Self {
            features: p.features.clone(),
            strafe_signal: p.movement.strafe_signal,
            gun: GunGestureLatch::new(p.gun.grace_frames),
            trigger: TriggerController::new(),
            pointer: PointerController::new(p.pointer.clone()),
            movement: MovementAxisController::new(&p.movement),
            left_hand: AuxGestureController::from_profile(
                "left_hand",
                p.left_hand.debounce_ms,
                p.left_hand.min_hold_frames,
                p,
            ),
            mouth: AuxGestureController::from_profile(
                "mouth",
                p.mouth.debounce_ms,
                p.mouth.min_hold_frames,
                p,
            ),
        }
    }

    pub fn process(
        &mut self,
        frame: &Frame,
        control_enabled: bool,
        sink: &mut dyn InputSink,
    ) -> FrameStatus {
        let fs = FeatureSet::extract(frame, &self.features);
        let mut events = Vec::new();

        let was_locked = self.gun.is_locked();
        let gun_active = self.gun.update(fs.right.as_ref());
        match (was_locked, gun_active) {
            (false, true) => events.push(FrameEvent::GunLocked),
            (true, false) => events.push(FrameEvent::GunUnlocked),
            _ => {}
        }

        let aiming = gun_active && control_enabled;
        let was_pressed = self.trigger.is_pressed();
        let trigger = self.trigger.update(fs.right.as_ref(), aiming, sink);
        if !was_pressed && self.trigger.is_pressed() {
            events.push(FrameEvent::Fire);
        }
        let pointer = self
            .pointer
            .update(fs.right.and_then(|h| h.index_tip), aiming, sink);

        let strafe = match self.strafe_signal {
            StrafeSignal::Lean => fs.lean,
            StrafeSignal::Yaw => fs.yaw,
        };
        let (_, keys) = self.movement.update(strafe, fs.pitch, control_enabled, sink);

        let now = frame.timestamp_ms;
        let left_hand = self.left_hand.update(
            fs.left.map(|h| LeftHandGesture::classify(h.fingers_down)),
            control_enabled,
            now,
            sink,
        );
        if let AuxStatus::Pressed(key) = left_hand {
            events.push(FrameEvent::AuxPress { source: "left_hand", key });
        }
        let mouth = self.mouth.update(
            fs.mouth_open.map(MouthGesture::from_open),
            control_enabled,
            now,
            sink,
        );
        if let AuxStatus::Pressed(key) = mouth {
            events.push(FrameEvent::AuxPress { source: "mouth", key });
        }

        FrameStatus {
            timestamp_ms: now,
            control_enabled,
            gun_active,
            trigger,
            pointer,
            keys,
            left_hand,
            mouth,
            features: fs,
            events,
        }
    }

    /// Leave nothing held in the sink. Safe to call repeatedly. The gun latch
    /// is not input and keeps tracking.
    pub fn release_all(&mut self, sink: &mut dyn InputSink) {
        if self.trigger.is_pressed() || !self.movement.pressed().is_empty() {
            info!("driver: releasing all held input");
        }
        self.trigger.force_release(sink);
        self.pointer.freeze();
        self.movement.release_all(sink);
        self.left_hand.reset();
        self.mouth.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::recording::{RecordingSink, SinkEvent};
    use crate::landmarks::fixtures::*;
    use crate::landmarks::*;

    fn pose(x: f32) -> LandmarkSet {
        LandmarkSet(vec![Landmark::new(x, 0.5); 33])
    }

    fn frame(t: u64, right: LandmarkSet, left: Option<LandmarkSet>, lean_x: f32) -> Frame {
        let mut hands = vec![right];
        hands.extend(left);
        Frame {
            timestamp_ms: t,
            face: None,
            hands,
            pose: Some(pose(lean_x)),
        }
    }

    fn thumb_down(mut h: LandmarkSet) -> LandmarkSet {
        let ip = h.0[THUMB_IP];
        h.0[THUMB_TIP] = Landmark::new(ip.x, ip.y + 0.05);
        h
    }

    fn one_down(cx: f32) -> LandmarkSet {
        let mut h = open_hand(cx);
        curl(&mut h, INDEX_MCP);
        h
    }

    #[test]
    fn test_gun_lock_fire_and_disable() {
        let mut d = FrameDriver::from_profile(&Profile::default());
        let mut sink = RecordingSink::default();

        let st = d.process(&frame(0, gun_hand(0.7), None, 0.5), true, &mut sink);
        assert!(st.gun_active);
        assert_eq!(st.events, vec![FrameEvent::GunLocked]);
        assert_eq!(st.pointer, PointerStatus::Baseline);
        assert_eq!(st.trigger, TriggerStatus::Ready);

        let st = d.process(&frame(33, thumb_down(gun_hand(0.7)), None, 0.5), true, &mut sink);
        assert_eq!(st.trigger, TriggerStatus::Firing);
        assert_eq!(st.events, vec![FrameEvent::Fire]);
        assert_eq!(sink.take(), vec![SinkEvent::MouseDown]);

        let st = d.process(&frame(66, thumb_down(gun_hand(0.7)), None, 0.5), false, &mut sink);
        assert_eq!(st.trigger, TriggerStatus::Inactive);
        assert_eq!(st.pointer, PointerStatus::Frozen);
        assert_eq!(sink.take(), vec![SinkEvent::MouseUp]);
    }

    #[test]
    fn test_movement_and_left_hand_compose() {
        let mut d = FrameDriver::from_profile(&Profile::default());
        let mut sink = RecordingSink::default();

        // lean right by 10 with a crouching left hand
        let st = d.process(&frame(0, gun_hand(0.7), Some(one_down(0.2)), 0.6), true, &mut sink);
        assert!(st.keys.d);
        assert_eq!(st.left_hand, AuxStatus::Pressed(Key::Ctrl));
        assert!(st.events.contains(&FrameEvent::AuxPress { source: "left_hand", key: Key::Ctrl }));
        assert_eq!(st.mouth, AuxStatus::NoObservation);
        assert!(sink.events.contains(&SinkEvent::KeyDown(Key::D)));
        assert!(sink.events.contains(&SinkEvent::Press(Key::Ctrl)));
    }

    #[test]
    fn test_disable_is_idempotent() {
        let mut d = FrameDriver::from_profile(&Profile::default());
        let mut sink = RecordingSink::default();
        d.process(&frame(0, gun_hand(0.7), None, 0.6), true, &mut sink);
        d.process(&frame(33, thumb_down(gun_hand(0.7)), None, 0.6), true, &mut sink);
        sink.take();

        d.process(&frame(66, thumb_down(gun_hand(0.7)), None, 0.6), false, &mut sink);
        let first = sink.take();
        assert!(first.contains(&SinkEvent::MouseUp));
        assert!(first.contains(&SinkEvent::KeyUp(Key::D)));

        let st = d.process(&frame(99, thumb_down(gun_hand(0.7)), None, 0.6), false, &mut sink);
        assert!(sink.events.is_empty());
        assert_eq!(st.keys, KeyStates::default());
    }

    #[test]
    fn test_release_all_leaves_nothing_held() {
        let mut d = FrameDriver::from_profile(&Profile::default());
        let mut sink = RecordingSink::default();
        d.process(&frame(0, gun_hand(0.7), None, 0.6), true, &mut sink);
        d.process(&frame(33, thumb_down(gun_hand(0.7)), None, 0.6), true, &mut sink);
        sink.take();

        d.release_all(&mut sink);
        assert_eq!(
            sink.take(),
            vec![SinkEvent::MouseUp, SinkEvent::KeyUp(Key::D)]
        );
        d.release_all(&mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_gun_lock_survives_release() {
        let mut d = FrameDriver::from_profile(&Profile::default());
        let mut sink = RecordingSink::default();
        d.process(&frame(0, gun_hand(0.7), None, 0.5), true, &mut sink);
        d.release_all(&mut sink);
        let st = d.process(&frame(33, gun_hand(0.7), None, 0.5), false, &mut sink);
        assert!(st.gun_active);
        assert!(st.events.is_empty());
        let st = d.process(&frame(66, gun_hand(0.7), None, 0.5), true, &mut sink);
        assert!(st.gun_active);
        assert!(st.events.is_empty());
        assert_eq!(st.pointer, PointerStatus::Baseline);
    }

    #[test]
    fn test_yaw_profile_ignores_lean() {
        let p = Profile::parse("[movement]\nstrafe_signal = \"yaw\"\n").unwrap();
        let mut d = FrameDriver::from_profile(&p);
        let mut sink = RecordingSink::default();
        let st = d.process(&frame(0, gun_hand(0.7), None, 0.9), true, &mut sink);
        assert_eq!(st.keys, KeyStates::default());
    }
}
