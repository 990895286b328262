//! Debounced one-shot keys from discrete gestures (left-hand finger counts,
//! mouth open).
//!
//! A key is tapped once when a bound label becomes the stable label, never
//! while it is held, and never twice inside the debounce window.

use log::{debug, info};
use serde::Serialize;
use std::{collections::HashMap, fmt::Debug, hash::Hash};

use crate::actions::{InputSink, Key};
use crate::config::Profile;

/// A discrete per-frame label that may be bound to a one-shot key.
pub trait AuxLabel: Copy + Eq + Hash + Debug + 'static {
    const ALL: &'static [Self];

    /// Name used under `[bindings]`, or `None` if the label can never press.
    fn binding_name(&self) -> Option<&'static str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeftHandGesture {
    /// Exactly one finger folded: crouch.
    OneDown,
    /// Four fingers folded: jump.
    FourDown,
    Other,
}

impl LeftHandGesture {
    pub fn classify(fingers_down: u8) -> Self {
        match fingers_down {
            1 => LeftHandGesture::OneDown,
            4 => LeftHandGesture::FourDown,
            _ => LeftHandGesture::Other,
        }
    }
}

impl AuxLabel for LeftHandGesture {
    const ALL: &'static [Self] = &[
        LeftHandGesture::OneDown,
        LeftHandGesture::FourDown,
        LeftHandGesture::Other,
    ];

    fn binding_name(&self) -> Option<&'static str> {
        match self {
            LeftHandGesture::OneDown => Some("left_hand.one_down"),
            LeftHandGesture::FourDown => Some("left_hand.four_down"),
            LeftHandGesture::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MouthGesture {
    Open,
    Closed,
}

impl MouthGesture {
    pub fn from_open(open: bool) -> Self {
        if open { MouthGesture::Open } else { MouthGesture::Closed }
    }
}

impl AuxLabel for MouthGesture {
    const ALL: &'static [Self] = &[MouthGesture::Open, MouthGesture::Closed];

    fn binding_name(&self) -> Option<&'static str> {
        match self {
            MouthGesture::Open => Some("mouth.open"),
            MouthGesture::Closed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxStatus {
    Disabled,
    /// Nothing observed this frame; state kept as is.
    NoObservation,
    /// New label not yet seen for `min_hold_frames` frames.
    Settling,
    Holding,
    /// New stable label with no key bound.
    Ready,
    /// New stable label, but inside the debounce window.
    Debounced,
    Pressed(Key),
}

/// Fires a single key press on entry into a bound label, rate-limited by a
/// debounce window shared by all labels of this controller.
#[derive(Debug, Clone)]
pub struct AuxGestureController<G: AuxLabel> {
    name: &'static str,
    debounce_ms: u64,
    min_hold_frames: u32,
    keymap: HashMap<G, Key>,
    last_gesture: Option<G>,
    last_trigger_ms: Option<u64>,
    candidate: Option<(G, u32)>,
}

impl<G: AuxLabel> AuxGestureController<G> {
    pub fn new(
        name: &'static str,
        debounce_ms: u64,
        min_hold_frames: u32,
        keymap: HashMap<G, Key>,
    ) -> Self {
        Self {
            name,
            debounce_ms,
            min_hold_frames: min_hold_frames.max(1),
            keymap,
            last_gesture: None,
            last_trigger_ms: None,
            candidate: None,
        }
    }

    /// Keymap taken from the profile's `[bindings]`.
    pub fn from_profile(
        name: &'static str,
        debounce_ms: u64,
        min_hold_frames: u32,
        profile: &Profile,
    ) -> Self {
        let keymap = G::ALL
            .iter()
            .filter_map(|g| Some((*g, profile.binding(g.binding_name()?)?)))
            .collect();
        Self::new(name, debounce_ms, min_hold_frames, keymap)
    }

    pub fn update(
        &mut self,
        observed: Option<G>,
        enabled: bool,
        now_ms: u64,
        sink: &mut dyn InputSink,
    ) -> AuxStatus {
        if !enabled {
            self.reset();
            return AuxStatus::Disabled;
        }
        let Some(g) = observed else {
            return AuxStatus::NoObservation;
        };

        let seen = match self.candidate {
            Some((c, n)) if c == g => n.saturating_add(1),
            _ => 1,
        };
        self.candidate = Some((g, seen));
        if seen < self.min_hold_frames {
            return AuxStatus::Settling;
        }

        if self.last_gesture == Some(g) {
            return AuxStatus::Holding;
        }
        self.last_gesture = Some(g);

        let Some(key) = self.keymap.get(&g).copied() else {
            debug!("{}: {g:?} (unbound)", self.name);
            return AuxStatus::Ready;
        };
        if let Some(t) = self.last_trigger_ms {
            if now_ms.saturating_sub(t) < self.debounce_ms {
                debug!("{}: {g:?} debounced", self.name);
                return AuxStatus::Debounced;
            }
        }
        info!("{}: {g:?} -> {key:?}", self.name);
        sink.press_once(key);
        self.last_trigger_ms = Some(now_ms);
        AuxStatus::Pressed(key)
    }

    pub fn reset(&mut self) {
        self.last_gesture = None;
        self.last_trigger_ms = None;
        self.candidate = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::recording::{RecordingSink, SinkEvent};

    fn left(debounce_ms: u64, hold: u32) -> AuxGestureController<LeftHandGesture> {
        AuxGestureController::from_profile("left_hand", debounce_ms, hold, &Profile::default())
    }

    #[test]
    fn test_classification_is_exclusive() {
        let mut c = left(0, 1);
        let expected = [
            (0, None),
            (1, Some(Key::Ctrl)),
            (2, None),
            (3, None),
            (4, Some(Key::Space)),
            (5, None),
        ];
        for (i, (down, key)) in expected.into_iter().enumerate() {
            // pass through neutral so every frame is a fresh entry
            c.reset();
            let mut sink = RecordingSink::default();
            let status = c.update(
                Some(LeftHandGesture::classify(down)),
                true,
                i as u64 * 1000,
                &mut sink,
            );
            match key {
                Some(k) => {
                    assert_eq!(status, AuxStatus::Pressed(k), "fingers_down={down}");
                    assert_eq!(sink.events, vec![SinkEvent::Press(k)]);
                }
                None => {
                    assert_eq!(status, AuxStatus::Ready, "fingers_down={down}");
                    assert!(sink.events.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_debounce_window() {
        let mut c = left(100, 1);
        let mut sink = RecordingSink::default();
        let one = Some(LeftHandGesture::OneDown);
        let other = Some(LeftHandGesture::Other);
        assert_eq!(c.update(one, true, 0, &mut sink), AuxStatus::Pressed(Key::Ctrl));
        assert_eq!(c.update(one, true, 33, &mut sink), AuxStatus::Holding);
        assert_eq!(c.update(other, true, 50, &mut sink), AuxStatus::Ready);
        assert_eq!(c.update(one, true, 80, &mut sink), AuxStatus::Debounced);
        c.update(other, true, 120, &mut sink);
        assert_eq!(c.update(one, true, 150, &mut sink), AuxStatus::Pressed(Key::Ctrl));
        assert_eq!(sink.count(SinkEvent::Press(Key::Ctrl)), 2);
    }

    #[test]
    fn test_presses_never_closer_than_debounce() {
        let mut c = left(100, 1);
        let mut sink = RecordingSink::default();
        let mut presses = Vec::new();
        for i in 0..200u64 {
            let g = if i % 2 == 0 { 1 } else { 4 };
            let now = i * 16;
            if let AuxStatus::Pressed(_) =
                c.update(Some(LeftHandGesture::classify(g)), true, now, &mut sink)
            {
                presses.push(now);
            }
        }
        assert!(presses.len() > 1);
        for w in presses.windows(2) {
            assert!(w[1] - w[0] >= 100);
        }
    }

    #[test]
    fn test_no_observation_keeps_state() {
        let mut c = left(0, 1);
        let mut sink = RecordingSink::default();
        c.update(Some(LeftHandGesture::OneDown), true, 0, &mut sink);
        assert_eq!(c.update(None, true, 10, &mut sink), AuxStatus::NoObservation);
        assert_eq!(
            c.update(Some(LeftHandGesture::OneDown), true, 20, &mut sink),
            AuxStatus::Holding
        );
        assert_eq!(sink.count(SinkEvent::Press(Key::Ctrl)), 1);
    }

    #[test]
    fn test_disabled_resets_and_is_silent() {
        let mut c = left(100, 1);
        let mut sink = RecordingSink::default();
        c.update(Some(LeftHandGesture::OneDown), true, 0, &mut sink);
        sink.take();
        for t in [10, 20] {
            assert_eq!(
                c.update(Some(LeftHandGesture::FourDown), false, t, &mut sink),
                AuxStatus::Disabled
            );
        }
        assert!(sink.events.is_empty());
        assert_eq!(c.last_gesture, None);
        // debounce cleared as well
        assert_eq!(
            c.update(Some(LeftHandGesture::OneDown), true, 30, &mut sink),
            AuxStatus::Pressed(Key::Ctrl)
        );
    }

    #[test]
    fn test_min_hold_frames() {
        let mut c = AuxGestureController::from_profile("mouth", 0, 3, &Profile::default());
        let mut sink = RecordingSink::default();
        let open = Some(MouthGesture::Open);
        assert_eq!(c.update(open, true, 0, &mut sink), AuxStatus::Settling);
        assert_eq!(c.update(open, true, 1, &mut sink), AuxStatus::Settling);
        assert_eq!(c.update(open, true, 2, &mut sink), AuxStatus::Pressed(Key::T));
        // a single-frame flicker does not count
        assert_eq!(c.update(Some(MouthGesture::Closed), true, 3, &mut sink), AuxStatus::Settling);
        assert_eq!(c.update(open, true, 4, &mut sink), AuxStatus::Settling);
        assert_eq!(sink.count(SinkEvent::Press(Key::T)), 1);
    }

    #[test]
    fn test_custom_bindings() {
        let p = Profile::parse("[bindings]\n\"left_hand.one_down\" = \"key:C\"\n").unwrap();
        let mut c = AuxGestureController::<LeftHandGesture>::from_profile("left_hand", 0, 1, &p);
        let mut sink = RecordingSink::default();
        assert_eq!(
            c.update(Some(LeftHandGesture::OneDown), true, 0, &mut sink),
            AuxStatus::Pressed(Key::C)
        );
        // no defaults for the rest once [bindings] is given
        c.reset();
        assert_eq!(
            c.update(Some(LeftHandGesture::FourDown), true, 0, &mut sink),
            AuxStatus::Ready
        );
    }
}
