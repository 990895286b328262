//! Edge-triggered left mouse button driven by the thumb of the gun hand.
//!
//! Sole writer of the mouse button. `pressed == true` always means the sink
//! has seen a mouse-down without a matching mouse-up.

use log::debug;
use serde::Serialize;
use std::fmt;

use crate::actions::InputSink;
use crate::features::HandFeatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Inactive,
    Firing,
    Ready,
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerStatus::Inactive => "not active",
            TriggerStatus::Firing => "FIRING",
            TriggerStatus::Ready => "ready",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerController {
    pressed: bool,
    last_thumb_down: bool,
}

impl TriggerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn update(
        &mut self,
        hand: Option<&HandFeatures>,
        gun_active: bool,
        sink: &mut dyn InputSink,
    ) -> TriggerStatus {
        let hand = match hand {
            Some(h) if gun_active => h,
            _ => {
                self.force_release(sink);
                return TriggerStatus::Inactive;
            }
        };

        let thumb_down = hand.thumb_down;
        if thumb_down && !self.last_thumb_down && !self.pressed {
            debug!("trigger: mouse down");
            sink.mouse_down();
            self.pressed = true;
        } else if !thumb_down && self.last_thumb_down && self.pressed {
            debug!("trigger: mouse up");
            sink.mouse_up();
            self.pressed = false;
        }
        self.last_thumb_down = thumb_down;

        if self.pressed {
            TriggerStatus::Firing
        } else {
            TriggerStatus::Ready
        }
    }

    /// Idempotent: emits exactly one mouse-up if and only if pressed.
    /// The thumb edge is reset too, so a thumb already down when the gun
    /// re-arms counts as a fresh press.
    pub fn force_release(&mut self, sink: &mut dyn InputSink) {
        if self.pressed {
            debug!("trigger: force release");
            sink.mouse_up();
            self.pressed = false;
        }
        self.last_thumb_down = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::recording::{RecordingSink, SinkEvent};

    fn hand(thumb_down: bool) -> HandFeatures {
        HandFeatures {
            thumb_down,
            ..Default::default()
        }
    }

    #[test]
    fn test_press_and_release_pair() {
        let mut t = TriggerController::new();
        let mut sink = RecordingSink::default();
        assert_eq!(t.update(Some(&hand(false)), true, &mut sink), TriggerStatus::Ready);
        assert_eq!(t.update(Some(&hand(true)), true, &mut sink), TriggerStatus::Firing);
        assert_eq!(t.update(Some(&hand(true)), true, &mut sink), TriggerStatus::Firing);
        assert_eq!(t.update(Some(&hand(false)), true, &mut sink), TriggerStatus::Ready);
        assert_eq!(sink.events, vec![SinkEvent::MouseDown, SinkEvent::MouseUp]);
    }

    #[test]
    fn test_no_double_mouse_down() {
        let mut t = TriggerController::new();
        let mut sink = RecordingSink::default();
        for i in 0..20 {
            t.update(Some(&hand(i % 2 == 0)), true, &mut sink);
        }
        let mut down = false;
        for ev in &sink.events {
            match ev {
                SinkEvent::MouseDown => {
                    assert!(!down, "mouse down twice in a row");
                    down = true;
                }
                SinkEvent::MouseUp => {
                    assert!(down, "mouse up without mouse down");
                    down = false;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_lock_loss_releases_exactly_once() {
        let mut t = TriggerController::new();
        let mut sink = RecordingSink::default();
        t.update(Some(&hand(true)), true, &mut sink);
        assert!(t.is_pressed());
        assert_eq!(t.update(Some(&hand(true)), false, &mut sink), TriggerStatus::Inactive);
        assert_eq!(t.update(None, false, &mut sink), TriggerStatus::Inactive);
        assert_eq!(sink.count(SinkEvent::MouseUp), 1);
        assert!(!t.is_pressed());
    }

    #[test]
    fn test_missing_hand_releases() {
        let mut t = TriggerController::new();
        let mut sink = RecordingSink::default();
        t.update(Some(&hand(true)), true, &mut sink);
        t.update(None, true, &mut sink);
        assert_eq!(sink.events, vec![SinkEvent::MouseDown, SinkEvent::MouseUp]);
    }

    #[test]
    fn test_force_release_idempotent() {
        let mut t = TriggerController::new();
        let mut sink = RecordingSink::default();
        t.force_release(&mut sink);
        t.force_release(&mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(TriggerStatus::Firing.to_string(), "FIRING");
        assert_eq!(TriggerStatus::Inactive.to_string(), "not active");
    }
}
