//! W/A/S/D from two continuous signals, one hysteresis band per direction.
//!
//! A key is pressed once its signal reaches the press threshold and is only
//! released once the signal falls back inside `press * hysteresis`, which keeps
//! natural tremor around a threshold from chattering the key. The controller is
//! the sole writer of these four keys: every key in `pressed` is down in the
//! sink.

use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::actions::{InputSink, Key};
use crate::config::MovementConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyStates {
    pub w: bool,
    pub a: bool,
    pub s: bool,
    pub d: bool,
}

impl KeyStates {
    fn from_set(keys: &BTreeSet<Key>) -> Self {
        Self {
            w: keys.contains(&Key::W),
            a: keys.contains(&Key::A),
            s: keys.contains(&Key::S),
            d: keys.contains(&Key::D),
        }
    }
}

/// One direction of one axis. `sign` is -1 for the negative side.
#[derive(Debug, Clone, Copy)]
struct Band {
    key: Key,
    sign: f32,
    press: f32,
    release: f32,
}

impl Band {
    fn new(key: Key, sign: f32, press: f32, hysteresis: f32) -> Self {
        Self {
            key,
            sign,
            press,
            release: press * hysteresis,
        }
    }

    fn wants(&self, signal: f32, held: bool) -> bool {
        let v = signal * self.sign;
        if held { v >= self.release } else { v >= self.press }
    }
}

#[derive(Debug, Clone)]
pub struct MovementAxisController {
    bands: [Band; 4],
    enabled: bool,
    invert_pitch: bool,
    repeat_held: bool,
    pressed: BTreeSet<Key>,
}

impl MovementAxisController {
    pub fn new(cfg: &MovementConfig) -> Self {
        let h = cfg.hysteresis;
        Self {
            bands: [
                Band::new(Key::A, -1.0, cfg.strafe_threshold, h),
                Band::new(Key::D, 1.0, cfg.strafe_threshold, h),
                Band::new(Key::W, -1.0, cfg.forward_threshold, h),
                Band::new(Key::S, 1.0, cfg.back_threshold, h),
            ],
            enabled: cfg.enabled,
            invert_pitch: cfg.invert_pitch,
            repeat_held: cfg.repeat_held,
            pressed: BTreeSet::new(),
        }
    }

    pub fn pressed(&self) -> &BTreeSet<Key> {
        &self.pressed
    }

    /// `strafe` drives A/D, `pitch` drives W/S. Disabled control (or a
    /// profile with movement off) releases everything and reports an empty
    /// state.
    pub fn update(
        &mut self,
        strafe: f32,
        pitch: f32,
        control_enabled: bool,
        sink: &mut dyn InputSink,
    ) -> (BTreeSet<Key>, KeyStates) {
        if !control_enabled || !self.enabled {
            self.release_all(sink);
            return (BTreeSet::new(), KeyStates::default());
        }

        let pitch = if self.invert_pitch { -pitch } else { pitch };
        let desired: BTreeSet<Key> = self
            .bands
            .iter()
            .filter(|b| {
                let signal = if matches!(b.key, Key::A | Key::D) { strafe } else { pitch };
                b.wants(signal, self.pressed.contains(&b.key))
            })
            .map(|b| b.key)
            .collect();

        for key in self.pressed.difference(&desired) {
            debug!("movement: release {key:?}");
            sink.key_up(*key);
        }
        for key in &desired {
            if !self.pressed.contains(key) {
                debug!("movement: press {key:?}");
                sink.key_down(*key);
            } else if self.repeat_held {
                sink.key_down(*key);
            }
        }

        self.pressed = desired.clone();
        let states = KeyStates::from_set(&desired);
        (desired, states)
    }

    /// Key-up for everything held. Safe to call any number of times.
    pub fn release_all(&mut self, sink: &mut dyn InputSink) {
        if self.pressed.is_empty() {
            return;
        }
        debug!("movement: releasing {:?}", self.pressed);
        for key in std::mem::take(&mut self.pressed) {
            sink.key_up(key);
        }
    }
}
