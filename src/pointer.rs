//! Relative mouse motion from the index fingertip of the gun hand.
//!
//! Only deltas between consecutive active frames are ever emitted. Losing the
//! gun (or the hand) unsets the baseline, and the first frame after
//! reacquisition only records a new baseline, so the cursor never jumps to
//! wherever the hand reappears.

use log::debug;
use serde::Serialize;
use std::collections::VecDeque;

use crate::actions::InputSink;
use crate::config::PointerConfig;
use crate::landmarks::Landmark;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PointerStatus {
    /// Not tracking; cursor left where it is.
    Frozen,
    /// First active frame; baseline recorded, nothing emitted.
    Baseline,
    /// Active but below one pixel of accumulated motion.
    Still,
    Moved { dx: i32, dy: i32 },
}

#[derive(Debug, Clone)]
pub struct PointerController {
    cfg: PointerConfig,
    baseline: Option<(f32, f32)>,
    // spread-out remainder of a large jump, screen px before sensitivity;
    // never longer than `smoothing_frames - 1`
    pending: VecDeque<(f32, f32)>,
    // sub-pixel motion carried to the next frame
    residual: (f32, f32),
}

impl PointerController {
    pub fn new(cfg: PointerConfig) -> Self {
        Self {
            cfg,
            baseline: None,
            pending: VecDeque::new(),
            residual: (0.0, 0.0),
        }
    }

    pub fn update(
        &mut self,
        tip: Option<Landmark>,
        gun_active: bool,
        sink: &mut dyn InputSink,
    ) -> PointerStatus {
        let tip = match tip {
            Some(t) if gun_active => t,
            _ => {
                self.freeze();
                return PointerStatus::Frozen;
            }
        };

        let cur = (tip.x * self.cfg.screen_width, tip.y * self.cfg.screen_height);
        let Some(last) = self.baseline.replace(cur) else {
            debug!("pointer: baseline at ({:.0}, {:.0})", cur.0, cur.1);
            return PointerStatus::Baseline;
        };

        let raw = (cur.0 - last.0, cur.1 - last.1);
        let queued = self.pending.pop_front().unwrap_or((0.0, 0.0));

        let dist = (raw.0 * raw.0 + raw.1 * raw.1).sqrt();
        let steps = self.cfg.smoothing_frames;
        // a jump is only spread once the previous one has drained
        let now = if dist > self.cfg.gap_px && steps > 1 && self.pending.is_empty() {
            let part = (raw.0 / steps as f32, raw.1 / steps as f32);
            debug!("pointer: spreading {dist:.0}px jump over {steps} frames");
            for _ in 1..steps {
                self.pending.push_back(part);
            }
            part
        } else {
            raw
        };

        let gain = self.cfg.sensitivity;
        let acc = (
            (now.0 + queued.0) * gain + self.residual.0,
            (now.1 + queued.1) * gain + self.residual.1,
        );
        let dx = acc.0.trunc();
        let dy = acc.1.trunc();
        self.residual = (acc.0 - dx, acc.1 - dy);

        let (dx, dy) = (dx as i32, dy as i32);
        if dx == 0 && dy == 0 {
            return PointerStatus::Still;
        }
        sink.move_relative(dx, dy);
        PointerStatus::Moved { dx, dy }
    }

    /// Stop tracking without touching the cursor.
    pub fn freeze(&mut self) {
        self.baseline = None;
        self.pending.clear();
        self.residual = (0.0, 0.0);
    }
}
