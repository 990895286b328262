//! Sticky "gun mode" latch for the aiming hand.
//!
//! Acquisition needs the strict index-out shape; once locked, only the looser
//! grip test has to hold, so jitter or a changed camera angle does not drop the
//! lock mid-aim. A lost hand is tolerated for `grace_frames` frames.

use log::info;

use crate::features::HandFeatures;

#[derive(Debug, Clone)]
pub struct GunGestureLatch {
    locked: bool,
    frames_without_hand: u32,
    grace_frames: u32,
}

impl GunGestureLatch {
    pub fn new(grace_frames: u32) -> Self {
        Self {
            locked: false,
            frames_without_hand: 0,
            grace_frames,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Advance one frame; returns whether gun mode is active.
    pub fn update(&mut self, hand: Option<&HandFeatures>) -> bool {
        let Some(hand) = hand else {
            if self.locked {
                self.frames_without_hand += 1;
                if self.frames_without_hand > self.grace_frames {
                    info!(
                        "gun: unlocked (hand lost for {} frames)",
                        self.frames_without_hand
                    );
                    self.unlock();
                }
            }
            return self.locked;
        };

        self.frames_without_hand = 0;
        if !self.locked {
            if hand.gun_shape {
                info!("gun: locked");
                self.locked = true;
            }
        } else if !hand.bottom_three_curled {
            info!("gun: unlocked (grip released)");
            self.unlock();
        }
        self.locked
    }

    fn unlock(&mut self) {
        self.locked = false;
        self.frames_without_hand = 0;
    }
}
