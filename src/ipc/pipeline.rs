use log::{info, warn};
use serde::Serialize;
use std::{
    sync::{
        Arc, Mutex,
        mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    },
    time::Duration,
};

use crate::actions::{InputSink, UinputSink};
use crate::announce::Announcer;
use crate::config::Profile;
use crate::driver::{FrameDriver, FrameStatus};
use crate::landmarks::Frame;

/// Upper bound on how long a control message waits when no frames arrive.
const TICK: Duration = Duration::from_millis(50);

pub enum PipelineMsg {
    SetEnabled(bool),
    Rebuild(Box<Profile>),
    Shutdown,
}

/// What `status` reports about the frame loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSnapshot {
    pub frames: u64,
    pub input_open: bool,
    pub last: Option<FrameStatus>,
}

pub type SharedSnapshot = Arc<Mutex<PipelineSnapshot>>;

pub fn make_sink(dry_run: bool) -> UinputSink {
    if dry_run {
        info!("pipeline: dry run, no input will be injected");
        return UinputSink::noop();
    }
    UinputSink::new().unwrap_or_else(|e| {
        warn!("pipeline: uinput unavailable ({e}); falling back to no-op sink");
        UinputSink::noop()
    })
}

struct Pipeline {
    driver: FrameDriver,
    announcer: Announcer,
    enabled: bool,
    snapshot: SharedSnapshot,
}

impl Pipeline {
    fn new(profile: &Profile, enabled: bool, snapshot: SharedSnapshot) -> Self {
        if let Ok(mut s) = snapshot.lock() {
            s.input_open = true;
        }
        Self {
            driver: FrameDriver::from_profile(profile),
            announcer: Announcer::from_profile(profile),
            enabled,
            snapshot,
        }
    }

    /// Returns false once the loop should stop.
    fn on_control(&mut self, msg: PipelineMsg, sink: &mut dyn InputSink) -> bool {
        match msg {
            PipelineMsg::SetEnabled(on) => {
                if self.enabled != on {
                    info!("pipeline: control {}", if on { "enabled" } else { "disabled" });
                }
                self.enabled = on;
                if !on {
                    self.driver.release_all(sink);
                }
                true
            }
            PipelineMsg::Rebuild(profile) => {
                self.driver.release_all(sink);
                self.driver = FrameDriver::from_profile(&profile);
                self.announcer = Announcer::from_profile(&profile);
                info!(
                    "pipeline: rebuilt controllers (announce {})",
                    if self.announcer.is_enabled() { "on" } else { "off" }
                );
                true
            }
            PipelineMsg::Shutdown => false,
        }
    }

    fn on_frame(&mut self, frame: &Frame, sink: &mut dyn InputSink) {
        let status = self.driver.process(frame, self.enabled, sink);
        for ev in &status.events {
            self.announcer.announce(ev);
        }
        if let Ok(mut s) = self.snapshot.lock() {
            s.frames += 1;
            s.last = Some(status);
        }
    }

    fn finish(&mut self, sink: &mut dyn InputSink) {
        self.driver.release_all(sink);
        if let Ok(mut s) = self.snapshot.lock() {
            s.input_open = false;
        }
    }
}

/// Frame loop. Runs until shutdown, a closed control channel, or end of
/// input; every exit path releases all held input first.
pub fn run_pipeline(
    profile: &Profile,
    enabled: bool,
    frames: Receiver<Frame>,
    control: Receiver<PipelineMsg>,
    snapshot: SharedSnapshot,
    sink: &mut dyn InputSink,
) {
    let mut p = Pipeline::new(profile, enabled, snapshot);
    'run: loop {
        loop {
            match control.try_recv() {
                Ok(msg) => {
                    if !p.on_control(msg, sink) {
                        info!("pipeline: shutting down");
                        break 'run;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'run,
            }
        }
        match frames.recv_timeout(TICK) {
            Ok(frame) => p.on_frame(&frame, sink),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("pipeline: input closed");
                break;
            }
        }
    }
    p.finish(sink);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::recording::{RecordingSink, SinkEvent};
    use crate::landmarks::fixtures::gun_hand;
    use crate::landmarks::{Landmark, THUMB_IP, THUMB_TIP};
    use std::sync::mpsc;

    fn firing_frames() -> Vec<Frame> {
        let mut down = gun_hand(0.7);
        let ip = down.0[THUMB_IP];
        down.0[THUMB_TIP] = Landmark::new(ip.x, ip.y + 0.05);
        vec![
            Frame {
                hands: vec![gun_hand(0.7)],
                ..Default::default()
            },
            Frame {
                timestamp_ms: 33,
                hands: vec![down],
                ..Default::default()
            },
        ]
    }

    #[test]
    fn test_end_of_input_releases_everything() {
        let (ftx, frx) = mpsc::sync_channel(8);
        let (_ctx, crx) = mpsc::channel();
        for f in firing_frames() {
            ftx.send(f).unwrap();
        }
        drop(ftx);
        let snap = SharedSnapshot::default();
        let mut sink = RecordingSink::default();
        run_pipeline(&Profile::default(), true, frx, crx, snap.clone(), &mut sink);

        assert_eq!(sink.events, vec![SinkEvent::MouseDown, SinkEvent::MouseUp]);
        let s = snap.lock().unwrap();
        assert_eq!(s.frames, 2);
        assert!(!s.input_open);
    }

    #[test]
    fn test_shutdown_wins_over_pending_frames() {
        let (ftx, frx) = mpsc::sync_channel(8);
        let (ctx, crx) = mpsc::channel();
        for f in firing_frames() {
            ftx.send(f).unwrap();
        }
        ctx.send(PipelineMsg::Shutdown).unwrap();
        let snap = SharedSnapshot::default();
        let mut sink = RecordingSink::default();
        run_pipeline(&Profile::default(), true, frx, crx, snap.clone(), &mut sink);
        assert!(sink.events.is_empty());
        assert_eq!(snap.lock().unwrap().frames, 0);
    }

    #[test]
    fn test_disable_and_rebuild_release() {
        let snap = SharedSnapshot::default();
        let mut p = Pipeline::new(&Profile::default(), true, snap);
        let mut sink = RecordingSink::default();
        for f in firing_frames() {
            p.on_frame(&f, &mut sink);
        }
        assert_eq!(sink.take(), vec![SinkEvent::MouseDown]);

        assert!(p.on_control(PipelineMsg::SetEnabled(false), &mut sink));
        assert_eq!(sink.take(), vec![SinkEvent::MouseUp]);
        assert!(p.on_control(PipelineMsg::SetEnabled(false), &mut sink));
        assert!(sink.events.is_empty());

        assert!(p.on_control(PipelineMsg::SetEnabled(true), &mut sink));
        for f in firing_frames() {
            p.on_frame(&f, &mut sink);
        }
        assert!(p.on_control(PipelineMsg::Rebuild(Box::default()), &mut sink));
        assert_eq!(sink.take(), vec![SinkEvent::MouseDown, SinkEvent::MouseUp]);
        assert!(!p.on_control(PipelineMsg::Shutdown, &mut sink));
    }

    #[test]
    fn test_disabled_start_emits_nothing() {
        let snap = SharedSnapshot::default();
        let mut p = Pipeline::new(&Profile::default(), false, snap.clone());
        let mut sink = RecordingSink::default();
        for f in firing_frames() {
            p.on_frame(&f, &mut sink);
        }
        assert!(sink.events.is_empty());
        let s = snap.lock().unwrap();
        assert_eq!(s.last.as_ref().map(|l| l.gun_active), Some(true));
    }
}
