//! Spoken callouts for frame events through an external command
//! (e.g. `["espeak", "-s", "180"]`; the phrase is appended).
//!
//! The frame loop never waits on it: phrases go through a small bounded queue
//! and are dropped when the worker falls behind.

use log::{debug, error, info, warn};
use std::{
    process::{Command, Stdio},
    sync::mpsc::{self, SyncSender, TrySendError},
    thread,
};

use crate::config::Profile;
use crate::driver::FrameEvent;

const QUEUE_DEPTH: usize = 8;

#[derive(Debug, Default)]
pub struct Announcer {
    tx: Option<SyncSender<String>>,
}

impl Announcer {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Spawns the worker only when the profile both names a command and
    /// allows running one.
    pub fn from_profile(p: &Profile) -> Self {
        let cmd = p.announce.command.clone();
        if cmd.is_empty() {
            return Self::disabled();
        }
        if !p.meta.allow_commands {
            warn!("announce: command set but meta.allow_commands=false; disabled");
            return Self::disabled();
        }

        let (tx, rx) = mpsc::sync_channel::<String>(QUEUE_DEPTH);
        let spawned = thread::Builder::new()
            .name("announcer".into())
            .spawn(move || {
                for phrase in rx {
                    run_command(&cmd, &phrase);
                }
                debug!("announce: worker stopped");
            });
        match spawned {
            Ok(_) => {
                info!("announce: enabled ({})", p.announce.command.join(" "));
                Self { tx: Some(tx) }
            }
            Err(e) => {
                error!("announce: failed to start worker: {e}");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue a phrase; returns false if it was dropped.
    pub fn announce(&self, event: &FrameEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(event.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(p)) => {
                debug!("announce: queue full, dropping '{p}'");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

fn run_command(cmd: &[String], phrase: &str) {
    let Some((prog, args)) = cmd.split_first() else {
        return;
    };
    let status = Command::new(prog)
        .args(args)
        .arg(phrase)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status();
    match status {
        Ok(s) if !s.success() => warn!("announce: '{prog}' exited with {s}"),
        Ok(_) => {}
        Err(e) => error!("announce: failed to run '{prog}': {e}"),
    }
}
