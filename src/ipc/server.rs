use anyhow::{Result, anyhow};
use log::{error, info, warn};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
    sync::mpsc::{self, Sender},
    thread,
    time::Duration,
};

use super::pipeline::{PipelineMsg, SharedSnapshot, make_sink, run_pipeline};
use super::runtime::socket_path;
use crate::config::DaemonConfigState;
use crate::source;
use crate::watch;

/// Frames buffered between the reader and the pipeline.
const FRAME_QUEUE: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    /// Landmark stream; stdin when unset.
    pub input: Option<PathBuf>,
    pub enabled: bool,
    pub dry_run: bool,
    pub profile: Option<String>,
}

enum DaemonMsg {
    ProfileEdited(PathBuf),
    Shutdown,
}

struct DaemonState {
    enabled: bool,
    dry_run: bool,
    input: String,
    cfg: DaemonConfigState,
    pipeline: Sender<PipelineMsg>,
    snapshot: SharedSnapshot,
}

impl DaemonState {
    fn set_enabled(&mut self, on: bool) {
        if self.enabled != on {
            info!("daemon: control {}", if on { "enabled" } else { "disabled" });
        }
        self.enabled = on;
        let _ = self.pipeline.send(PipelineMsg::SetEnabled(on));
    }

    fn rebuild(&self) {
        let _ = self
            .pipeline
            .send(PipelineMsg::Rebuild(Box::new(self.cfg.profile.clone())));
    }

    fn reload(&mut self) -> Result<()> {
        self.cfg.reload()?;
        self.rebuild();
        info!("daemon: reloaded profile '{}'", self.cfg.active_name);
        Ok(())
    }

    fn use_profile(&mut self, name: &str) -> Result<()> {
        self.cfg.set_active(name)?;
        self.rebuild();
        info!("daemon: switched active profile to '{}'", self.cfg.active_name);
        Ok(())
    }

    fn status(&self) -> serde_json::Value {
        let snap = self.snapshot.lock().map(|s| s.clone()).unwrap_or_default();
        serde_json::json!({
            "enabled": self.enabled,
            "dry_run": self.dry_run,
            "active_profile": self.cfg.active_name,
            "profile_name": self.cfg.profile.meta.name,
            "socket": socket_path().ok(),
            "pid": std::process::id(),
            "input": self.input,
            "pipeline": snap,
        })
    }
}

pub fn run_daemon(opts: DaemonOptions) -> Result<()> {
    let mut cfg = DaemonConfigState::load_or_install_default()?;
    if let Some(name) = &opts.profile {
        cfg.set_active(name)?;
    }
    info!("daemon: active profile '{}'", cfg.active_name);

    // socket
    let sock = socket_path()?;
    if sock.exists() {
        if UnixStream::connect(&sock).is_ok() {
            return Err(anyhow!("gesturectl daemon already running at {}", sock.display()));
        }
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    listener.set_nonblocking(true)?;
    info!("daemon: listening on {}", sock.display());

    // frames
    let reader = source::open_input(opts.input.as_deref())?;
    let (tx_frame, rx_frame) = mpsc::sync_channel(FRAME_QUEUE);
    source::spawn_reader(reader, tx_frame)?;

    // pipeline
    let (tx_pipe, rx_pipe) = mpsc::channel();
    let snapshot = SharedSnapshot::default();
    let pipeline_thread = {
        let profile = cfg.profile.clone();
        let snapshot = snapshot.clone();
        let (enabled, dry_run) = (opts.enabled, opts.dry_run);
        thread::Builder::new().name("pipeline".into()).spawn(move || {
            let mut sink = make_sink(dry_run);
            run_pipeline(&profile, enabled, rx_frame, rx_pipe, snapshot, &mut sink);
        })?
    };
    if !opts.enabled {
        info!("daemon: starting disabled; use `gesturectl enable`");
    }

    // signals and profile edits
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonMsg>();
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signal_handle = signals.handle();
    {
        let tx = tx_evt.clone();
        thread::Builder::new().name("signals".into()).spawn(move || {
            for sig in signals.forever() {
                info!("daemon: received signal {sig}");
                let _ = tx.send(DaemonMsg::Shutdown);
            }
        })?;
    }
    let _watcher = {
        let tx = tx_evt.clone();
        watch::watch_profiles(&cfg.profiles_dir, move |p| {
            let _ = tx.send(DaemonMsg::ProfileEdited(p));
        })
        .map_err(|e| warn!("daemon: profile watcher unavailable: {e}"))
        .ok()
    };

    let mut state = DaemonState {
        enabled: opts.enabled,
        dry_run: opts.dry_run,
        input: opts
            .input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".into()),
        cfg,
        pipeline: tx_pipe,
        snapshot,
    };

    // accept loop
    'serve: loop {
        match listener.accept() {
            Ok((stream, _)) => match handle_client(stream, &mut state) {
                Ok(true) => break 'serve,
                Ok(false) => {}
                Err(e) => error!("ipc client error: {e}"),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("daemon: accept failed: {e}"),
        }

        while let Ok(msg) = rx_evt.try_recv() {
            match msg {
                DaemonMsg::ProfileEdited(path) => {
                    if path == state.cfg.active_path() {
                        if let Err(e) = state.reload() {
                            error!("daemon: reload after edit failed, keeping last good: {e:#}");
                        }
                    }
                }
                DaemonMsg::Shutdown => break 'serve,
            }
        }

        if pipeline_thread.is_finished() {
            info!("daemon: pipeline stopped");
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    let _ = state.pipeline.send(PipelineMsg::Shutdown);
    if pipeline_thread.join().is_err() {
        error!("daemon: pipeline thread panicked");
    }
    signal_handle.close();
    let _ = std::fs::remove_file(&sock);
    info!("daemon: stopped");
    Ok(())
}

/// Serve one request. Returns true when the daemon should stop.
fn handle_client(mut stream: UnixStream, st: &mut DaemonState) -> Result<bool> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(1)))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(false);
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let mut stop = false;
    let resp = match op {
        "status" => ok(st.status()),
        "enable" | "disable" | "toggle" => {
            let on = match op {
                "enable" => true,
                "disable" => false,
                _ => !st.enabled,
            };
            st.set_enabled(on);
            ok(serde_json::json!({ "enabled": st.enabled }))
        }
        "reload" => match st.reload() {
            Ok(()) => ok(serde_json::json!({ "active_profile": st.cfg.active_name })),
            Err(e) => fail(format!("{e:#}")),
        },
        "use" => match req.get("profile").and_then(|v| v.as_str()) {
            Some(name) => match st.use_profile(name) {
                Ok(()) => ok(serde_json::json!({ "active_profile": st.cfg.active_name })),
                Err(e) => fail(format!("{e:#}")),
            },
            None => fail("missing 'profile'".into()),
        },
        "list" => {
            let list = st.cfg.list_profiles();
            ok(serde_json::json!({ "profiles": list, "active": st.cfg.active_name }))
        }
        "doctor" => ok(st.cfg.doctor_report()),
        "shutdown" => {
            stop = true;
            ok(serde_json::json!("shutting down"))
        }
        _ => fail(format!("unknown op: {op}")),
    };

    writeln!(stream, "{resp}")?;
    Ok(stop)
}

fn ok(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "ok": true, "data": data })
}

fn fail(error: String) -> serde_json::Value {
    serde_json::json!({ "ok": false, "error": error })
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "gesturectl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
