//! Landmark frames as newline-delimited JSON, one frame per line.
//!
//! ```text
//! {"t_ms": 1234, "face": [{"x":0.5,"y":0.4}, ...], "hands": [[...21 points], ...], "pose": [...]}
//! ```
//!
//! Every field is optional. Lines that fail to parse are logged and skipped;
//! the stream only ends at EOF or when the pipeline hangs up.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
    sync::mpsc::SyncSender,
    thread,
    time::Instant,
};
use thiserror::Error;

use crate::landmarks::{Frame, LandmarkSet};

/// Hands beyond this count are not something the extractor produces.
const MAX_HANDS: usize = 2;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has {0} hands, at most {MAX_HANDS} supported")]
    TooManyHands(usize),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    t_ms: Option<u64>,
    face: Option<LandmarkSet>,
    #[serde(default)]
    hands: Vec<LandmarkSet>,
    pose: Option<LandmarkSet>,
}

/// Parse one line. Blank lines yield `Ok(None)`; `now_ms` stands in for a
/// missing timestamp.
pub fn parse_line(line: &str, now_ms: u64) -> Result<Option<Frame>, FrameError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let raw: RawFrame = serde_json::from_str(line)?;
    if raw.hands.len() > MAX_HANDS {
        return Err(FrameError::TooManyHands(raw.hands.len()));
    }
    Ok(Some(Frame {
        timestamp_ms: raw.t_ms.unwrap_or(now_ms),
        face: raw.face.filter(|f| !f.is_empty()),
        hands: raw.hands.into_iter().filter(|h| !h.is_empty()).collect(),
        pose: raw.pose.filter(|p| !p.is_empty()),
    }))
}

/// `None` or `-` reads stdin.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead + Send>> {
    match path {
        Some(p) if p != Path::new("-") => {
            let f = File::open(p).with_context(|| format!("failed to open {}", p.display()))?;
            info!("source: reading frames from {}", p.display());
            Ok(Box::new(BufReader::new(f)))
        }
        _ => {
            info!("source: reading frames from stdin");
            Ok(Box::new(BufReader::new(io::stdin())))
        }
    }
}

/// Forward frames until EOF or until the receiver is gone. Returns the number
/// of frames delivered.
pub fn read_frames<R: BufRead>(reader: R, tx: &SyncSender<Frame>) -> usize {
    let clock = Instant::now();
    let mut sent = 0;
    for (n, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("source: read failed: {e}");
                break;
            }
        };
        let now_ms = clock.elapsed().as_millis() as u64;
        match parse_line(&line, now_ms) {
            Ok(Some(frame)) => {
                if tx.send(frame).is_err() {
                    debug!("source: pipeline gone, stopping");
                    break;
                }
                sent += 1;
            }
            Ok(None) => {}
            Err(e) => warn!("source: line {}: {e}", n + 1),
        }
    }
    sent
}

/// Reader thread. Dropping `tx` on exit is how the pipeline learns of EOF.
pub fn spawn_reader(
    reader: Box<dyn BufRead + Send>,
    tx: SyncSender<Frame>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("frame-reader".into())
        .spawn(move || {
            let n = read_frames(reader, &tx);
            info!("source: end of input after {n} frames");
        })
}
