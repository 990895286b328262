use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::actions::Key;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub extension_angle_deg: f32,
    pub curl_ratio: f32,
    pub thumb_wrist_ratio: f32,
    pub mouth_separation: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            extension_angle_deg: 130.0,
            curl_ratio: 1.8,
            thumb_wrist_ratio: 0.8,
            mouth_separation: 0.015,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GunConfig {
    /// Frames without a hand tolerated before the lock drops (~1s at 30fps).
    pub grace_frames: u32,
}

impl Default for GunConfig {
    fn default() -> Self {
        Self { grace_frames: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    pub sensitivity: f32,
    pub screen_width: f32,
    pub screen_height: f32,
    /// Per-frame jump (screen px, before sensitivity) that gets spread out.
    pub gap_px: f32,
    pub smoothing_frames: u32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            sensitivity: 3.0,
            screen_width: 1920.0,
            screen_height: 1080.0,
            gap_px: 120.0,
            smoothing_frames: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrafeSignal {
    Lean,
    Yaw,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Off for hands-only profiles; W/A/S/D are then never pressed.
    pub enabled: bool,
    pub strafe_signal: StrafeSignal,
    pub strafe_threshold: f32,
    pub forward_threshold: f32,
    pub back_threshold: f32,
    pub hysteresis: f32,
    pub invert_pitch: bool,
    pub repeat_held: bool,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strafe_signal: StrafeSignal::Lean,
            strafe_threshold: 3.0,
            forward_threshold: 8.0,
            back_threshold: 12.0,
            hysteresis: 0.7,
            invert_pitch: false,
            repeat_held: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeftHandConfig {
    pub debounce_ms: u64,
    pub min_hold_frames: u32,
}

impl Default for LeftHandConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            min_hold_frames: 1,
        }
    }
}

/// Natural mouth movement is spammy, hence the long debounce.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MouthConfig {
    pub debounce_ms: u64,
    pub min_hold_frames: u32,
}

impl Default for MouthConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            min_hold_frames: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    /// Program and leading args; the phrase is appended as the last arg.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub gun: GunConfig,
    #[serde(default)]
    pub pointer: PointerConfig,
    #[serde(default)]
    pub movement: MovementConfig,
    #[serde(default)]
    pub left_hand: LeftHandConfig,
    #[serde(default)]
    pub mouth: MouthConfig,
    #[serde(default)]
    pub announce: AnnounceConfig,

    // Accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(
        default = "default_bindings",
        deserialize_with = "deserialize_bindings_flat"
    )]
    pub bindings: HashMap<String, String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            meta: Meta::default(),
            features: FeatureConfig::default(),
            gun: GunConfig::default(),
            pointer: PointerConfig::default(),
            movement: MovementConfig::default(),
            left_hand: LeftHandConfig::default(),
            mouth: MouthConfig::default(),
            announce: AnnounceConfig::default(),
            bindings: default_bindings(),
        }
    }
}

impl Profile {
    pub fn parse(txt: &str) -> Result<Self, ProfileError> {
        let profile: Profile = toml::from_str(txt).map_err(|e| ProfileError::Parse(e.to_string()))?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    /// Key bound to a gesture name such as "left_hand.one_down".
    pub fn binding(&self, gesture: &str) -> Option<Key> {
        self.bindings
            .get(gesture)
            .and_then(|a| a.strip_prefix("key:"))
            .and_then(|k| Key::parse(k.trim()))
    }
}

/// Gesture names that may carry a binding. `left_hand.other` is deliberately
/// absent: transitional hand shapes never press anything.
pub const BINDABLE_GESTURES: [&str; 3] = ["left_hand.one_down", "left_hand.four_down", "mouth.open"];

fn default_bindings() -> HashMap<String, String> {
    HashMap::from([
        ("left_hand.one_down".to_string(), "key:CTRL".to_string()),
        ("left_hand.four_down".to_string(), "key:SPACE".to_string()),
        ("mouth.open".to_string(), "key:T".to_string()),
    ])
}

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("failed to parse profile: {0}")]
    Parse(String),
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("movement.hysteresis must be in (0,1], got {0}")]
    Hysteresis(f32),
    #[error("empty binding key")]
    EmptyBindingKey,
    #[error("binding '{0}' is not a known gesture")]
    UnknownGesture(String),
    #[error("binding '{key}' has invalid action '{action}' (expected key:NAME)")]
    InvalidAction { key: String, action: String },
    #[error("binding '{key}' uses unsupported key '{token}'")]
    UnknownKey { key: String, token: String },
    #[error("binding '{key}' uses {k:?}, which is owned by movement")]
    ReservedKey { key: String, k: Key },
    #[error("key {0:?} is bound to more than one gesture")]
    DuplicateKey(Key),
    #[error("announce.command is set but meta.allow_commands=false")]
    CommandsNotAllowed,
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(de: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

pub fn validate_profile(p: &Profile) -> Result<(), ProfileError> {
    let positive = [
        ("features.extension_angle_deg", p.features.extension_angle_deg),
        ("features.curl_ratio", p.features.curl_ratio),
        ("features.thumb_wrist_ratio", p.features.thumb_wrist_ratio),
        ("features.mouth_separation", p.features.mouth_separation),
        ("pointer.sensitivity", p.pointer.sensitivity),
        ("pointer.screen_width", p.pointer.screen_width),
        ("pointer.screen_height", p.pointer.screen_height),
        ("pointer.gap_px", p.pointer.gap_px),
        ("movement.strafe_threshold", p.movement.strafe_threshold),
        ("movement.forward_threshold", p.movement.forward_threshold),
        ("movement.back_threshold", p.movement.back_threshold),
    ];
    for (name, v) in positive {
        if !(v > 0.0) {
            return Err(ProfileError::NotPositive(name));
        }
    }
    let h = p.movement.hysteresis;
    if !(h > 0.0 && h <= 1.0) {
        return Err(ProfileError::Hysteresis(h));
    }

    let mut seen = HashSet::new();
    let mut names: Vec<_> = p.bindings.iter().collect();
    names.sort();
    for (k, v) in names {
        if k.trim().is_empty() {
            return Err(ProfileError::EmptyBindingKey);
        }
        if !BINDABLE_GESTURES.contains(&k.as_str()) {
            return Err(ProfileError::UnknownGesture(k.clone()));
        }
        let Some(token) = v.strip_prefix("key:") else {
            return Err(ProfileError::InvalidAction {
                key: k.clone(),
                action: v.clone(),
            });
        };
        let Some(key) = Key::parse(token.trim()) else {
            return Err(ProfileError::UnknownKey {
                key: k.clone(),
                token: token.trim().to_string(),
            });
        };
        if key.is_movement() {
            return Err(ProfileError::ReservedKey { key: k.clone(), k: key });
        }
        if !seen.insert(key) {
            return Err(ProfileError::DuplicateKey(key));
        }
    }

    if !p.announce.command.is_empty() && !p.meta.allow_commands {
        return Err(ProfileError::CommandsNotAllowed);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .ok_or_else(|| anyhow!("cannot determine home directory"))?
        .home_dir()
        .to_path_buf();
    Ok(home.join(".config").join("gesturectl"))
}

const BUILTIN_PROFILES: [(&str, &str); 4] = [
    ("default", include_str!("../profiles/default.toml")),
    ("basic", include_str!("../profiles/basic.toml")),
    ("dual_hand", include_str!("../profiles/dual_hand.toml")),
    ("krunker", include_str!("../profiles/krunker.toml")),
];

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        for (name, text) in BUILTIN_PROFILES {
            let path = profdir.join(format!("{name}.toml"));
            if !path.exists() {
                fs::write(&path, text)?;
                info!("installed built-in profile at {}", path.display());
            }
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            fs::write(&active_ptr, b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Keeps the last good profile when the file fails to load.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        self.profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        Ok(())
    }

    pub fn active_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let broken: Vec<_> = self
            .list_profiles()
            .into_iter()
            .filter_map(|name| {
                load_profile(&self.profiles_dir, &name)
                    .err()
                    .map(|e| serde_json::json!({ "profile": name, "error": e.to_string() }))
            })
            .collect();
        if !broken.is_empty() {
            warn!("doctor: {} profile(s) fail to load", broken.len());
        }
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "broken_profiles": broken,
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let profile = Profile::parse(&txt).with_context(|| format!("invalid profile {}", path.display()))?;
    Ok(profile)
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}
