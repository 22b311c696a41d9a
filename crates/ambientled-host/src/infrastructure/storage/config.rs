//! Configuration file loading for the host.
//!
//! The file describes the loop rates and every strip with its segments:
//!
//! ```json
//! {
//!   "ups": 60, "fps": 30, "lerp": 0.5,
//!   "strips": [{
//!     "type": "rpi", "addr": "192.168.1.20", "port": 5163,
//!     "leds": 120, "max_brightness": 600,
//!     "r_mult": 1.0, "g_mult": 0.9, "b_mult": 0.8,
//!     "segments": [{
//!       "offset": 0, "length": 60, "display": ":0",
//!       "x": 0, "y": 0, "width": 1920, "height": 40,
//!       "orientation": 1, "flip": false
//!     }]
//!   }]
//! }
//! ```
//!
//! Files ending in `.toml` are read as TOML with the same keys; anything else
//! is read as JSON.
//!
//! # Serde default values
//!
//! Fields added on top of the original schema are optional and fall back to
//! defaults: `sample_step`, a `link` section with timeouts and the reconnect
//! schedule, and a per-strip `baud_rate` for serial controllers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ambientled_core::{
    CaptureRect, Calibration, DeviceKind, HandshakePolicy, Orientation, Placement, Segment, Strip,
    Timing, Topology, TopologyError, DEFAULT_SERIAL_BAUD_RATE,
};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::application::backoff::BackoffPolicy;
use crate::infrastructure::transport::LinkSettings;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON content could not be parsed.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A network controller entry has no `port`.
    #[error("strip {strip}: \"rpi\" strips require a port")]
    MissingPort { strip: usize },

    /// A `link` setting that must be positive is zero.
    #[error("link.{field} must be greater than zero")]
    ZeroLinkSetting { field: &'static str },

    /// The strips and segments do not form a valid topology.
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Controller updates per second.
    pub ups: u32,
    /// Screen captures per second.
    pub fps: u32,
    /// Device-side interpolation factor.
    pub lerp: f32,
    /// Pixel stride used when software backends average a rectangle.
    #[serde(default = "default_sample_step")]
    pub sample_step: usize,
    #[serde(default)]
    pub link: LinkConfig,
    pub strips: Vec<StripEntry>,
}

/// Controller type as written in the file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StripType {
    /// Network controller (Raspberry Pi) over TCP.
    Rpi,
    /// Microcontroller (Arduino) over a serial line.
    Arduino,
}

/// One strip entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StripEntry {
    #[serde(rename = "type")]
    pub kind: StripType,
    /// IP address / host name, or serial device path.
    pub addr: String,
    /// TCP port; required for `rpi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Serial baud rate; `arduino` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    pub leds: usize,
    pub max_brightness: u32,
    pub r_mult: f32,
    pub g_mult: f32,
    pub b_mult: f32,
    #[serde(default)]
    pub segments: Vec<SegmentEntry>,
}

/// One segment entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentEntry {
    pub offset: usize,
    pub length: usize,
    pub display: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// `0` = vertical, `1` = horizontal.
    pub orientation: Orientation,
    /// Accepts `true`/`false` as well as `0`/`1`.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub flip: bool,
}

/// Link timeouts and reconnect schedule, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// `0` disables the write timeout.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_handshake_attempts")]
    pub handshake_attempts: u32,
    #[serde(default = "default_handshake_interval_ms")]
    pub handshake_interval_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_sample_step() -> usize {
    4
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_write_timeout_ms() -> u64 {
    250
}
fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    30_000
}
fn default_handshake_attempts() -> u32 {
    10
}
fn default_handshake_interval_ms() -> u64 {
    100
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            handshake_attempts: default_handshake_attempts(),
            handshake_interval_ms: default_handshake_interval_ms(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

// ── Conversion ────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] on malformed input or schema mismatch.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on malformed input or schema mismatch.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validates the strips and segments into a [`Topology`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingPort`] for an `rpi` strip without a port
    /// and [`ConfigError::Topology`] for every structural problem (zero rates,
    /// out-of-range or overlapping segments, …).
    pub fn to_topology(&self) -> Result<Topology, ConfigError> {
        let strips = self
            .strips
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.to_strip(index))
            .collect::<Result<Vec<_>, _>>()?;
        let timing = Timing {
            fps: self.fps,
            ups: self.ups,
            lerp: self.lerp,
        };
        Ok(Topology::new(timing, strips)?)
    }

    /// Link timeouts and handshake schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroLinkSetting`] if `handshake_attempts` is zero.
    pub fn link_settings(&self) -> Result<LinkSettings, ConfigError> {
        if self.link.handshake_attempts == 0 {
            return Err(ConfigError::ZeroLinkSetting {
                field: "handshake_attempts",
            });
        }
        Ok(LinkSettings {
            connect_timeout: Duration::from_millis(self.link.connect_timeout_ms),
            write_timeout: match self.link.write_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            handshake: HandshakePolicy {
                attempts: self.link.handshake_attempts,
                interval: Duration::from_millis(self.link.handshake_interval_ms),
            },
        })
    }

    /// Reconnect schedule for dropped links.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroLinkSetting`] if `reconnect_initial_ms` is zero.
    pub fn backoff_policy(&self) -> Result<BackoffPolicy, ConfigError> {
        if self.link.reconnect_initial_ms == 0 {
            return Err(ConfigError::ZeroLinkSetting {
                field: "reconnect_initial_ms",
            });
        }
        Ok(BackoffPolicy {
            initial: Duration::from_millis(self.link.reconnect_initial_ms),
            max: Duration::from_millis(self.link.reconnect_max_ms),
        })
    }
}

impl StripEntry {
    fn to_strip(&self, index: usize) -> Result<Strip, ConfigError> {
        let device = match self.kind {
            StripType::Rpi => DeviceKind::Network {
                host: self.addr.clone(),
                port: self.port.ok_or(ConfigError::MissingPort { strip: index })?,
            },
            StripType::Arduino => DeviceKind::Serial {
                path: self.addr.clone(),
                baud_rate: self.baud_rate.unwrap_or(DEFAULT_SERIAL_BAUD_RATE),
            },
        };
        Ok(Strip {
            device,
            leds: self.leds,
            calibration: Calibration {
                max_brightness: self.max_brightness,
                red: self.r_mult,
                green: self.g_mult,
                blue: self.b_mult,
            },
            segments: self.segments.iter().map(SegmentEntry::to_segment).collect(),
        })
    }
}

impl SegmentEntry {
    fn to_segment(&self) -> Segment {
        Segment {
            placement: Placement::new(self.offset, self.length, self.flip),
            display: self.display.clone(),
            rect: CaptureRect {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
            },
            orientation: self.orientation,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the configuration at `path`, choosing the format by extension.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, and
/// [`ConfigError::Json`] / [`ConfigError::Toml`] if it does not parse.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        AppConfig::from_toml_str(&content)
    } else {
        AppConfig::from_json_str(&content)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
