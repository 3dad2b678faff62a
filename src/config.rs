use chrono::Duration;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::clock::ClockJump;
use crate::link::{LinkError, RadioLinkParams};
use crate::radio::{MixerConfig, RadioError};
use crate::tracker::{Observer, Satellite, TrackerError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid station coordinates: {0:?}")]
    InvalidCoordinates(String),
    #[error("satellite: {0}")]
    Tracker(#[from] TrackerError),
    #[error("link: {0}")]
    Link(#[from] LinkError),
    #[error("radio: {0}")]
    Radio(#[from] RadioError),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    pub satellite: SatelliteConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub radio: RadioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub name: Option<String>,
    pub coordinates: String,
    #[serde(default)]
    pub elevation_km: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SatelliteConfig {
    pub name: Option<String>,
    pub tle: String,
    #[serde(default = "default_transmit_power_w")]
    pub transmit_power_w: f64,
    #[serde(default = "default_frequency_mhz")]
    pub frequency_mhz: f64,
}

fn default_transmit_power_w() -> f64 {
    5.0
}

fn default_frequency_mhz() -> f64 {
    137.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_antenna_gain_db")]
    pub antenna_gain_db: f64,
    #[serde(default = "default_noise_floor_db")]
    pub noise_floor_db: f64,
}

fn default_antenna_gain_db() -> f64 {
    5.0
}

fn default_noise_floor_db() -> f64 {
    -80.0
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            antenna_gain_db: default_antenna_gain_db(),
            noise_floor_db: default_noise_floor_db(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RadioConfig {
    /// WAV file looped as the transmitted program.
    pub program: Option<PathBuf>,
    #[serde(default = "default_master_volume")]
    pub master_volume: f32,
    #[serde(default = "default_buffer_seconds")]
    pub buffer_seconds: f64,
    #[serde(default = "default_quantum_seconds")]
    pub quantum_seconds: f64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_fallback_sample_rate")]
    pub fallback_sample_rate: u32,
    /// Fixed noise seed for reproducible recordings.
    pub noise_seed: Option<u64>,
}

fn default_master_volume() -> f32 {
    20.0
}

fn default_buffer_seconds() -> f64 {
    1.0
}

fn default_quantum_seconds() -> f64 {
    0.01
}

fn default_tick_ms() -> u64 {
    16
}

fn default_fallback_sample_rate() -> u32 {
    22_050
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            program: None,
            master_volume: default_master_volume(),
            buffer_seconds: default_buffer_seconds(),
            quantum_seconds: default_quantum_seconds(),
            tick_ms: default_tick_ms(),
            fallback_sample_rate: default_fallback_sample_rate(),
            noise_seed: None,
        }
    }
}

impl RadioConfig {
    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig {
            target_buffer_seconds: self.buffer_seconds,
            quantum_seconds: self.quantum_seconds,
            master_volume: self.master_volume,
            fallback_sample_rate: self.fallback_sample_rate,
        }
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_ms)
    }
}

/// Validated, immutable inputs for one simulation session.
pub struct Session {
    pub station_name: String,
    pub observer: Observer,
    pub satellite: Satellite,
    pub link: RadioLinkParams,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Parses and checks everything up front so nothing downstream has to
    /// cope with malformed elements or non-finite link parameters.
    pub fn build_session(&self) -> Result<Session, ConfigError> {
        let observer = Observer::from_coordinates(
            &self.station.coordinates,
            Some(self.station.elevation_km),
        )
        .ok_or_else(|| ConfigError::InvalidCoordinates(self.station.coordinates.clone()))?;

        let mut satellite = Satellite::from_tle(&self.satellite.tle)?;
        if let Some(name) = &self.satellite.name {
            satellite = satellite.with_name(name.clone());
        }

        let link = RadioLinkParams::new(
            self.satellite.transmit_power_w,
            self.satellite.frequency_mhz,
            self.receiver.antenna_gain_db,
            self.receiver.noise_floor_db,
        )?;

        self.radio.mixer_config().validate()?;
        if self.radio.tick_ms == 0 {
            return Err(ConfigError::Invalid("radio.tick_ms must be positive".into()));
        }

        Ok(Session {
            station_name: self
                .station
                .name
                .clone()
                .unwrap_or_else(|| self.station.coordinates.clone()),
            observer,
            satellite,
            link,
        })
    }
}

/// Signed human-readable duration: `90m`, `-2h 30m`, `+10s`.
pub fn parse_offset(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let dur = parse_duration(rest)?;
    Ok(if neg { -dur } else { dur })
}

/// `AT=OFFSET`, e.g. `30s=+90m`: shift the clock by `OFFSET` once `AT` has
/// elapsed.
pub fn parse_jump(s: &str) -> Result<ClockJump, String> {
    let (at, offset) = s
        .split_once('=')
        .ok_or_else(|| format!("expected AT=OFFSET, got {:?}", s))?;
    Ok(ClockJump {
        at: parse_duration(at)?,
        offset: parse_offset(offset)?,
    })
}

pub fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s.trim())
        .map_err(|e| e.to_string())
        .and_then(|d| Duration::from_std(d).map_err(|e| e.to_string()))
}
