// THEORY:
// `EngineConfig` is the tunable surface of the engine, the counterpart of the vision
// pipeline's `PipelineConfig`. Every field has a default, so an empty TOML file is a valid
// configuration and a deployment only spells out what it changes.
//
// Loading happens in layers: built-in defaults, then the TOML file, then an optional
// `zones.json` in the format the zone-drawing tool writes, then environment overrides for
// the handful of values operators tweak per camera. `validate` runs last and decides whether
// the engine settings are usable.
//
// Zones are kept as raw `ZoneDefinition`s until the engine starts. `build_zones` validates
// them one at a time, so a single malformed zone is rejected on its own while the rest of the
// file still loads.

use crate::core_modules::alert::DEFAULT_GLOBAL_THRESHOLD;
use crate::core_modules::detection::DetectionFilter;
use crate::core_modules::history::DEFAULT_HISTORY_CAPACITY;
use crate::core_modules::zone::{Zone, ZoneDefinition};
use crate::error::{EngineError, Result, ValidationError};
use crate::event_log::DEFAULT_EVENT_LOG_CAPACITY;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::Path;

pub const ENV_HISTORY_CAPACITY: &str = "CROWD_HISTORY_CAPACITY";
pub const ENV_GLOBAL_THRESHOLD: &str = "CROWD_GLOBAL_THRESHOLD";
pub const ENV_FRAME_SIZE: &str = "CROWD_FRAME_SIZE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Width of the camera frame in pixels; sizes the heatmap.
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    /// Heatmap cell size in pixels. 1x1 gives a grid at full frame resolution.
    #[serde(default = "default_cell_size")]
    pub cell_width: u32,
    #[serde(default = "default_cell_size")]
    pub cell_height: u32,
    /// Number of snapshots retained by the history ring.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Whole-frame occupancy at which the global alert fires.
    #[serde(default = "default_global_threshold")]
    pub global_threshold: NonZeroU32,
    /// Size of the in-memory alert log used by `MemoryEventLog`.
    #[serde(default = "default_alert_log_capacity")]
    pub alert_log_capacity: usize,
    #[serde(default)]
    pub detection_filter: DetectionFilter,
    /// Unvalidated zone definitions, in file order.
    #[serde(default)]
    pub zones: Vec<ZoneDefinition>,
}

/// A zone definition that failed validation and was left out of the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedZone {
    pub name: String,
    pub error: ValidationError,
}

fn default_frame_width() -> u32 {
    1920
}

fn default_frame_height() -> u32 {
    1080
}

fn default_cell_size() -> u32 {
    1
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_global_threshold() -> NonZeroU32 {
    DEFAULT_GLOBAL_THRESHOLD
}

fn default_alert_log_capacity() -> usize {
    DEFAULT_EVENT_LOG_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            cell_width: default_cell_size(),
            cell_height: default_cell_size(),
            history_capacity: default_history_capacity(),
            global_threshold: default_global_threshold(),
            alert_log_capacity: default_alert_log_capacity(),
            detection_filter: DetectionFilter::default(),
            zones: Vec::new(),
        }
    }
}

/// On-disk shape of `zones.json`.
#[derive(Debug, Deserialize)]
struct ZonesFile {
    #[serde(default)]
    zones: Vec<ZoneDefinition>,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Reads a TOML file and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&source)?;
        config.apply_env_overrides()?;
        tracing::info!(path = %path.display(), zones = config.zones.len(), "Loaded engine config");
        Ok(config)
    }

    /// Parses a `zones.json` document and returns its zone definitions, unvalidated.
    pub fn parse_zones_json(source: &str) -> Result<Vec<ZoneDefinition>> {
        let file: ZonesFile = serde_json::from_str(source)?;
        Ok(file.zones)
    }

    /// Replaces the configured zones with the ones in a `zones.json` file.
    pub fn load_zones_json(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        self.zones = Self::parse_zones_json(&source)?;
        tracing::info!(path = %path.display(), zones = self.zones.len(), "Loaded zone definitions");
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup, so tests need not touch the process env.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(ENV_HISTORY_CAPACITY) {
            self.history_capacity = raw
                .trim()
                .parse()
                .map_err(|_| EngineError::Config(format!("{ENV_HISTORY_CAPACITY}={raw}")))?;
        }
        if let Some(raw) = lookup(ENV_GLOBAL_THRESHOLD) {
            self.global_threshold = raw
                .trim()
                .parse()
                .map_err(|_| EngineError::Config(format!("{ENV_GLOBAL_THRESHOLD}={raw}")))?;
        }
        if let Some(raw) = lookup(ENV_FRAME_SIZE) {
            let (width, height) = parse_frame_size(&raw)
                .ok_or_else(|| EngineError::Config(format!("{ENV_FRAME_SIZE}={raw}")))?;
            self.frame_width = width;
            self.frame_height = height;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(EngineError::Config(format!(
                "frame size must be non-zero, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if self.cell_width == 0 || self.cell_height == 0 {
            return Err(EngineError::Config(format!(
                "heatmap cell size must be non-zero, got {}x{}",
                self.cell_width, self.cell_height
            )));
        }
        if self.history_capacity == 0 {
            return Err(EngineError::Config("history capacity must be non-zero".into()));
        }
        if self.alert_log_capacity == 0 {
            return Err(EngineError::Config("alert log capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Validates each zone definition on its own, splitting valid zones from rejected ones.
    pub fn build_zones(&self) -> (Vec<Zone>, Vec<RejectedZone>) {
        let mut zones = Vec::with_capacity(self.zones.len());
        let mut rejected = Vec::new();
        for definition in &self.zones {
            let name = definition.name.clone();
            match Zone::try_from(definition.clone()) {
                Ok(zone) => zones.push(zone),
                Err(error) => rejected.push(RejectedZone { name, error }),
            }
        }
        (zones, rejected)
    }
}

/// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
fn parse_frame_size(raw: &str) -> Option<(u32, u32)> {
    let (width, height) = raw.trim().split_once(['x', 'X'])?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}
