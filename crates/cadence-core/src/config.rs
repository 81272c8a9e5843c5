//! Configuration loading: JSON file with defaults, then environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schedule::{TickSchedule, DEFAULT_RENDER_TICK_MS, DEFAULT_SIMULATION_TICK_MS};

/// Top-level Cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Payload location: a file path or an `http(s)://` URL.
    #[serde(default = "default_payload")]
    pub payload: String,
    /// Host surface handed to the rendering context.
    #[serde(default = "default_surface")]
    pub surface: String,
    #[serde(default = "default_surface_width")]
    pub surface_width: u32,
    #[serde(default = "default_surface_height")]
    pub surface_height: u32,
    #[serde(default = "default_render_tick_ms")]
    pub render_tick_ms: u64,
    #[serde(default = "default_simulation_tick_ms")]
    pub simulation_tick_ms: u64,
    /// Path the config was loaded from (not serialized).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

fn default_payload() -> String {
    "bin/cadence-payload.wasm".into()
}
fn default_surface() -> String {
    "c".into()
}
fn default_surface_width() -> u32 {
    800
}
fn default_surface_height() -> u32 {
    600
}
fn default_render_tick_ms() -> u64 {
    DEFAULT_RENDER_TICK_MS
}
fn default_simulation_tick_ms() -> u64 {
    DEFAULT_SIMULATION_TICK_MS
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            payload: default_payload(),
            surface: default_surface(),
            surface_width: default_surface_width(),
            surface_height: default_surface_height(),
            render_tick_ms: DEFAULT_RENDER_TICK_MS,
            simulation_tick_ms: DEFAULT_SIMULATION_TICK_MS,
            config_path: None,
        }
    }
}

impl CadenceConfig {
    /// Load from an optional JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut config: CadenceConfig = serde_json::from_str(&data)?;
        config.config_path = Some(path.to_path_buf());
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `CADENCE_*` overrides from the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(payload) = lookup("CADENCE_PAYLOAD") {
            self.payload = payload;
        }
        if let Some(surface) = lookup("CADENCE_SURFACE") {
            self.surface = surface;
        }
        if let Some(ms) = lookup("CADENCE_RENDER_TICK_MS") {
            self.render_tick_ms = parse_millis("CADENCE_RENDER_TICK_MS", &ms)?;
        }
        if let Some(ms) = lookup("CADENCE_SIMULATION_TICK_MS") {
            self.simulation_tick_ms = parse_millis("CADENCE_SIMULATION_TICK_MS", &ms)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.payload.trim().is_empty() {
            return Err(Error::Config("payload location is empty".into()));
        }
        if self.surface.trim().is_empty() {
            return Err(Error::Config("surface id is empty".into()));
        }
        self.schedule().map(|_| ())
    }

    /// Tick schedule built from the configured intervals.
    pub fn schedule(&self) -> Result<TickSchedule> {
        TickSchedule::new(self.render_tick_ms, self.simulation_tick_ms)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: expected milliseconds, got {value:?}")))
}
