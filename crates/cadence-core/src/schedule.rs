//! Tick intervals per role.

use std::num::NonZeroU64;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::role::Role;

/// Default rendering cadence (~60Hz).
pub const DEFAULT_RENDER_TICK_MS: u64 = 16;
/// Default simulation cadence (0.1Hz).
pub const DEFAULT_SIMULATION_TICK_MS: u64 = 10_000;

/// Positive tick interval in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct TickInterval(NonZeroU64);

impl TickInterval {
    pub fn from_millis(ms: u64) -> Result<Self> {
        NonZeroU64::new(ms)
            .map(Self)
            .ok_or_else(|| Error::Config("tick interval must be at least 1ms".into()))
    }

    pub fn as_millis(self) -> u64 {
        self.0.get()
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0.get())
    }
}

impl TryFrom<u64> for TickInterval {
    type Error = Error;

    fn try_from(ms: u64) -> Result<Self> {
        Self::from_millis(ms)
    }
}

impl From<TickInterval> for u64 {
    fn from(interval: TickInterval) -> u64 {
        interval.as_millis()
    }
}

impl std::fmt::Display for TickInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Independent tick intervals for each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSchedule {
    pub rendering: TickInterval,
    pub simulation: TickInterval,
}

impl TickSchedule {
    pub fn new(rendering_ms: u64, simulation_ms: u64) -> Result<Self> {
        Ok(Self {
            rendering: TickInterval::from_millis(rendering_ms)?,
            simulation: TickInterval::from_millis(simulation_ms)?,
        })
    }

    /// Interval configured for a role.
    pub fn for_role(&self, role: Role) -> TickInterval {
        match role {
            Role::Rendering => self.rendering,
            Role::Simulation => self.simulation,
        }
    }
}

impl Default for TickSchedule {
    fn default() -> Self {
        Self {
            rendering: TickInterval(nonzero(DEFAULT_RENDER_TICK_MS)),
            simulation: TickInterval(nonzero(DEFAULT_SIMULATION_TICK_MS)),
        }
    }
}

const fn nonzero(ms: u64) -> NonZeroU64 {
    match NonZeroU64::new(ms) {
        Some(v) => v,
        None => NonZeroU64::MIN,
    }
}
