//! Cadence Core — execution roles, tick scheduling, configuration, errors.

pub mod config;
pub mod error;
pub mod role;
pub mod schedule;

pub use config::CadenceConfig;
pub use error::{Error, Result};
pub use role::Role;
pub use schedule::{TickInterval, TickSchedule};
