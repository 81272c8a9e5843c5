//! The handoff message: the single message that initializes a context.

use cadence_core::{Error, Result, Role, TickInterval};
use serde::{Deserialize, Serialize};

use crate::descriptor::{Assignment, ContextDescriptor};
use crate::payload::Payload;
use crate::surface::SurfaceId;

/// Current handoff schema version.
pub const HANDOFF_VERSION: u16 = 1;

/// Handoff sent exactly once to each context.
///
/// Built by consuming a descriptor; posting it consumes the handoff, so the
/// transferred surface leaves the sender in the same move.
#[derive(Debug)]
pub struct Handoff {
    version: u16,
    payload: Payload,
    tick_interval: TickInterval,
    assignment: Assignment,
}

impl Handoff {
    pub fn from_descriptor(descriptor: ContextDescriptor) -> Self {
        let (payload, tick_interval, assignment) = descriptor.into_parts();
        Self {
            version: HANDOFF_VERSION,
            payload,
            tick_interval,
            assignment,
        }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn role(&self) -> Role {
        self.assignment.role()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn tick_interval(&self) -> TickInterval {
        self.tick_interval
    }

    /// Surfaces this message moves to the receiver.
    pub fn transfers(&self) -> Vec<SurfaceId> {
        self.assignment.transferred_surface().into_iter().cloned().collect()
    }

    /// Wire summary of this message.
    pub fn header(&self) -> HandoffHeader {
        HandoffHeader {
            version: self.version,
            role: self.role(),
            payload_bytes: self.payload.len(),
            payload_digest: self.payload.digest().to_string(),
            transfers: self.transfers(),
            tick_interval_ms: self.tick_interval,
        }
    }

    pub(crate) fn into_parts(self) -> (Payload, TickInterval, Assignment) {
        (self.payload, self.tick_interval, self.assignment)
    }

    #[cfg(test)]
    pub(crate) fn with_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }
}

/// Serializable summary of a handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffHeader {
    pub version: u16,
    pub role: Role,
    pub payload_bytes: usize,
    pub payload_digest: String,
    pub transfers: Vec<SurfaceId>,
    pub tick_interval_ms: TickInterval,
}

impl HandoffHeader {
    /// Schema checks for a header received from outside the process.
    pub fn validate(&self) -> Result<()> {
        check_version(self.version)?;
        let expected = usize::from(self.role.takes_surface());
        if self.transfers.len() != expected {
            return Err(Error::TransferViolation(format!(
                "{} handoff must transfer {} surface(s), declares {}",
                self.role,
                expected,
                self.transfers.len()
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_version(version: u16) -> Result<()> {
    if version != HANDOFF_VERSION {
        return Err(Error::HandoffSchema(format!(
            "unsupported handoff version {} (expected {})",
            version, HANDOFF_VERSION
        )));
    }
    Ok(())
}
