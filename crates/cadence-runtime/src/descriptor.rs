//! Context descriptor table.

use cadence_core::{Role, TickInterval, TickSchedule};

use crate::payload::Payload;
use crate::surface::{OffscreenSurface, SurfaceId};

/// Role together with the resources that role owns.
///
/// A rendering assignment always carries its surface and a simulation
/// assignment never does, so a role/resource mismatch cannot be built.
#[derive(Debug)]
pub enum Assignment {
    Rendering { surface: OffscreenSurface },
    Simulation,
}

impl Assignment {
    pub fn role(&self) -> Role {
        match self {
            Self::Rendering { .. } => Role::Rendering,
            Self::Simulation => Role::Simulation,
        }
    }

    /// Id of the exclusively transferred surface, if any.
    pub fn transferred_surface(&self) -> Option<&SurfaceId> {
        match self {
            Self::Rendering { surface } => Some(surface.id()),
            Self::Simulation => None,
        }
    }
}

/// Everything one execution context needs before it is spawned.
#[derive(Debug)]
pub struct ContextDescriptor {
    payload: Payload,
    tick_interval: TickInterval,
    assignment: Assignment,
}

impl ContextDescriptor {
    pub fn rendering(payload: Payload, surface: OffscreenSurface, tick_interval: TickInterval) -> Self {
        Self {
            payload,
            tick_interval,
            assignment: Assignment::Rendering { surface },
        }
    }

    pub fn simulation(payload: Payload, tick_interval: TickInterval) -> Self {
        Self {
            payload,
            tick_interval,
            assignment: Assignment::Simulation,
        }
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

    pub fn transferred_surface(&self) -> Option<&SurfaceId> {
        self.assignment.transferred_surface()
    }

    pub(crate) fn into_parts(self) -> (Payload, TickInterval, Assignment) {
        (self.payload, self.tick_interval, self.assignment)
    }
}

/// Build the descriptor table: rendering first, then simulation.
///
/// The payload is shared, not re-fetched; the surface moves into the
/// rendering descriptor.
pub fn build_descriptors(
    payload: &Payload,
    surface: OffscreenSurface,
    schedule: &TickSchedule,
) -> Vec<ContextDescriptor> {
    vec![
        ContextDescriptor::rendering(payload.clone(), surface, schedule.rendering),
        ContextDescriptor::simulation(payload.clone(), schedule.simulation),
    ]
}
