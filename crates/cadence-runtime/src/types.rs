//! Runtime types.

use cadence_core::{Role, TickInterval};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::surface::SurfaceId;

/// Identifier of a spawned execution context.
pub type ContextId = Uuid;

/// Channel on which contexts report back to the host.
pub type EventSender = mpsc::UnboundedSender<ContextEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ContextEvent>;

/// Message from a context to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ContextEvent {
    /// Payload instantiated; the tick loop is about to start.
    Started {
        id: ContextId,
        role: Role,
        #[serde(rename = "tickIntervalMs")]
        tick_interval: TickInterval,
        /// Surface this context now exclusively owns.
        surface: Option<SurfaceId>,
    },
    Ticked {
        id: ContextId,
        role: Role,
        tick: u64,
    },
    /// Tick loop ended on request.
    Stopped {
        id: ContextId,
        role: Role,
        ticks: u64,
    },
    /// Context ended on its own because of an error or panic.
    Failed {
        id: ContextId,
        role: Role,
        error: String,
    },
}

impl ContextEvent {
    pub fn id(&self) -> ContextId {
        match self {
            Self::Started { id, .. }
            | Self::Ticked { id, .. }
            | Self::Stopped { id, .. }
            | Self::Failed { id, .. } => *id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Started { role, .. }
            | Self::Ticked { role, .. }
            | Self::Stopped { role, .. }
            | Self::Failed { role, .. } => *role,
        }
    }
}

impl std::fmt::Display for ContextEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started {
                role,
                tick_interval,
                surface: Some(surface),
                ..
            } => write!(f, "{} context started ({}), owns surface {}", role, tick_interval, surface),
            Self::Started {
                role,
                tick_interval,
                surface: None,
                ..
            } => write!(f, "{} context started ({})", role, tick_interval),
            Self::Ticked { role, tick, .. } => write!(f, "{} tick {}", role, tick),
            Self::Stopped { role, ticks, .. } => {
                write!(f, "{} context stopped after {} ticks", role, ticks)
            }
            Self::Failed { role, error, .. } => write!(f, "{} context failed: {}", role, error),
        }
    }
}

/// What the registry knows about one live context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextInfo {
    pub id: ContextId,
    pub role: Role,
    #[serde(rename = "tickIntervalMs")]
    pub tick_interval: TickInterval,
    /// Surface moved into this context by its handoff.
    pub surface: Option<SurfaceId>,
}

/// Snapshot of the live context registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryView {
    pub contexts: Vec<ContextInfo>,
    pub closed: bool,
}

impl RegistryView {
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.contexts.iter().map(|c| c.role).collect()
    }
}
