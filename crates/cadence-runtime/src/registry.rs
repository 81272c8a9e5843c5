//! Live context registry, scoped to one orchestrator.

use cadence_core::{Error, Result};

use crate::context::ContextHandle;
use crate::types::RegistryView;

/// Ordered handles of spawned contexts.
///
/// Filled once during spawning and drained as a whole by shutdown; entries
/// are never removed one at a time. Sealed when the spawn phase begins so a
/// second spawn phase is refused. Once closed it accepts nothing.
#[derive(Debug, Default)]
pub struct LiveContextRegistry {
    entries: Vec<ContextHandle>,
    sealed: bool,
    closed: bool,
}

impl LiveContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Claim the single spawn phase.
    pub fn seal(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ShutDown);
        }
        if self.sealed {
            return Err(Error::AlreadySpawned);
        }
        self.sealed = true;
        Ok(())
    }

    /// Append a handed-off context. A refused handle is dropped, which
    /// stops its context.
    pub fn record(&mut self, handle: ContextHandle) -> Result<()> {
        if self.closed {
            return Err(Error::ShutDown);
        }
        self.entries.push(handle);
        Ok(())
    }

    /// Close the registry and take every entry.
    pub fn drain(&mut self) -> Vec<ContextHandle> {
        self.closed = true;
        std::mem::take(&mut self.entries)
    }

    pub fn view(&self) -> RegistryView {
        RegistryView {
            contexts: self.entries.iter().filter_map(|h| h.info()).collect(),
            closed: self.closed,
        }
    }
}
