//! Orchestrator — spawns one context per descriptor, hands each its
//! payload and resources, and tears them all down together.

use std::collections::HashSet;
use std::sync::Arc;

use cadence_core::{Error, Result, TickSchedule};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::console::HostConsole;
use crate::context::{ContextHandle, ContextSpawner, ThreadSpawner};
use crate::descriptor::{build_descriptors, ContextDescriptor};
use crate::handoff::Handoff;
use crate::module::ModuleHost;
use crate::payload::{acquire_payload, PayloadSource};
use crate::registry::LiveContextRegistry;
use crate::surface::{HostDocument, SurfaceId};
use crate::types::{ContextEvent, EventReceiver, EventSender, RegistryView};

/// Owns the live contexts of one bootstrap.
pub struct Orchestrator {
    spawner: Arc<dyn ContextSpawner>,
    registry: Arc<Mutex<LiveContextRegistry>>,
    console: Arc<HostConsole>,
    events_tx: EventSender,
    events_rx: Mutex<Option<EventReceiver>>,
}

impl Orchestrator {
    /// Orchestrator running each context on its own thread.
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self::with_spawner(Arc::new(ThreadSpawner::new(host)))
    }

    pub fn with_spawner(spawner: Arc<dyn ContextSpawner>) -> Self {
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            spawner,
            registry: Arc::new(Mutex::new(LiveContextRegistry::new())),
            console: Arc::new(HostConsole::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Take the receiver for context events. Only the first call gets it.
    pub fn take_events(&self) -> Option<EventReceiver> {
        self.events_rx.lock().take()
    }

    pub fn console(&self) -> &Arc<HostConsole> {
        &self.console
    }

    pub fn registry(&self) -> RegistryView {
        self.registry.lock().view()
    }

    /// Cloneable teardown trigger for exit hooks.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            registry: self.registry.clone(),
            console: self.console.clone(),
        }
    }

    /// Spawn a context per descriptor and post its handoff.
    ///
    /// Only one spawn phase per orchestrator: once a call gets past the
    /// transfer check, later calls fail with `AlreadySpawned` before
    /// anything is spawned. Returns once every handoff was accepted for
    /// delivery. Contexts spawned before a failure stay registered; call
    /// [`shutdown`] to clean them up.
    ///
    /// [`shutdown`]: Orchestrator::shutdown
    pub fn spawn_all(&self, descriptors: Vec<ContextDescriptor>) -> Result<RegistryView> {
        check_exclusive_transfers(&descriptors)?;
        self.registry.lock().seal()?;

        for descriptor in descriptors {
            let role = descriptor.role();
            if self.registry.lock().is_closed() {
                return Err(Error::ShutDown);
            }

            let (mut handle, endpoint) = ContextHandle::pair(role);
            self.spawner
                .spawn(endpoint, self.events_tx.clone())
                .map_err(|e| Error::spawn(role, e.to_string()))?;

            // Shutdown may have run while the context was being created.
            if self.registry.lock().is_closed() {
                return Err(Error::ShutDown);
            }

            handle.post(Handoff::from_descriptor(descriptor))?;
            let id = handle.id();
            self.registry.lock().record(handle)?;

            info!("Spawned {} context {}", role, id);
            self.announce(format!("spawned {} context {}", role, id));
        }

        Ok(self.registry())
    }

    /// Full startup: detach the surface, await the payload, spawn both
    /// contexts. On a spawn-phase failure every context that did start is
    /// torn down before the error is returned.
    pub async fn bootstrap(
        &self,
        source: &PayloadSource,
        document: &HostDocument,
        surface_id: &SurfaceId,
        schedule: &TickSchedule,
    ) -> Result<RegistryView> {
        let fetch = tokio::spawn({
            let source = source.clone();
            async move { acquire_payload(&source).await }
        });

        let surface = match document.detach_surface(surface_id) {
            Ok(surface) => surface,
            Err(e) => {
                fetch.abort();
                return Err(e);
            }
        };

        let payload = fetch
            .await
            .map_err(|e| Error::Fetch(format!("fetch task failed: {}", e)))??;

        let descriptors = build_descriptors(&payload, surface, schedule);
        match self.spawn_all(descriptors) {
            Ok(view) => Ok(view),
            Err(e) => {
                error!("Startup failed: {}", e);
                self.shutdown();
                Err(e)
            }
        }
    }

    /// Log a context event and mirror lifecycle events on the console.
    /// After shutdown events are only logged.
    pub fn record_event(&self, event: &ContextEvent) {
        match event {
            ContextEvent::Ticked { .. } => trace!("{}", event),
            ContextEvent::Failed { .. } => {
                warn!("{}", event);
                self.announce(event.to_string());
            }
            ContextEvent::Started { .. } | ContextEvent::Stopped { .. } => {
                info!("{}", event);
                self.announce(event.to_string());
            }
        }
    }

    // Registry lock held so a concurrent shutdown cannot clear in between.
    fn announce(&self, line: String) {
        let registry = self.registry.lock();
        if !registry.is_closed() {
            self.console.push(line);
        }
    }

    /// Terminate every live context and clear the console. Idempotent and
    /// never fails. Returns how many contexts were asked to stop.
    pub fn shutdown(&self) -> usize {
        self.shutdown_handle().shutdown()
    }
}

/// Teardown half of an orchestrator, safe to fire from any thread at any
/// point, including during a fetch or between two spawns.
#[derive(Clone)]
pub struct ShutdownHandle {
    registry: Arc<Mutex<LiveContextRegistry>>,
    console: Arc<HostConsole>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> usize {
        let handles = {
            let mut registry = self.registry.lock();
            let handles = registry.drain();
            self.console.clear();
            handles
        };
        let count = handles.len();

        for mut handle in handles {
            if !handle.terminate() {
                // Context already gone; nothing left to stop.
                debug!("{} context {} had already exited", handle.role(), handle.id());
            }
        }

        if count > 0 {
            info!("Shutdown requested for {} contexts", count);
        }
        count
    }

    pub fn is_shut_down(&self) -> bool {
        self.registry.lock().is_closed()
    }
}

/// No surface may be handed to more than one context.
fn check_exclusive_transfers(descriptors: &[ContextDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if let Some(surface) = descriptor.transferred_surface() {
            if !seen.insert(surface.clone()) {
                return Err(Error::TransferViolation(format!(
                    "surface {} is assigned to more than one context",
                    surface
                )));
            }
        }
    }
    Ok(())
}
