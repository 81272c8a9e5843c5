//! Execution contexts: one isolated thread of control per descriptor.
//!
//! The host side holds a [`ContextHandle`]; the context side runs from a
//! [`ContextEndpoint`]. They share nothing but two one-shot channels (the
//! handoff and the termination request) and the event channel back.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use cadence_core::{Error, Result, Role, TickInterval};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::descriptor::Assignment;
use crate::handoff::{check_version, Handoff};
use crate::module::{ModuleHost, TickContext};
use crate::surface::SurfaceId;
use crate::types::{ContextEvent, ContextId, ContextInfo, EventSender};

/// Host-side handle to one execution context.
///
/// Dropping the handle is itself a termination request.
#[derive(Debug)]
pub struct ContextHandle {
    id: ContextId,
    role: Role,
    inbox: Option<oneshot::Sender<Handoff>>,
    terminate: Option<oneshot::Sender<()>>,
    handed_off: Option<(TickInterval, Option<SurfaceId>)>,
}

/// Context-side ends of the channels created with a handle.
#[derive(Debug)]
pub struct ContextEndpoint {
    pub id: ContextId,
    pub role: Role,
    inbox: oneshot::Receiver<Handoff>,
    terminate: oneshot::Receiver<()>,
}

impl ContextHandle {
    /// Create a handle and the endpoint its context will run from.
    pub fn pair(role: Role) -> (Self, ContextEndpoint) {
        let id = Uuid::new_v4();
        let (inbox_tx, inbox_rx) = oneshot::channel();
        let (terminate_tx, terminate_rx) = oneshot::channel();
        (
            Self {
                id,
                role,
                inbox: Some(inbox_tx),
                terminate: Some(terminate_tx),
                handed_off: None,
            },
            ContextEndpoint {
                id,
                role,
                inbox: inbox_rx,
                terminate: terminate_rx,
            },
        )
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Send the one handoff. Consumes the message, and with it any
    /// transferred surface.
    pub fn post(&mut self, handoff: Handoff) -> Result<()> {
        if handoff.role() != self.role {
            return Err(Error::spawn(
                self.role,
                format!("handoff for {} posted to a {} context", handoff.role(), self.role),
            ));
        }
        let inbox = self
            .inbox
            .take()
            .ok_or_else(|| Error::spawn(self.role, "context already received its handoff"))?;

        let header = handoff.header();
        debug!(
            "Posting handoff to {} context {}: {}",
            self.role,
            self.id,
            serde_json::to_string(&header).unwrap_or_default()
        );
        let surface = header.transfers.into_iter().next();
        inbox
            .send(handoff)
            .map_err(|_| Error::spawn(self.role, "context exited before accepting its handoff"))?;
        self.handed_off = Some((header.tick_interval_ms, surface));
        Ok(())
    }

    /// Request termination. Returns false if it was already requested or
    /// the context is gone.
    pub fn terminate(&mut self) -> bool {
        match self.terminate.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Registry entry; `None` until the handoff was posted.
    pub fn info(&self) -> Option<ContextInfo> {
        self.handed_off.as_ref().map(|(tick_interval, surface)| ContextInfo {
            id: self.id,
            role: self.role,
            tick_interval: *tick_interval,
            surface: surface.clone(),
        })
    }
}

/// Creates the isolated thread of control for an endpoint.
pub trait ContextSpawner: Send + Sync {
    fn spawn(&self, endpoint: ContextEndpoint, events: EventSender) -> std::io::Result<()>;
}

/// One OS thread per context, each with its own single-threaded runtime.
pub struct ThreadSpawner {
    host: Arc<dyn ModuleHost>,
}

impl ThreadSpawner {
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self { host }
    }
}

impl ContextSpawner for ThreadSpawner {
    fn spawn(&self, endpoint: ContextEndpoint, events: EventSender) -> std::io::Result<()> {
        let host = self.host.clone();
        let name = match endpoint.role {
            Role::Rendering => "cadence-rendering",
            Role::Simulation => "cadence-simulation",
        };
        // Detached: termination is requested, never joined.
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_context(endpoint, host, events))?;
        Ok(())
    }
}

/// Thread body of an execution context.
pub fn run_context(endpoint: ContextEndpoint, host: Arc<dyn ModuleHost>, events: EventSender) {
    let span = info_span!("context", id = %endpoint.id, role = %endpoint.role);
    let _guard = span.enter();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build context runtime: {}", e);
            let _ = events.send(ContextEvent::Failed {
                id: endpoint.id,
                role: endpoint.role,
                error: e.to_string(),
            });
            return;
        }
    };
    runtime.block_on(drive(endpoint, host.as_ref(), &events));
}

async fn drive(endpoint: ContextEndpoint, host: &dyn ModuleHost, events: &EventSender) {
    let ContextEndpoint {
        id,
        role,
        inbox,
        mut terminate,
    } = endpoint;
    let fail = |error: String| {
        warn!("{} context {} failed: {}", role, id, error);
        let _ = events.send(ContextEvent::Failed { id, role, error });
    };

    // A handoff already delivered wins over a termination sent after it,
    // so every handed-off context reports Started and then Stopped.
    let handoff = tokio::select! {
        biased;
        handoff = inbox => match handoff {
            Ok(handoff) => handoff,
            Err(_) => {
                debug!("Handle dropped before handoff");
                return;
            }
        },
        _ = &mut terminate => {
            debug!("Terminated before handoff");
            return;
        }
    };

    if let Err(e) = check_version(handoff.version()) {
        return fail(e.to_string());
    }
    if handoff.role() != role {
        return fail(format!("received a {} handoff", handoff.role()));
    }

    let (payload, tick_interval, assignment) = handoff.into_parts();
    let mut surface = match assignment {
        Assignment::Rendering { surface } => Some(surface),
        Assignment::Simulation => None,
    };

    let mut instance = match catch_unwind(AssertUnwindSafe(|| host.instantiate(&payload, role))) {
        Ok(Ok(instance)) => instance,
        Ok(Err(e)) => return fail(format!("instantiation failed: {}", e)),
        Err(panic) => return fail(format!("instantiation panicked: {}", panic_message(&*panic))),
    };
    drop(payload);

    info!("{} context running every {}", role, tick_interval);
    let _ = events.send(ContextEvent::Started {
        id,
        role,
        tick_interval,
        surface: surface.as_ref().map(|s| s.id().clone()),
    });

    let mut ticker = tokio::time::interval(tick_interval.as_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick = 0u64;
    let mut last_tick: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = &mut terminate => break,
            _ = ticker.tick() => {}
        }

        tick += 1;
        let now = Instant::now();
        let elapsed = last_tick.map(|t| now - t).unwrap_or_default();
        last_tick = Some(now);

        let mut ctx = TickContext {
            tick,
            elapsed,
            target: surface.as_mut(),
        };
        match catch_unwind(AssertUnwindSafe(|| instance.tick(&mut ctx))) {
            Ok(Ok(())) => {
                let _ = events.send(ContextEvent::Ticked { id, role, tick });
            }
            Ok(Err(e)) => return fail(format!("tick {} failed: {}", tick, e)),
            Err(panic) => return fail(format!("tick {} panicked: {}", tick, panic_message(&*panic))),
        }
    }

    info!("{} context stopped after {} ticks", role, tick);
    let _ = events.send(ContextEvent::Stopped {
        id,
        role,
        ticks: tick,
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
