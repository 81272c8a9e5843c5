//! Payload instantiation inside a context.
//!
//! `ModuleHost` turns the shared payload into a private per-context
//! instance. Engines plug in here; `InertHost` is used when none is.

use std::time::Duration;

use cadence_core::{Error, Result, Role};
use tracing::{debug, trace};

use crate::payload::Payload;
use crate::surface::OffscreenSurface;

/// Inputs for one tick.
pub struct TickContext<'a> {
    /// 1-based tick number within this context.
    pub tick: u64,
    /// Measured wall time since the previous tick (zero on the first).
    pub elapsed: Duration,
    /// Exclusive render target, present only in the rendering context.
    pub target: Option<&'a mut OffscreenSurface>,
}

/// A payload instance private to one context.
pub trait ModuleInstance {
    /// Run one step. Never called re-entrantly.
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<()>;
}

/// Instantiates the payload. Shared by every context.
pub trait ModuleHost: Send + Sync {
    fn instantiate(&self, payload: &Payload, role: Role) -> Result<Box<dyn ModuleInstance>>;
}

/// Exports and function count of a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSummary {
    pub exports: Vec<String>,
    pub functions: usize,
}

impl ModuleSummary {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut summary = Self::default();
        for section in wasmparser::Parser::new(0).parse_all(bytes) {
            let section = section.map_err(|e| Error::Integrity(e.to_string()))?;
            match section {
                wasmparser::Payload::FunctionSection(reader) => {
                    summary.functions += reader.count() as usize;
                }
                wasmparser::Payload::ExportSection(reader) => {
                    for export in reader {
                        let export = export.map_err(|e| Error::Integrity(e.to_string()))?;
                        summary.exports.push(export.name.to_string());
                    }
                }
                _ => {}
            }
        }
        Ok(summary)
    }
}

/// Host that executes no guest code.
///
/// Each rendering tick presents a frame on the owned surface; each
/// simulation tick advances a step counter.
#[derive(Debug, Default)]
pub struct InertHost;

impl ModuleHost for InertHost {
    fn instantiate(&self, payload: &Payload, role: Role) -> Result<Box<dyn ModuleInstance>> {
        let summary = ModuleSummary::parse(payload.bytes())?;
        debug!(
            "Instantiated {} module: {} functions, exports={:?}",
            role, summary.functions, summary.exports
        );
        Ok(Box::new(InertInstance {
            role,
            steps: 0,
            _summary: summary,
        }))
    }
}

struct InertInstance {
    role: Role,
    steps: u64,
    _summary: ModuleSummary,
}

impl ModuleInstance for InertInstance {
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<()> {
        match self.role {
            Role::Rendering => {
                let target = ctx.target.as_deref_mut().ok_or_else(|| {
                    Error::SurfaceUnavailable("rendering tick without a render target".into())
                })?;
                let frame = target.present();
                trace!("frame {} presented on {}", frame, target.id());
            }
            Role::Simulation => {
                self.steps += 1;
                trace!("simulation step {} (+{:?})", self.steps, ctx.elapsed);
            }
        }
        Ok(())
    }
}
