//! Cadence runtime — payload acquisition, execution contexts, orchestration.
//!
//! One shared WebAssembly payload is instantiated in two isolated contexts
//! ticking at independent cadences: a rendering context that owns a
//! detached surface and a simulation context that owns none. The
//! orchestrator spawns them, posts one handoff each and tears them down
//! together.

pub mod console;
pub mod context;
pub mod descriptor;
pub mod handoff;
pub mod module;
pub mod orchestrator;
pub mod payload;
pub mod registry;
pub mod surface;
pub mod types;

pub use console::HostConsole;
pub use context::{ContextEndpoint, ContextHandle, ContextSpawner, ThreadSpawner};
pub use descriptor::{build_descriptors, Assignment, ContextDescriptor};
pub use handoff::{Handoff, HandoffHeader, HANDOFF_VERSION};
pub use module::{InertHost, ModuleHost, ModuleInstance, ModuleSummary, TickContext};
pub use orchestrator::{Orchestrator, ShutdownHandle};
pub use payload::{acquire_payload, verify_module, Payload, PayloadSource};
pub use registry::LiveContextRegistry;
pub use surface::{HostDocument, OffscreenSurface, SurfaceId};
pub use types::*;
