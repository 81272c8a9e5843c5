//! Cadence — loads one payload and runs it in a rendering and a simulation
//! context until the process is asked to exit.

use std::path::PathBuf;
use std::sync::Arc;

use cadence_core::CadenceConfig;
use cadence_runtime::{HostDocument, InertHost, ModuleSummary, Orchestrator, PayloadSource, SurfaceId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None => run(None).await,
        Some("run") => run(args.get(2).map(PathBuf::from)).await,
        Some("--validate") | Some("validate") => {
            let Some(location) = args.get(2) else {
                eprintln!("Usage: cadence validate <payload>");
                std::process::exit(1);
            };
            validate(location).await
        }
        Some("--help") | Some("-h") | Some("help") => {
            println!("Cadence — dual-cadence execution orchestrator");
            println!();
            println!("Usage: cadence [command]");
            println!();
            println!("Commands:");
            println!("  (none)                   Run with defaults and CADENCE_* overrides");
            println!("  run [config.json]        Run with a JSON config file");
            println!("  validate <payload>       Check a payload and print its summary");
            println!("  help                     Show this help message");
            Ok(())
        }
        Some(path) if path.ends_with(".json") => run(Some(PathBuf::from(path))).await,
        Some(other) => {
            eprintln!("Unknown command: {}. Use 'cadence help' for usage.", other);
            std::process::exit(1);
        }
    }
}

async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = CadenceConfig::load(config_path.as_deref())?;
    let schedule = config.schedule()?;
    info!(
        "Payload: {}, surface: {}, rendering every {}, simulation every {}",
        config.payload, config.surface, schedule.rendering, schedule.simulation
    );

    let document = HostDocument::new();
    let surface_id = SurfaceId::new(config.surface.clone());
    document.add_surface(surface_id.clone(), config.surface_width, config.surface_height)?;

    let orchestrator = Arc::new(Orchestrator::new(Arc::new(InertHost)));
    let exit = orchestrator.shutdown_handle();

    // Mirror context events on the console and log.
    if let Some(mut events) = orchestrator.take_events() {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                orchestrator.record_event(&event);
            }
        });
    }

    let source = PayloadSource::parse(&config.payload);
    tokio::select! {
        started = orchestrator.bootstrap(&source, &document, &surface_id, &schedule) => {
            let view = started?;
            info!("{} contexts running", view.len());
            println!("{}", serde_json::to_string_pretty(&view)?);
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("Exit requested during startup");
        }
    }

    // Shutdown clears the console; show what it collected first.
    for line in orchestrator.console().lines() {
        println!("{}", line);
    }

    let stopped = exit.shutdown();
    info!("Exit: {} contexts asked to stop", stopped);
    Ok(())
}

async fn validate(location: &str) -> anyhow::Result<()> {
    let source = PayloadSource::parse(location);
    match cadence_runtime::acquire_payload(&source).await {
        Ok(payload) => {
            let summary = ModuleSummary::parse(payload.bytes())?;
            println!("Payload:   {}", source);
            println!("Size:      {} bytes", payload.len());
            println!("SHA-256:   {}", payload.digest());
            println!("Functions: {}", summary.functions);
            println!("Exports:   {}", summary.exports.join(", "));
            Ok(())
        }
        Err(e) => {
            eprintln!("Invalid payload {}: {}", source, e);
            std::process::exit(1);
        }
    }
}
