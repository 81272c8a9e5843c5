//! End-to-end lifecycle tests: bootstrap, spawn, tick cadence, teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Error, Result, Role, TickInterval, TickSchedule};
use cadence_runtime::{
    build_descriptors, ContextDescriptor, ContextEndpoint, ContextEvent, ContextSpawner,
    EventReceiver, EventSender, HostDocument, InertHost, ModuleHost, ModuleInstance, Orchestrator,
    Payload, PayloadSource, SurfaceId, ThreadSpawner,
};

const EMPTY_MODULE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

fn payload() -> Payload {
    Payload::from_bytes(EMPTY_MODULE.to_vec()).unwrap()
}

fn document() -> (HostDocument, SurfaceId) {
    let doc = HostDocument::new();
    let id = SurfaceId::new("c");
    doc.add_surface(id.clone(), 800, 600).unwrap();
    (doc, id)
}

fn payload_file(bytes: &[u8]) -> (tempfile::TempDir, PayloadSource) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence-payload.wasm");
    std::fs::write(&path, bytes).unwrap();
    (dir, PayloadSource::File(path))
}

async fn next_event(rx: &mut EventReceiver) -> ContextEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for context event")
        .expect("event channel closed")
}

/// Collect events until every id in `ids` has reported `Stopped`.
async fn wait_stopped(rx: &mut EventReceiver, ids: &[uuid::Uuid]) {
    let mut remaining: Vec<_> = ids.to_vec();
    while !remaining.is_empty() {
        if let ContextEvent::Stopped { id, .. } = next_event(rx).await {
            remaining.retain(|r| *r != id);
        }
    }
}

/// Count ticks per role over a fixed window.
async fn count_ticks(rx: &mut EventReceiver, window: Duration) -> (usize, usize) {
    let deadline = tokio::time::Instant::now() + window;
    let (mut rendering, mut simulation) = (0, 0);
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        if let ContextEvent::Ticked { role, .. } = event {
            match role {
                Role::Rendering => rendering += 1,
                Role::Simulation => simulation += 1,
            }
        }
    }
    (rendering, simulation)
}

#[tokio::test]
async fn test_spawn_two_contexts_surface_owned_by_rendering() {
    let orch = Orchestrator::new(Arc::new(InertHost));
    let mut events = orch.take_events().unwrap();
    let (doc, surface_id) = document();
    let surface = doc.detach_surface(&surface_id).unwrap();

    let schedule = TickSchedule::new(16, 10_000).unwrap();
    let view = orch
        .spawn_all(build_descriptors(&payload(), surface, &schedule))
        .unwrap();

    assert_eq!(view.len(), 2);
    assert_eq!(view.roles(), vec![Role::Rendering, Role::Simulation]);
    assert_eq!(view.contexts[0].surface, Some(surface_id.clone()));
    assert_eq!(view.contexts[0].tick_interval.as_millis(), 16);
    assert_eq!(view.contexts[1].surface, None);
    assert_eq!(view.contexts[1].tick_interval.as_millis(), 10_000);

    // The host lost the surface; only the rendering context reports owning it.
    assert!(matches!(doc.draw(&surface_id), Err(Error::TransferViolation(_))));
    let mut started = Vec::new();
    while started.len() < 2 {
        if let ContextEvent::Started { role, surface, .. } = next_event(&mut events).await {
            started.push((role, surface));
        }
    }
    started.sort_by_key(|(role, _)| *role == Role::Simulation);
    assert_eq!(
        started,
        vec![
            (Role::Rendering, Some(surface_id)),
            (Role::Simulation, None),
        ]
    );

    let ids: Vec<_> = view.contexts.iter().map(|c| c.id).collect();
    assert_eq!(orch.shutdown(), 2);
    wait_stopped(&mut events, &ids).await;
}

#[tokio::test]
async fn test_shutdown_twice_same_as_once() {
    let orch = Orchestrator::new(Arc::new(InertHost));
    let mut events = orch.take_events().unwrap();
    let (doc, surface_id) = document();
    let surface = doc.detach_surface(&surface_id).unwrap();
    let view = orch
        .spawn_all(build_descriptors(&payload(), surface, &TickSchedule::default()))
        .unwrap();
    orch.console().push("frame stats");

    assert_eq!(orch.shutdown(), 2);
    let after_first = orch.registry();
    assert!(orch.console().is_empty());

    assert_eq!(orch.shutdown(), 0);
    assert_eq!(orch.registry(), after_first);
    assert!(after_first.is_empty());
    assert!(after_first.closed);

    let ids: Vec<_> = view.contexts.iter().map(|c| c.id).collect();
    wait_stopped(&mut events, &ids).await;
}

#[tokio::test]
async fn test_tick_intervals_are_independent() {
    async fn run(rendering_ms: u64) -> (usize, usize) {
        let orch = Orchestrator::new(Arc::new(InertHost));
        let mut events = orch.take_events().unwrap();
        let (doc, surface_id) = document();
        let surface = doc.detach_surface(&surface_id).unwrap();
        let schedule = TickSchedule::new(rendering_ms, 100).unwrap();
        orch.spawn_all(build_descriptors(&payload(), surface, &schedule))
            .unwrap();
        let counts = count_ticks(&mut events, Duration::from_millis(600)).await;
        orch.shutdown();
        counts
    }

    // Contexts tick on their own runtimes, so paused test time cannot drive
    // them; the bounds leave room for a loaded machine.

    let (fast_rendering, sim_a) = run(5).await;
    let (slow_rendering, sim_b) = run(50).await;

    assert!(
        fast_rendering > slow_rendering,
        "rendering ticks: {} at 5ms vs {} at 50ms",
        fast_rendering,
        slow_rendering
    );
    // ~6 simulation ticks in 600ms at 100ms, whatever the rendering rate.
    for sim in [sim_a, sim_b] {
        assert!((2..=12).contains(&sim), "simulation ticks: {}", sim);
    }
    assert!(
        sim_a.abs_diff(sim_b) <= 4,
        "simulation ticks: {} vs {}",
        sim_a,
        sim_b
    );
}

#[tokio::test]
async fn test_fetch_failure_spawns_nothing() {
    let orch = Orchestrator::new(Arc::new(InertHost));
    let (doc, surface_id) = document();
    let dir = tempfile::tempdir().unwrap();
    let source = PayloadSource::File(dir.path().join("missing.wasm"));

    let err = orch
        .bootstrap(&source, &doc, &surface_id, &TickSchedule::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Fetch(_)));
    assert!(orch.registry().is_empty());
    assert_eq!(orch.shutdown(), 0);
}

#[tokio::test]
async fn test_bad_payload_spawns_nothing() {
    let orch = Orchestrator::new(Arc::new(InertHost));
    let (doc, surface_id) = document();
    let (_dir, source) = payload_file(b"not a module");

    let err = orch
        .bootstrap(&source, &doc, &surface_id, &TickSchedule::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
    assert!(orch.registry().is_empty());
}

#[tokio::test]
async fn test_bootstrap_from_file() {
    let orch = Orchestrator::new(Arc::new(InertHost));
    let mut events = orch.take_events().unwrap();
    let (doc, surface_id) = document();
    let (_dir, source) = payload_file(&EMPTY_MODULE);

    let view = orch
        .bootstrap(&source, &doc, &surface_id, &TickSchedule::default())
        .await
        .unwrap();
    assert_eq!(view.len(), 2);
    assert!(doc.is_detached(&surface_id));
    assert_eq!(orch.console().len(), 2);

    // Surface detachment is single-use.
    let err = orch
        .bootstrap(&source, &doc, &surface_id, &TickSchedule::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SurfaceUnavailable(_)));

    let ids: Vec<_> = view.contexts.iter().map(|c| c.id).collect();
    orch.shutdown();
    wait_stopped(&mut events, &ids).await;
}

/// Delegates to `InertHost`, remembering each instantiation.
#[derive(Default)]
struct CountingHost {
    instantiated: parking_lot::Mutex<Vec<(Role, String)>>,
}

impl ModuleHost for CountingHost {
    fn instantiate(&self, payload: &Payload, role: Role) -> Result<Box<dyn ModuleInstance>> {
        self.instantiated
            .lock()
            .push((role, payload.digest().to_string()));
        InertHost.instantiate(payload, role)
    }
}

/// Wait until every role has reported at least `ticks` ticks.
async fn wait_ticks(rx: &mut EventReceiver, ticks: u64) {
    let (mut rendering, mut simulation) = (0, 0);
    while rendering < ticks || simulation < ticks {
        if let ContextEvent::Ticked { role, tick, .. } = next_event(rx).await {
            match role {
                Role::Rendering => rendering = rendering.max(tick),
                Role::Simulation => simulation = simulation.max(tick),
            }
        }
    }
}

#[tokio::test]
async fn test_bootstrap_over_http_fetches_once() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/cadence.wasm"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(EMPTY_MODULE.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let orch = Orchestrator::new(Arc::new(InertHost));
    let mut events = orch.take_events().unwrap();
    let (doc, surface_id) = document();
    let source = PayloadSource::parse(&format!("{}/app/cadence.wasm", server.uri()));
    assert!(matches!(source, PayloadSource::Http(_)));

    let view = orch
        .bootstrap(&source, &doc, &surface_id, &TickSchedule::new(5, 5).unwrap())
        .await
        .unwrap();
    assert_eq!(view.roles(), vec![Role::Rendering, Role::Simulation]);

    // Both contexts are running off the one download.
    wait_ticks(&mut events, 3).await;
    let ids: Vec<_> = view.contexts.iter().map(|c| c.id).collect();
    orch.shutdown();
    wait_stopped(&mut events, &ids).await;

    server.verify().await;
}

#[tokio::test]
async fn test_each_context_instantiates_once() {
    let host = Arc::new(CountingHost::default());
    let orch = Orchestrator::new(host.clone());
    let mut events = orch.take_events().unwrap();
    let (doc, surface_id) = document();
    let (_dir, source) = payload_file(&EMPTY_MODULE);

    let view = orch
        .bootstrap(&source, &doc, &surface_id, &TickSchedule::new(5, 10).unwrap())
        .await
        .unwrap();
    wait_ticks(&mut events, 5).await;

    let mut instantiated = host.instantiated.lock().clone();
    instantiated.sort_by_key(|(role, _)| *role == Role::Simulation);
    let digest = payload().digest().to_string();
    assert_eq!(
        instantiated,
        vec![(Role::Rendering, digest.clone()), (Role::Simulation, digest)]
    );

    let ids: Vec<_> = view.contexts.iter().map(|c| c.id).collect();
    orch.shutdown();
    wait_stopped(&mut events, &ids).await;
    assert_eq!(host.instantiated.lock().len(), 2);
}

/// Spawns normally until `fail_at`, then refuses.
struct FailingAt {
    inner: ThreadSpawner,
    calls: AtomicUsize,
    fail_at: usize,
}

impl ContextSpawner for FailingAt {
    fn spawn(&self, endpoint: ContextEndpoint, events: EventSender) -> std::io::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "context creation unsupported",
            ));
        }
        self.inner.spawn(endpoint, events)
    }
}

#[tokio::test]
async fn test_failed_startup_tears_down_spawned_contexts() {
    let orch = Orchestrator::with_spawner(Arc::new(FailingAt {
        inner: ThreadSpawner::new(Arc::new(InertHost)),
        calls: AtomicUsize::new(0),
        fail_at: 1,
    }));
    let mut events = orch.take_events().unwrap();
    let (doc, surface_id) = document();
    let (_dir, source) = payload_file(&EMPTY_MODULE);

    let err = orch
        .bootstrap(&source, &doc, &surface_id, &TickSchedule::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Spawn { role: Role::Simulation, .. }));

    let view = orch.registry();
    assert!(view.is_empty());
    assert!(view.closed);

    // The rendering context that did start was stopped, not orphaned.
    loop {
        if let ContextEvent::Stopped { role, .. } = next_event(&mut events).await {
            assert_eq!(role, Role::Rendering);
            break;
        }
    }
}

/// Blocks the second spawn until released, reporting when it got there.
struct Gated {
    inner: ThreadSpawner,
    calls: AtomicUsize,
    reached: parking_lot::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    resume: parking_lot::Mutex<std::sync::mpsc::Receiver<()>>,
}

impl ContextSpawner for Gated {
    fn spawn(&self, endpoint: ContextEndpoint, events: EventSender) -> std::io::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
            if let Some(reached) = self.reached.lock().take() {
                let _ = reached.send(());
            }
            let _ = self.resume.lock().recv();
        }
        self.inner.spawn(endpoint, events)
    }
}

#[tokio::test]
async fn test_shutdown_mid_spawn() {
    let (reached_tx, reached_rx) = tokio::sync::oneshot::channel();
    let (resume_tx, resume_rx) = std::sync::mpsc::channel();
    let orch = Arc::new(Orchestrator::with_spawner(Arc::new(Gated {
        inner: ThreadSpawner::new(Arc::new(InertHost)),
        calls: AtomicUsize::new(0),
        reached: parking_lot::Mutex::new(Some(reached_tx)),
        resume: parking_lot::Mutex::new(resume_rx),
    })));
    let mut events = orch.take_events().unwrap();
    let (doc, surface_id) = document();
    let surface = doc.detach_surface(&surface_id).unwrap();
    let descriptors = build_descriptors(&payload(), surface, &TickSchedule::new(10, 10).unwrap());

    let spawning = tokio::task::spawn_blocking({
        let orch = orch.clone();
        move || orch.spawn_all(descriptors)
    });

    tokio::time::timeout(Duration::from_secs(5), reached_rx)
        .await
        .unwrap()
        .unwrap();
    let first = orch.registry();
    assert_eq!(first.roles(), vec![Role::Rendering]);

    assert_eq!(orch.shutdown_handle().shutdown(), 1);
    assert!(orch.registry().is_empty());

    resume_tx.send(()).unwrap();
    let result = spawning.await.unwrap();
    assert!(matches!(result, Err(Error::ShutDown)));
    assert!(orch.registry().is_empty());

    wait_stopped(&mut events, &[first.contexts[0].id]).await;

    // The simulation context was never handed off, so it never started.
    let (rendering, simulation) = count_ticks(&mut events, Duration::from_millis(100)).await;
    assert_eq!(simulation, 0);
    assert_eq!(rendering, 0);
}

#[tokio::test]
async fn test_simulation_descriptor_alone() {
    let orch = Orchestrator::new(Arc::new(InertHost));
    let mut events = orch.take_events().unwrap();
    let view = orch
        .spawn_all(vec![ContextDescriptor::simulation(
            payload(),
            TickInterval::from_millis(20).unwrap(),
        )])
        .unwrap();
    assert_eq!(view.roles(), vec![Role::Simulation]);
    assert!(matches!(next_event(&mut events).await, ContextEvent::Started { surface: None, .. }));
    orch.shutdown();
    wait_stopped(&mut events, &[view.contexts[0].id]).await;
}
