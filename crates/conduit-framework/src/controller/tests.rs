use super::*;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Map;
use tokio_test::{assert_err, assert_ok};

use conduit_core::{Context, Event};

use crate::pipeline::Middleware;
use crate::plugin::{PluginManifest, StaticSource};

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Fault {
    Clean,
    Validate,
    Init,
    InitPanic,
    Deactivate,
}

/// Test plugin that journals every hook it sees.
#[derive(Clone)]
struct Recorder {
    name: &'static str,
    journal: Journal,
    fault: Fault,
    middleware: bool,
    provides: Option<&'static str>,
    needs: Option<&'static str>,
    peer: Option<&'static str>,
}

impl Recorder {
    fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: Arc::clone(journal),
            fault: Fault::Clean,
            middleware: false,
            provides: None,
            needs: None,
            peer: None,
        }
    }

    fn fault(mut self, fault: Fault) -> Self {
        self.fault = fault;
        self
    }

    fn record(&self, hook: &str) {
        self.journal.lock().push(format!("{}:{hook}", self.name));
    }

    fn manifest(self, deps: &[&str]) -> PluginManifest {
        PluginManifest::new(self.name, move || Ok(self.clone())).depends_on(deps.iter().copied())
    }
}

#[async_trait]
impl Plugin for Recorder {
    fn validate_config(&self, _ctx: &PluginContext) -> bool {
        self.fault != Fault::Validate
    }

    async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        self.record("init");
        match self.fault {
            Fault::Init => return Err("init exploded".into()),
            Fault::InitPanic => panic!("init panicked"),
            _ => {}
        }
        if let Some(needed) = self.needs {
            if ctx.services().get::<String>(needed).is_none() {
                return Err(format!("service '{needed}' unavailable").into());
            }
        }
        if let Some(service) = self.provides {
            ctx.provide(service, Arc::new(self.name.to_string()));
        }
        Ok(())
    }

    async fn activate(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        self.record("activate");
        if let Some(peer) = self.peer {
            if ctx.plugin_state(peer) != Some(PluginState::Active) || ctx.plugin(peer).is_none() {
                return Err(format!("peer '{peer}' is not active").into());
            }
        }
        Ok(())
    }

    async fn deactivate(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        self.record("deactivate");
        if self.fault == Fault::Deactivate {
            return Err("deactivate exploded".into());
        }
        Ok(())
    }

    fn cleanup(&self) {
        self.record("cleanup");
    }

    fn as_middleware(self: Arc<Self>) -> Option<Arc<dyn Middleware>> {
        if self.middleware { Some(self) } else { None }
    }

    fn describe(&self) -> Value {
        json!({ "recorder": self.name })
    }
}

#[async_trait]
impl Middleware for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn process(&self, mut ctx: Context) -> Result<Context, BoxError> {
        if let Value::Array(items) = &mut ctx.data {
            items.push(json!(self.name));
        }
        Ok(ctx)
    }
}

struct Slow;

#[async_trait]
impl Plugin for Slow {
    async fn init(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

/// Waits on a shared barrier in `init`, then journals completion.
struct Gate {
    name: &'static str,
    barrier: Arc<tokio::sync::Barrier>,
    journal: Journal,
}

#[async_trait]
impl Plugin for Gate {
    async fn init(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        self.barrier.wait().await;
        self.journal.lock().push(format!("{}:init", self.name));
        Ok(())
    }
}

fn gated(parallel: bool, j: &Journal) -> LifecycleController {
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let mut source = StaticSource::new();
    for name in ["left", "right"] {
        let barrier = Arc::clone(&barrier);
        let journal = Arc::clone(j);
        source.push(PluginManifest::new(name, move || {
            Ok(Gate {
                name,
                barrier: Arc::clone(&barrier),
                journal: Arc::clone(&journal),
            })
        }));
    }
    source.push(Recorder::new("joined", j).manifest(&["left", "right"]));
    LifecycleController::builder()
        .source(source)
        .hook_timeout(Some(Duration::from_millis(100)))
        .parallel_passes(parallel)
        .build()
}

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn controller(manifests: Vec<PluginManifest>) -> LifecycleController {
    LifecycleController::builder()
        .source(manifests.into_iter().collect::<StaticSource>())
        .hook_timeout(Some(Duration::from_secs(5)))
        .build()
}

/// conversations → {chroma, config}, chroma → config, discovered dependents-first.
fn trio(j: &Journal) -> Vec<PluginManifest> {
    vec![
        Recorder::new("conversations", j).manifest(&["chroma", "config"]),
        Recorder::new("chroma", j).manifest(&["config"]),
        Recorder::new("config", j).manifest(&[]),
    ]
}

// ─── start ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_initializes_everything_before_activating() {
    let j = journal();
    let c = controller(trio(&j));

    let report = assert_ok!(c.start().await);
    assert_eq!(report.order, ["config", "chroma", "conversations"]);
    assert_eq!(report.active, report.order);
    assert!(report.is_clean());
    assert_eq!(
        *j.lock(),
        [
            "config:init",
            "chroma:init",
            "conversations:init",
            "config:activate",
            "chroma:activate",
            "conversations:activate",
        ]
    );
}

#[tokio::test]
async fn test_sequential_passes_keep_the_same_order() {
    let j = journal();
    let c = LifecycleController::builder()
        .source(trio(&j).into_iter().collect::<StaticSource>())
        .parallel_passes(false)
        .build();

    c.start().await.unwrap();
    assert_eq!(j.lock()[..3], ["config:init", "chroma:init", "conversations:init"]);
    assert!(!c.options().parallel_passes);
}

#[tokio::test(start_paused = true)]
async fn test_layer_hooks_run_concurrently() {
    let j = journal();
    let c = gated(true, &j);

    let report = c.start().await.unwrap();
    assert_eq!(report.active.len(), 3);
    let journal = j.lock();
    assert_eq!(journal.len(), 4);
    assert_eq!(journal[2], "joined:init");
    assert_eq!(journal[3], "joined:activate");
}

#[tokio::test(start_paused = true)]
async fn test_sequential_layer_hooks_do_not_overlap() {
    let j = journal();
    let c = gated(false, &j);

    c.start().await.unwrap();
    let left = c.descriptor("left").unwrap();
    assert_eq!(left.state(), PluginState::Error);
    assert!(left.error().is_some_and(|e| e.contains("timed out")));
    assert_eq!(c.state("joined"), Some(PluginState::Error));
    assert!(!j.lock().iter().any(|e| e == "left:init"));
}

#[tokio::test]
async fn test_cycle_aborts_start() {
    let j = journal();
    let c = controller(vec![
        Recorder::new("a", &j).manifest(&["b"]),
        Recorder::new("b", &j).manifest(&["a"]),
    ]);

    let err = assert_err!(c.start().await);
    assert!(matches!(&err, ControllerError::Cycle(cycle) if cycle.involves("a") && cycle.involves("b")));
    assert_eq!(c.state("a"), Some(PluginState::Discovered));
    assert_eq!(c.state("b"), Some(PluginState::Discovered));
    assert!(j.lock().is_empty());
}

#[tokio::test]
async fn test_validation_failure_is_isolated() {
    let j = journal();
    let c = controller(vec![
        Recorder::new("p", &j).fault(Fault::Validate).manifest(&[]),
        Recorder::new("q", &j).manifest(&[]),
    ]);

    let report = c.start().await.unwrap();
    assert_eq!(c.state("p"), Some(PluginState::Error));
    assert_eq!(c.state("q"), Some(PluginState::Active));
    assert_eq!(report.active, ["q"]);
    assert_eq!(report.state_counts["error"], 1);
    assert_eq!(report.state_counts["active"], 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(
        report.failed[0].error.as_deref(),
        Some("configuration validation failed")
    );
    assert!(!j.lock().iter().any(|e| e == "p:init"));
}

#[tokio::test]
async fn test_failed_dependency_blocks_dependent() {
    let j = journal();
    let c = controller(vec![
        Recorder::new("base", &j).fault(Fault::Init).manifest(&[]),
        Recorder::new("top", &j).manifest(&["base"]),
    ]);

    c.start().await.unwrap();
    let base = c.descriptor("base").unwrap();
    assert_eq!(base.state(), PluginState::Error);
    assert_eq!(base.error(), Some("init exploded"));
    let top = c.descriptor("top").unwrap();
    assert_eq!(top.state(), PluginState::Error);
    assert!(top.error().is_some_and(|e| e.contains("dependency 'base'")));
    assert_eq!(*j.lock(), ["base:init"]);
}

#[tokio::test]
async fn test_panicking_init_is_isolated() {
    let j = journal();
    let c = controller(vec![
        Recorder::new("x", &j).fault(Fault::InitPanic).manifest(&[]),
        Recorder::new("y", &j).manifest(&[]),
    ]);

    c.start().await.unwrap();
    let x = c.descriptor("x").unwrap();
    assert_eq!(x.state(), PluginState::Error);
    assert!(x.error().is_some_and(|e| e.contains("init panicked")));
    assert_eq!(c.state("y"), Some(PluginState::Active));
}

#[tokio::test(start_paused = true)]
async fn test_hook_timeout_fails_plugin() {
    let c = LifecycleController::builder()
        .source(StaticSource::new().with(PluginManifest::new("slow", || Ok(Slow))))
        .hook_timeout(Some(Duration::from_millis(100)))
        .build();

    c.start().await.unwrap();
    let slow = c.descriptor("slow").unwrap();
    assert_eq!(slow.state(), PluginState::Error);
    assert!(slow.error().is_some_and(|e| e.contains("timed out")));
}

#[tokio::test]
async fn test_missing_dependency_is_only_a_warning() {
    let j = journal();
    let c = controller(vec![Recorder::new("x", &j).manifest(&["ghost"])]);

    let report = c.start().await.unwrap();
    assert_eq!(c.state("x"), Some(PluginState::Active));
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].dependency, "ghost");
    assert!(!report.is_clean());

    let deps = c.dependencies("x").unwrap();
    assert_eq!(deps.dependencies[0].state, None);
}

#[tokio::test]
async fn test_discovery_errors_are_reported() {
    let j = journal();
    let c = controller(vec![
        Recorder::new("good", &j).manifest(&[]),
        Recorder::new("bad", &j).manifest(&["not valid"]),
    ]);

    let report = c.start().await.unwrap();
    assert_eq!(report.discovery_errors.len(), 1);
    assert_eq!(c.state("bad"), Some(PluginState::Error));
    assert_eq!(c.state("good"), Some(PluginState::Active));
    assert_eq!(c.discovery_errors().len(), 1);
}

// ─── unload / reload ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unload_cascades_to_dependents() {
    let j = journal();
    let c = controller(trio(&j));
    c.start().await.unwrap();
    j.lock().clear();

    let unloaded = c.unload("config").await.unwrap();
    assert_eq!(unloaded, ["conversations", "chroma", "config"]);
    assert_eq!(
        *j.lock(),
        [
            "conversations:deactivate",
            "conversations:cleanup",
            "chroma:deactivate",
            "chroma:cleanup",
            "config:deactivate",
            "config:cleanup",
        ]
    );
    for name in ["conversations", "chroma", "config"] {
        assert_eq!(c.state(name), Some(PluginState::Unloaded));
        assert!(c.plugin(name).is_none());
    }
}

#[tokio::test]
async fn test_unload_leaf_leaves_dependencies_alone() {
    let j = journal();
    let c = controller(trio(&j));
    c.start().await.unwrap();

    assert_eq!(c.unload("conversations").await.unwrap(), ["conversations"]);
    assert_eq!(c.state("chroma"), Some(PluginState::Active));
    let config = c.descriptor("config").unwrap();
    assert_eq!(config.dependents().iter().collect::<Vec<_>>(), ["chroma"]);
}

#[tokio::test]
async fn test_deactivate_failure_still_unloads() {
    let j = journal();
    let c = controller(vec![Recorder::new("x", &j).fault(Fault::Deactivate).manifest(&[])]);
    c.start().await.unwrap();

    assert_eq!(c.unload("x").await.unwrap(), ["x"]);
    assert_eq!(c.state("x"), Some(PluginState::Unloaded));
    assert!(j.lock().iter().any(|e| e == "x:cleanup"));
}

#[tokio::test]
async fn test_reload_restores_cascade() {
    let j = journal();
    let c = controller(trio(&j));
    c.start().await.unwrap();
    j.lock().clear();

    assert!(assert_ok!(c.reload("chroma").await));
    assert_eq!(
        *j.lock(),
        [
            "conversations:deactivate",
            "conversations:cleanup",
            "chroma:deactivate",
            "chroma:cleanup",
            "chroma:init",
            "conversations:init",
            "chroma:activate",
            "conversations:activate",
        ]
    );
    for name in ["conversations", "chroma", "config"] {
        assert_eq!(c.state(name), Some(PluginState::Active));
    }
    let config = c.descriptor("config").unwrap();
    assert_eq!(
        config.dependents().iter().collect::<Vec<_>>(),
        ["chroma", "conversations"]
    );
}

#[tokio::test]
async fn test_reload_after_explicit_unload() {
    let j = journal();
    let c = controller(trio(&j));
    c.start().await.unwrap();
    c.unload("config").await.unwrap();

    assert!(c.reload("config").await.unwrap());
    assert_eq!(c.state("config"), Some(PluginState::Active));
    assert_eq!(c.state("chroma"), Some(PluginState::Unloaded));
}

#[tokio::test]
async fn test_unknown_plugin() {
    let c = controller(Vec::new());
    c.start().await.unwrap();

    assert!(matches!(c.unload("nope").await, Err(ControllerError::UnknownPlugin(n)) if n == "nope"));
    assert!(matches!(c.reload("nope").await, Err(ControllerError::UnknownPlugin(_))));
    assert!(matches!(c.validate(Some("nope")), Err(ControllerError::UnknownPlugin(_))));
}

#[tokio::test]
async fn test_shutdown_all_in_reverse_order() {
    let j = journal();
    let c = controller(trio(&j));
    c.start().await.unwrap();

    let unloaded = c.shutdown_all().await;
    assert_eq!(unloaded, ["conversations", "chroma", "config"]);
    assert!(c.plugins().iter().all(|p| p.state == PluginState::Unloaded));
}

// ─── integration with services, pipeline and events ─────────────────────────

#[tokio::test]
async fn test_middleware_plugin_joins_and_leaves_pipeline() {
    let j = journal();
    let mut mw = Recorder::new("mw", &j);
    mw.middleware = true;
    let c = controller(vec![mw.manifest(&[])]);
    c.start().await.unwrap();

    assert_eq!(c.pipeline().middleware_names(), ["mw"]);
    let out = c
        .pipeline()
        .process("op", json!([]), Map::new())
        .await
        .unwrap();
    assert_eq!(out, json!(["mw"]));
    assert_eq!(c.info("mw").unwrap().middleware.as_deref(), Some("mw"));

    c.unload("mw").await.unwrap();
    assert!(c.pipeline().is_empty());
}

#[tokio::test]
async fn test_provided_services_are_shared_and_withdrawn() {
    let j = journal();
    let mut provider = Recorder::new("provider", &j);
    provider.provides = Some("store");
    let mut consumer = Recorder::new("consumer", &j);
    consumer.needs = Some("store");
    consumer.peer = Some("provider");

    let c = controller(vec![consumer.manifest(&["provider"]), provider.manifest(&[])]);
    c.start().await.unwrap();
    assert_eq!(c.state("consumer"), Some(PluginState::Active));
    assert_eq!(c.services().get::<String>("store").as_deref().map(String::as_str), Some("provider"));
    assert_eq!(c.info("provider").unwrap().services, ["store"]);

    c.unload("provider").await.unwrap();
    assert!(!c.services().contains("store"));
    assert_eq!(c.state("consumer"), Some(PluginState::Unloaded));
}

#[tokio::test]
async fn test_lifecycle_events_are_emitted() {
    let j = journal();
    let c = controller(vec![
        Recorder::new("p", &j).fault(Fault::Validate).manifest(&[]),
        Recorder::new("q", &j).manifest(&[]),
    ]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event_type in [lifecycle::ACTIVATED, lifecycle::FAILED] {
        let seen = Arc::clone(&seen);
        c.events().subscribe(event_type, move |event: Event| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock()
                    .push(format!("{}({})", event.event_type, event.payload["plugin"]));
                Ok(())
            }
        });
    }

    c.start().await.unwrap();
    assert_eq!(
        *seen.lock(),
        [r#"plugin.failed("p")"#, r#"plugin.activated("q")"#]
    );
}

// ─── queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_info_and_dependencies() {
    let j = journal();
    let c = controller(trio(&j));
    c.start().await.unwrap();

    let info = c.info("chroma").unwrap();
    assert_eq!(info.version, "0.1.0");
    assert_eq!(info.state, PluginState::Active);
    assert_eq!(info.dependencies, ["config"]);
    assert_eq!(info.dependents, ["conversations"]);
    assert_eq!(info.details, json!({ "recorder": "chroma" }));

    let deps = c.dependencies("conversations").unwrap();
    assert_eq!(deps.load_position, Some(2));
    assert_eq!(
        deps.dependencies,
        [
            DependencyStatus {
                name: "chroma".into(),
                state: Some(PluginState::Active),
            },
            DependencyStatus {
                name: "config".into(),
                state: Some(PluginState::Active),
            },
        ]
    );
    assert!(c.info("nope").is_none());
    assert_eq!(c.load_order(), ["config", "chroma", "conversations"]);
}

#[tokio::test]
async fn test_describe_may_query_controller() {
    struct Introspective {
        controller: Arc<std::sync::OnceLock<LifecycleController>>,
    }

    impl Plugin for Introspective {
        fn describe(&self) -> Value {
            let states: Vec<PluginSummary> =
                self.controller.get().map(|c| c.plugins()).unwrap_or_default();
            json!({ "known": states.len() })
        }
    }

    let cell = Arc::new(std::sync::OnceLock::new());
    let shared = Arc::clone(&cell);
    let c = controller(vec![PluginManifest::new("self_aware", move || {
        Ok(Introspective {
            controller: Arc::clone(&shared),
        })
    })]);
    assert!(cell.set(c.clone()).is_ok());
    c.start().await.unwrap();

    let info = c.info("self_aware").unwrap();
    assert_eq!(info.details, json!({ "known": 1 }));
}

#[tokio::test]
async fn test_validate_reruns_config_checks() {
    let j = journal();
    let c = controller(vec![
        Recorder::new("p", &j).fault(Fault::Validate).manifest(&[]),
        Recorder::new("q", &j).manifest(&[]),
    ]);
    c.start().await.unwrap();

    let all = c.validate(None).unwrap();
    assert_eq!(all.len(), 2);
    assert!(!all[0].valid);
    assert!(all[1].valid);

    c.unload("q").await.unwrap();
    assert!(matches!(c.validate(Some("q")), Err(ControllerError::NotLoaded(_))));
}
