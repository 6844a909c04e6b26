use super::*;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::events::{EventBus, LifecycleEvent};
use crate::http::ListenerKind;
use crate::integration::{AssetServer, DatabaseInitializer, RouteRegistrar};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tower::ServiceExt;

// `run()` listens for process signals; keep those tests from overlapping
static RUN_EXCLUSIVE: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

fn create_test_config(environment: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.environment = environment.to_string();
    config.server.port = 0;
    config.server.fallback_port = 0;
    config.lifecycle.grace_period_ms = 10;
    config.lifecycle.shutdown_timeout_ms = 2_000;
    config.lifecycle.health_log_interval_secs = 0;
    config.lifecycle.fallback_retry_delay_ms = 10;
    config
}

#[derive(Default)]
struct TestDatabase {
    calls: AtomicUsize,
    fail: bool,
}

impl TestDatabase {
    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl DatabaseInitializer for TestDatabase {
    async fn initialize(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServerError::component("database", "connection refused"));
        }
        Ok(())
    }
}

struct StalledDatabase;

#[async_trait]
impl DatabaseInitializer for StalledDatabase {
    async fn initialize(&self) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

struct GatedDatabase {
    gate: Arc<Notify>,
}

#[async_trait]
impl DatabaseInitializer for GatedDatabase {
    async fn initialize(&self) -> Result<()> {
        self.gate.notified().await;
        Ok(())
    }
}

#[derive(Default)]
struct ApiRoutes {
    calls: AtomicUsize,
}

#[async_trait]
impl RouteRegistrar for ApiRoutes {
    async fn register(&self, router: Router) -> Result<Router> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(router
            .route(
                "/api/items",
                get(|| async { Json(serde_json::json!({ "items": ["blt", "club"] })) }),
            )
            .route(
                "/api/boom",
                get(|| async {
                    let press: Option<&str> = None;
                    press.expect("sandwich press jammed")
                }),
            )
            .route(
                "/api/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "done"
                }),
            ))
    }
}

#[derive(Default)]
struct RecordingAssets {
    dev_calls: AtomicUsize,
    static_calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl AssetServer for RecordingAssets {
    async fn setup_dev(&self, router: Router) -> Result<Router> {
        self.dev_calls.fetch_add(1, Ordering::SeqCst);
        Ok(router)
    }

    fn serve_static(&self, router: Router) -> Result<Router> {
        self.static_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServerError::component("static_assets", "missing bundle"));
        }
        Ok(router)
    }
}

fn build_controller(
    config: ServerConfig,
    database: Arc<dyn DatabaseInitializer>,
    registrar: Arc<dyn RouteRegistrar>,
    assets: Arc<dyn AssetServer>,
) -> BootstrapController {
    BootstrapController::builder(config)
        .database(database)
        .routes(registrar)
        .assets(assets)
        .build()
        .unwrap()
}

async fn request(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn wait_for_phase(state: &LifecycleState, phase: Phase) {
    for _ in 0..100 {
        if state.phase() == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.phase(), phase);
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    /// Route this thread's INFO and above into the buffer
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn lines_containing(&self, needle: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

async fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8_lossy(&raw).to_string();

    let status = text
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = text.split("\r\n\r\n").nth(1).unwrap_or("").to_string();
    (status, body)
}

#[tokio::test]
async fn test_heavy_init_success_marks_ready() {
    let database = Arc::new(TestDatabase::default());
    let registrar = Arc::new(ApiRoutes::default());
    let assets = Arc::new(RecordingAssets::default());
    let controller = build_controller(
        create_test_config("production"),
        database.clone(),
        registrar.clone(),
        assets.clone(),
    );
    let router = controller.router();

    let (_, health) = request(&router, "/health").await;
    assert_eq!(health["initialized"], false);
    let (status, _) = request(&router, "/api/items").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let phase = controller.run_heavy_init().await.unwrap();
    assert_eq!(phase, Phase::Ready);
    assert_eq!(database.calls.load(Ordering::SeqCst), 1);
    assert_eq!(registrar.calls.load(Ordering::SeqCst), 1);
    assert_eq!(assets.static_calls.load(Ordering::SeqCst), 1);
    assert_eq!(assets.dev_calls.load(Ordering::SeqCst), 0);

    let (status, health) = request(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["initialized"], true);
    assert_eq!(health["environment"], "production");

    let (status, body) = request(&router, "/api/items").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0], "blt");
}

#[tokio::test]
async fn test_development_selects_dev_assets() {
    let assets = Arc::new(RecordingAssets::default());
    let controller = build_controller(
        create_test_config("development"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        assets.clone(),
    );

    assert_eq!(controller.run_heavy_init().await.unwrap(), Phase::Ready);
    assert_eq!(assets.dev_calls.load(Ordering::SeqCst), 1);
    assert_eq!(assets.static_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_heavy_init_publishes_stage_events() {
    let events = Arc::new(EventBus::default());
    let mut receiver = events.subscribe();
    let controller = BootstrapController::builder(create_test_config("production"))
        .event_bus(Arc::clone(&events))
        .database(Arc::new(TestDatabase::default()))
        .routes(Arc::new(ApiRoutes::default()))
        .assets(Arc::new(RecordingAssets::default()))
        .build()
        .unwrap();

    controller.run_heavy_init().await.unwrap();

    let mut stages = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let LifecycleEvent::StageCompleted { stage } = event {
            stages.push(stage);
        }
    }
    assert_eq!(
        stages,
        vec![
            InitStage::Database,
            InitStage::Routes,
            InitStage::AttachedAssets,
            InitStage::Assets
        ]
    );
}

#[tokio::test]
async fn test_database_failure_leaves_process_degraded() {
    let registrar = Arc::new(ApiRoutes::default());
    let controller = build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::failing()),
        registrar.clone(),
        Arc::new(RecordingAssets::default()),
    );
    let router = controller.router();

    assert_eq!(controller.run_heavy_init().await.unwrap(), Phase::Degraded);
    assert_eq!(registrar.calls.load(Ordering::SeqCst), 0);

    let error = controller.state().initialization_error().unwrap();
    assert_eq!(error.stage, InitStage::Database);
    assert!(error.message.contains("connection refused"));

    let (status, body) = request(&router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "status": "ok" }));

    let (status, health) = request(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["initialized"], false);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["phase"], "degraded");

    let (status, _) = request(&router, "/api/anything").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_asset_failure_installs_no_routes() {
    let assets = Arc::new(RecordingAssets {
        fail: true,
        ..RecordingAssets::default()
    });
    let controller = build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        assets,
    );
    let router = controller.router();

    assert_eq!(controller.run_heavy_init().await.unwrap(), Phase::Degraded);
    assert_eq!(
        controller.state().initialization_error().unwrap().stage,
        InitStage::Assets
    );

    let (status, _) = request(&router, "/api/items").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_heavy_init_runs_only_once() {
    let database = Arc::new(TestDatabase::default());
    let controller = build_controller(
        create_test_config("production"),
        database.clone(),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );

    controller.run_heavy_init().await.unwrap();
    assert!(controller.run_heavy_init().await.is_err());
    assert_eq!(database.calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state().phase(), Phase::Ready);
}

#[tokio::test]
async fn test_heavy_init_refused_after_shutdown() {
    let database = Arc::new(TestDatabase::default());
    let controller = build_controller(
        create_test_config("production"),
        database.clone(),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );

    controller.shutdown_manager().request(ShutdownSignal::Sigterm);

    assert!(matches!(
        controller.run_heavy_init().await,
        Err(ServerError::InvalidTransition { .. })
    ));
    assert_eq!(database.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stalled_initialization_times_out_into_degraded() {
    let mut config = create_test_config("production");
    config.lifecycle.init_timeout_secs = 1;
    let controller = build_controller(
        config,
        Arc::new(StalledDatabase),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );

    assert_eq!(controller.run_heavy_init().await.unwrap(), Phase::Degraded);

    let error = controller.state().initialization_error().unwrap();
    assert_eq!(error.stage, InitStage::Database);
    assert!(error.message.contains("timed out"));
    assert!(!controller.health().snapshot().initialized);
}

#[tokio::test]
async fn test_shutdown_during_init_does_not_abort_it() {
    let gate = Arc::new(Notify::new());
    let controller = Arc::new(build_controller(
        create_test_config("production"),
        Arc::new(GatedDatabase {
            gate: Arc::clone(&gate),
        }),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    ));
    let router = controller.router();

    let init = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run_heavy_init().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(controller.state().phase(), Phase::Initializing);

    assert!(controller.shutdown_manager().request(ShutdownSignal::Sigterm));
    gate.notify_one();

    let phase = init.await.unwrap().unwrap();
    assert_eq!(phase, Phase::ShuttingDown);
    assert!(!controller.health().snapshot().initialized);

    let (status, _) = request(&router, "/api/items").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_shutdown_requests_are_idempotent() {
    let events = Arc::new(EventBus::default());
    let state = Arc::new(LifecycleState::new(Arc::clone(&events)));
    let manager = ShutdownManager::with_timeouts(
        Arc::clone(&state),
        events,
        Duration::from_millis(10),
        Duration::from_secs(2),
    );

    assert!(manager.request(ShutdownSignal::Sigterm));
    assert!(!manager.request(ShutdownSignal::Sigterm));
    assert!(!manager.request(ShutdownSignal::UncaughtException));
    assert_eq!(state.shutdown_request().unwrap().signal, ShutdownSignal::Sigterm);

    let status = manager.wait_for_exit(async { Ok(()) }).await.unwrap();
    assert_eq!(status, ExitStatus::Graceful);
    assert_eq!(status.code(), 0);
    assert_eq!(state.phase(), Phase::Terminated);

    // Timers are never armed twice
    assert!(manager.wait_for_exit(async { Ok(()) }).await.is_err());
}

#[tokio::test]
async fn test_forced_exit_when_listener_never_closes() {
    let events = Arc::new(EventBus::default());
    let state = Arc::new(LifecycleState::new(Arc::clone(&events)));
    let manager = ShutdownManager::with_timeouts(
        Arc::clone(&state),
        events,
        Duration::from_millis(10),
        Duration::from_millis(100),
    );

    manager.request(ShutdownSignal::Sigint);
    let status = manager
        .wait_for_exit(std::future::pending::<Result<()>>())
        .await
        .unwrap();

    assert_eq!(status, ExitStatus::Forced);
    assert_eq!(status.code(), 1);
    assert_eq!(state.phase(), Phase::Terminated);
}

#[tokio::test]
async fn test_unhandled_rejection_policy_depends_on_environment() {
    let production = build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );
    let started = production
        .fault_handler()
        .handle(Fault::unhandled_rejection("socket hang up"));
    assert!(!started);
    assert_eq!(production.state().phase(), Phase::Listening);

    let development = build_controller(
        create_test_config("development"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );
    let started = development
        .fault_handler()
        .handle(Fault::unhandled_rejection("socket hang up"));
    assert!(started);
    assert_eq!(development.state().phase(), Phase::ShuttingDown);
    assert_eq!(
        development.state().shutdown_request().unwrap().signal,
        ShutdownSignal::UnhandledRejection
    );
}

#[tokio::test]
async fn test_uncaught_fault_shuts_down_in_production() {
    let controller = build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );

    assert!(controller.fault_handler().handle(Fault::uncaught("index out of bounds")));
    assert_eq!(
        controller.state().shutdown_request().unwrap().signal,
        ShutdownSignal::UncaughtException
    );
}

#[tokio::test]
async fn test_detached_task_error_reaches_fault_policy() {
    let controller = build_controller(
        create_test_config("development"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );
    let faults = controller.fault_handler();
    assert!(faults.start().is_some());
    assert!(faults.start().is_none());

    faults.spawn_detached("flaky_job", async {
        Err(ServerError::system("job exploded"))
    });

    let shutdown = controller.shutdown_manager();
    tokio::time::timeout(Duration::from_secs(2), shutdown.requested())
        .await
        .expect("unhandled rejection should start shutdown in development");
}

#[tokio::test]
async fn test_degraded_scenario_over_tcp() {
    let controller = build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::failing()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );

    let mut listener = controller.start().await.unwrap();
    assert_eq!(listener.kind(), ListenerKind::Primary);
    let addr = listener.local_addr();

    // Liveness answers before any dependency is touched
    let (status, body) = http_get(addr, "/").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"status\":\"ok\""));

    controller.run_heavy_init().await.unwrap();

    let (status, body) = http_get(addr, "/health").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"initialized\":false"));

    let (status, _) = http_get(addr, "/api/anything").await;
    assert_eq!(status, 404);

    let shutdown = controller.shutdown_manager();
    shutdown.request(ShutdownSignal::Sigterm);
    let status = shutdown.wait_for_exit(listener.closed()).await.unwrap();
    assert_eq!(status, ExitStatus::Graceful);

    assert!(TcpStream::connect(("127.0.0.1", addr.port())).await.is_err());
}

#[tokio::test]
async fn test_inflight_request_forces_exit_after_ceiling() {
    let mut config = create_test_config("production");
    config.lifecycle.shutdown_timeout_ms = 300;
    let controller = build_controller(
        config,
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );

    let mut listener = controller.start().await.unwrap();
    let addr = listener.local_addr();
    assert_eq!(controller.run_heavy_init().await.unwrap(), Phase::Ready);

    // Hold a connection open on a request that outlives the ceiling
    let _client = tokio::spawn(async move { http_get(addr, "/api/slow").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let shutdown = controller.shutdown_manager();
    shutdown.request(ShutdownSignal::Sigterm);
    let status = shutdown.wait_for_exit(listener.closed()).await.unwrap();

    assert_eq!(status, ExitStatus::Forced);
    assert_eq!(controller.state().phase(), Phase::Terminated);
}

#[tokio::test]
async fn test_fallback_listener_when_primary_bind_fails() {
    let blocker = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let mut config = create_test_config("production");
    config.server.port = blocker.local_addr().unwrap().port();

    let events = Arc::new(EventBus::default());
    let mut receiver = events.subscribe();
    let controller = BootstrapController::builder(config)
        .event_bus(Arc::clone(&events))
        .routes(Arc::new(ApiRoutes::default()))
        .assets(Arc::new(RecordingAssets::default()))
        .build()
        .unwrap();

    let listener = controller.start_with_fallback().await.unwrap();
    assert_eq!(listener.kind(), ListenerKind::Fallback);
    let addr = listener.local_addr();

    let (status, body) = http_get(addr, "/health").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"initialized\":false"));

    let (status, _) = http_get(addr, "/api/items").await;
    assert_eq!(status, 404);

    let mut saw_fallback = false;
    while let Ok(event) = receiver.try_recv() {
        if let LifecycleEvent::FallbackListening { attempt, .. } = event {
            assert_eq!(attempt, 1);
            saw_fallback = true;
        }
    }
    assert!(saw_fallback);
    assert_eq!(controller.state().phase(), Phase::Listening);
}

#[tokio::test]
async fn test_fallback_gives_up_after_configured_attempts() {
    let blocker = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = blocker.local_addr().unwrap().port();
    let mut config = create_test_config("production");
    config.server.port = port;
    config.server.fallback_port = port;
    config.lifecycle.fallback_attempts = 2;

    let controller = BootstrapController::builder(config)
        .assets(Arc::new(RecordingAssets::default()))
        .build()
        .unwrap();

    assert!(matches!(
        controller.start_with_fallback().await,
        Err(ServerError::BindFailed { .. })
    ));
}

#[tokio::test]
async fn test_run_exits_gracefully_on_shutdown_request() {
    let _exclusive = RUN_EXCLUSIVE.lock().await;
    let controller = Arc::new(build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    ));

    let run = tokio::spawn(Arc::clone(&controller).run());

    let state = controller.state();
    wait_for_phase(&state, Phase::Ready).await;

    controller.shutdown_manager().request(ShutdownSignal::Sigterm);
    let status = run.await.unwrap().unwrap();

    assert_eq!(status, ExitStatus::Graceful);
    assert_eq!(state.phase(), Phase::Terminated);
    assert!(controller.health().snapshot().initialized);
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_handles_repeated_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    let _exclusive = RUN_EXCLUSIVE.lock().await;
    // Keeps SIGTERM from terminating the test binary and tells us it arrived
    let mut sigterm = signal(SignalKind::terminate()).unwrap();

    let events = Arc::new(EventBus::default());
    let mut receiver = events.subscribe();
    let controller = Arc::new(
        BootstrapController::builder(create_test_config("production"))
            .event_bus(Arc::clone(&events))
            .database(Arc::new(TestDatabase::default()))
            .routes(Arc::new(ApiRoutes::default()))
            .assets(Arc::new(RecordingAssets::default()))
            .build()
            .unwrap(),
    );

    let run = tokio::spawn(Arc::clone(&controller).run());
    wait_for_phase(&controller.state(), Phase::Ready).await;

    for _ in 0..2 {
        let sent = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(std::process::id().to_string())
            .status()
            .unwrap();
        assert!(sent.success());
        sigterm.recv().await;
    }

    let status = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run should finish after SIGTERM")
        .unwrap()
        .unwrap();
    assert_eq!(status, ExitStatus::Graceful);
    assert_eq!(
        controller.state().shutdown_request().unwrap().signal,
        ShutdownSignal::Sigterm
    );

    let mut shutdowns = 0;
    while let Ok(event) = receiver.try_recv() {
        if let LifecycleEvent::ShutdownRequested { signal, .. } = event {
            assert_eq!(signal, ShutdownSignal::Sigterm);
            shutdowns += 1;
        }
    }
    assert_eq!(shutdowns, 1);
}

#[tokio::test]
async fn test_health_log_stops_when_shutdown_begins() {
    let controller = build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );

    let task = controller.spawn_health_log(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());

    controller.shutdown_manager().request(ShutdownSignal::Sigterm);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("health log should stop once shutdown begins")
        .unwrap();
}

#[tokio::test]
async fn test_handler_panic_answers_500_and_keeps_serving() {
    let controller = build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::default()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );
    let mut listener = controller.start().await.unwrap();
    let addr = listener.local_addr();
    assert_eq!(controller.run_heavy_init().await.unwrap(), Phase::Ready);

    let (status, body) = http_get(addr, "/api/boom").await;
    assert_eq!(status, 500);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["message"], "sandwich press jammed");

    // Same listener keeps answering
    let (status, _) = http_get(addr, "/api/items").await;
    assert_eq!(status, 200);
    assert_eq!(controller.state().phase(), Phase::Ready);
    assert!(!controller.shutdown_manager().is_requested());

    let shutdown = controller.shutdown_manager();
    shutdown.request(ShutdownSignal::Sigterm);
    let status = shutdown.wait_for_exit(listener.closed()).await.unwrap();
    assert_eq!(status, ExitStatus::Graceful);
}

#[tokio::test]
async fn test_panics_while_handling_requests_are_not_process_faults() {
    use super::faults::fault_for_panic;

    let inside = within_request(async { fault_for_panic("boom".to_string()) }).await;
    assert!(inside.is_none());

    let outside = fault_for_panic("boom".to_string()).unwrap();
    assert_eq!(outside.kind, FaultKind::Uncaught);
    assert_eq!(outside.message, "boom");
}

#[tokio::test]
async fn test_lifecycle_failures_are_logged_once() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let controller = build_controller(
        create_test_config("production"),
        Arc::new(TestDatabase::failing()),
        Arc::new(ApiRoutes::default()),
        Arc::new(RecordingAssets::default()),
    );
    assert_eq!(controller.run_heavy_init().await.unwrap(), Phase::Degraded);
    controller.shutdown_manager().request(ShutdownSignal::Sigterm);

    assert_eq!(logs.lines_containing("connection refused"), 1);
    assert_eq!(logs.lines_containing("SIGTERM"), 1);
}

#[test]
fn test_exit_status_codes() {
    assert_eq!(ExitStatus::Graceful.code(), 0);
    assert_eq!(ExitStatus::Forced.code(), 1);
    assert_eq!(ExitStatus::StartupFailed.code(), 1);
}

#[test]
fn test_shutdown_signal_names() {
    assert_eq!(ShutdownSignal::Sigterm.to_string(), "SIGTERM");
    assert_eq!(ShutdownSignal::Sigint.to_string(), "SIGINT");
    assert_eq!(
        ShutdownSignal::UncaughtException.to_string(),
        "uncaughtException"
    );
}
