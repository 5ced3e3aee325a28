//! End-to-end tests of the sync protocol.
//!
//! Requester, dispatcher, worker and poller run against in-memory stores on a
//! paused tokio clock, so deadlines elapse instantly and deterministically.

use async_trait::async_trait;
use secret_sync::{
    evaluate, ChannelDispatcher, ConsumerRegistry, ExportDispatcher, ExportRequest, ExportWorker,
    InMemoryAuthority, InMemoryRegistry, SecretName, SecretValue, SyncConfig, SyncError,
    SyncOutcome, SyncRequester, TargetIdentity,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(30);
const INTERVAL: Duration = Duration::from_secs(2);

// =============================================================================
// Helpers
// =============================================================================

/// Dispatcher that only records requests; exports run when the test says so.
#[derive(Default)]
struct RecordingDispatcher {
    requests: Mutex<Vec<ExportRequest>>,
}

impl RecordingDispatcher {
    async fn count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn take(&self) -> Vec<ExportRequest> {
        std::mem::take(&mut *self.requests.lock().await)
    }
}

#[async_trait]
impl ExportDispatcher for RecordingDispatcher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn trigger_export(&self, request: &ExportRequest) -> Result<(), SyncError> {
        self.requests.lock().await.push(request.clone());
        Ok(())
    }
}

/// Wraps a registry so every presence check takes `latency`, or never ends.
struct SlowRegistry {
    inner: Arc<InMemoryRegistry>,
    latency: Option<Duration>,
}

#[async_trait]
impl ConsumerRegistry for SlowRegistry {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn has_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
    ) -> Result<bool, SyncError> {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => std::future::pending::<()>().await,
        }
        self.inner.has_secret(target, name).await
    }

    async fn set_secret(
        &self,
        target: &TargetIdentity,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), SyncError> {
        self.inner.set_secret(target, name, value).await
    }
}

/// Dispatcher whose trigger call never returns.
struct StalledDispatcher;

#[async_trait]
impl ExportDispatcher for StalledDispatcher {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn trigger_export(&self, _request: &ExportRequest) -> Result<(), SyncError> {
        std::future::pending().await
    }
}

fn name(value: &str) -> SecretName {
    SecretName::parse(value).unwrap()
}

fn svc_b() -> TargetIdentity {
    TargetIdentity::parse("svc-b").unwrap()
}

fn config() -> SyncConfig {
    SyncConfig::default()
        .with_timeout(TIMEOUT)
        .with_poll_interval(INTERVAL)
}

/// Authority + registry wired through a live channel dispatcher and worker.
async fn live_stack(
    authority_secrets: &[(&str, &str)],
) -> (Arc<InMemoryRegistry>, SyncRequester) {
    let authority = Arc::new(InMemoryAuthority::new());
    for (key, value) in authority_secrets {
        authority.put(name(key), SecretValue::new(*value)).await;
    }
    let registry = Arc::new(InMemoryRegistry::new());

    let worker = ExportWorker::new(authority, registry.clone());
    let (dispatcher, _handle) = ChannelDispatcher::spawn(worker, 16);

    let requester = SyncRequester::new(registry.clone(), Arc::new(dispatcher), config()).unwrap();
    (registry, requester)
}

// =============================================================================
// Tests
// =============================================================================

/// DB_PASS is held by the authority, API_KEY is not.
#[tokio::test(start_paused = true)]
async fn test_db_pass_synced_api_key_times_out() {
    let (registry, requester) = live_stack(&[("DB_PASS", "p1")]).await;
    let start = Instant::now();

    let report = requester
        .ensure(vec![name("DB_PASS"), name("API_KEY")], &svc_b())
        .await;

    assert_eq!(report.get("DB_PASS"), Some(&SyncOutcome::Synced));
    assert_eq!(report.get("API_KEY"), Some(&SyncOutcome::TimedOut));

    let stored = registry.get(&svc_b(), &name("DB_PASS")).await.unwrap();
    assert_eq!(stored.expose(), "p1");
    assert!(registry.get(&svc_b(), &name("API_KEY")).await.is_none());

    assert!(start.elapsed() >= TIMEOUT);
    assert!(start.elapsed() <= TIMEOUT + INTERVAL);

    match evaluate(&report, false) {
        Err(SyncError::SecretsMissing { names }) => assert_eq!(names, vec!["API_KEY"]),
        other => panic!("expected SecretsMissing, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_synced_within_one_interval() {
    let (_registry, requester) = live_stack(&[("DB_PASS", "p1")]).await;
    let start = Instant::now();

    let report = requester
        .ensure_secrets(vec![name("DB_PASS")], &svc_b())
        .await
        .unwrap();

    assert_eq!(report.get("DB_PASS"), Some(&SyncOutcome::Synced));
    assert!(start.elapsed() <= INTERVAL + Duration::from_millis(10));
}

#[tokio::test(start_paused = true)]
async fn test_all_present_makes_no_dispatch() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry
        .set_secret(&svc_b(), &name("DB_PASS"), &SecretValue::new("p1"))
        .await
        .unwrap();
    registry
        .set_secret(&svc_b(), &name("API_KEY"), &SecretValue::new("k1"))
        .await
        .unwrap();
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let requester = SyncRequester::new(registry.clone(), dispatcher.clone(), config()).unwrap();
    let start = Instant::now();

    let report = requester
        .ensure_secrets(vec![name("DB_PASS"), name("API_KEY")], &svc_b())
        .await
        .unwrap();

    assert_eq!(report.get("DB_PASS"), Some(&SyncOutcome::AlreadyPresent));
    assert_eq!(report.get("API_KEY"), Some(&SyncOutcome::AlreadyPresent));
    assert_eq!(dispatcher.count().await, 0);
    assert!(start.elapsed() < INTERVAL);
    assert_eq!(registry.write_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_one_timeout_does_not_affect_other_names() {
    let (_registry, requester) =
        live_stack(&[("ALPHA", "a"), ("BRAVO", "b"), ("DELTA", "d")]).await;

    let report = requester
        .ensure(
            vec![name("ALPHA"), name("BRAVO"), name("CHARLIE"), name("DELTA")],
            &svc_b(),
        )
        .await;

    assert_eq!(report.len(), 4);
    assert_eq!(report.get("ALPHA"), Some(&SyncOutcome::Synced));
    assert_eq!(report.get("BRAVO"), Some(&SyncOutcome::Synced));
    assert_eq!(report.get("DELTA"), Some(&SyncOutcome::Synced));
    assert_eq!(report.get("CHARLIE"), Some(&SyncOutcome::TimedOut));
    assert_eq!(report.failed(), vec!["CHARLIE"]);
}

/// An export that lands after the requester gave up is picked up next time.
#[tokio::test(start_paused = true)]
async fn test_late_export_is_already_present_next_run() {
    let authority = Arc::new(InMemoryAuthority::new());
    authority.put(name("DB_PASS"), SecretValue::new("p1")).await;
    let registry = Arc::new(InMemoryRegistry::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let requester = SyncRequester::new(registry.clone(), dispatcher.clone(), config()).unwrap();

    let first = requester.ensure_secrets(vec![name("DB_PASS")], &svc_b()).await;
    assert!(matches!(first, Err(SyncError::SecretsMissing { .. })));

    // The authority's workflow finally runs.
    let worker = ExportWorker::new(authority, registry.clone());
    for request in dispatcher.take().await {
        worker.run(&request).await.unwrap();
    }

    let second = requester
        .ensure_secrets(vec![name("DB_PASS")], &svc_b())
        .await
        .unwrap();
    assert_eq!(second.get("DB_PASS"), Some(&SyncOutcome::AlreadyPresent));
    assert_eq!(dispatcher.count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_worker_rejects_without_polling() {
    let registry = Arc::new(InMemoryRegistry::new());
    let (sender, receiver) = tokio::sync::mpsc::channel(1);
    drop(receiver);
    let dispatcher = Arc::new(ChannelDispatcher::new(sender));
    let requester = SyncRequester::new(registry, dispatcher, config()).unwrap();
    let start = Instant::now();

    let report = requester.ensure(vec![name("DB_PASS")], &svc_b()).await;

    assert!(matches!(
        report.get("DB_PASS"),
        Some(SyncOutcome::Rejected { .. })
    ));
    assert!(start.elapsed() < INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_mode_via_free_function() {
    let registry = Arc::new(InMemoryRegistry::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());

    let report = secret_sync::ensure_secrets(
        vec![name("API_KEY")],
        &svc_b(),
        config().with_degraded(true),
        registry,
        dispatcher.clone(),
    )
    .await
    .unwrap();

    assert_eq!(report.get("API_KEY"), Some(&SyncOutcome::TimedOut));
    assert_eq!(dispatcher.count().await, 1);
}

// =============================================================================
// Slow collaborators
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_registry_stays_within_bound() {
    let authority = Arc::new(InMemoryAuthority::new());
    authority.put(name("DB_PASS"), SecretValue::new("p1")).await;
    let inner = Arc::new(InMemoryRegistry::new());
    let worker = ExportWorker::new(authority, inner.clone());
    let (dispatcher, _handle) = ChannelDispatcher::spawn(worker, 16);
    let registry = Arc::new(SlowRegistry {
        inner: inner.clone(),
        latency: Some(Duration::from_secs(5)),
    });
    let requester = SyncRequester::new(registry, Arc::new(dispatcher), config()).unwrap();
    let start = Instant::now();

    let report = requester
        .ensure(vec![name("DB_PASS"), name("API_KEY")], &svc_b())
        .await;

    assert_eq!(report.get("DB_PASS"), Some(&SyncOutcome::Synced));
    assert_eq!(report.get("API_KEY"), Some(&SyncOutcome::TimedOut));
    assert!(start.elapsed() >= TIMEOUT);
    assert!(start.elapsed() <= TIMEOUT + INTERVAL);
    assert!(inner.get(&svc_b(), &name("DB_PASS")).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_first_check_still_dispatches_and_times_out() {
    let registry = Arc::new(SlowRegistry {
        inner: Arc::new(InMemoryRegistry::new()),
        latency: None,
    });
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let requester = SyncRequester::new(registry, dispatcher.clone(), config()).unwrap();
    let start = Instant::now();

    let report = requester.ensure(vec![name("DB_PASS")], &svc_b()).await;

    assert_eq!(report.get("DB_PASS"), Some(&SyncOutcome::TimedOut));
    assert!(start.elapsed() <= TIMEOUT + INTERVAL);
    assert_eq!(dispatcher.count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_dispatch_is_rejected_at_deadline() {
    let registry = Arc::new(InMemoryRegistry::new());
    let requester =
        SyncRequester::new(registry, Arc::new(StalledDispatcher), config()).unwrap();
    let start = Instant::now();

    let report = requester.ensure(vec![name("DB_PASS")], &svc_b()).await;

    assert!(matches!(
        report.get("DB_PASS"),
        Some(SyncOutcome::Rejected { reason }) if reason.contains("deadline")
    ));
    assert!(start.elapsed() <= TIMEOUT + INTERVAL);
}
