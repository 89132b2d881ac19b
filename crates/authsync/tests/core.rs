//! End-to-end behavior of `SessionCore` and `CoreDriver` against a
//! scripted authority and in-memory storage.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use authsync::prelude::*;
use authsync::protocol::{Codec, JsonCodec, SessionCheckResponse, WireId, WireUser};
use authsync::store::SessionStore;
use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};

// ---------------------------------------------------------------------------
// Test authority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    User(&'static str, &'static str),
    NoSession,
    Down,
    /// Raw response body, decoded the way `HttpAuthority` decodes it.
    Body(&'static str),
    Hang,
}

struct MockAuthority {
    reply: Mutex<Reply>,
    calls: AtomicUsize,
    logouts: AtomicUsize,
    logout_fails: AtomicBool,
    gate: Option<Semaphore>,
}

impl MockAuthority {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            logout_fails: AtomicBool::new(false),
            gate: None,
        })
    }

    /// Session checks wait until `open()` is called.
    fn gated(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            calls: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            logout_fails: AtomicBool::new(false),
            gate: Some(Semaphore::new(0)),
        })
    }

    fn set(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(16);
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AuthorityClient for MockAuthority {
    async fn check_session(&self) -> Result<SessionCheckResponse, AuthorityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }

        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::User(id, name) => Ok(SessionCheckResponse {
                success: true,
                user: Some(WireUser {
                    id: Some(WireId::Text(id.to_string())),
                    name: Some(name.to_string()),
                    email: Some(format!("{id}@example.com")),
                    avatar: None,
                }),
                malformed: false,
            }),
            Reply::NoSession => Ok(SessionCheckResponse::no_session()),
            Reply::Down => Err(AuthorityError::Request("connection refused".into())),
            Reply::Body(body) => Ok(JsonCodec.decode(body.as_bytes())?),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn logout(&self) -> Result<(), AuthorityError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        if self.logout_fails.load(Ordering::SeqCst) {
            Err(AuthorityError::Status(500))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Core = SessionCore<Arc<MockAuthority>, Arc<MemoryStorage>>;
type Driver = CoreDriver<Arc<MockAuthority>, Arc<MemoryStorage>>;

fn build(auth: &Arc<MockAuthority>, storage: &Arc<MemoryStorage>) -> (Core, Driver) {
    SessionCoreBuilder::new()
        .poll(PollConfig::disabled())
        .build(Arc::clone(auth), Arc::clone(storage))
}

fn record(core: &Core) -> (Arc<Mutex<Vec<TransitionKind>>>, Subscription) {
    let kinds: Arc<Mutex<Vec<TransitionKind>>> = Arc::default();
    let sink = Arc::clone(&kinds);
    let sub = core.on_transition(move |e| sink.lock().unwrap().push(e.kind));
    (kinds, sub)
}

fn kinds(log: &Arc<Mutex<Vec<TransitionKind>>>) -> Vec<TransitionKind> {
    log.lock().unwrap().clone()
}

fn snapshot(id: &str) -> AuthSnapshot {
    AuthSnapshot::new(UserId::new(id).unwrap(), format!("user {id}"), "", "")
}

fn current_id(core: &Core) -> Option<String> {
    core.current_snapshot().map(|s| s.user_id.as_str().to_string())
}

async fn wait_for_calls(auth: &MockAuthority, n: usize) {
    while auth.calls() < n {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_force_probe_login_saves_and_publishes() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);

    let result = core.force_probe().await;

    assert_eq!(result.snapshot().map(|s| s.display_name.as_str()), Some("Ada"));
    assert_eq!(kinds(&log), vec![TransitionKind::Login]);
    assert_eq!(current_id(&core).as_deref(), Some("7"));
    assert_eq!(storage.len(), 1);
}

#[tokio::test]
async fn test_same_user_twice_is_unchanged() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);

    core.force_probe().await;
    let first = core.current_snapshot().unwrap();
    core.force_probe().await;
    let second = core.current_snapshot().unwrap();

    assert_eq!(kinds(&log), vec![TransitionKind::Login, TransitionKind::Unchanged]);
    assert!(first.same_profile(&second));
    assert!(second.captured_at >= first.captured_at);
}

#[tokio::test]
async fn test_probe_without_session_logs_out() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);

    core.force_probe().await;
    auth.set(Reply::NoSession);
    core.force_probe().await;

    assert_eq!(kinds(&log), vec![TransitionKind::Login, TransitionKind::Logout]);
    assert!(core.current_snapshot().is_none());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_different_user_is_user_switch() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let events: Arc<Mutex<Vec<TransitionEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    let _sub = core.on_transition(move |e| sink.lock().unwrap().push(e.clone()));

    core.force_probe().await;
    auth.set(Reply::User("8", "Grace"));
    core.force_probe().await;

    let events = events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.kind, TransitionKind::UserSwitch);
    assert_eq!(last.previous.as_ref().unwrap().user_id.as_str(), "7");
    assert_eq!(last.current.as_ref().unwrap().user_id.as_str(), "8");
}

#[tokio::test]
async fn test_logged_out_probe_unauthenticated_is_unchanged_without_write() {
    let auth = MockAuthority::new(Reply::NoSession);
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);

    core.force_probe().await;

    assert_eq!(kinds(&log), vec![TransitionKind::Unchanged]);
    assert!(storage.is_empty());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_probe_keeps_snapshot_and_stays_silent() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);
    core.force_probe().await;

    auth.set(Reply::Down);
    let down = core.force_probe().await;
    auth.set(Reply::Body("<html>maintenance</html>"));
    let garbage = core.force_probe().await;

    assert!(matches!(down, ProbeResult::Failed(ProbeFailure::Network(_))));
    assert!(matches!(garbage, ProbeResult::Failed(ProbeFailure::Malformed(_))));
    assert_eq!(kinds(&log), vec![TransitionKind::Login]);
    assert_eq!(current_id(&core).as_deref(), Some("7"));
    assert_eq!(storage.len(), 1);
}

#[tokio::test]
async fn test_misshapen_json_body_logs_out() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);
    core.force_probe().await;

    for body in [r#"{"success":true,"user":"bob"}"#, r#"{"success":"yes"}"#] {
        auth.set(Reply::Body(body));
        let result = core.force_probe().await;
        assert_eq!(result, ProbeResult::Unauthenticated, "{body}");
    }

    assert_eq!(
        kinds(&log),
        vec![TransitionKind::Login, TransitionKind::Logout, TransitionKind::Unchanged]
    );
    assert!(core.current_snapshot().is_none());
    assert!(storage.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hung_authority_times_out() {
    let auth = MockAuthority::new(Reply::Hang);
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = SessionCoreBuilder::new()
        .poll(PollConfig::disabled())
        .probe_timeout(Duration::from_secs(2))
        .build(Arc::clone(&auth), Arc::clone(&storage));

    let started = tokio::time::Instant::now();
    let result = core.force_probe().await;

    assert_eq!(result, ProbeResult::Failed(ProbeFailure::Timeout));
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(core.is_ready());
}

#[tokio::test]
async fn test_panicking_handler_does_not_block_others() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let _bad = core.on_transition(|_| panic!("widget crashed"));
    let (log, _sub) = record(&core);

    core.force_probe().await;

    assert_eq!(kinds(&log), vec![TransitionKind::Login]);
    assert_eq!(current_id(&core).as_deref(), Some("7"));
}

// ---------------------------------------------------------------------------
// Single-flight and ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrent_force_probes_share_one_request() {
    let auth = MockAuthority::gated(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);

    let (a, b, ()) = tokio::join!(core.force_probe(), core.force_probe(), async {
        wait_for_calls(&auth, 1).await;
        auth.open();
    });

    assert_eq!(auth.calls(), 1);
    assert_eq!(a, b);
    assert_eq!(kinds(&log), vec![TransitionKind::Login]);
}

#[tokio::test]
async fn test_logout_discards_probe_already_in_flight() {
    let storage = Arc::new(MemoryStorage::new());
    SessionStore::open(Arc::clone(&storage), StoreConfig::default()).save(Some(snapshot("7")));

    let auth = MockAuthority::gated(Reply::User("7", "Ada"));
    let (core, _driver) = build(&auth, &storage);
    assert_eq!(current_id(&core).as_deref(), Some("7"));
    let (log, _sub) = record(&core);

    let probe = tokio::spawn({
        let core = core.clone();
        async move { core.force_probe().await }
    });
    wait_for_calls(&auth, 1).await;

    core.logout().await;
    auth.open();
    let landed = probe.await.unwrap();

    assert!(matches!(landed, ProbeResult::Authenticated(_)));
    assert!(core.current_snapshot().is_none());
    assert_eq!(kinds(&log), vec![TransitionKind::Logout]);
    assert!(storage.is_empty());
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_logout_clears_locally_and_notifies_authority() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    core.force_probe().await;
    let (log, _sub) = record(&core);

    core.logout().await;

    assert_eq!(kinds(&log), vec![TransitionKind::Logout]);
    assert_eq!(auth.logouts.load(Ordering::SeqCst), 1);
    assert!(core.current_snapshot().is_none());
}

#[tokio::test]
async fn test_logout_authority_failure_still_clears_locally() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    auth.logout_fails.store(true, Ordering::SeqCst);
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    core.force_probe().await;

    core.logout().await;

    assert!(core.current_snapshot().is_none());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_logout_when_logged_out_publishes_nothing() {
    let auth = MockAuthority::new(Reply::NoSession);
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);

    core.logout().await;

    assert!(kinds(&log).is_empty());
    assert_eq!(auth.logouts.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_new_core_restores_persisted_snapshot() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (first, _d1) = build(&auth, &storage);
    first.force_probe().await;

    let (second, _d2) = build(&auth, &storage);

    assert_eq!(current_id(&second).as_deref(), Some("7"));
    assert_eq!(auth.calls(), 1);
}

#[tokio::test]
async fn test_new_core_ignores_stale_snapshot() {
    let storage = Arc::new(MemoryStorage::new());
    let old = snapshot("7").captured_at(Utc::now() - chrono::Duration::hours(2));
    SessionStore::open(Arc::clone(&storage), StoreConfig::default()).save(Some(old));
    assert_eq!(storage.len(), 1);

    let auth = MockAuthority::new(Reply::NoSession);
    let (core, _driver) = build(&auth, &storage);

    assert!(core.current_snapshot().is_none());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_unavailable_storage_degrades_to_memory() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    storage.set_unavailable(true);
    let (core, _driver) = build(&auth, &storage);
    let (log, _sub) = record(&core);

    core.force_probe().await;

    assert_eq!(kinds(&log), vec![TransitionKind::Login]);
    assert_eq!(current_id(&core).as_deref(), Some("7"));
}

// ---------------------------------------------------------------------------
// Subscriptions and readiness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unsubscribed_handler_is_not_called() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let (core, _driver) = build(&auth, &storage);
    let (log, sub) = record(&core);
    assert_eq!(core.subscriber_count(), 1);

    assert!(sub.unsubscribe());
    core.force_probe().await;

    assert!(kinds(&log).is_empty());
    assert_eq!(core.subscriber_count(), 0);
}

#[tokio::test]
async fn test_ready_resolves_after_first_probe() {
    let auth = MockAuthority::new(Reply::Down);
    let storage = Arc::new(MemoryStorage::new());
    let (core, driver) = build(&auth, &storage);
    assert!(!core.is_ready());

    let task = tokio::spawn(driver.run());
    tokio::time::timeout(Duration::from_secs(1), core.ready())
        .await
        .expect("core never became ready");

    assert!(core.is_ready());
    assert_eq!(auth.calls(), 1);
    core.ready().await;

    core.shutdown();
    task.await.unwrap();
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_change_in_one_instance_reaches_the_other() {
    let storage = Arc::new(MemoryStorage::new());
    let auth_a = MockAuthority::new(Reply::User("7", "Ada"));
    let auth_b = MockAuthority::new(Reply::Down);
    let (a, _driver_a) = build(&auth_a, &storage);
    let (b, driver_b) = build(&auth_b, &storage);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = b.on_transition(move |e| {
        let _ = tx.send(e.clone());
    });
    let task = tokio::spawn(driver_b.run());
    b.ready().await;

    a.force_probe().await;
    let login = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(login.kind, TransitionKind::Login);
    assert_eq!(current_id(&b).as_deref(), Some("7"));

    a.logout().await;
    let logout = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(logout.kind, TransitionKind::Logout);
    assert!(b.current_snapshot().is_none());

    b.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_driver_polls_only_while_visible() {
    let auth = MockAuthority::new(Reply::User("7", "Ada"));
    let storage = Arc::new(MemoryStorage::new());
    let poll = PollConfig {
        interval: Duration::from_secs(30),
        initial_jitter: Duration::ZERO,
    };
    let (core, driver) = SessionCoreBuilder::new()
        .poll(poll)
        .build(Arc::clone(&auth), Arc::clone(&storage));
    let task = tokio::spawn(driver.run());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(auth.calls(), 1, "initial probe");

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(auth.calls(), 2, "first periodic probe");

    core.set_visible(false);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(auth.calls(), 2, "no polling while hidden");

    core.set_visible(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(auth.calls(), 3, "probe on becoming visible");

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(auth.calls(), 4, "polling resumed");

    core.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_does_not_wait_for_hung_probe() {
    let auth = MockAuthority::new(Reply::Hang);
    let storage = Arc::new(MemoryStorage::new());
    let (core, driver) = build(&auth, &storage);
    let task = tokio::spawn(driver.run());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(auth.calls(), 1);

    core.shutdown();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("driver kept running behind the probe")
        .unwrap();
    assert!(!core.is_ready());
}

#[tokio::test]
async fn test_storage_change_handled_while_probe_outstanding() {
    let storage = Arc::new(MemoryStorage::new());
    let auth_a = MockAuthority::new(Reply::User("7", "Ada"));
    let auth_b = MockAuthority::gated(Reply::NoSession);
    let (a, _driver_a) = build(&auth_a, &storage);
    let (b, driver_b) = build(&auth_b, &storage);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = b.on_transition(move |e| {
        let _ = tx.send(e.kind);
    });
    let task = tokio::spawn(driver_b.run());
    wait_for_calls(&auth_b, 1).await;

    a.force_probe().await;
    let kind = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("change not seen while probe was outstanding")
        .unwrap();
    assert_eq!(kind, TransitionKind::Login);

    b.shutdown();
    task.await.unwrap();
}
