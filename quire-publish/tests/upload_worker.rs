//! Upload worker behavior against an in-memory object store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quire_core::HostName;
use quire_publish::{
    Acl, ObjectStore, PublishCredentials, PublishError, PutObject, StoreConnector, UploadOutcome,
    UploadSession, UploadTask, UploadWorker,
};
use tempfile::TempDir;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Put {
    bucket: String,
    key: String,
    content_type: String,
    acl: Acl,
    body: Vec<u8>,
}

#[derive(Default)]
struct Shared {
    puts: Mutex<Vec<Put>>,
    attempts: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, usize>>,
    connects: AtomicU64,
}

struct FakeStore {
    bucket: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put(&self, object: PutObject<'_>) -> Result<(), PublishError> {
        self.shared.attempts.lock().expect("lock").push(object.key.to_string());
        let should_fail = {
            let mut failures = self.shared.failures.lock().expect("lock");
            match failures.get_mut(object.key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            return Err(PublishError::Status {
                key: object.key.to_string(),
                status: 503,
                body: "slow down".into(),
            });
        }
        self.shared.puts.lock().expect("lock").push(Put {
            bucket: self.bucket.clone(),
            key: object.key.to_string(),
            content_type: object.content_type.to_string(),
            acl: object.acl,
            body: object.body.to_vec(),
        });
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeConnector {
    shared: Arc<Shared>,
}

impl FakeConnector {
    fn fail(&self, key: &str, times: usize) {
        self.shared.failures.lock().expect("lock").insert(key.to_string(), times);
    }
    fn puts(&self) -> Vec<Put> {
        self.shared.puts.lock().expect("lock").clone()
    }
    fn attempts(&self) -> Vec<String> {
        self.shared.attempts.lock().expect("lock").clone()
    }
    fn connects(&self) -> u64 {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

impl StoreConnector for FakeConnector {
    fn connect(
        &self,
        credentials: &PublishCredentials,
    ) -> Result<Arc<dyn ObjectStore>, PublishError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeStore {
            bucket: credentials.bucket.clone(),
            shared: self.shared.clone(),
        }))
    }
}

fn creds() -> PublishCredentials {
    PublishCredentials {
        key: "k".into(),
        secret: "s".into(),
        bucket: "foo.com".into(),
    }
}

fn live_with(files: &[(&str, &str)]) -> TempDir {
    let live = TempDir::new().expect("live");
    for (rel, body) in files {
        let path = live.path().join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, body).expect("write");
    }
    live
}

fn task(live: &Path, rel: &str) -> UploadTask {
    UploadTask::new(live, &live.join(rel), &creds()).expect("task")
}

fn worker(connector: &FakeConnector) -> UploadWorker {
    UploadWorker::new(HostName::from("foo.com"), Arc::new(connector.clone()))
}

#[tokio::test]
async fn publishes_public_read_with_content_type() {
    let live = live_with(&[("blog/index.html", "<h1>hi</h1>")]);
    let connector = FakeConnector::default();
    let mut worker = worker(&connector);

    let outcome = worker.process(task(live.path(), "blog/index.html")).await;
    assert_eq!(outcome, UploadOutcome::Published { attempts: 1 });

    let puts = connector.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].bucket, "foo.com");
    assert_eq!(puts[0].key, "blog/index.html");
    assert_eq!(puts[0].content_type, "text/html; charset=utf-8");
    assert_eq!(puts[0].acl, Acl::PublicRead);
    assert_eq!(puts[0].body, b"<h1>hi</h1>");
}

#[tokio::test(start_paused = true)]
async fn one_failure_is_retried_after_backoff() {
    let live = live_with(&[("a.css", "body{}")]);
    let connector = FakeConnector::default();
    connector.fail("a.css", 1);
    let mut worker = worker(&connector);

    let started = Instant::now();
    let outcome = worker.process(task(live.path(), "a.css")).await;
    assert_eq!(outcome, UploadOutcome::Published { attempts: 2 });
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(connector.attempts(), vec!["a.css", "a.css"]);
}

#[tokio::test(start_paused = true)]
async fn two_failures_drop_the_task_but_a_new_event_is_tried_again() {
    let live = live_with(&[("a.css", "v1"), ("b.css", "other")]);
    let connector = FakeConnector::default();
    connector.fail("a.css", 2);
    let mut worker = worker(&connector);

    let outcome = worker.process(task(live.path(), "a.css")).await;
    assert!(matches!(outcome, UploadOutcome::Dropped { .. }), "got {outcome:?}");
    assert_eq!(connector.attempts().len(), 2, "exactly one retry");

    // The worker keeps going with other tasks.
    let outcome = worker.process(task(live.path(), "b.css")).await;
    assert_eq!(outcome, UploadOutcome::Published { attempts: 1 });

    // A later change to the same path is not suppressed by the earlier drop.
    std::fs::write(live.path().join("a.css"), "v2").expect("rewrite");
    let outcome = worker.process(task(live.path(), "a.css")).await;
    assert_eq!(outcome, UploadOutcome::Published { attempts: 1 });
    let published: Vec<_> = connector.puts().into_iter().map(|p| (p.key, p.body)).collect();
    assert!(published.contains(&("a.css".to_string(), b"v2".to_vec())));
}

#[tokio::test(start_paused = true)]
async fn stale_session_is_refreshed_before_publishing() {
    let live = live_with(&[("a.html", "a"), ("b.html", "b")]);
    let connector = FakeConnector::default();
    let mut worker = worker(&connector);

    worker.process(task(live.path(), "a.html")).await;
    assert_eq!(connector.connects(), 1);

    tokio::time::advance(Duration::from_secs(180)).await;
    worker.process(task(live.path(), "b.html")).await;
    assert_eq!(connector.connects(), 2, "more than 2 minutes idle must refresh");
    assert_eq!(worker.session().connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn fresh_session_is_reused() {
    let live = live_with(&[("a.html", "a"), ("b.html", "b")]);
    let connector = FakeConnector::default();
    let mut worker = worker(&connector);

    worker.process(task(live.path(), "a.html")).await;
    tokio::time::advance(Duration::from_secs(60)).await;
    worker.process(task(live.path(), "b.html")).await;
    assert_eq!(connector.connects(), 1, "under 2 minutes must not refresh");
}

#[test]
fn session_refreshes_when_credentials_change() {
    let connector = FakeConnector::default();
    let mut session = UploadSession::new(Arc::new(connector.clone()), Duration::from_secs(120));
    let now = Instant::now();
    session.store_for(&creds(), now).expect("connect");
    session.store_for(&creds(), now).expect("reuse");
    assert_eq!(session.connects(), 1);

    let other = PublishCredentials {
        bucket: "www.foo.com".into(),
        ..creds()
    };
    session.store_for(&other, now).expect("reconnect");
    assert_eq!(session.connects(), 2);
}

#[tokio::test]
async fn directories_and_missing_files_are_skipped() {
    let live = live_with(&[("dir/keep.txt", "x")]);
    let connector = FakeConnector::default();
    let mut worker = worker(&connector);

    let outcome = worker.process(task(live.path(), "dir")).await;
    assert!(matches!(outcome, UploadOutcome::Skipped { .. }));
    let outcome = worker.process(task(live.path(), "gone.html")).await;
    assert!(matches!(outcome, UploadOutcome::Skipped { .. }));
    assert!(connector.attempts().is_empty());
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn run_processes_queue_in_order_until_closed() {
    let live = live_with(&[("1.txt", "1"), ("2.txt", "2"), ("3.txt", "3")]);
    let connector = FakeConnector::default();
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    let handle = tokio::spawn(worker(&connector).run(rx));

    for rel in ["1.txt", "2.txt", "3.txt"] {
        tx.send(task(live.path(), rel)).await.expect("send");
    }
    drop(tx);
    handle.await.expect("worker exits when queue closes");

    let keys: Vec<_> = connector.puts().into_iter().map(|p| p.key).collect();
    assert_eq!(keys, vec!["1.txt", "2.txt", "3.txt"]);
}
