//! In-process stand-ins for git/rsync, the site generator, and the object
//! store, shared by the daemon integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quire_core::{Config, HostName, PublishCredentials, SiteDirs, SiteRegistration};
use quire_daemon::{BuildDispatcher, ProcessOutcome, SiteSupervisor, Toolchain};
use quire_generator::{Generator, GeneratorFactory, RenderError, RenderSummary};
use quire_publish::{ObjectStore, PublishError, PutObject, StoreConnector};

/// Ordered record of pipeline steps across all fakes: `(host, step)`.
pub type StepLog = Arc<Mutex<Vec<(String, &'static str)>>>;

fn record(log: &StepLog, host: &str, step: &'static str) {
    log.lock().expect("lock").push((host.to_string(), step));
}

fn host_of(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Toolchain
// ---------------------------------------------------------------------------

/// "Clones" by copying a fixture tree, "pulls" as a no-op, and mirrors by
/// replacing live with a copy of rendered.
pub struct FakeToolchain {
    pub fixture: PathBuf,
    pub log: StepLog,
    pub sync_outcome: ProcessOutcome,
    pub step_delay: Duration,
}

impl FakeToolchain {
    pub fn new(fixture: &Path, log: StepLog) -> Self {
        Self {
            fixture: fixture.to_path_buf(),
            log,
            sync_outcome: ProcessOutcome::Succeeded,
            step_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn clone_source(&self, site: &SiteRegistration, dirs: &SiteDirs) -> ProcessOutcome {
        record(&self.log, site.host_name.as_str(), "clone");
        copy_tree(&self.fixture, &dirs.source);
        tokio::time::sleep(self.step_delay).await;
        self.sync_outcome.clone()
    }

    async fn update_source(&self, site: &SiteRegistration, _dirs: &SiteDirs) -> ProcessOutcome {
        record(&self.log, site.host_name.as_str(), "pull");
        tokio::time::sleep(self.step_delay).await;
        self.sync_outcome.clone()
    }

    async fn mirror(&self, dirs: &SiteDirs) -> ProcessOutcome {
        record(&self.log, &host_of(&dirs.live), "mirror");
        let _ = fs::remove_dir_all(&dirs.live);
        copy_tree(&dirs.rendered, &dirs.live);
        tokio::time::sleep(self.step_delay).await;
        ProcessOutcome::Succeeded
    }
}

pub fn copy_tree(from: &Path, to: &Path) {
    fs::create_dir_all(to).expect("mkdir");
    let Ok(entries) = fs::read_dir(from) else { return };
    for entry in entries {
        let entry = entry.expect("entry");
        let target = to.join(entry.file_name());
        if entry.file_type().expect("type").is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).expect("copy");
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Copies the source tree into the output, writing the configured
/// `baseurl` into `baseurl.txt`. A `FAIL` file in the source makes the
/// render fail.
pub struct FakeGenerator {
    source: PathBuf,
    dest: PathBuf,
    baseurl: String,
    log: StepLog,
}

impl Generator for FakeGenerator {
    fn render(&mut self) -> Result<RenderSummary, RenderError> {
        record(&self.log, &host_of(&self.dest), "render");
        if self.source.join("FAIL").exists() {
            return Err(RenderError::MissingConfig {
                path: self.source.join("_config.yml"),
            });
        }
        let _ = fs::remove_dir_all(&self.dest);
        copy_tree(&self.source, &self.dest);
        fs::write(self.dest.join("baseurl.txt"), &self.baseurl).expect("write");
        Ok(RenderSummary { pages: 1, files: 1 })
    }

    fn reload(&mut self) -> Result<(), RenderError> {
        record(&self.log, &host_of(&self.dest), "reload");
        Ok(())
    }

    fn set_param(&mut self, key: &str, value: serde_json::Value) {
        if key == "baseurl" {
            self.baseurl = value.as_str().unwrap_or_default().to_string();
        }
    }
}

pub struct FakeFactory {
    pub log: StepLog,
}

impl GeneratorFactory for FakeFactory {
    fn open(&self, source: &Path, dest: &Path) -> Result<Box<dyn Generator>, RenderError> {
        record(&self.log, &host_of(dest), "open");
        Ok(Box::new(FakeGenerator {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
            baseurl: String::new(),
            log: self.log.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub puts: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeConnector {
    /// `(bucket, key)` pairs published so far.
    pub fn published(&self) -> Vec<(String, String)> {
        self.puts.lock().expect("lock").clone()
    }

    /// Poll until at least `count` objects are published or `limit` passes.
    pub async fn wait_for(&self, count: usize, limit: Duration) -> Vec<(String, String)> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let published = self.published();
            if published.len() >= count || tokio::time::Instant::now() >= deadline {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

struct FakeStore {
    bucket: String,
    puts: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put(&self, object: PutObject<'_>) -> Result<(), PublishError> {
        self.puts
            .lock()
            .expect("lock")
            .push((self.bucket.clone(), object.key.to_string()));
        Ok(())
    }
}

impl StoreConnector for FakeConnector {
    fn connect(&self, credentials: &PublishCredentials) -> Result<Arc<dyn ObjectStore>, PublishError> {
        Ok(Arc::new(FakeStore {
            bucket: credentials.bucket.clone(),
            puts: self.puts.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn test_config() -> Arc<Config> {
    let mut config = Config::default();
    config.store.key = Some("AKIDEXAMPLE".into());
    config.store.secret = Some("secret".into());
    Arc::new(config)
}

pub struct Harness {
    pub dispatcher: BuildDispatcher,
    pub connector: FakeConnector,
    pub log: StepLog,
}

pub fn harness(base: &Path, toolchain: FakeToolchain) -> Harness {
    let connector = FakeConnector::default();
    let log = toolchain.log.clone();
    let supervisor = SiteSupervisor::new(
        base.to_path_buf(),
        test_config(),
        Arc::new(connector.clone()),
    )
    .with_coalesce_window(Duration::from_millis(50));
    let dispatcher = BuildDispatcher::new(
        base.to_path_buf(),
        Arc::new(toolchain),
        Arc::new(FakeFactory { log: log.clone() }),
        supervisor,
    );
    Harness {
        dispatcher,
        connector,
        log,
    }
}

pub fn site(host: &str, first_deploy: bool) -> SiteRegistration {
    let mut site = SiteRegistration::new_pending(
        "Test Site",
        "owner@example.com",
        "/blog",
        HostName::from(host),
        "git",
        format!("git://example.com/{host}.git"),
    );
    site.needs_deployment = first_deploy;
    site
}

/// A small fixture source tree: two pages, a stylesheet, and a dotfile.
pub fn fixture(root: &Path) -> PathBuf {
    let dir = root.join("fixture");
    fs::create_dir_all(dir.join("css")).expect("mkdir");
    fs::write(dir.join("index.html"), "<h1>home</h1>").expect("write");
    fs::write(dir.join("about.html"), "<h1>about</h1>").expect("write");
    fs::write(dir.join("css/site.css"), "body{}").expect("write");
    fs::write(dir.join(".hidden"), "x").expect("write");
    dir
}

pub fn step_counts(log: &StepLog) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for (_, step) in log.lock().expect("lock").iter() {
        *counts.entry(*step).or_insert(0) += 1;
    }
    counts
}
