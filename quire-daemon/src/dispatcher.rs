//! Build queue and the single dispatcher that drains it.
//!
//! Every build, for every site, runs on the dispatcher task one after
//! another: sync, render, mirror, then (first deploy only) seed the upload
//! queue and attach the site's watcher. [`BuildQueue::enqueue`] returns once
//! the dispatcher has taken the job, not when the job finishes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use quire_core::{HostName, SiteDirs, SiteRegistration};
use quire_generator::{Generator, GeneratorFactory, RenderError, RenderSummary};
use quire_publish::seed_tasks;

use crate::error::DaemonError;
use crate::process::ProcessOutcome;
use crate::supervisor::SiteSupervisor;
use crate::toolchain::Toolchain;

/// A registration snapshot taken at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    pub site: SiteRegistration,
}

/// Where a job ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Render failed; rendered and live trees were left as they were.
    Aborted,
    /// Mirrored, but the site's watcher could not be attached.
    Unattached,
    /// Mirrored and the site's watcher / upload pair is running.
    Attached,
}

/// What one job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub host: HostName,
    pub first_deploy: bool,
    pub sync: ProcessOutcome,
    pub render: Result<RenderSummary, String>,
    pub mirror: Option<ProcessOutcome>,
    pub seeded: usize,
    pub state: JobState,
}

/// A job in flight between an enqueuer and the dispatcher.
#[derive(Debug)]
pub struct QueuedJob {
    job: BuildJob,
    accepted: oneshot::Sender<()>,
    done: Option<oneshot::Sender<JobReport>>,
}

impl QueuedJob {
    pub fn job(&self) -> &BuildJob {
        &self.job
    }

    /// Release the enqueuer and hand over the job plus its completion slot.
    pub fn accept(self) -> (BuildJob, Option<oneshot::Sender<JobReport>>) {
        let _ = self.accepted.send(());
        (self.job, self.done)
    }
}

#[derive(Debug, Clone)]
pub struct BuildQueue {
    tx: mpsc::Sender<QueuedJob>,
}

/// Queue handle plus the receiving end for [`BuildDispatcher::run`].
pub fn build_queue() -> (BuildQueue, mpsc::Receiver<QueuedJob>) {
    let (tx, rx) = mpsc::channel(1);
    (BuildQueue { tx }, rx)
}

impl BuildQueue {
    /// Wait until the dispatcher has taken the job.
    pub async fn enqueue(&self, site: SiteRegistration) -> Result<(), DaemonError> {
        self.push(site, None).await
    }

    /// Like [`enqueue`](Self::enqueue), plus a receiver that resolves when
    /// the job finishes.
    pub async fn submit(
        &self,
        site: SiteRegistration,
    ) -> Result<oneshot::Receiver<JobReport>, DaemonError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.push(site, Some(done_tx)).await?;
        Ok(done_rx)
    }

    async fn push(
        &self,
        site: SiteRegistration,
        done: Option<oneshot::Sender<JobReport>>,
    ) -> Result<(), DaemonError> {
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let queued = QueuedJob {
            job: BuildJob { site },
            accepted: accepted_tx,
            done,
        };
        self.tx
            .send(queued)
            .await
            .map_err(|_| DaemonError::ChannelClosed("build queue"))?;
        accepted_rx
            .await
            .map_err(|_| DaemonError::ChannelClosed("build dispatcher"))
    }
}

pub struct BuildDispatcher {
    base_dir: PathBuf,
    toolchain: Arc<dyn Toolchain>,
    generators: Arc<dyn GeneratorFactory>,
    open: HashMap<HostName, Box<dyn Generator>>,
    supervisor: SiteSupervisor,
}

impl BuildDispatcher {
    pub fn new(
        base_dir: PathBuf,
        toolchain: Arc<dyn Toolchain>,
        generators: Arc<dyn GeneratorFactory>,
        supervisor: SiteSupervisor,
    ) -> Self {
        Self {
            base_dir,
            toolchain,
            generators,
            open: HashMap::new(),
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &SiteSupervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut SiteSupervisor {
        &mut self.supervisor
    }

    /// Run jobs one at a time until every [`BuildQueue`] handle is dropped.
    pub async fn run(mut self, mut queue: mpsc::Receiver<QueuedJob>) {
        while let Some(queued) = queue.recv().await {
            let (job, done) = queued.accept();
            let report = self.execute(job).await;
            if let Some(done) = done {
                let _ = done.send(report);
            }
        }
        self.supervisor.shutdown();
        tracing::info!("build dispatcher stopped");
    }

    pub async fn execute(&mut self, job: BuildJob) -> JobReport {
        let site = job.site;
        let host = site.host_name.clone();
        let first_deploy = site.needs_deployment;
        let dirs = SiteDirs::resolve(&self.base_dir, &host);
        tracing::info!(host = %host, site = %site.label(), first_deploy, "build started");

        let sync = if first_deploy {
            self.toolchain.clone_source(&site, &dirs).await
        } else {
            self.toolchain.update_source(&site, &dirs).await
        };
        if !sync.is_success() {
            tracing::warn!(host = %host, outcome = ?sync, "source sync did not succeed; rendering what is on disk");
        }

        let mut report = JobReport {
            host: host.clone(),
            first_deploy,
            sync,
            render: Err(String::new()),
            mirror: None,
            seeded: 0,
            state: JobState::Unattached,
        };

        match self.render(&site, &dirs).await {
            Ok(summary) => {
                tracing::info!(host = %host, pages = summary.pages, files = summary.files, "render finished");
                report.render = Ok(summary);
            }
            Err(err) => {
                tracing::error!(host = %host, error = %err, "render failed; build aborted");
                report.render = Err(err.to_string());
                report.state = JobState::Aborted;
                return report;
            }
        }

        let mirror = self.toolchain.mirror(&dirs).await;
        if !mirror.is_success() {
            tracing::warn!(host = %host, outcome = ?mirror, "mirror did not succeed; live tree may be partial");
        }
        report.mirror = Some(mirror);

        if first_deploy {
            match self.seed(&site, &dirs).await {
                Ok(count) => report.seeded = count,
                Err(err) => {
                    tracing::error!(host = %host, error = %err, "seeding upload queue failed");
                }
            }
        }

        match self.supervisor.attach(&site) {
            Ok(()) => report.state = JobState::Attached,
            Err(err) => {
                tracing::error!(host = %host, error = %err, "site not attached; changes will not publish");
            }
        }
        tracing::info!(host = %host, seeded = report.seeded, "build finished");
        report
    }

    /// Reload the site's cached generator, or open one, then render on the
    /// blocking pool.
    async fn render(
        &mut self,
        site: &SiteRegistration,
        dirs: &SiteDirs,
    ) -> Result<RenderSummary, DaemonError> {
        let existing = self.open.remove(&site.host_name);
        let factory = self.generators.clone();
        let source = dirs.source.clone();
        let rendered = dirs.rendered.clone();
        let base_url = site.base_url.clone();

        let (generator, summary) = tokio::task::spawn_blocking(
            move || -> Result<(Box<dyn Generator>, RenderSummary), RenderError> {
                let mut generator = match existing {
                    Some(mut generator) => {
                        generator.reload()?;
                        generator
                    }
                    None => factory.open(&source, &rendered)?,
                };
                if !base_url.is_empty() {
                    generator.set_param("baseurl", json!(base_url));
                }
                let summary = generator.render()?;
                Ok((generator, summary))
            },
        )
        .await
        .map_err(|err| DaemonError::Join(format!("render task: {err}")))??;

        self.open.insert(site.host_name.clone(), generator);
        Ok(summary)
    }

    /// Queue every file of the freshly mirrored live tree.
    async fn seed(&mut self, site: &SiteRegistration, dirs: &SiteDirs) -> Result<usize, DaemonError> {
        let (uploads, credentials) = self.supervisor.uploader(site)?;
        let live = dirs.live.clone();
        let tasks = tokio::task::spawn_blocking(move || seed_tasks(&live, &credentials))
            .await
            .map_err(|err| DaemonError::Join(format!("seed walk: {err}")))??;
        let count = tasks.len();
        tracing::info!(host = %site.host_name, files = count, "seeding upload queue");
        for task in tasks {
            uploads
                .send(task)
                .await
                .map_err(|_| DaemonError::ChannelClosed("upload queue"))?;
        }
        Ok(count)
    }
}
