use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use quire_core::{Config, SiteRegistry};
use quire_generator::TeraGeneratorFactory;
use quire_publish::S3Connector;

use crate::api::{router, AppState};
use crate::dispatcher::{build_queue, BuildDispatcher};
use crate::error::{io_err, DaemonError};
use crate::process::ProcessRunner;
use crate::supervisor::SiteSupervisor;
use crate::toolchain::ExternalTools;

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub config_path: PathBuf,
    pub port: Option<u16>,
    pub sites_file: Option<PathBuf>,
    pub base_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl ServeOptions {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.general.port = port;
        }
        if let Some(sites_file) = &self.sites_file {
            config.general.sites_file = sites_file.clone();
        }
        if let Some(base_dir) = &self.base_dir {
            config.general.base_dir = base_dir.clone();
        }
        config.general.log_json |= self.log_json;
    }
}

/// Load config, start logging, and block the current thread on the server.
pub fn start_blocking(options: &ServeOptions) -> Result<(), DaemonError> {
    let mut config = Config::load_at(&options.config_path)?;
    options.apply(&mut config);
    init_tracing(config.general.log_json);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the server until ctrl-c.
///
/// Startup order: load the registry, attach a watcher / upload pair for
/// every known site, queue a rebuild of each, then accept HTTP requests.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    let base_dir = absolute(&config.general.base_dir)?;
    let registry = SiteRegistry::load(config.general.sites_file.clone())?;
    let sites = registry.all().await;
    tracing::info!(
        sites_file = %config.general.sites_file.display(),
        base_dir = %base_dir.display(),
        sites = sites.len(),
        "registry loaded"
    );

    let config = Arc::new(config);
    let connector = Arc::new(S3Connector::from_config(&config.store));
    let supervisor = SiteSupervisor::new(base_dir.clone(), config.clone(), connector);
    let toolchain = Arc::new(ExternalTools::new(
        ProcessRunner::new(config.general.verbose),
        config.process_timeout(),
    ));
    let mut dispatcher = BuildDispatcher::new(
        base_dir,
        toolchain,
        Arc::new(TeraGeneratorFactory),
        supervisor,
    );
    for site in &sites {
        if let Err(err) = dispatcher.supervisor_mut().attach(site) {
            tracing::error!(host = %site.host_name, error = %err, "cannot attach site at startup");
        }
    }

    let (queue, jobs) = build_queue();
    let dispatcher_handle = tokio::spawn(dispatcher.run(jobs));

    let startup_queue = queue.clone();
    tokio::spawn(async move {
        for site in sites {
            let host = site.host_name.clone();
            if let Err(err) = startup_queue.enqueue(site).await {
                tracing::error!(host = %host, error = %err, "cannot queue startup rebuild");
                break;
            }
        }
    });

    let app = router(AppState { registry, queue }).layer(TraceLayer::new_for_http());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.general.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| io_err(format!("listen {addr}"), e))?;
    tracing::info!(%addr, "control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| io_err(format!("serve {addr}"), e))?;

    dispatcher_handle.abort();
    tracing::info!("server stopped");
    Ok(())
}

pub(crate) async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down"),
        Err(err) => {
            tracing::error!(error = %err, "ctrl-c handler failed; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn absolute(dir: &Path) -> Result<PathBuf, DaemonError> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| io_err(".", e))?;
    if dir.as_os_str().is_empty() {
        Ok(cwd)
    } else {
        Ok(cwd.join(dir))
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt().json().with_env_filter(filter).with_target(false).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}
