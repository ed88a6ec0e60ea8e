//! Single-site preview: render once, serve the output over HTTP, and
//! re-render whenever the source tree changes.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use quire_core::is_hidden_or_temp;
use quire_generator::{Generator, RenderSummary, TeraSite};

use crate::error::{io_err, DaemonError};
use crate::runtime::shutdown_signal;

/// Quiet time after a source change before re-rendering.
const SETTLE: Duration = Duration::from_millis(100);

pub async fn run_preview(source: &Path, output: &Path, port: u16) -> Result<(), DaemonError> {
    let source = fs::canonicalize(source).map_err(|e| io_err(source, e))?;
    fs::create_dir_all(output).map_err(|e| io_err(output, e))?;
    let output = fs::canonicalize(output).map_err(|e| io_err(output, e))?;

    let site = Arc::new(Mutex::new(TeraSite::open(&source, &output)?));
    let summary = rebuild(site.clone(), false).await?;
    tracing::info!(source = %source.display(), output = %output.display(), pages = summary.pages, files = summary.files, "site rendered");

    let (event_tx, mut events) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&source, RecursiveMode::Recursive)?;

    let app = Router::new()
        .fallback_service(ServeDir::new(&output))
        .layer(TraceLayer::new_for_http());
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| io_err(format!("listen {addr}"), e))?;
    tracing::info!("preview at http://{addr}/");
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let watch_loop = async {
        while let Some(event) = events.recv().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "watcher event error");
                    continue;
                }
            };
            if !triggers_render(&event, &source, &output) {
                continue;
            }
            // Let editors finish writing, then fold the burst into one render.
            tokio::time::sleep(SETTLE).await;
            while events.try_recv().is_ok() {}
            match rebuild(site.clone(), true).await {
                Ok(summary) => {
                    tracing::info!(pages = summary.pages, files = summary.files, "site re-rendered");
                }
                Err(err) => tracing::error!(error = %err, "re-render failed"),
            }
        }
    };

    tokio::select! {
        served = server => {
            served
                .map_err(|err| DaemonError::Join(format!("preview server: {err}")))?
                .map_err(|e| io_err(format!("serve {addr}"), e))?;
        }
        _ = watch_loop => {
            tracing::warn!("source watcher closed");
        }
    }
    drop(watcher);
    Ok(())
}

async fn rebuild(site: Arc<Mutex<TeraSite>>, reload: bool) -> Result<RenderSummary, DaemonError> {
    tokio::task::spawn_blocking(move || -> Result<RenderSummary, DaemonError> {
        let mut site = site
            .lock()
            .map_err(|_| DaemonError::Join("preview site lock poisoned".to_string()))?;
        if reload {
            site.reload()?;
        }
        Ok(site.render()?)
    })
    .await
    .map_err(|err| DaemonError::Join(format!("render task: {err}")))?
}

/// Any create, modify, or remove of a visible source file outside the
/// output directory.
fn triggers_render(event: &Event, source: &Path, output: &Path) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event.paths.iter().any(|path| {
        if path.starts_with(output) {
            return false;
        }
        match path.strip_prefix(source) {
            Ok(rel) => !rel.as_os_str().is_empty() && !is_hidden_or_temp(rel),
            Err(_) => false,
        }
    })
}
