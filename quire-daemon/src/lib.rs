//! Quire daemon: build dispatch, change watching, incremental publishing,
//! and the HTTP control API.

pub mod api;
pub mod dispatcher;
mod error;
pub mod preview;
pub mod process;
mod runtime;
pub mod supervisor;
pub mod toolchain;
pub mod watcher;

pub use api::{router, ApiResponse, AppState};
pub use dispatcher::{build_queue, BuildDispatcher, BuildJob, BuildQueue, JobReport, JobState, QueuedJob};
pub use error::DaemonError;
pub use preview::run_preview;
pub use process::{CommandSpec, ProcessOutcome, ProcessRunner};
pub use runtime::{init_tracing, run, start_blocking, ServeOptions};
pub use supervisor::SiteSupervisor;
pub use toolchain::{ExternalTools, Toolchain};
pub use watcher::ChangeWatcher;
