//! Per-site directory layout and path filters.
//!
//! ```text
//! <base_dir>/
//!   sites/<host>   checked-out source
//!   _gen/<host>    generator output (intermediate)
//!   _out/<host>    live mirror: watched and published
//! ```

use std::path::{Component, Path, PathBuf};

use crate::types::HostName;

pub const SOURCES_DIR: &str = "sites";
pub const RENDERED_DIR: &str = "_gen";
pub const LIVE_DIR: &str = "_out";

/// Per-site publish override, looked up at the root of the source checkout.
pub const PUBLISH_OVERRIDE_FILE: &str = "_publish.yml";

/// Never published, wherever it sits in the live tree root.
const EXCLUDED_FILE: &str = "README.md";

/// The source / rendered / live directory triple for one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDirs {
    pub source: PathBuf,
    pub rendered: PathBuf,
    pub live: PathBuf,
}

impl SiteDirs {
    /// Pure function of `(base_dir, host)`; no I/O.
    pub fn resolve(base_dir: &Path, host: &HostName) -> Self {
        Self {
            source: base_dir.join(SOURCES_DIR).join(host.as_str()),
            rendered: base_dir.join(RENDERED_DIR).join(host.as_str()),
            live: base_dir.join(LIVE_DIR).join(host.as_str()),
        }
    }

    pub fn publish_override(&self) -> PathBuf {
        self.source.join(PUBLISH_OVERRIDE_FILE)
    }
}

/// True for paths that must never be rendered or published: any dot-prefixed
/// component, editor backups ending in `~`, and the root `README.md`.
///
/// `rel` is relative to the tree being walked or watched.
pub fn is_hidden_or_temp(rel: &Path) -> bool {
    if rel == Path::new(EXCLUDED_FILE) {
        return true;
    }
    let hidden = rel.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    });
    hidden
        || rel
            .file_name()
            .map(|name| name.to_string_lossy().ends_with('~'))
            .unwrap_or(false)
}
