//! # quire-generator
//!
//! The site-generator contract the build pipeline renders through, plus a
//! tera-backed implementation ([`TeraSite`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use quire_generator::{GeneratorFactory, TeraGeneratorFactory};
//!
//! fn build(src: &Path, dest: &Path) {
//!     if let Ok(mut site) = TeraGeneratorFactory.open(src, dest) {
//!         site.set_param("baseurl", serde_json::json!("/blog"));
//!         let _ = site.render();
//!     }
//! }
//! ```

use std::path::Path;

pub mod context;
pub mod engine;
pub mod error;

pub use context::TemplateContext;
pub use engine::{TeraGeneratorFactory, TeraSite};
pub use error::RenderError;

/// Counts reported by a successful render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub pages: usize,
    pub files: usize,
}

/// A site generator bound to one (source, output) directory pair.
pub trait Generator: Send {
    /// Clear the output directory and write the whole site into it.
    fn render(&mut self) -> Result<RenderSummary, RenderError>;

    /// Re-read configuration and the source file set.
    fn reload(&mut self) -> Result<(), RenderError>;

    /// Override one configuration parameter for subsequent renders.
    fn set_param(&mut self, key: &str, value: serde_json::Value);
}

/// Constructs generators; the build pipeline owns one per site.
pub trait GeneratorFactory: Send + Sync {
    fn open(&self, source: &Path, dest: &Path) -> Result<Box<dyn Generator>, RenderError>;
}
