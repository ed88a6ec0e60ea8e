//! Tera-backed site generator.
//!
//! # Source layout
//!
//! | Source path                          | Treatment                         |
//! |--------------------------------------|-----------------------------------|
//! | `_config.yml`                        | site configuration (required)     |
//! | `_layouts/**`, `_includes/**`        | templates, never written out      |
//! | other `_*` entries                   | ignored                           |
//! | `*.html`, `*.htm`, `*.xml`, `*.rss`, `*.atom` | rendered through tera    |
//! | everything else                      | copied verbatim                   |
//!
//! Hidden and temp files are skipped everywhere.

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use tera::Tera;

use quire_core::is_hidden_or_temp;

use crate::context::TemplateContext;
use crate::error::{io_err, RenderError};
use crate::{Generator, GeneratorFactory, RenderSummary};

pub const CONFIG_FILE: &str = "_config.yml";
const TEMPLATE_DIRS: &[&str] = &["_layouts", "_includes"];
const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "xml", "rss", "atom"];

// ---------------------------------------------------------------------------
// Source classification helpers
// ---------------------------------------------------------------------------

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn is_markup(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MARKUP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn top_level(path: &Path) -> Option<String> {
    match path.components().next() {
        Some(Component::Normal(name)) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(path.as_path()).to_path_buf();
        if is_hidden_or_temp(&rel) {
            continue;
        }
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_files(root, &path, out)?;
        } else if meta.is_file() {
            out.push(rel);
        }
    }
    Ok(())
}

fn load_config(src: &Path) -> Result<Map<String, Value>, RenderError> {
    let path = src.join(CONFIG_FILE);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(RenderError::MissingConfig { path });
        }
        Err(err) => return Err(io_err(path, err)),
    };
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_yaml::from_str(&contents).map_err(|source| RenderError::Config { path, source })
}

// ---------------------------------------------------------------------------
// TeraSite
// ---------------------------------------------------------------------------

/// One site loaded into memory: configuration, compiled templates, and the
/// lists of pages to render and files to copy.
pub struct TeraSite {
    src: PathBuf,
    dest: PathBuf,
    config: Map<String, Value>,
    pages: Vec<PathBuf>,
    files: Vec<PathBuf>,
    tera: Tera,
}

impl std::fmt::Debug for TeraSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeraSite")
            .field("src", &self.src)
            .field("dest", &self.dest)
            .field("pages", &self.pages.len())
            .field("files", &self.files.len())
            .finish()
    }
}

impl TeraSite {
    /// Load `src` for rendering into `dest`.
    pub fn open(src: &Path, dest: &Path) -> Result<Self, RenderError> {
        let mut site = Self {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            config: Map::new(),
            pages: Vec::new(),
            files: Vec::new(),
            tera: Tera::default(),
        };
        site.read()?;
        Ok(site)
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn source(&self) -> &Path {
        &self.src
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    fn read(&mut self) -> Result<(), RenderError> {
        let config = load_config(&self.src)?;
        tracing::debug!(path = %self.src.join(CONFIG_FILE).display(), "loaded site config");

        let mut all = Vec::new();
        collect_files(&self.src, &self.src, &mut all)?;
        all.sort();

        let mut templates = Vec::new();
        let mut pages = Vec::new();
        let mut files = Vec::new();
        for rel in all {
            let top = top_level(&rel).unwrap_or_default();
            if TEMPLATE_DIRS.contains(&top.as_str()) {
                templates.push(rel);
            } else if top.starts_with('_') {
                continue;
            } else if is_markup(&rel) {
                pages.push(rel);
            } else {
                files.push(rel);
            }
        }

        let mut raw = Vec::with_capacity(templates.len() + pages.len());
        for rel in templates.iter().chain(pages.iter()) {
            let path = self.src.join(rel);
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            raw.push((normalize_template_name(rel), contents));
        }
        let mut tera = Tera::default();
        tera.add_raw_templates(raw)?;

        self.config = config;
        self.pages = pages;
        self.files = files;
        self.tera = tera;
        Ok(())
    }

    fn write_pages(&self) -> Result<usize, RenderError> {
        for rel in &self.pages {
            let ctx = TemplateContext::for_page(&self.config, rel).to_tera()?;
            let rendered = self.tera.render(&normalize_template_name(rel), &ctx)?;
            let to = self.dest.join(rel);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            std::fs::write(&to, rendered).map_err(|e| io_err(&to, e))?;
        }
        Ok(self.pages.len())
    }

    fn write_static(&self) -> Result<usize, RenderError> {
        for rel in &self.files {
            let from = self.src.join(rel);
            let to = self.dest.join(rel);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            std::fs::copy(&from, &to).map_err(|e| io_err(&from, e))?;
        }
        Ok(self.files.len())
    }
}

impl Generator for TeraSite {
    fn render(&mut self) -> Result<RenderSummary, RenderError> {
        match std::fs::remove_dir_all(&self.dest) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(&self.dest, err)),
        }
        std::fs::create_dir_all(&self.dest).map_err(|e| io_err(&self.dest, e))?;

        let summary = RenderSummary {
            pages: self.write_pages()?,
            files: self.write_static()?,
        };
        tracing::info!(
            src = %self.src.display(),
            pages = summary.pages,
            files = summary.files,
            "site generation completed",
        );
        Ok(summary)
    }

    /// Re-reads `_config.yml` as well, so parameters set with
    /// [`Generator::set_param`] must be set again afterwards.
    fn reload(&mut self) -> Result<(), RenderError> {
        self.read()
    }

    fn set_param(&mut self, key: &str, value: Value) {
        self.config.insert(key.to_string(), value);
    }
}

/// Opens [`TeraSite`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeraGeneratorFactory;

impl GeneratorFactory for TeraGeneratorFactory {
    fn open(&self, source: &Path, dest: &Path) -> Result<Box<dyn Generator>, RenderError> {
        Ok(Box::new(TeraSite::open(source, dest)?))
    }
}
