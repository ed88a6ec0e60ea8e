//! `quire serve`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use quire_daemon::{start_blocking, ServeOptions};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Global config file (YAML).
    #[arg(long, short = 'c', default_value = "quire.yaml")]
    pub config: PathBuf,

    /// Sites file; overrides `general.sites_file`.
    #[arg(long)]
    pub sites: Option<PathBuf>,

    /// Control API port; overrides `general.port`.
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Root of the sites/, _gen/ and _out/ trees; overrides `general.base_dir`.
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let options = ServeOptions {
            config_path: self.config,
            port: self.port,
            sites_file: self.sites,
            base_dir: self.base_dir,
            log_json: self.log_json,
        };
        start_blocking(&options).with_context(|| {
            format!("server exited with error (config {})", options.config_path.display())
        })
    }
}
