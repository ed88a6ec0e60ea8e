//! `quire preview`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use quire_daemon::{init_tracing, run_preview};

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Site source directory.
    #[arg(default_value = ".")]
    pub source: PathBuf,

    /// Output directory. Defaults to `<SOURCE>/_site`.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    #[arg(long, short = 'p', default_value_t = 4000)]
    pub port: u16,
}

impl PreviewArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(false);
        let out = self.out.unwrap_or_else(|| self.source.join("_site"));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        runtime
            .block_on(run_preview(&self.source, &out, self.port))
            .with_context(|| format!("preview of {} failed", self.source.display()))
    }
}
