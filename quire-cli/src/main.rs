//! Quire: static-site build-and-publish server.
//!
//! # Usage
//!
//! ```text
//! quire serve [--config quire.yaml] [--sites sites.json] [--port 9999] [--log-json]
//! quire preview [SRC] [--out DIR] [--port 4000]
//! quire site add --hostname <host> --clone-url <url> [--server URL]
//! quire site update <host> [--server URL]
//! quire site list [--sites sites.json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{preview::PreviewArgs, serve::ServeArgs, site::SiteCommand};

#[derive(Parser, Debug)]
#[command(
    name = "quire",
    version,
    about = "Build static sites from git and publish them to an object store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the build server and its HTTP control API.
    Serve(ServeArgs),

    /// Render one site locally, serve it, and re-render on change.
    Preview(PreviewArgs),

    /// Register, rebuild, or list sites.
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Preview(args) => args.run(),
        Commands::Site { command } => commands::site::run(command),
    }
}
