//! `quire site add|update|list`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use quire_core::registry::load_sites_at;
use quire_daemon::ApiResponse;

const DEFAULT_SERVER: &str = "http://127.0.0.1:9999";

#[derive(Subcommand, Debug)]
pub enum SiteCommand {
    /// Register a site on a running server and queue its first deploy.
    Add(AddArgs),

    /// Queue a rebuild of a registered site.
    Update(UpdateArgs),

    /// Print the sites file as a table.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub hostname: String,

    #[arg(long)]
    pub clone_url: String,

    #[arg(long, default_value = "git")]
    pub clone_type: String,

    #[arg(long, default_value = "")]
    pub name: String,

    #[arg(long, default_value = "")]
    pub email: String,

    /// Root path injected into the generator's `baseurl`.
    #[arg(long, default_value = "")]
    pub base_url: String,

    #[arg(long, default_value = DEFAULT_SERVER)]
    pub server: String,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub hostname: String,

    #[arg(long, default_value = DEFAULT_SERVER)]
    pub server: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long, default_value = "sites.json")]
    pub sites: PathBuf,
}

pub fn run(command: SiteCommand) -> Result<()> {
    match command {
        SiteCommand::Add(args) => {
            let response = call(
                &args.server,
                "add",
                &[
                    ("name", args.name.as_str()),
                    ("email", args.email.as_str()),
                    ("baseurl", args.base_url.as_str()),
                    ("hostname", args.hostname.as_str()),
                    ("clonetype", args.clone_type.as_str()),
                    ("cloneurl", args.clone_url.as_str()),
                ],
            )?;
            report(&response)?;
            println!("registered {} (API secret {})", args.hostname, response.message);
            Ok(())
        }
        SiteCommand::Update(args) => {
            let response = call(&args.server, "update", &[("hostname", args.hostname.as_str())])?;
            report(&response)?;
            println!("{}: {}", args.hostname, response.message);
            Ok(())
        }
        SiteCommand::List(args) => list(&args.sites),
    }
}

fn call(server: &str, route: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
    let url = format!("{}/{route}", server.trim_end_matches('/'));
    let mut request = ureq::post(&url);
    for (key, value) in params {
        request = request.query(key, value);
    }
    let response = match request.call() {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => return Err(err).with_context(|| format!("cannot reach {url}")),
    };
    response
        .into_json::<ApiResponse>()
        .with_context(|| format!("unexpected reply from {url}"))
}

fn report(response: &ApiResponse) -> Result<()> {
    if response.code != 200 {
        bail!("server replied {}: {}", response.code, response.message);
    }
    Ok(())
}

#[derive(Tabled)]
struct SiteRow {
    #[tabled(rename = "host")]
    host: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "base url")]
    base_url: String,
    #[tabled(rename = "clone url")]
    clone_url: String,
    #[tabled(rename = "pending deploy")]
    pending: bool,
}

fn list(sites_file: &Path) -> Result<()> {
    let sites = load_sites_at(sites_file)
        .with_context(|| format!("failed to read sites file {}", sites_file.display()))?;
    if sites.is_empty() {
        println!("No sites registered.");
        return Ok(());
    }
    let rows: Vec<SiteRow> = sites
        .into_iter()
        .map(|site| SiteRow {
            host: site.host_name.0,
            name: site.name,
            base_url: site.base_url,
            clone_url: site.clone_url,
            pending: site.needs_deployment,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
