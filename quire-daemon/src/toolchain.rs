//! External tools the build pipeline shells out to: `git` for source sync
//! and `rsync` for the rendered-to-live mirror.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use quire_core::{SiteDirs, SiteRegistration};

use crate::process::{CommandSpec, ProcessOutcome, ProcessRunner};

#[async_trait]
pub trait Toolchain: Send + Sync {
    /// First deploy: check the source out from `CloneURL`.
    async fn clone_source(&self, site: &SiteRegistration, dirs: &SiteDirs) -> ProcessOutcome;

    /// Rebuild: pull the existing checkout.
    async fn update_source(&self, site: &SiteRegistration, dirs: &SiteDirs) -> ProcessOutcome;

    /// Make the live tree match the rendered tree: changed files are
    /// rewritten, files gone from rendered are deleted.
    async fn mirror(&self, dirs: &SiteDirs) -> ProcessOutcome;
}

/// `git` + `rsync`, each bounded by the same deadline.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    runner: ProcessRunner,
    deadline: Duration,
}

impl ExternalTools {
    pub fn new(runner: ProcessRunner, deadline: Duration) -> Self {
        Self { runner, deadline }
    }
}

/// The clone URL arrives from the control API; `--` keeps it from being
/// read as a git option.
pub fn clone_command(site: &SiteRegistration, dirs: &SiteDirs) -> CommandSpec {
    CommandSpec::new("git")
        .arg("clone")
        .arg("--")
        .arg(&site.clone_url)
        .arg(&dirs.source)
}

pub fn pull_command(dirs: &SiteDirs) -> CommandSpec {
    CommandSpec::new("git").arg("-C").arg(&dirs.source).arg("pull")
}

/// Contents of rendered into live; the trailing slash on the source
/// matters to rsync.
pub fn mirror_command(dirs: &SiteDirs) -> CommandSpec {
    let mut from = OsString::from(dirs.rendered.as_os_str());
    from.push("/");
    CommandSpec::new("rsync")
        .arg("--delete")
        .arg("--size-only")
        .arg("--recursive")
        .arg(from)
        .arg(&dirs.live)
}

fn ensure_parent(path: &Path) -> Option<ProcessOutcome> {
    let parent = path.parent()?;
    match std::fs::create_dir_all(parent) {
        Ok(()) => None,
        Err(err) => {
            tracing::error!(path = %parent.display(), error = %err, "cannot create directory");
            Some(ProcessOutcome::Error {
                reason: err.to_string(),
            })
        }
    }
}

#[async_trait]
impl Toolchain for ExternalTools {
    async fn clone_source(&self, site: &SiteRegistration, dirs: &SiteDirs) -> ProcessOutcome {
        if let Some(failed) = ensure_parent(&dirs.source) {
            return failed;
        }
        tracing::info!(host = %site.host_name, url = %site.clone_url, kind = %site.clone_url_type, "cloning source");
        self.runner.run(&clone_command(site, dirs), self.deadline).await
    }

    async fn update_source(&self, site: &SiteRegistration, dirs: &SiteDirs) -> ProcessOutcome {
        tracing::info!(host = %site.host_name, "pulling source");
        self.runner.run(&pull_command(dirs), self.deadline).await
    }

    async fn mirror(&self, dirs: &SiteDirs) -> ProcessOutcome {
        if let Some(failed) = ensure_parent(&dirs.live) {
            return failed;
        }
        self.runner.run(&mirror_command(dirs), self.deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::HostName;
    use std::path::PathBuf;

    fn dirs() -> SiteDirs {
        SiteDirs::resolve(Path::new("/srv/quire"), &HostName::from("blog.example.com"))
    }

    #[test]
    fn clone_targets_the_source_dir() {
        let site = SiteRegistration::new_pending(
            "n",
            "e",
            "",
            HostName::from("blog.example.com"),
            "git",
            "git://example.com/blog.git",
        );
        let spec = clone_command(&site, &dirs());
        assert_eq!(
            spec.display(),
            "git clone -- git://example.com/blog.git /srv/quire/sites/blog.example.com"
        );
    }

    #[test]
    fn clone_url_cannot_pass_as_an_option() {
        let site = SiteRegistration::new_pending(
            "n",
            "e",
            "",
            HostName::from("blog.example.com"),
            "git",
            "--upload-pack=touch /tmp/pwned",
        );
        let spec = clone_command(&site, &dirs());
        let separator = spec.args.iter().position(|a| a == "--").expect("separator");
        let url = spec
            .args
            .iter()
            .position(|a| a == "--upload-pack=touch /tmp/pwned")
            .expect("url");
        assert_eq!(separator, 1);
        assert!(separator < url);
    }

    #[test]
    fn pull_runs_inside_the_checkout() {
        assert_eq!(
            pull_command(&dirs()).display(),
            "git -C /srv/quire/sites/blog.example.com pull"
        );
    }

    #[test]
    fn mirror_copies_contents_not_the_directory() {
        let spec = mirror_command(&dirs());
        assert_eq!(spec.args.last(), Some(&OsString::from("/srv/quire/_out/blog.example.com")));
        assert!(spec.args.contains(&OsString::from("/srv/quire/_gen/blog.example.com/")));
        assert!(spec.args.contains(&OsString::from("--delete")));
        assert_eq!(spec.cwd, None::<PathBuf>);
    }
}
