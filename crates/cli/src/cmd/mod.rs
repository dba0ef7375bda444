mod debug_config;
mod plan;
mod update;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use zbuild_lib::builddef::BuildOpts;
use zbuild_lib::builder::Builder;
use zbuild_lib::pkgsolver::{DpkgRepository, DpkgSolver, PackageSolvers};
use zbuild_lib::platform::arch::Arch;
use zbuild_lib::platform::paths::cache_dir;
use zbuild_lib::registry::KindRegistry;
use zbuild_lib::statesolver::{DockerSolver, StateSolver};

pub use debug_config::cmd_debug_config;
pub use plan::cmd_plan;
pub use update::{UpdateFlags, cmd_update};

/// Flags shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
  pub file: String,
  pub context: String,
  pub docker_bin: String,
}

impl GlobalOpts {
  fn build_opts(&self, stage: &str) -> Result<BuildOpts> {
    BuildOpts::new(&self.file, &self.context, stage).with_context(|| format!("Invalid build context: {}", self.context))
  }

  /// Local contexts are resolved from the current directory.
  fn state_solver(&self) -> Arc<dyn StateSolver> {
    Arc::new(DockerSolver::new(".").with_docker_bin(&self.docker_bin))
  }
}

pub fn parse_arch(name: &str) -> Result<Arch, String> {
  Arch::from_dpkg(name).ok_or_else(|| format!("unsupported architecture {:?} (expected amd64 or arm64)", name))
}

fn builder(pkg_solvers: PackageSolvers) -> Builder {
  Builder::new(KindRegistry::default_registry(), pkg_solvers)
}

/// Parses `SUITE=URL` repository specs.
fn parse_dpkg_repos(specs: &[String]) -> Result<Vec<DpkgRepository>> {
  specs
    .iter()
    .map(|spec| match spec.split_once('=') {
      Some((suite, url)) if !suite.is_empty() && !url.is_empty() => Ok(DpkgRepository::new(url, suite)),
      _ => bail!("Invalid repository {:?}: expected SUITE=URL", spec),
    })
    .collect()
}

fn package_solvers(dpkg_repos: &[String], arch: Arch, index_ttl: Duration) -> Result<PackageSolvers> {
  let repos = parse_dpkg_repos(dpkg_repos)?;
  if repos.is_empty() {
    return Ok(PackageSolvers::default());
  }

  let dpkg = DpkgSolver::new(repos, arch.dpkg_name(), cache_dir()).with_ttl(index_ttl);
  Ok(PackageSolvers::default().with_dpkg(dpkg))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_dpkg_repos() {
    let repos = parse_dpkg_repos(&[
      "buster=http://deb.debian.org/debian/".to_string(),
      "buster-updates=http://deb.debian.org/debian".to_string(),
    ])
    .unwrap();

    assert_eq!(
      repos,
      vec![
        DpkgRepository::new("http://deb.debian.org/debian", "buster"),
        DpkgRepository::new("http://deb.debian.org/debian", "buster-updates"),
      ]
    );
  }

  #[test]
  fn parses_dpkg_arch() {
    assert_eq!(parse_arch("arm64"), Ok(Arch::Arm64));
    assert!(parse_arch("x86_64").unwrap_err().contains("expected amd64 or arm64"));
  }

  #[test]
  fn rejects_invalid_dpkg_repo() {
    let err = parse_dpkg_repos(&["http://deb.debian.org/debian".to_string()]).unwrap_err();
    assert!(err.to_string().contains("expected SUITE=URL"));
  }
}
