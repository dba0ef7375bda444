use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{PackageSolver, PkgSolverError, check_missing_packages, partition_pinned};
use crate::builddef::VersionMap;
use crate::statesolver::StateSolver;

/// Resolves package versions with `apt-cache madison` in debian-based images.
pub struct AptSolver {
  solver: Arc<dyn StateSolver>,
}

impl AptSolver {
  pub fn new(solver: Arc<dyn StateSolver>) -> Self {
    Self { solver }
  }
}

#[async_trait]
impl PackageSolver for AptSolver {
  async fn resolve_versions(
    &self,
    ctx: &CancellationToken,
    image_ref: &str,
    pkgs: &VersionMap,
  ) -> Result<VersionMap, PkgSolverError> {
    let (mut resolved, to_resolve) = partition_pinned(pkgs);
    if to_resolve.is_empty() {
      return Ok(resolved);
    }

    debug!(image = %image_ref, packages = ?to_resolve, "resolving apt packages");

    let cmds = vec![
      "apt-get update 1>/dev/null 2>&1".to_string(),
      format!("apt-cache madison {}", to_resolve.join(" ")),
    ];
    let out = self
      .solver
      .exec_image(ctx, image_ref, &cmds)
      .await
      .map_err(|source| PkgSolverError::Exec {
        image: image_ref.to_string(),
        source,
      })?;

    parse_madison(&out, &mut resolved);
    check_missing_packages(pkgs, &resolved)?;

    Ok(resolved)
  }
}

/// Parses `apt-cache madison` output. Lines look like
/// `curl | 7.64.0-4+deb10u1 | http://deb.debian.org/debian buster/main amd64 Packages`.
///
/// madison lists the best candidate first, so only the first version of each
/// package is kept.
fn parse_madison(out: &str, resolved: &mut VersionMap) {
  for line in out.lines() {
    let mut parts = line.splitn(3, " | ");
    let (Some(name), Some(version), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
      continue;
    };

    resolved.add(name.trim(), version.trim());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::MockSolver;

  const IMAGE: &str = "docker.io/library/debian:buster";
  const MADISON_CURL: &str = "\
      curl | 7.64.0-4+deb10u1 | http://deb.debian.org/debian buster/main amd64 Packages
      curl | 7.64.0-4 | http://deb.debian.org/debian buster/main amd64 Packages
";

  fn update_cmds(pkgs: &str) -> [String; 2] {
    [
      "apt-get update 1>/dev/null 2>&1".to_string(),
      format!("apt-cache madison {}", pkgs),
    ]
  }

  #[tokio::test]
  async fn resolves_latest_candidate() {
    let cmds = update_cmds("curl");
    let solver = MockSolver::default().with_exec(IMAGE, &[&cmds[0], &cmds[1]], MADISON_CURL);
    let apt = AptSolver::new(Arc::new(solver));

    let pkgs: VersionMap = [("curl", "*")].into_iter().collect();
    let resolved = apt
      .resolve_versions(&CancellationToken::new(), IMAGE, &pkgs)
      .await
      .unwrap();

    assert_eq!(resolved, [("curl", "7.64.0-4+deb10u1")].into_iter().collect());
  }

  #[tokio::test]
  async fn pinned_packages_skip_the_image() {
    let solver = Arc::new(MockSolver::default());
    let apt = AptSolver::new(solver.clone());

    let pkgs: VersionMap = [("curl", "7.64.0-4")].into_iter().collect();
    let resolved = apt
      .resolve_versions(&CancellationToken::new(), IMAGE, &pkgs)
      .await
      .unwrap();

    assert_eq!(resolved, pkgs);
    assert!(solver.exec_calls().is_empty());
  }

  #[tokio::test]
  async fn unknown_package_is_reported() {
    let cmds = update_cmds("curl yolo");
    let solver = MockSolver::default().with_exec(IMAGE, &[&cmds[0], &cmds[1]], MADISON_CURL);
    let apt = AptSolver::new(Arc::new(solver));

    let pkgs: VersionMap = [("curl", ""), ("yolo", "*")].into_iter().collect();
    let err = apt
      .resolve_versions(&CancellationToken::new(), IMAGE, &pkgs)
      .await
      .unwrap_err();

    assert_eq!(err.to_string(), "packages yolo not found");
  }

  #[tokio::test]
  async fn exec_failure_is_propagated() {
    let apt = AptSolver::new(Arc::new(MockSolver::default()));

    let pkgs: VersionMap = [("curl", "*")].into_iter().collect();
    let err = apt
      .resolve_versions(&CancellationToken::new(), IMAGE, &pkgs)
      .await
      .unwrap_err();

    assert!(matches!(err, PkgSolverError::Exec { .. }));
  }

  #[test]
  fn madison_parser_ignores_malformed_lines() {
    let mut resolved = VersionMap::new();
    parse_madison("garbage\n   git | 1:2.20.1-2+deb10u3 | http://deb.debian.org/debian\n", &mut resolved);

    assert_eq!(resolved, [("git", "1:2.20.1-2+deb10u3")].into_iter().collect());
  }
}
