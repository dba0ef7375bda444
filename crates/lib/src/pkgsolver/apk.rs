use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{PackageSolver, PkgSolverError, check_missing_packages, partition_pinned};
use crate::builddef::VersionMap;
use crate::statesolver::{SolverError, StateSolver};

/// Resolves package versions with `apk info` in alpine-based images.
pub struct ApkSolver {
  solver: Arc<dyn StateSolver>,
}

impl ApkSolver {
  pub fn new(solver: Arc<dyn StateSolver>) -> Self {
    Self { solver }
  }
}

#[async_trait]
impl PackageSolver for ApkSolver {
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

    debug!(image = %image_ref, packages = ?to_resolve, "resolving apk packages");

    let cmds = vec![format!("apk --no-cache info --description {}", to_resolve.join(" "))];
    let out = match self.solver.exec_image(ctx, image_ref, &cmds).await {
      Ok(out) => out,
      // apk exits with code 1 when one of the packages is unknown, without
      // any error message. What was found is still on stdout.
      Err(SolverError::ExitStatus {
        code: Some(1), stdout, ..
      }) => stdout,
      Err(source) => {
        return Err(PkgSolverError::Exec {
          image: image_ref.to_string(),
          source,
        });
      }
    };

    parse_apk_info(&out, &to_resolve, &mut resolved)?;
    check_missing_packages(pkgs, &resolved)?;

    Ok(resolved)
  }
}

/// Extracts versions from `apk info --description` output, where each
/// package shows up as `<name>-<version> description:`.
fn parse_apk_info(out: &str, names: &[String], resolved: &mut VersionMap) -> Result<(), PkgSolverError> {
  let mut names: Vec<&str> = names.iter().map(String::as_str).collect();
  // Longer names first, so `curl-dev` isn't read as `curl` at version `dev-...`.
  names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

  let alternation = names.iter().map(|name| regex::escape(name)).collect::<Vec<_>>().join("|");
  let exp = Regex::new(&format!(r"(?m)^({})-(\d[^ \n]*) description:", alternation))?;

  for captures in exp.captures_iter(out) {
    resolved.overwrite(&captures[1], &captures[2]);
  }

  Ok(())
}
