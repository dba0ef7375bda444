//! Specialized definition kinds.
//!
//! Each kind decodes the raw configuration of a [`BuildDef`] into its own
//! strictly typed definition, resolves its stages and knows how to lock
//! its dependencies.
//!
//! [`BuildDef`]: crate::builddef::BuildDef

pub mod nodejs;
pub mod php;
pub mod webserver;

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::builddef::{OsRelease, VersionMap};
use crate::pkgsolver::{PackageSolvers, PkgSolverError, SolverType};
use crate::statesolver::{SolverError, StateSolver, resolve_image_os};

/// Error returned by kind handlers.
#[derive(Debug, Error)]
pub enum KindError {
  #[error(transparent)]
  Php(#[from] php::PhpError),

  #[error(transparent)]
  NodeJs(#[from] nodejs::NodeJsError),

  #[error(transparent)]
  Webserver(#[from] webserver::WebserverError),
}

/// Pins a base image to its digest and detects the OS it's based on.
pub(crate) async fn resolve_base_image(
  ctx: &CancellationToken,
  solver: &dyn StateSolver,
  image: &str,
) -> Result<(String, OsRelease), SolverError> {
  let pinned = solver.resolve_image_ref(ctx, image).await?;
  let osrelease = resolve_image_os(ctx, solver, &pinned).await?;
  info!(image = %image, pinned = %pinned, os = %osrelease.name, "base image locked");

  Ok((pinned, osrelease))
}

/// Resolves system packages with the package solver matching the OS of the
/// base image.
pub(crate) async fn resolve_system_packages(
  ctx: &CancellationToken,
  solver: &Arc<dyn StateSolver>,
  pkg_solvers: &PackageSolvers,
  image_ref: &str,
  osrelease: &OsRelease,
  pkgs: &VersionMap,
) -> Result<VersionMap, PkgSolverError> {
  let solver_type = SolverType::from_os(osrelease)?;
  let pkg_solver = pkg_solvers.new_solver(solver_type, solver.clone())?;

  pkg_solver.resolve_versions(ctx, image_ref, pkgs).await
}

/// Returns the previously locked value unless it should be refreshed.
pub(crate) fn keep_previous<'a, T>(previous: Option<&'a T>, refresh: bool) -> Option<&'a T> {
  if refresh { None } else { previous }
}
