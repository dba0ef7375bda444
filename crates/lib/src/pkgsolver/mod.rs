//! Package solvers pin system packages to exact versions.
//!
//! A package solver takes a map of package names to version constraints and
//! returns the same packages associated with their resolved version. An empty
//! constraint or `*` asks for the latest version known by the package index.
//! Any other constraint is considered pinned already and is returned as-is.
//!
//! Three backends are available:
//! - [`AptSolver`] queries `apt-cache` inside the base image
//! - [`ApkSolver`] queries `apk info` inside the base image
//! - [`DpkgSolver`] looks packages up in Debian repository indexes

mod apk;
mod apt;
mod dpkg;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::builddef::{OsRelease, VersionMap};
use crate::statesolver::{SolverError, StateSolver};

pub use apk::ApkSolver;
pub use apt::AptSolver;
pub use dpkg::{DEFAULT_INDEX_TTL, DpkgRepository, DpkgSolver};

#[derive(Debug, Error)]
pub enum PkgSolverError {
  #[error("packages {} not found", .0.join(", "))]
  MissingPackages(Vec<String>),

  #[error("could not resolve packages in {image}: {source}")]
  Exec {
    image: String,
    #[source]
    source: SolverError,
  },

  #[error("unsupported OS {0:?}: only debian-based and alpine-based base images are supported")]
  UnsupportedOs(String),

  #[error("no package solver registered for {0}")]
  UnsupportedSolver(SolverType),

  #[error("could not fetch {url}: {message}")]
  Fetch { url: String, message: String },

  #[error("could not access {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid package name pattern: {0}")]
  Pattern(#[from] regex::Error),

  #[error("operation cancelled")]
  Cancelled,
}

#[async_trait]
pub trait PackageSolver: Send + Sync {
  /// Resolves the version of every package in `pkgs`, using the package
  /// index of the image `image_ref`.
  ///
  /// Fails with [`PkgSolverError::MissingPackages`] naming every package that
  /// could not be resolved.
  async fn resolve_versions(
    &self,
    ctx: &CancellationToken,
    image_ref: &str,
    pkgs: &VersionMap,
  ) -> Result<VersionMap, PkgSolverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverType {
  Apt,
  Apk,
}

impl SolverType {
  /// Selects the solver matching the distribution of a base image.
  pub fn from_os(osrelease: &OsRelease) -> Result<Self, PkgSolverError> {
    match osrelease.name.as_str() {
      "debian" | "ubuntu" => Ok(Self::Apt),
      "alpine" => Ok(Self::Apk),
      other => Err(PkgSolverError::UnsupportedOs(other.to_string())),
    }
  }
}

impl fmt::Display for SolverType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Apt => write!(f, "apt"),
      Self::Apk => write!(f, "apk"),
    }
  }
}

type SolverFactory = Box<dyn Fn(Arc<dyn StateSolver>) -> Arc<dyn PackageSolver> + Send + Sync>;

/// Package solver factories, by solver type.
pub struct PackageSolvers {
  factories: HashMap<SolverType, SolverFactory>,
}

impl Default for PackageSolvers {
  /// APT and APK solvers querying the base image through the state solver.
  fn default() -> Self {
    Self::empty()
      .with_factory(SolverType::Apt, |solver| Arc::new(AptSolver::new(solver)))
      .with_factory(SolverType::Apk, |solver| Arc::new(ApkSolver::new(solver)))
  }
}

impl PackageSolvers {
  pub fn empty() -> Self {
    Self {
      factories: HashMap::new(),
    }
  }

  /// Registers (or replaces) the factory of a solver type.
  pub fn with_factory<F>(mut self, solver_type: SolverType, factory: F) -> Self
  where
    F: Fn(Arc<dyn StateSolver>) -> Arc<dyn PackageSolver> + Send + Sync + 'static,
  {
    self.factories.insert(solver_type, Box::new(factory));
    self
  }

  /// Uses Debian repository indexes instead of the image for APT-based
  /// images. The index is downloaded once and shared by every stage.
  pub fn with_dpkg(self, dpkg: DpkgSolver) -> Self {
    let dpkg: Arc<dyn PackageSolver> = Arc::new(dpkg);
    self.with_factory(SolverType::Apt, move |_| dpkg.clone())
  }

  pub fn new_solver(
    &self,
    solver_type: SolverType,
    solver: Arc<dyn StateSolver>,
  ) -> Result<Arc<dyn PackageSolver>, PkgSolverError> {
    let factory = self
      .factories
      .get(&solver_type)
      .ok_or(PkgSolverError::UnsupportedSolver(solver_type))?;
    Ok(factory(solver))
  }
}

/// Whether a constraint asks for the latest version.
pub(crate) fn needs_resolution(constraint: &str) -> bool {
  constraint.is_empty() || constraint == "*"
}

/// Splits packages into those already pinned and the names left to resolve.
pub(crate) fn partition_pinned(pkgs: &VersionMap) -> (VersionMap, Vec<String>) {
  let mut pinned = VersionMap::new();
  let mut to_resolve = Vec::new();

  for (name, constraint) in pkgs.iter() {
    if needs_resolution(constraint) {
      to_resolve.push(name.clone());
    } else {
      pinned.overwrite(name, constraint);
    }
  }

  (pinned, to_resolve)
}

/// Fails with every package of `pkgs` missing from `resolved`.
pub fn check_missing_packages(pkgs: &VersionMap, resolved: &VersionMap) -> Result<(), PkgSolverError> {
  let missing: Vec<String> = pkgs.names().into_iter().filter(|name| !resolved.has(name)).collect();

  if missing.is_empty() {
    Ok(())
  } else {
    Err(PkgSolverError::MissingPackages(missing))
  }
}
