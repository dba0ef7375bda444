//! The `nodejs` kind.

mod definition;
mod locks;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{KindError, keep_previous, resolve_base_image, resolve_system_packages};
use crate::builddef::{BuildOpts, Context, DefError, Locks, UpdateLocksOpts};
use crate::pkgsolver::{PackageSolvers, PkgSolverError};
use crate::plan::BuildPlan;
use crate::registry::KindHandler;
use crate::stage::StageError;
use crate::statesolver::{SolverError, StateSolver, lock_context};

pub use definition::{Definition, Stage, StageDefinition};
pub use locks::{DefinitionLocks, StageLocks};

pub const KIND: &str = "nodejs";

#[derive(Debug, Error)]
pub enum NodeJsError {
  #[error(transparent)]
  Def(#[from] DefError),

  #[error(transparent)]
  Stage(#[from] StageError),

  #[error("you can't provide both version and base image parameters at the same time")]
  VersionAndBase,

  #[error(transparent)]
  Solver(#[from] SolverError),

  #[error("could not resolve system packages: {0}")]
  SystemPackages(#[from] PkgSolverError),

  #[error("no locks available for stage {0:?}. Please update your lockfile")]
  NoLocks(String),

  #[error("could not dump stage config: {0}")]
  Dump(#[source] serde_yaml::Error),

  #[error("could not encode build plan: {0}")]
  Encode(#[source] serde_json::Error),
}

/// Package manager used to install the dependencies of an application,
/// detected from the lock file found in its build context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
  Yarn,
  Npm,
}

impl PackageManager {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Yarn => "yarn",
      Self::Npm => "npm",
    }
  }

  /// Command installing the locked dependencies.
  pub fn install_command(&self) -> &'static str {
    match self {
      Self::Yarn => "yarn install --frozen-lockfile",
      Self::Npm => "npm ci",
    }
  }

  /// yarn.lock wins over package-lock.json. Contexts with neither use yarn.
  pub async fn detect(ctx: &CancellationToken, solver: &dyn StateSolver, context: &Context) -> Result<Self, SolverError> {
    let source = solver.from_build_context(context);

    for (lockfile, manager) in [("yarn.lock", Self::Yarn), ("package-lock.json", Self::Npm)] {
      match solver.read_file(ctx, lockfile, &source).await {
        Ok(_) => return Ok(manager),
        Err(err) if err.is_not_found() => continue,
        Err(err) => return Err(err),
      }
    }

    debug!(context = %context, "no package lock file found, defaulting to yarn");
    Ok(Self::Yarn)
  }
}

impl fmt::Display for PackageManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Default)]
pub struct NodeJsHandler;

impl NodeJsHandler {
  async fn lock_definition(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    pkg_solvers: &PackageSolvers,
    opts: &UpdateLocksOpts,
  ) -> Result<DefinitionLocks, NodeJsError> {
    let def = Definition::from_build_def(&opts.build_opts.def)?;
    let previous = &def.locks;
    let mut locks = DefinitionLocks::default();

    if opts.update_image_ref || previous.base_image.is_empty() {
      (locks.base_image, locks.osrelease) = resolve_base_image(ctx, solver.as_ref(), &def.base_image).await?;
    } else {
      locks.base_image = previous.base_image.clone();
      locks.osrelease = previous.osrelease.clone();
    }

    if let Some(context) = &def.source_context {
      locks.source_context = Some(lock_context(ctx, solver.as_ref(), context).await?);
    }

    for name in def.stages.names() {
      let stage = def.resolve_stage(name)?;

      let system_packages = match keep_previous(previous.stages.get(name), opts.update_system_packages) {
        Some(previous) => previous.system_packages.clone(),
        None => {
          resolve_system_packages(
            ctx,
            solver,
            pkg_solvers,
            &locks.base_image,
            &locks.osrelease,
            &stage.stage.system_packages,
          )
          .await?
        }
      };

      info!(stage = %name, packages = system_packages.len(), "stage locked");
      locks.stages.insert(name.clone(), StageLocks { system_packages });
    }

    Ok(locks)
  }
}

#[async_trait]
impl KindHandler for NodeJsHandler {
  async fn build(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    opts: &BuildOpts,
  ) -> Result<BuildPlan, KindError> {
    let def = Definition::from_build_def(&opts.def)?;
    let stage = def.resolve_stage(&opts.stage)?;
    let locks = def
      .locks
      .stages
      .get(&opts.stage)
      .ok_or_else(|| NodeJsError::NoLocks(opts.stage.clone()))?;

    let context = def.locks.source_context.as_ref().unwrap_or(&opts.build_context);
    let manager = PackageManager::detect(ctx, solver.as_ref(), context)
      .await
      .map_err(NodeJsError::from)?;

    let mut plan = BuildPlan::new(KIND, &opts.stage, &def.locks.base_image, context, stage.dev, &stage, locks)
      .map_err(NodeJsError::Encode)?
      .with_arg("package_manager", manager.as_str())
      .with_arg("install_command", manager.install_command());
    if !stage.dev {
      plan = plan.with_arg("node_env", "production");
    }

    Ok(plan)
  }

  async fn update_locks(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    pkg_solvers: &PackageSolvers,
    opts: &UpdateLocksOpts,
  ) -> Result<Box<dyn Locks>, KindError> {
    let locks = self.lock_definition(ctx, solver, pkg_solvers, opts).await?;
    Ok(Box::new(locks))
  }

  async fn debug_config(
    &self,
    _ctx: &CancellationToken,
    _solver: &Arc<dyn StateSolver>,
    opts: &BuildOpts,
  ) -> Result<serde_yaml::Value, KindError> {
    let def = Definition::from_build_def(&opts.def)?;
    let stage = def.resolve_stage(&opts.stage)?;
    let dumped = serde_yaml::to_value(&stage).map_err(NodeJsError::Dump)?;

    Ok(dumped)
  }
}
