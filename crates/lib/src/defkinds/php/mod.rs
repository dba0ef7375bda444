//! The `php` kind.
//!
//! PHP definitions describe an application running on the official PHP
//! images, either with FPM or as a CLI worker. Stages declare extensions and
//! system packages, and the inference pass adds what the declared
//! extensions, integrations and `composer.lock` need.

mod composer;
mod definition;
mod extensions;
mod locks;
mod pecl;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{KindError, keep_previous, resolve_base_image, resolve_system_packages};
use crate::builddef::{BuildOpts, DefError, HealthcheckError, Locks, UpdateLocksOpts};
use crate::pkgsolver::{PackageSolvers, PkgSolverError};
use crate::plan::BuildPlan;
use crate::registry::KindHandler;
use crate::stage::StageError;
use crate::statesolver::{SolverError, StateSolver, lock_context};

pub use composer::load_platform_reqs;
pub use definition::{ComposerDumpFlags, Definition, PhpConfigFiles, Stage, StageDefinition};
pub use locks::{DefinitionLocks, StageLocks, lock_extensions};
pub use pecl::{DEFAULT_PECL_URL, ExtensionIndex, PeclIndex, Release, Stability};

pub const KIND: &str = "php";

#[derive(Debug, Error)]
pub enum PhpError {
  #[error(transparent)]
  Def(#[from] DefError),

  #[error(transparent)]
  Stage(#[from] StageError),

  #[error("you can't specify version and base parameters at the same time")]
  VersionAndBase,

  #[error("you have to specify either version or base parameter")]
  MissingVersionOrBase,

  #[error("FPM mode is disabled but no command was provided")]
  FpmWithoutCommand,

  #[error(
    "you can't use both --apcu and --classmap-authoritative flags. See https://getcomposer.org/doc/articles/autoloader-optimization.md"
  )]
  ConflictingComposerFlags,

  #[error("stage {stage:?} has an invalid healthcheck: {source}")]
  InvalidHealthcheck {
    stage: String,
    #[source]
    source: HealthcheckError,
  },

  #[error("unknown integration {0:?}")]
  UnknownIntegration(String),

  #[error("blackfire integration doesn't support PHP {0:?}")]
  UnsupportedBlackfireVersion(String),

  #[error("could not decode composer.lock: {0}")]
  ComposerLock(#[source] serde_json::Error),

  #[error(transparent)]
  Solver(#[from] SolverError),

  #[error("could not resolve system packages: {0}")]
  SystemPackages(#[from] PkgSolverError),

  #[error("could not query {url}: {message}")]
  Pecl { url: String, message: String },

  #[error("extension {name} has no {stability} release matching {constraint:?}")]
  ExtensionNotFound {
    name: String,
    constraint: String,
    stability: Stability,
  },

  #[error("invalid version constraint {constraint:?} for extension {name}: {source}")]
  InvalidConstraint {
    name: String,
    constraint: String,
    #[source]
    source: semver::Error,
  },

  #[error("invalid stability {0:?}: expected stable, beta, alpha or devel")]
  InvalidStability(String),

  #[error("no locks available for stage {0:?}. Please update your lockfile")]
  NoLocks(String),

  #[error("could not dump stage config: {0}")]
  Dump(#[source] serde_yaml::Error),

  #[error("could not encode build plan: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("operation cancelled")]
  Cancelled,
}

pub struct PhpHandler {
  index: Arc<dyn ExtensionIndex>,
}

impl Default for PhpHandler {
  fn default() -> Self {
    Self::new(Arc::new(PeclIndex::default()))
  }
}

impl PhpHandler {
  pub fn new(index: Arc<dyn ExtensionIndex>) -> Self {
    Self { index }
  }

  async fn resolve(
    &self,
    ctx: &CancellationToken,
    solver: &dyn StateSolver,
    opts: &BuildOpts,
  ) -> Result<(Definition, StageDefinition), PhpError> {
    let def = Definition::from_build_def(&opts.def)?;
    let context = def.locks.source_context.as_ref().unwrap_or(&opts.build_context);
    let platform_reqs = load_platform_reqs(ctx, solver, context).await?;
    let stage = def.resolve_stage(&opts.stage, &platform_reqs, def.locks.osrelease.family())?;

    Ok((def, stage))
  }

  async fn lock_definition(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    pkg_solvers: &PackageSolvers,
    opts: &UpdateLocksOpts,
  ) -> Result<DefinitionLocks, PhpError> {
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

    let context = locks.source_context.as_ref().unwrap_or(&opts.build_opts.build_context);
    let platform_reqs = load_platform_reqs(ctx, solver.as_ref(), context).await?;

    for name in def.stages.names() {
      let stage = def.resolve_stage(name, &platform_reqs, locks.osrelease.family())?;
      let previous = previous.stages.get(name);

      let system_packages = match keep_previous(previous, opts.update_system_packages) {
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
      let extensions = match keep_previous(previous, opts.update_extensions) {
        Some(previous) => previous.extensions.clone(),
        None => lock_extensions(ctx, self.index.as_ref(), &stage.stage.extensions).await?,
      };

      info!(stage = %name, packages = system_packages.len(), extensions = extensions.len(), "stage locked");
      locks.stages.insert(
        name.clone(),
        StageLocks {
          system_packages,
          extensions,
        },
      );
    }

    Ok(locks)
  }
}

#[async_trait]
impl KindHandler for PhpHandler {
  async fn build(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    opts: &BuildOpts,
  ) -> Result<BuildPlan, KindError> {
    let (def, stage) = self.resolve(ctx, solver.as_ref(), opts).await?;
    let locks = def
      .locks
      .stages
      .get(&opts.stage)
      .ok_or_else(|| PhpError::NoLocks(opts.stage.clone()))?;
    let context = def.locks.source_context.as_ref().unwrap_or(&opts.build_context);

    let mut plan = BuildPlan::new(KIND, &opts.stage, &def.locks.base_image, context, stage.dev, &stage, locks)
      .map_err(PhpError::Encode)?;
    if !stage.dev {
      plan = plan.with_arg("composer_dump_flags", &stage.composer_dump_flags()?);
    }
    if let Some(healthcheck) = stage.healthcheck_config() {
      let test = serde_json::to_string(&healthcheck.test()).map_err(PhpError::Encode)?;
      plan = plan.with_arg("healthcheck", &test);
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
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    opts: &BuildOpts,
  ) -> Result<serde_yaml::Value, KindError> {
    let (_, stage) = self.resolve(ctx, solver.as_ref(), opts).await?;
    let dumped = serde_yaml::to_value(&stage).map_err(PhpError::Dump)?;

    Ok(dumped)
  }
}
