//! The `webserver` kind.
//!
//! A flat definition (no stages) describing a web server image serving the
//! assets of an application. It's usually embedded under the `webserver` key
//! of a php or nodejs definition rather than used on its own.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{KindError, keep_previous, resolve_base_image, resolve_system_packages};
use crate::builddef::{BuildDef, BuildOpts, DefError, Locks, OsRelease, UpdateLocksOpts, VersionMap, decode, decode_locks, to_raw_locks};
use crate::pkgsolver::{PackageSolvers, PkgSolverError};
use crate::plan::BuildPlan;
use crate::registry::KindHandler;
use crate::statesolver::{SolverError, StateSolver};

pub const KIND: &str = "webserver";

#[derive(Debug, Error)]
pub enum WebserverError {
  #[error(transparent)]
  Def(#[from] DefError),

  #[error(transparent)]
  Solver(#[from] SolverError),

  #[error("could not resolve system packages: {0}")]
  SystemPackages(#[from] PkgSolverError),

  #[error("no locks available for webserver. Please update your lockfile")]
  NoLocks,

  #[error("could not dump webserver config: {0}")]
  Dump(#[source] serde_yaml::Error),

  #[error("could not encode build plan: {0}")]
  Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebserverType {
  #[default]
  Nginx,
}

impl WebserverType {
  pub fn config_path(&self) -> &'static str {
    match self {
      Self::Nginx => "/etc/nginx/nginx.conf",
    }
  }

  pub fn base_image(&self) -> &'static str {
    match self {
      Self::Nginx => "docker.io/library/nginx:latest",
    }
  }
}

/// Files copied from the application stage into the webserver image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetToCopy {
  pub from: String,
  pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Definition {
  #[serde(rename = "type")]
  pub kind: WebserverType,
  pub system_packages: VersionMap,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub config_file: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub healthcheck: Option<bool>,
  pub assets: Vec<AssetToCopy>,
}

impl Definition {
  pub fn from_build_def(def: &BuildDef) -> Result<(Self, DefinitionLocks), WebserverError> {
    let mut parsed: Definition = decode("webserver definition", def.raw_config.clone())?;
    parsed.healthcheck.get_or_insert(true);
    if parsed.healthcheck() {
      parsed.system_packages.add("curl", "*");
    }

    Ok((parsed, decode_locks(&def.raw_locks)?))
  }

  pub fn healthcheck(&self) -> bool {
    self.healthcheck.unwrap_or(true)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DefinitionLocks {
  pub base_image: String,
  pub osrelease: OsRelease,
  pub system_packages: VersionMap,
}

impl Locks for DefinitionLocks {
  fn raw_locks(&self) -> Result<Mapping, DefError> {
    to_raw_locks(self)
  }
}

#[derive(Debug, Default)]
pub struct WebserverHandler;

impl WebserverHandler {
  async fn lock_definition(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    pkg_solvers: &PackageSolvers,
    opts: &UpdateLocksOpts,
  ) -> Result<DefinitionLocks, WebserverError> {
    let (def, previous) = Definition::from_build_def(&opts.build_opts.def)?;
    let mut locks = DefinitionLocks::default();

    if opts.update_image_ref || previous.base_image.is_empty() {
      (locks.base_image, locks.osrelease) = resolve_base_image(ctx, solver.as_ref(), def.kind.base_image()).await?;
    } else {
      locks.base_image = previous.base_image.clone();
      locks.osrelease = previous.osrelease.clone();
    }

    let refresh = opts.update_system_packages || previous.system_packages.is_empty();
    locks.system_packages = match keep_previous(Some(&previous.system_packages), refresh) {
      Some(previous) => previous.clone(),
      None => {
        resolve_system_packages(
          ctx,
          solver,
          pkg_solvers,
          &locks.base_image,
          &locks.osrelease,
          &def.system_packages,
        )
        .await?
      }
    };
    info!(packages = locks.system_packages.len(), "webserver locked");

    Ok(locks)
  }
}

#[async_trait]
impl KindHandler for WebserverHandler {
  async fn build(
    &self,
    _ctx: &CancellationToken,
    _solver: &Arc<dyn StateSolver>,
    opts: &BuildOpts,
  ) -> Result<BuildPlan, KindError> {
    let (def, locks) = Definition::from_build_def(&opts.def)?;
    if locks.base_image.is_empty() {
      return Err(WebserverError::NoLocks.into());
    }

    let plan = BuildPlan::new(KIND, KIND, &locks.base_image, &opts.build_context, false, &def, &locks)
      .map_err(WebserverError::Encode)?
      .with_arg("config_path", def.kind.config_path());

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
    let (def, _) = Definition::from_build_def(&opts.def)?;
    let dumped = serde_yaml::to_value(&def).map_err(WebserverError::Dump)?;

    Ok(dumped)
  }
}
