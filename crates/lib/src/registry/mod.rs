//! Kind handlers and their registry.
//!
//! The registry maps the `kind` of a definition file to the handler that
//! knows how to build, lock and dump it. There's no global registry: callers
//! build one (usually [`KindRegistry::default_registry`]) and pass it along.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::builddef::{BuildOpts, Locks, UpdateLocksOpts};
use crate::defkinds::nodejs::{self, NodeJsHandler};
use crate::defkinds::php::{self, PhpHandler};
use crate::defkinds::webserver::{self, WebserverHandler};
use crate::defkinds::KindError;
use crate::pkgsolver::PackageSolvers;
use crate::plan::BuildPlan;
use crate::statesolver::StateSolver;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
  #[error("unknown kind {0:?}")]
  UnknownKind(String),
}

/// Operations every definition kind supports.
///
/// Handlers are stateless: collaborators are passed on each call.
#[async_trait]
pub trait KindHandler: Send + Sync {
  /// Resolves the stage selected in `opts` into a build plan. Requires the
  /// definition to be locked.
  async fn build(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    opts: &BuildOpts,
  ) -> Result<BuildPlan, KindError>;

  /// Computes the locks of the whole definition.
  async fn update_locks(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    pkg_solvers: &PackageSolvers,
    opts: &UpdateLocksOpts,
  ) -> Result<Box<dyn Locks>, KindError>;

  /// Returns the resolved configuration of the stage selected in `opts`.
  async fn debug_config(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    opts: &BuildOpts,
  ) -> Result<serde_yaml::Value, KindError>;
}

struct Registration {
  handler: Arc<dyn KindHandler>,
  embeds_webserver: bool,
}

#[derive(Default)]
pub struct KindRegistry {
  kinds: BTreeMap<String, Registration>,
}

impl KindRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers the php, nodejs and webserver kinds.
  pub fn default_registry() -> Self {
    let mut registry = Self::new();
    registry.register(php::KIND, Arc::new(PhpHandler::default()), true);
    registry.register(nodejs::KIND, Arc::new(NodeJsHandler), true);
    registry.register(webserver::KIND, Arc::new(WebserverHandler), false);
    registry
  }

  /// Registers a handler. `embeds_webserver` tells whether definitions of
  /// this kind may declare a webserver under the `webserver` key. A kind
  /// registered twice keeps the last handler.
  pub fn register(&mut self, name: &str, handler: Arc<dyn KindHandler>, embeds_webserver: bool) {
    self.kinds.insert(
      name.to_string(),
      Registration {
        handler,
        embeds_webserver,
      },
    );
  }

  pub fn find(&self, name: &str) -> Result<Arc<dyn KindHandler>, RegistryError> {
    self
      .kinds
      .get(name)
      .map(|registration| registration.handler.clone())
      .ok_or_else(|| RegistryError::UnknownKind(name.to_string()))
  }

  pub fn embeds_webserver(&self, name: &str) -> bool {
    self.kinds.get(name).is_some_and(|registration| registration.embeds_webserver)
  }

  #[cfg(test)]
  pub(crate) fn kinds(&self) -> impl Iterator<Item = &String> {
    self.kinds.keys()
  }
}
