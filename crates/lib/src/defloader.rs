//! Loads definition files and their lock files through a state solver.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::builddef::{BuildDef, BuildOpts, DefError};
use crate::statesolver::{SolverError, StateSolver};

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("zbuildfile {0} not found")]
  ZbuildfileNotFound(String),

  #[error("could not load {file}: {source}")]
  Read {
    file: String,
    #[source]
    source: SolverError,
  },

  #[error(transparent)]
  Def(#[from] DefError),
}

/// Loads the definition file and the lock file selected by `opts` from its
/// build context.
///
/// A missing lock file leaves [`BuildDef::raw_locks`] empty. Whether the
/// locks are in sync with the definition is left to the caller.
pub async fn load(ctx: &CancellationToken, solver: &dyn StateSolver, opts: &BuildOpts) -> Result<BuildDef, LoadError> {
  let source = solver.from_build_context(&opts.build_context);

  let content = match solver.read_file(ctx, &opts.file, &source).await {
    Ok(content) => content,
    Err(err) if err.is_not_found() => return Err(LoadError::ZbuildfileNotFound(opts.file.clone())),
    Err(source) => {
      return Err(LoadError::Read {
        file: opts.file.clone(),
        source,
      });
    }
  };
  let def = BuildDef::parse(&opts.file, &content)?;

  match solver.read_file(ctx, &opts.lock_file, &source).await {
    Ok(locks) => Ok(def.with_locks(&opts.lock_file, &locks)?),
    Err(err) if err.is_not_found() => {
      debug!(file = %opts.lock_file, "no lock file found");
      Ok(def)
    }
    Err(source) => Err(LoadError::Read {
      file: opts.lock_file.clone(),
      source,
    }),
  }
}
