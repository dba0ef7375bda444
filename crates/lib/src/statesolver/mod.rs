//! State solvers read files and execute commands on behalf of the rest of
//! the crate.
//!
//! Nothing else in the crate talks to a container runtime, an image
//! registry or the local filesystem directly: every such access goes
//! through a [`StateSolver`]. This keeps kind handlers and package solvers
//! testable with an in-memory implementation.

mod context_locker;
mod docker;
mod osresolver;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::builddef::{Context, DefError};

pub use context_locker::{GIT_IMAGE, lock_context};
pub use docker::DockerSolver;
pub use osresolver::resolve_image_os;

/// Where a file should be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
  BuildContext(Context),
  Image(String),
}

impl std::fmt::Display for Source {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Source::BuildContext(context) => write!(f, "build context {}", context),
      Source::Image(image) => write!(f, "image {}", image),
    }
  }
}

#[derive(Debug, Error)]
pub enum SolverError {
  #[error("file {path} not found in {location}")]
  FileNotFound { path: String, location: String },

  #[error("operation cancelled")]
  Cancelled,

  #[error("failed to run {cmd}: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command {cmd:?} in {image} exited with code {code:?}: {stderr}")]
  ExitStatus {
    image: String,
    cmd: String,
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },

  #[error("could not read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("could not resolve image {image}: {message}")]
  ImageRef { image: String, message: String },

  #[error("could not find /etc/os-release in {0}")]
  OsReleaseNotFound(String),

  #[error("could not parse /etc/os-release from {image}: {source}")]
  OsRelease {
    image: String,
    #[source]
    source: DefError,
  },
}

impl SolverError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, SolverError::FileNotFound { .. })
  }
}

/// Reads files and executes commands in build contexts and container images.
///
/// Every operation takes a cancellation token. A cancelled token aborts the
/// in-flight operation with [`SolverError::Cancelled`].
#[async_trait]
pub trait StateSolver: Send + Sync {
  fn from_build_context(&self, context: &Context) -> Source {
    Source::BuildContext(context.clone())
  }

  fn from_image(&self, image_ref: &str) -> Source {
    Source::Image(image_ref.to_string())
  }

  /// Directory a local context lives in on the host, as used by
  /// [`StateSolver::read_file`]. `None` for contexts outside the host
  /// filesystem (git).
  fn local_dir(&self, context: &Context) -> Option<PathBuf> {
    context.is_local().then(|| PathBuf::from(&context.source))
  }

  /// Reads a file. Returns [`SolverError::FileNotFound`] when the file
  /// doesn't exist.
  async fn read_file(&self, ctx: &CancellationToken, path: &str, source: &Source) -> Result<Vec<u8>, SolverError>;

  /// Runs `cmds` in sequence in a container created from `image_ref` and
  /// returns what they wrote to stdout. The sequence stops on the first
  /// failing command.
  async fn exec_image(&self, ctx: &CancellationToken, image_ref: &str, cmds: &[String]) -> Result<String, SolverError>;

  /// Pins an image reference to its digest.
  async fn resolve_image_ref(&self, ctx: &CancellationToken, image_ref: &str) -> Result<String, SolverError>;
}
