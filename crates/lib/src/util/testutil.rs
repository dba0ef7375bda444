//! Test utilities for zbuild-lib.
//!
//! In-memory implementations of the collaborator traits, so kind handlers,
//! package solvers and the builder can be tested without docker or network
//! access.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::defkinds::php::{ExtensionIndex, PhpError, Release, Stability};
use crate::statesolver::{SolverError, Source, StateSolver};

/// A state solver answering from canned files and command outputs.
///
/// Unknown files are reported as not found. Unknown commands fail with exit
/// code 127 so unexpected calls show up in test failures.
#[derive(Default)]
pub struct MockSolver {
  files: HashMap<(String, String), Vec<u8>>,
  execs: HashMap<(String, String), Result<String, (i32, String)>>,
  image_refs: HashMap<String, String>,
  exec_calls: Mutex<Vec<String>>,
}

impl MockSolver {
  pub fn with_file(mut self, source: Source, path: &str, content: &str) -> Self {
    self
      .files
      .insert((source.to_string(), path.to_string()), content.as_bytes().to_vec());
    self
  }

  pub fn with_exec(mut self, image: &str, cmds: &[&str], stdout: &str) -> Self {
    self
      .execs
      .insert((image.to_string(), cmds.join("; ")), Ok(stdout.to_string()));
    self
  }

  pub fn with_failing_exec(mut self, image: &str, cmds: &[&str], code: i32, stdout: &str) -> Self {
    self
      .execs
      .insert((image.to_string(), cmds.join("; ")), Err((code, stdout.to_string())));
    self
  }

  pub fn with_image_ref(mut self, image: &str, pinned: &str) -> Self {
    self.image_refs.insert(image.to_string(), pinned.to_string());
    self
  }

  /// Returns the commands executed so far, one `; `-joined string per call.
  pub fn exec_calls(&self) -> Vec<String> {
    self.exec_calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl StateSolver for MockSolver {
  async fn read_file(&self, ctx: &CancellationToken, path: &str, source: &Source) -> Result<Vec<u8>, SolverError> {
    if ctx.is_cancelled() {
      return Err(SolverError::Cancelled);
    }

    self
      .files
      .get(&(source.to_string(), path.to_string()))
      .cloned()
      .ok_or_else(|| SolverError::FileNotFound {
        path: path.to_string(),
        location: source.to_string(),
      })
  }

  async fn exec_image(&self, ctx: &CancellationToken, image_ref: &str, cmds: &[String]) -> Result<String, SolverError> {
    if ctx.is_cancelled() {
      return Err(SolverError::Cancelled);
    }

    let script = cmds.join("; ");
    self.exec_calls.lock().unwrap().push(script.clone());

    match self.execs.get(&(image_ref.to_string(), script.clone())) {
      Some(Ok(stdout)) => Ok(stdout.clone()),
      Some(Err((code, stdout))) => Err(SolverError::ExitStatus {
        image: image_ref.to_string(),
        cmd: script,
        code: Some(*code),
        stdout: stdout.clone(),
        stderr: String::new(),
      }),
      None => Err(SolverError::ExitStatus {
        image: image_ref.to_string(),
        cmd: script,
        code: Some(127),
        stdout: String::new(),
        stderr: "unexpected command".to_string(),
      }),
    }
  }

  async fn resolve_image_ref(&self, ctx: &CancellationToken, image_ref: &str) -> Result<String, SolverError> {
    if ctx.is_cancelled() {
      return Err(SolverError::Cancelled);
    }

    self
      .image_refs
      .get(image_ref)
      .cloned()
      .ok_or_else(|| SolverError::ImageRef {
        image: image_ref.to_string(),
        message: "unknown image".to_string(),
      })
  }
}

/// An extension index answering from a fixed set of releases.
#[derive(Default)]
pub struct MockExtensionIndex {
  releases: HashMap<String, Vec<Release>>,
}

impl MockExtensionIndex {
  pub fn with_release(mut self, name: &str, stability: Stability, version: &str) -> Self {
    self
      .releases
      .entry(name.to_string())
      .or_default()
      .push(Release::new(version, stability));
    self
  }
}

#[async_trait]
impl ExtensionIndex for MockExtensionIndex {
  async fn releases(&self, _ctx: &CancellationToken, name: &str) -> Result<Vec<Release>, PhpError> {
    Ok(self.releases.get(name).cloned().unwrap_or_default())
  }
}
