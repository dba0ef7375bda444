//! State solver backed by the `docker` CLI.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use shell_words::quote;

use super::context_locker::{GIT_IMAGE, clone_cmd, source_ref_or_head};
use super::{SolverError, Source, StateSolver};
use crate::builddef::Context;

/// Exit code of `git show` when the requested path doesn't exist.
const GIT_NOT_FOUND_CODE: i32 = 128;

#[derive(Debug, Clone)]
pub struct DockerSolver {
  docker_bin: String,
  /// Directory local contexts are resolved from.
  root_dir: PathBuf,
}

impl DockerSolver {
  pub fn new(root_dir: impl Into<PathBuf>) -> Self {
    Self {
      docker_bin: "docker".to_string(),
      root_dir: root_dir.into(),
    }
  }

  /// Uses another docker-compatible binary (e.g. `podman`).
  pub fn with_docker_bin(mut self, docker_bin: &str) -> Self {
    self.docker_bin = docker_bin.to_string();
    self
  }

  async fn run(&self, ctx: &CancellationToken, args: &[String]) -> Result<Output, SolverError> {
    debug!(bin = %self.docker_bin, args = ?args, "spawning process");

    let mut command = Command::new(&self.docker_bin);
    command
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let child = command.spawn().map_err(|source| SolverError::Spawn {
      cmd: self.docker_bin.clone(),
      source,
    })?;

    tokio::select! {
      biased;
      _ = ctx.cancelled() => Err(SolverError::Cancelled),
      output = child.wait_with_output() => output.map_err(|source| SolverError::Spawn {
        cmd: self.docker_bin.clone(),
        source,
      }),
    }
  }

  async fn read_from_local_context(&self, context: &Context, path: &str) -> Result<Vec<u8>, SolverError> {
    let fullpath = self.root_dir.join(&context.source).join(path.trim_start_matches('/'));
    debug!(path = ?fullpath, "reading file from local context");

    match tokio::fs::read(&fullpath).await {
      Ok(raw) => Ok(raw),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(SolverError::FileNotFound {
        path: path.to_string(),
        location: format!("build context {}", context),
      }),
      Err(source) => Err(SolverError::Io {
        path: display_path(&fullpath),
        source,
      }),
    }
  }

  async fn read_from_git_context(
    &self,
    ctx: &CancellationToken,
    context: &Context,
    path: &str,
  ) -> Result<Vec<u8>, SolverError> {
    match self.exec_image(ctx, GIT_IMAGE, &git_show_cmds(context, path)).await {
      Ok(out) => Ok(out.into_bytes()),
      Err(SolverError::ExitStatus {
        code: Some(GIT_NOT_FOUND_CODE),
        ..
      }) => Err(SolverError::FileNotFound {
        path: path.to_string(),
        location: format!("build context {}", context),
      }),
      Err(err) => Err(err),
    }
  }

  async fn read_from_image(&self, ctx: &CancellationToken, image: &str, path: &str) -> Result<Vec<u8>, SolverError> {
    let args = docker_args(&["run", "--rm", "--entrypoint", "cat", image, path]);
    let output = self.run(ctx, &args).await?;

    if output.status.success() {
      return Ok(output.stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("No such file or directory") {
      return Err(SolverError::FileNotFound {
        path: path.to_string(),
        location: format!("image {}", image),
      });
    }

    Err(SolverError::ExitStatus {
      image: image.to_string(),
      cmd: format!("cat {}", path),
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: stderr.into_owned(),
    })
  }
}

#[async_trait]
impl StateSolver for DockerSolver {
  fn local_dir(&self, context: &Context) -> Option<PathBuf> {
    context.is_local().then(|| self.root_dir.join(&context.source))
  }

  async fn read_file(&self, ctx: &CancellationToken, path: &str, source: &Source) -> Result<Vec<u8>, SolverError> {
    match source {
      Source::BuildContext(context) if context.is_git() => self.read_from_git_context(ctx, context, path).await,
      Source::BuildContext(context) => self.read_from_local_context(context, path).await,
      Source::Image(image) => self.read_from_image(ctx, image, path).await,
    }
  }

  async fn exec_image(&self, ctx: &CancellationToken, image_ref: &str, cmds: &[String]) -> Result<String, SolverError> {
    let script = cmds.join("; ");
    info!(image = %image_ref, cmd = %script, "executing command in image");

    let args = docker_args(&[
      "run",
      "--rm",
      "--entrypoint",
      "/bin/sh",
      image_ref,
      "-o",
      "errexit",
      "-c",
      &script,
    ]);
    let output = self.run(ctx, &args).await?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }

      return Err(SolverError::ExitStatus {
        image: image_ref.to_string(),
        cmd: script,
        code: output.status.code(),
        stdout,
        stderr,
      });
    }

    Ok(stdout)
  }

  async fn resolve_image_ref(&self, ctx: &CancellationToken, image_ref: &str) -> Result<String, SolverError> {
    if image_ref.contains("@sha256:") {
      return Ok(image_ref.to_string());
    }

    info!(image = %image_ref, "resolving image reference");

    let pull = self.run(ctx, &docker_args(&["pull", "--quiet", image_ref])).await?;
    if !pull.status.success() {
      return Err(SolverError::ImageRef {
        image: image_ref.to_string(),
        message: String::from_utf8_lossy(&pull.stderr).trim().to_string(),
      });
    }

    let inspect = self
      .run(
        ctx,
        &docker_args(&["image", "inspect", "--format", "{{index .RepoDigests 0}}", image_ref]),
      )
      .await?;
    let repo_digest = String::from_utf8_lossy(&inspect.stdout).trim().to_string();

    match repo_digest.split_once('@') {
      Some((_, digest)) if inspect.status.success() => Ok(format!("{}@{}", image_ref, digest)),
      _ => Err(SolverError::ImageRef {
        image: image_ref.to_string(),
        message: "no repo digest found".to_string(),
      }),
    }
  }
}

/// Shell commands printing `path` of a git context at its reference.
fn git_show_cmds(context: &Context, path: &str) -> Vec<String> {
  let filepath = Path::new(&context.path).join(path.trim_start_matches('/'));
  let object = format!("{}:{}", source_ref_or_head(context), display_path(&filepath));
  vec![
    clone_cmd(context),
    "cd /tmp/repo".to_string(),
    format!("git show {}", quote(&object)),
  ]
}

fn docker_args(args: &[&str]) -> Vec<String> {
  args.iter().map(|arg| arg.to_string()).collect()
}

fn display_path(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}
