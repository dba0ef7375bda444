use shell_words::quote;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{SolverError, StateSolver};
use crate::builddef::Context;

/// Image used to run git commands.
pub const GIT_IMAGE: &str = "docker.io/akerouanton/zbuild-git:v0.1";

/// Pins a git context to the commit its reference currently points to.
///
/// Local contexts can't be pinned and are returned unchanged.
pub async fn lock_context(
  ctx: &CancellationToken,
  solver: &dyn StateSolver,
  context: &Context,
) -> Result<Context, SolverError> {
  if !context.is_git() {
    return Ok(context.clone());
  }

  let cmds = vec![
    clone_cmd(context),
    "cd /tmp/repo".to_string(),
    format!("git rev-parse -q --verify {}", quote(source_ref_or_head(context))),
  ];
  let out = solver.exec_image(ctx, GIT_IMAGE, &cmds).await?;

  let mut locked = context.clone();
  locked.reference = out.trim().to_string();
  info!(source = %context.source, reference = %locked.reference, "locked git context");

  Ok(locked)
}

/// Shell command cloning the repository of `context` into `/tmp/repo`.
pub(super) fn clone_cmd(context: &Context) -> String {
  format!(
    "git clone --quiet {} /tmp/repo 1>/dev/null 2>&1",
    quote(&normalize_repo_uri(context))
  )
}

fn normalize_repo_uri(context: &Context) -> String {
  if context.source.starts_with("git://") {
    context.source.clone()
  } else {
    format!("git://{}", context.source)
  }
}

pub(super) fn source_ref_or_head(context: &Context) -> &str {
  if context.reference.is_empty() {
    "HEAD"
  } else {
    &context.reference
  }
}
