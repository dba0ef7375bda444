use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{SolverError, StateSolver};
use crate::builddef::OsRelease;

/// Reads and parses `/etc/os-release` from an image.
pub async fn resolve_image_os(
  ctx: &CancellationToken,
  solver: &dyn StateSolver,
  image_ref: &str,
) -> Result<OsRelease, SolverError> {
  let source = solver.from_image(image_ref);
  let raw = match solver.read_file(ctx, "/etc/os-release", &source).await {
    Ok(raw) => raw,
    Err(err) if err.is_not_found() => return Err(SolverError::OsReleaseNotFound(image_ref.to_string())),
    Err(err) => return Err(err),
  };

  let osrelease = OsRelease::parse(&raw).map_err(|source| SolverError::OsRelease {
    image: image_ref.to_string(),
    source,
  })?;
  debug!(image = %image_ref, os = %osrelease.name, version = %osrelease.version_id, "resolved image os");

  Ok(osrelease)
}
