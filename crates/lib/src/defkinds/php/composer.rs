use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::PhpError;
use crate::builddef::{Context, VersionMap};
use crate::statesolver::{SolverError, StateSolver};

const COMPOSER_LOCK: &str = "composer.lock";

#[derive(Deserialize)]
struct ComposerLock {
  // Composer writes an empty array when there's no platform requirement.
  #[serde(default)]
  platform: serde_json::Value,
}

/// Loads the extensions required by `composer.lock` (its `ext-*` platform
/// requirements) from a build context. A missing `composer.lock` yields an
/// empty map.
pub async fn load_platform_reqs(
  ctx: &CancellationToken,
  solver: &dyn StateSolver,
  context: &Context,
) -> Result<VersionMap, PhpError> {
  let source = solver.from_build_context(context);
  let raw = match solver.read_file(ctx, COMPOSER_LOCK, &source).await {
    Ok(raw) => raw,
    Err(SolverError::FileNotFound { .. }) => {
      debug!(context = %context, "no composer.lock found");
      return Ok(VersionMap::new());
    }
    Err(err) => return Err(err.into()),
  };

  parse_platform_reqs(&raw)
}

fn parse_platform_reqs(raw: &[u8]) -> Result<VersionMap, PhpError> {
  let lock: ComposerLock = serde_json::from_slice(raw).map_err(PhpError::ComposerLock)?;

  let mut reqs = VersionMap::new();
  if let serde_json::Value::Object(platform) = lock.platform {
    for (req, constraint) in platform {
      if let (Some(ext), Some(constraint)) = (req.strip_prefix("ext-"), constraint.as_str()) {
        reqs.overwrite(ext, constraint);
      }
    }
  }

  Ok(reqs)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::statesolver::Source;
  use crate::util::testutil::MockSolver;

  #[test]
  fn keeps_extension_requirements_only() {
    let raw = br#"{"packages": [], "platform": {"php": "^7.2", "ext-intl": "*", "ext-redis": "^5.1"}}"#;

    let reqs = parse_platform_reqs(raw).unwrap();

    assert_eq!(reqs, [("intl", "*"), ("redis", "^5.1")].into_iter().collect());
  }

  #[test]
  fn empty_platform_is_an_array() {
    let reqs = parse_platform_reqs(br#"{"platform": []}"#).unwrap();
    assert!(reqs.is_empty());
  }

  #[test]
  fn invalid_json_is_an_error() {
    assert!(matches!(parse_platform_reqs(b"{"), Err(PhpError::ComposerLock(_))));
  }

  #[tokio::test]
  async fn reads_composer_lock_from_context() {
    let context = Context::local(".");
    let solver = MockSolver::default().with_file(
      Source::BuildContext(context.clone()),
      "composer.lock",
      r#"{"platform": {"ext-soap": "*"}}"#,
    );

    let reqs = load_platform_reqs(&CancellationToken::new(), &solver, &context)
      .await
      .unwrap();

    assert_eq!(reqs, [("soap", "*")].into_iter().collect());
  }

  #[tokio::test]
  async fn missing_composer_lock_is_not_an_error() {
    let reqs = load_platform_reqs(&CancellationToken::new(), &MockSolver::default(), &Context::local("."))
      .await
      .unwrap();

    assert!(reqs.is_empty());
  }
}
