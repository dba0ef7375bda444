use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::PhpError;
use super::extensions::is_core_extension;
use super::pecl::{ExtensionIndex, Stability, is_exact_version, resolve_constraint};
use crate::builddef::{Context, DefError, Locks, OsRelease, VersionMap, to_raw_locks};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DefinitionLocks {
  pub base_image: String,
  pub osrelease: OsRelease,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source_context: Option<Context>,
  pub stages: BTreeMap<String, StageLocks>,
}

impl Locks for DefinitionLocks {
  fn raw_locks(&self) -> Result<Mapping, DefError> {
    to_raw_locks(self)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StageLocks {
  pub system_packages: VersionMap,
  pub extensions: VersionMap,
}

/// Pins extension versions.
///
/// Core extensions are compiled from the PHP sources so their constraint is
/// kept as-is, and so are exact community extension versions. Other
/// constraints are resolved against the published releases: `*` selects the
/// latest release, `~5.1.0` the latest 5.1 release. A `@beta` suffix also
/// accepts beta releases.
pub async fn lock_extensions(
  ctx: &CancellationToken,
  index: &dyn ExtensionIndex,
  extensions: &VersionMap,
) -> Result<VersionMap, PhpError> {
  let mut resolved = VersionMap::new();

  for (name, constraint) in extensions.iter() {
    if is_core_extension(name) {
      resolved.overwrite(name, constraint);
      continue;
    }

    let (constraint, stability) = match constraint.split_once('@') {
      Some((constraint, stability)) => (constraint, stability.parse::<Stability>()?),
      None => (constraint.as_str(), Stability::Stable),
    };

    if is_exact_version(constraint) {
      resolved.overwrite(name, constraint);
      continue;
    }

    let releases = index.releases(ctx, name).await?;
    let version =
      resolve_constraint(name, &releases, constraint, stability)?.ok_or_else(|| PhpError::ExtensionNotFound {
        name: name.clone(),
        constraint: constraint.to_string(),
        stability,
      })?;
    debug!(extension = %name, constraint = %constraint, version = %version, "extension locked");
    resolved.overwrite(name, &version);
  }

  Ok(resolved)
}
