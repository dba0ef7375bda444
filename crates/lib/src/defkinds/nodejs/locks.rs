use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

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
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builddef::decode_locks;

  #[test]
  fn raw_locks_round_trip() {
    let mut locks = DefinitionLocks {
      base_image: "docker.io/library/node:12-buster-slim@sha256:abc".to_string(),
      source_context: Some(Context::parse("git://github.com/some/repo#0123abc", None).unwrap()),
      ..Default::default()
    };
    locks.stages.insert(
      "prod".to_string(),
      StageLocks {
        system_packages: [("ca-certificates", "20190110")].into_iter().collect(),
      },
    );

    let decoded: DefinitionLocks = decode_locks(&locks.raw_locks().unwrap()).unwrap();

    assert_eq!(decoded, locks);
  }
}
