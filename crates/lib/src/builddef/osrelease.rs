use serde::{Deserialize, Serialize};

use super::DefError;

/// Linux distribution details, as read from `/etc/os-release`.
///
/// Part of the definition locks. Used to select the package solver and the
/// OS-specific package tables during inference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OsRelease {
  pub name: String,
  #[serde(default)]
  pub version_name: String,
  #[serde(default)]
  pub version_id: String,
}

impl OsRelease {
  /// Parses the raw content of an os-release file.
  pub fn parse(raw: &[u8]) -> Result<Self, DefError> {
    let content = String::from_utf8_lossy(raw);
    let mut res = OsRelease::default();

    for line in content.lines() {
      let Some((key, value)) = line.split_once('=') else {
        continue;
      };
      let value = value.trim().trim_matches('"').to_string();

      match key.trim() {
        "ID" => res.name = value,
        "VERSION_CODENAME" => res.version_name = value,
        "VERSION_ID" => res.version_id = value,
        _ => {}
      }
    }

    if res.name.is_empty() {
      return Err(DefError::InvalidOsRelease("no field ID found".to_string()));
    }

    Ok(res)
  }

  /// Returns the family used by the package tables (`debian` or `alpine`).
  pub fn family(&self) -> &str {
    match self.name.as_str() {
      "ubuntu" => "debian",
      name => name,
    }
  }
}
