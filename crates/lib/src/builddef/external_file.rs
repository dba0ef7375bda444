use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
  !*value
}

/// A file fetched from a remote URL and added to the final image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalFile {
  pub url: String,
  /// Whether the downloaded file is a compressed archive.
  #[serde(default, skip_serializing_if = "is_false")]
  pub compressed: bool,
  /// Pattern of the file to extract from a compressed archive.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pattern: Option<String>,
  pub destination: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub checksum: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mode: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub owner: Option<String>,
}

impl ExternalFile {
  pub fn new(url: &str, destination: &str) -> Self {
    Self {
      url: url.to_string(),
      compressed: false,
      pattern: None,
      destination: destination.to_string(),
      checksum: None,
      mode: None,
      owner: None,
    }
  }
}
