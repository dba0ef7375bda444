//! Container healthchecks declared in definition files.
//!
//! A healthcheck is either a boolean toggle, resolved against the default
//! config of the kind, or a structured config:
//!
//! ```yaml
//! healthcheck:
//!   type: fcgi
//!   fcgi: { path: /ping, expected: pong }
//!   interval: 10s
//!   timeout: 1s
//!   retries: 3
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HealthcheckError {
  #[error("healthcheck type {0} is not supported here")]
  UnsupportedType(HealthcheckType),

  #[error("healthcheck type {0} requires a {0} section")]
  MissingSection(HealthcheckType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthcheckType {
  Disabled,
  Http,
  Fcgi,
  Cmd,
}

impl fmt::Display for HealthcheckType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      HealthcheckType::Disabled => "disabled",
      HealthcheckType::Http => "http",
      HealthcheckType::Fcgi => "fcgi",
      HealthcheckType::Cmd => "cmd",
    };
    f.write_str(name)
  }
}

/// A request whose response body must equal `expected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthcheckRequest {
  pub path: String,
  pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthcheckCmd {
  /// Run `command` through the image shell.
  #[serde(default)]
  pub shell: bool,
  pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthcheckConfig {
  #[serde(rename = "type")]
  pub kind: HealthcheckType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub http: Option<HealthcheckRequest>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fcgi: Option<HealthcheckRequest>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cmd: Option<HealthcheckCmd>,
  #[serde(default = "default_interval", with = "human_duration")]
  pub interval: Duration,
  #[serde(default = "default_timeout", with = "human_duration")]
  pub timeout: Duration,
  #[serde(default = "default_retries")]
  pub retries: u32,
}

fn default_interval() -> Duration {
  Duration::from_secs(10)
}

fn default_timeout() -> Duration {
  Duration::from_secs(1)
}

fn default_retries() -> u32 {
  3
}

impl HealthcheckConfig {
  /// FastCGI request sent to `127.0.0.1:9000`.
  pub fn fcgi(path: &str, expected: &str) -> Self {
    Self {
      kind: HealthcheckType::Fcgi,
      http: None,
      fcgi: Some(HealthcheckRequest {
        path: path.to_string(),
        expected: expected.to_string(),
      }),
      cmd: None,
      interval: default_interval(),
      timeout: default_timeout(),
      retries: default_retries(),
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.kind != HealthcheckType::Disabled
  }

  /// Checks the type is one of `allowed` and comes with its section.
  pub fn validate(&self, allowed: &[HealthcheckType]) -> Result<(), HealthcheckError> {
    if !self.is_enabled() {
      return Ok(());
    }
    if !allowed.contains(&self.kind) {
      return Err(HealthcheckError::UnsupportedType(self.kind));
    }

    let has_section = match self.kind {
      HealthcheckType::Http => self.http.is_some(),
      HealthcheckType::Fcgi => self.fcgi.is_some(),
      HealthcheckType::Cmd => self.cmd.is_some(),
      HealthcheckType::Disabled => true,
    };
    if !has_section {
      return Err(HealthcheckError::MissingSection(self.kind));
    }
    Ok(())
  }

  /// The image `HEALTHCHECK` test, in its exec form.
  pub fn test(&self) -> Vec<String> {
    match (self.kind, &self.http, &self.fcgi, &self.cmd) {
      (HealthcheckType::Http, Some(req), _, _) => vec![
        "CMD".to_string(),
        format!(
          "http_proxy= test \"$(curl --fail http://127.0.0.1/{})\" = \"{}\"",
          req.path.trim_start_matches('/'),
          req.expected
        ),
      ],
      (HealthcheckType::Fcgi, _, Some(req), _) => vec![
        "CMD".to_string(),
        format!(
          "http_proxy= test \"$(fcgi-client get 127.0.0.1:9000 {})\" = \"{}\"",
          req.path, req.expected
        ),
      ],
      (HealthcheckType::Cmd, _, _, Some(cmd)) => {
        let form = if cmd.shell { "CMD-SHELL" } else { "CMD" };
        std::iter::once(form.to_string()).chain(cmd.command.iter().cloned()).collect()
      }
      _ => vec!["NONE".to_string()],
    }
  }
}

/// A healthcheck as written in a definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Healthcheck {
  Toggle(bool),
  Config(HealthcheckConfig),
}

impl Healthcheck {
  /// The effective config, `None` when disabled. `true` stands for `default`.
  pub fn resolve(&self, default: &HealthcheckConfig) -> Option<HealthcheckConfig> {
    match self {
      Healthcheck::Toggle(true) => Some(default.clone()),
      Healthcheck::Toggle(false) => None,
      Healthcheck::Config(config) if config.is_enabled() => Some(config.clone()),
      Healthcheck::Config(_) => None,
    }
  }

  pub fn validate(&self, allowed: &[HealthcheckType]) -> Result<(), HealthcheckError> {
    match self {
      Healthcheck::Toggle(_) => Ok(()),
      Healthcheck::Config(config) => config.validate(allowed),
    }
  }
}

mod human_duration {
  use std::time::Duration;

  use serde::de::Error;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*duration))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(D::Error::custom)
  }
}
