use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::NodeJsError;
use super::locks::DefinitionLocks;
use crate::builddef::{BuildDef, Context, ExternalFile, VersionMap, WEBSERVER_KEY, decode, decode_locks, take_keys};
use crate::stage::{self, BASE_STAGE, DerivedStage, DerivedStageSet, StageConfig, append, override_opt};

const DEFINITION_KEYS: &[&str] = &["base", "version", "alpine", "frontend", "stages", "source_context"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Stage {
  pub external_files: Vec<ExternalFile>,
  pub system_packages: VersionMap,
  pub global_packages: VersionMap,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub build_command: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub command: Option<Vec<String>>,
  /// Files copied into the image, keyed by their path in the build context.
  pub config_files: BTreeMap<String, String>,
  pub sources: Vec<String>,
  pub stateful_dirs: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub healthcheck: Option<bool>,
}

impl StageConfig for Stage {
  fn merge(&self, overriding: &Self) -> Self {
    let mut system_packages = self.system_packages.clone();
    system_packages.merge(&overriding.system_packages);
    let mut global_packages = self.global_packages.clone();
    global_packages.merge(&overriding.global_packages);
    let mut config_files = self.config_files.clone();
    config_files.extend(overriding.config_files.clone());

    Self {
      external_files: append(&self.external_files, &overriding.external_files),
      system_packages,
      global_packages,
      build_command: override_opt(&self.build_command, &overriding.build_command),
      command: override_opt(&self.command, &overriding.command),
      config_files,
      sources: append(&self.sources, &overriding.sources),
      stateful_dirs: append(&self.stateful_dirs, &overriding.stateful_dirs),
      healthcheck: override_opt(&self.healthcheck, &overriding.healthcheck),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct DefinitionParams {
  base: Option<String>,
  #[serde(deserialize_with = "crate::builddef::deserialize_opt_scalar")]
  version: Option<String>,
  alpine: bool,
  frontend: bool,
  stages: DerivedStageSet<Stage>,
  source_context: Option<Context>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
  pub base_stage: Stage,
  pub base_image: String,
  pub version: String,
  pub alpine: bool,
  /// Frontend applications are served by a webserver and never run as is.
  pub frontend: bool,
  pub stages: DerivedStageSet<Stage>,
  pub source_context: Option<Context>,
  pub locks: DefinitionLocks,
}

fn default_stages() -> DerivedStageSet<Stage> {
  [
    ("dev".to_string(), DerivedStage::new(BASE_STAGE, Some(true), Stage::default())),
    ("prod".to_string(), DerivedStage::new(BASE_STAGE, Some(false), Stage::default())),
  ]
  .into_iter()
  .collect()
}

impl Definition {
  pub fn from_build_def(def: &BuildDef) -> Result<Self, NodeJsError> {
    let mut raw = def.raw_config.clone();
    raw.remove(WEBSERVER_KEY);

    let params: DefinitionParams = decode("nodejs definition", take_keys(&mut raw, DEFINITION_KEYS))?;
    let base_stage: Stage = decode("nodejs base stage", raw)?;

    if params.version.is_some() && params.base.is_some() {
      return Err(NodeJsError::VersionAndBase);
    }
    if let Some(context) = &params.source_context {
      context.validate()?;
    }

    let version = params.version.unwrap_or_default();
    let base_image = match params.base {
      Some(base) => base,
      None => {
        let flavor = if params.alpine { "alpine" } else { "buster-slim" };
        format!("docker.io/library/node:{}-{}", version, flavor)
      }
    };

    let base_stage = Stage {
      healthcheck: Some(true),
      ..Stage::default()
    }
    .merge(&base_stage);

    Ok(Self {
      base_stage,
      base_image,
      version,
      alpine: params.alpine,
      frontend: params.frontend,
      stages: default_stages().merge(&params.stages),
      source_context: params.source_context,
      locks: decode_locks(&def.raw_locks)?,
    })
  }

  pub fn resolve_stage(&self, name: &str) -> Result<StageDefinition, NodeJsError> {
    let merged = stage::resolve(&self.base_stage, &self.stages, name)?;

    let mut stage_def = StageDefinition {
      name: name.to_string(),
      base_image: self.base_image.clone(),
      version: self.version.clone(),
      dev: merged.dev,
      frontend: self.frontend,
      stage: merged.stage,
    };
    if stage_def.dev || stage_def.frontend {
      stage_def.stage.healthcheck = Some(false);
    }

    debug!(stage = %name, dev = stage_def.dev, frontend = stage_def.frontend, "nodejs stage resolved");
    Ok(stage_def)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDefinition {
  pub name: String,
  pub base_image: String,
  pub version: String,
  pub dev: bool,
  pub frontend: bool,
  #[serde(flatten)]
  pub stage: Stage,
}

impl StageDefinition {
  pub fn healthcheck(&self) -> bool {
    self.stage.healthcheck.unwrap_or(false)
  }

  /// Arguments of the global packages install command, `name@constraint`
  /// for pinned packages.
  pub fn global_package_specs(&self) -> Vec<String> {
    self
      .stage
      .global_packages
      .iter()
      .map(|(name, constraint)| match constraint.as_str() {
        "" | "*" => name.clone(),
        constraint => format!("{}@{}", name, constraint),
      })
      .collect()
  }
}
