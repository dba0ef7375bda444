//! Resolved build plans.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::builddef::Context;

/// Everything needed to build one stage: the resolved stage configuration
/// together with its locks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildPlan {
  pub kind: String,
  pub stage: String,
  /// Pinned reference of the base image.
  pub base_image: String,
  pub build_context: Context,
  pub dev: bool,
  pub definition: serde_json::Value,
  pub locks: serde_json::Value,
  /// Kind-specific build arguments.
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub args: BTreeMap<String, String>,
  /// The plan this one copies files from (e.g. a webserver copying assets
  /// from the application stage).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source: Option<Box<BuildPlan>>,
}

impl BuildPlan {
  pub fn new<D: Serialize, L: Serialize>(
    kind: &str,
    stage: &str,
    base_image: &str,
    build_context: &Context,
    dev: bool,
    definition: &D,
    locks: &L,
  ) -> Result<Self, serde_json::Error> {
    Ok(Self {
      kind: kind.to_string(),
      stage: stage.to_string(),
      base_image: base_image.to_string(),
      build_context: build_context.clone(),
      dev,
      definition: serde_json::to_value(definition)?,
      locks: serde_json::to_value(locks)?,
      args: BTreeMap::new(),
      source: None,
    })
  }

  pub fn with_arg(mut self, name: &str, value: &str) -> Self {
    self.args.insert(name.to_string(), value.to_string());
    self
  }

  pub fn with_source(mut self, source: BuildPlan) -> Self {
    self.source = Some(Box::new(source));
    self
  }
}
