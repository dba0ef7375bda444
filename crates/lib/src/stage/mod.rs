//! Generic stage resolution engine.
//!
//! Every kind declares a base stage and a set of named stages deriving from
//! one another (single parent). Resolving a stage walks its derivation chain
//! up to the implicit `base` stage and merges the chain ancestors first:
//!
//! - optional values are replaced when set by the overriding stage
//! - lists are appended (ancestor first)
//! - maps are merged key-wise, the overriding stage winning
//!
//! Kinds implement [`StageConfig`] on their stage type and layer their own
//! validation and inference on top of [`resolve`].

use std::collections::{BTreeMap, HashSet};

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

/// Name of the implicit root stage.
pub const BASE_STAGE: &str = "base";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
  #[error("stage {0:?} not found")]
  NotFound(String),

  #[error("there's a cyclic dependency between {0:?} and itself")]
  CyclicDependency(String),
}

/// Properties of a stage that can be overridden by derived stages.
pub trait StageConfig: Clone {
  /// Returns a copy of `self` with `overriding` applied on top of it.
  fn merge(&self, overriding: &Self) -> Self;
}

/// A stage along with its parent stage and its dev mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedStage<S> {
  #[serde(flatten)]
  pub stage: S,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub derive_from: String,
  /// `None` means the dev mode of the parent stage is kept.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dev: Option<bool>,
}

impl<S: StageConfig> DerivedStage<S> {
  pub fn new(derive_from: &str, dev: Option<bool>, stage: S) -> Self {
    Self {
      stage,
      derive_from: derive_from.to_string(),
      dev,
    }
  }

  pub fn merge(&self, overriding: &Self) -> Self {
    Self {
      stage: self.stage.merge(&overriding.stage),
      derive_from: overriding.derive_from.clone(),
      dev: overriding.dev.or(self.dev),
    }
  }
}

// `derive_from` and `dev` are split from the mapping by hand so the stage
// properties can still be decoded with `deny_unknown_fields`.
impl<'de, S: DeserializeOwned> Deserialize<'de> for DerivedStage<S> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let mut raw = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();

    let derive_from = match raw.remove("derive_from") {
      None | Some(Value::Null) => String::new(),
      Some(Value::String(parent)) => parent,
      Some(_) => return Err(D::Error::custom("derive_from must be a stage name")),
    };
    let dev = match raw.remove("dev") {
      None | Some(Value::Null) => None,
      Some(Value::Bool(dev)) => Some(dev),
      Some(_) => return Err(D::Error::custom("dev must be a boolean")),
    };
    let stage = serde_yaml::from_value(Value::Mapping(raw)).map_err(D::Error::custom)?;

    Ok(Self {
      stage,
      derive_from,
      dev,
    })
  }
}

/// Named stages of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent, bound(deserialize = "S: DeserializeOwned"))]
pub struct DerivedStageSet<S>(pub BTreeMap<String, DerivedStage<S>>);

impl<S> Default for DerivedStageSet<S> {
  fn default() -> Self {
    Self(BTreeMap::new())
  }
}

impl<S: StageConfig> DerivedStageSet<S> {
  pub fn get(&self, name: &str) -> Option<&DerivedStage<S>> {
    self.0.get(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &String> {
    self.0.keys()
  }

  /// Stages absent from `self` are added as-is, the others are merged.
  pub fn merge(&self, overriding: &Self) -> Self {
    let mut merged = self.0.clone();
    for (name, stage) in &overriding.0 {
      let stage = match merged.get(name) {
        Some(base) => base.merge(stage),
        None => stage.clone(),
      };
      merged.insert(name.clone(), stage);
    }
    Self(merged)
  }
}

impl<S> FromIterator<(String, DerivedStage<S>)> for DerivedStageSet<S> {
  fn from_iter<I: IntoIterator<Item = (String, DerivedStage<S>)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

/// Walks the derivation chain of `name` up to the base stage.
///
/// The chain is ordered most-derived first.
pub fn resolve_stage_chain<'a, S: StageConfig>(
  stages: &'a DerivedStageSet<S>,
  name: &str,
) -> Result<Vec<&'a DerivedStage<S>>, StageError> {
  let mut chain = Vec::with_capacity(stages.0.len());
  let mut visited = HashSet::new();
  let mut current = name;

  while !current.is_empty() && current != BASE_STAGE {
    if !visited.insert(current) {
      return Err(StageError::CyclicDependency(current.to_string()));
    }

    let stage = stages.get(current).ok_or_else(|| StageError::NotFound(current.to_string()))?;
    chain.push(stage);
    current = &stage.derive_from;
  }

  Ok(chain)
}

/// A stage merged with all its ancestors.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedStage<S> {
  pub stage: S,
  pub dev: bool,
}

/// Merges a derivation chain (most-derived first) on top of a copy of `base`.
pub fn merge_stages<S: StageConfig>(base: &S, chain: &[&DerivedStage<S>]) -> MergedStage<S> {
  let mut merged = MergedStage {
    stage: base.clone(),
    dev: false,
  };

  for derived in chain.iter().rev() {
    merged.stage = merged.stage.merge(&derived.stage);
    if let Some(dev) = derived.dev {
      merged.dev = dev;
    }
  }

  merged
}

/// Resolves the stage `name` by walking its chain and merging it on top of
/// the base stage.
pub fn resolve<S: StageConfig>(
  base: &S,
  stages: &DerivedStageSet<S>,
  name: &str,
) -> Result<MergedStage<S>, StageError> {
  let chain = resolve_stage_chain(stages, name)?;
  debug!(stage = %name, depth = chain.len(), "resolved stage chain");
  Ok(merge_stages(base, &chain))
}

/// Appends `overriding` to a copy of `base`.
pub fn append<T: Clone>(base: &[T], overriding: &[T]) -> Vec<T> {
  base.iter().chain(overriding).cloned().collect()
}

/// Returns the overriding value when set, the base value otherwise.
pub fn override_opt<T: Clone>(base: &Option<T>, overriding: &Option<T>) -> Option<T> {
  overriding.clone().or_else(|| base.clone())
}
