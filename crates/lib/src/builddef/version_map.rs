//! Name to version constraint maps.
//!
//! `VersionMap` backs every `system_packages`, `extensions` and
//! `global_packages` collection. A nil map (see [`VersionMap::nil`]) ignores
//! every write, which lets optional maps be passed around without branching.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A mapping from a dependency name to a version constraint or a resolved
/// version.
#[derive(Clone, PartialEq, Eq)]
pub struct VersionMap(Option<BTreeMap<String, String>>);

impl Default for VersionMap {
  fn default() -> Self {
    Self(Some(BTreeMap::new()))
  }
}

impl VersionMap {
  /// Creates an empty, writable map.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a nil map. All write operations on it are no-ops.
  pub fn nil() -> Self {
    Self(None)
  }

  #[cfg(test)]
  pub(crate) fn is_nil(&self) -> bool {
    self.0.is_none()
  }

  /// Inserts `version` for `name` unless `name` is already present.
  pub fn add(&mut self, name: &str, version: &str) {
    if let Some(map) = self.0.as_mut() {
      map.entry(name.to_string()).or_insert_with(|| version.to_string());
    }
  }

  /// Inserts or replaces the version of `name`.
  pub fn overwrite(&mut self, name: &str, version: &str) {
    if let Some(map) = self.0.as_mut() {
      map.insert(name.to_string(), version.to_string());
    }
  }

  /// Overwrites every entry present in `overriding`. Entries absent from
  /// `overriding` are preserved.
  pub fn merge(&mut self, overriding: &VersionMap) {
    let Some(map) = self.0.as_mut() else {
      return;
    };
    for (name, version) in overriding.iter() {
      map.insert(name.clone(), version.clone());
    }
  }

  pub fn remove(&mut self, name: &str) -> Option<String> {
    self.0.as_mut().and_then(|map| map.remove(name))
  }

  pub fn has(&self, name: &str) -> bool {
    self.0.as_ref().is_some_and(|map| map.contains_key(name))
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.0.as_ref().and_then(|map| map.get(name)).map(String::as_str)
  }

  /// Returns the names in the map, sorted.
  pub fn names(&self) -> Vec<String> {
    self.iter().map(|(name, _)| name.clone()).collect()
  }

  pub fn len(&self) -> usize {
    self.0.as_ref().map_or(0, BTreeMap::len)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
    self.0.iter().flat_map(|map| map.iter())
  }

  /// Returns an owned copy of the entries. A nil map yields an empty map.
  pub fn to_map(&self) -> BTreeMap<String, String> {
    self.0.clone().unwrap_or_default()
  }
}

impl fmt::Debug for VersionMap {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.0 {
      Some(map) => f.debug_map().entries(map.iter()).finish(),
      None => write!(f, "nil"),
    }
  }
}

impl From<BTreeMap<String, String>> for VersionMap {
  fn from(map: BTreeMap<String, String>) -> Self {
    Self(Some(map))
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VersionMap {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(Some(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect()))
  }
}

impl Serialize for VersionMap {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.0.serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for VersionMap {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw: Option<BTreeMap<String, super::Scalar>> = Option::deserialize(deserializer)?;
    Ok(Self(raw.map(|map| map.into_iter().map(|(k, v)| (k, v.into_string())).collect())))
  }
}
