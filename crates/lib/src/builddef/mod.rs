//! Kind-agnostic definition model.
//!
//! A [`BuildDef`] is the raw representation of a definition file: its `kind`
//! and the open mappings of its configuration and lock data. Specialized
//! kinds (see [`crate::defkinds`]) decode these mappings into closed,
//! strictly validated structs.

mod context;
mod external_file;
mod healthcheck;
mod opts;
mod osrelease;
mod version_map;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::warn;

use crate::util::hash::{HashError, Hashable};

pub use context::{Context, ContextType};
pub use external_file::ExternalFile;
pub use healthcheck::{
  Healthcheck, HealthcheckCmd, HealthcheckConfig, HealthcheckError, HealthcheckRequest, HealthcheckType,
};
pub use opts::{BuildOpts, UpdateLocksOpts, lock_filepath};
pub use osrelease::OsRelease;
pub use version_map::VersionMap;

/// Key of the lock file holding the hash of the definition it was generated from.
pub const DEFHASH_KEY: &str = "defhash";

/// Key under which kinds embed a webserver definition (and its locks).
pub const WEBSERVER_KEY: &str = "webserver";

/// Errors raised while parsing or decoding definitions and locks.
#[derive(Debug, Error)]
pub enum DefError {
  #[error("could not decode {file}: {source}")]
  Parse {
    file: String,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("could not decode {file}: top-level value is not a mapping")]
  NotAMapping { file: String },

  #[error("{file} has no kind")]
  MissingKind { file: String },

  #[error("could not decode {what}: {source}")]
  Decode {
    what: String,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("could not encode locks: {0}")]
  EncodeLocks(#[source] serde_yaml::Error),

  #[error("could not encode locks: locks are not a mapping")]
  LocksNotAMapping,

  #[error("invalid context type {0:?}: only \"local\" and \"git\" are supported")]
  InvalidContextType(String),

  #[error("invalid context: {0}")]
  InvalidContext(String),

  #[error("invalid os-release content: {0}")]
  InvalidOsRelease(String),

  #[error("could not hash definition: {0}")]
  Hash(#[from] HashError),
}

/// A definition as declared in a zbuild file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildDef {
  pub kind: String,
  /// Every top-level key except `kind`.
  pub raw_config: Mapping,
  /// Content of the lock file. Empty when there's no lock file.
  pub raw_locks: Mapping,
}

#[derive(Serialize)]
struct HashedDef<'a> {
  kind: &'a str,
  raw_config: &'a Mapping,
}

impl Hashable for HashedDef<'_> {}

impl BuildDef {
  /// Parses the content of a definition file. `file` is only used in errors.
  pub fn parse(file: &str, content: &[u8]) -> Result<Self, DefError> {
    let mut raw = parse_mapping(file, content)?;
    let kind = match raw.remove("kind") {
      Some(Value::String(kind)) if !kind.is_empty() => kind,
      _ => {
        return Err(DefError::MissingKind { file: file.to_string() });
      }
    };

    Ok(Self {
      kind,
      raw_config: raw,
      raw_locks: Mapping::new(),
    })
  }

  /// Parses the content of a lock file and attaches it to the definition.
  pub fn with_locks(mut self, file: &str, content: &[u8]) -> Result<Self, DefError> {
    self.raw_locks = parse_mapping(file, content)?;
    Ok(self)
  }

  /// Hashes the kind and raw config. Locks are not part of the hash.
  pub fn hash(&self) -> Result<String, DefError> {
    let hashed = HashedDef {
      kind: &self.kind,
      raw_config: &self.raw_config,
    };
    Ok(hashed.compute_hash()?.0)
  }

  /// Returns the definition hash recorded in the lock file, if any.
  pub fn locked_hash(&self) -> Option<&str> {
    self.raw_locks.get(DEFHASH_KEY).and_then(Value::as_str)
  }

  /// Builds the webserver definition embedded in this one, along with its
  /// nested locks.
  pub fn webserver_def(&self) -> BuildDef {
    BuildDef {
      kind: WEBSERVER_KEY.to_string(),
      raw_config: nested_mapping(&self.raw_config, WEBSERVER_KEY),
      raw_locks: nested_mapping(&self.raw_locks, WEBSERVER_KEY),
    }
  }
}

fn parse_mapping(file: &str, content: &[u8]) -> Result<Mapping, DefError> {
  let value: Value = serde_yaml::from_slice(content).map_err(|source| DefError::Parse {
    file: file.to_string(),
    source,
  })?;

  match value {
    Value::Mapping(map) => Ok(map),
    Value::Null => Ok(Mapping::new()),
    _ => Err(DefError::NotAMapping { file: file.to_string() }),
  }
}

fn nested_mapping(parent: &Mapping, key: &str) -> Mapping {
  match parent.get(key) {
    Some(Value::Mapping(map)) => map.clone(),
    _ => Mapping::new(),
  }
}

/// Removes `keys` from `raw` and returns them in a separate mapping.
///
/// Kinds use this to split definition-level parameters from the base stage
/// parameters inlined at the top level, before decoding each half strictly.
pub fn take_keys(raw: &mut Mapping, keys: &[&str]) -> Mapping {
  let mut taken = Mapping::new();
  for key in keys {
    if let Some(value) = raw.remove(*key) {
      taken.insert(Value::String((*key).to_string()), value);
    }
  }
  taken
}

/// Strictly decodes a raw mapping into `T`.
pub fn decode<T: DeserializeOwned>(what: &str, raw: Mapping) -> Result<T, DefError> {
  serde_yaml::from_value(Value::Mapping(raw)).map_err(|source| DefError::Decode {
    what: what.to_string(),
    source,
  })
}

/// Common interface of every lock structure.
///
/// The returned mapping is what gets written to the lock file, so kinds can
/// be persisted uniformly and embedded under another kind's locks.
pub trait Locks: fmt::Debug + Send + Sync {
  fn raw_locks(&self) -> Result<Mapping, DefError>;
}

/// Serializes a lock structure into a mapping.
pub fn to_raw_locks<T: Serialize>(locks: &T) -> Result<Mapping, DefError> {
  match serde_yaml::to_value(locks).map_err(DefError::EncodeLocks)? {
    Value::Mapping(map) => Ok(map),
    Value::Null => Ok(Mapping::new()),
    _ => Err(DefError::LocksNotAMapping),
  }
}

/// Decodes the locks of a definition.
///
/// The definition hash and the embedded webserver locks are handled by the
/// builder and skipped here. An empty lock file decodes to `T::default()`.
pub fn decode_locks<T: DeserializeOwned + Default>(raw: &Mapping) -> Result<T, DefError> {
  let mut raw = raw.clone();
  raw.remove(DEFHASH_KEY);
  raw.remove(WEBSERVER_KEY);

  if raw.is_empty() {
    return Ok(T::default());
  }
  decode("lock file", raw)
}

/// A scalar YAML value read as a string (`7.4` and `"7.4"` are equivalent).
///
/// Unquoted floats lose their trailing zeros once parsed (`7.10` reads as
/// `7.1`), so they are reported. Integral floats keep one decimal (`8.0`).
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
  String(String),
  Int(i64),
  Float(f64),
  Bool(bool),
}

impl Scalar {
  pub(crate) fn into_string(self) -> String {
    match self {
      Scalar::String(s) => s,
      Scalar::Int(i) => i.to_string(),
      Scalar::Float(f) => {
        let value = if f.fract() == 0.0 && f.is_finite() {
          format!("{:.1}", f)
        } else {
          f.to_string()
        };
        warn!(value = %value, "unquoted version read as a number, quote it to keep it exact");
        value
      }
      Scalar::Bool(b) => b.to_string(),
    }
  }
}

/// Deserializes an optional scalar into an optional string.
pub(crate) fn deserialize_opt_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
  let raw: Option<Scalar> = Option::deserialize(deserializer)?;
  Ok(raw.map(Scalar::into_string))
}
