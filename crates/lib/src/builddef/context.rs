use std::fmt;

use serde::{Deserialize, Serialize};

use super::DefError;

/// Type of build context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
  #[default]
  Local,
  Git,
}

impl ContextType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Local => "local",
      Self::Git => "git",
    }
  }
}

impl fmt::Display for ContextType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Where the source files of a build come from.
///
/// A local context is a named directory available at build time. A git
/// context points to a remote repository, optionally at a given reference
/// and within a given sub-directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Context {
  #[serde(rename = "type", default)]
  pub kind: ContextType,
  /// Name of the local context or URI of the remote repository.
  pub source: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub reference: String,
  /// Root dir of the context within the git repository.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub path: String,
}

impl Context {
  /// Parses a context from its source string.
  ///
  /// A source prefixed with `git://`, or an explicit `git` type, produces a
  /// git context. Its fragment is read as `ref[:subdir]`. An explicit `local`
  /// type disables any inference on the source format.
  pub fn parse(source: &str, context_type: Option<&str>) -> Result<Self, DefError> {
    let context = match context_type {
      Some("git") => Self::parse_git(source),
      Some("local") => Self::local(source),
      Some(other) => return Err(DefError::InvalidContextType(other.to_string())),
      None if source.starts_with("git://") => Self::parse_git(source),
      None => Self::local(source),
    };

    context.validate()?;
    Ok(context)
  }

  pub fn local(source: &str) -> Self {
    Self {
      kind: ContextType::Local,
      source: source.to_string(),
      reference: String::new(),
      path: String::new(),
    }
  }

  fn parse_git(source: &str) -> Self {
    let (uri, fragment) = source.split_once('#').unwrap_or((source, ""));
    let (reference, path) = fragment.split_once(':').unwrap_or((fragment, ""));

    Self {
      kind: ContextType::Git,
      source: uri.to_string(),
      reference: reference.to_string(),
      path: path.to_string(),
    }
  }

  pub fn validate(&self) -> Result<(), DefError> {
    if self.source.is_empty() {
      return Err(DefError::InvalidContext("context source is empty".to_string()));
    }
    Ok(())
  }

  pub fn is_git(&self) -> bool {
    self.kind == ContextType::Git
  }

  pub fn is_local(&self) -> bool {
    self.kind == ContextType::Local
  }
}

impl fmt::Display for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      ContextType::Local => write!(f, "{}", self.source),
      ContextType::Git => {
        write!(f, "{}", self.source)?;
        if !self.reference.is_empty() || !self.path.is_empty() {
          write!(f, "#{}", self.reference)?;
        }
        if !self.path.is_empty() {
          write!(f, ":{}", self.path)?;
        }
        Ok(())
      }
    }
  }
}
