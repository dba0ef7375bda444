//! PECL extension index.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use regex::Regex;
use semver::{Prerelease, Version, VersionReq};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::PhpError;

pub const DEFAULT_PECL_URL: &str = "https://pecl.php.net/rest/r";

/// Release stability, as published by PECL. Variants are ordered from the
/// most to the least stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
  #[default]
  Stable,
  Beta,
  Alpha,
  Devel,
}

impl Stability {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Stable => "stable",
      Self::Beta => "beta",
      Self::Alpha => "alpha",
      Self::Devel => "devel",
    }
  }
}

impl FromStr for Stability {
  type Err = PhpError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "stable" => Ok(Self::Stable),
      "beta" => Ok(Self::Beta),
      "alpha" => Ok(Self::Alpha),
      "devel" => Ok(Self::Devel),
      _ => Err(PhpError::InvalidStability(s.to_string())),
    }
  }
}

impl fmt::Display for Stability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A published release of an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
  pub version: String,
  pub stability: Stability,
}

impl Release {
  pub fn new(version: &str, stability: Stability) -> Self {
    Self {
      version: version.to_string(),
      stability,
    }
  }
}

/// Lists the releases of community extensions.
#[async_trait]
pub trait ExtensionIndex: Send + Sync {
  /// Returns every known release of `name`, or an empty list when the
  /// extension is unknown.
  async fn releases(&self, ctx: &CancellationToken, name: &str) -> Result<Vec<Release>, PhpError>;
}

/// Whether `constraint` names a single version rather than a range.
pub fn is_exact_version(constraint: &str) -> bool {
  constraint.starts_with(|c: char| c.is_ascii_digit())
    && !constraint.contains(['*', ' ', ',', '|'])
    && !constraint.ends_with(".x")
}

/// Picks the highest release matching `constraint` that is at least as
/// stable as `stability`. An empty constraint or `*` matches any release,
/// prereleases included.
pub fn resolve_constraint(
  name: &str,
  releases: &[Release],
  constraint: &str,
  stability: Stability,
) -> Result<Option<String>, PhpError> {
  let reqs = if constraint.is_empty() || constraint == "*" {
    None
  } else {
    Some(parse_constraint(constraint).map_err(|source| PhpError::InvalidConstraint {
      name: name.to_string(),
      constraint: constraint.to_string(),
      source,
    })?)
  };

  let best = releases
    .iter()
    .filter(|release| release.stability <= stability)
    .filter_map(|release| parse_pecl_version(&release.version).map(|parsed| (parsed, release)))
    .filter(|(parsed, _)| match &reqs {
      Some(reqs) => {
        let base = Version::new(parsed.major, parsed.minor, parsed.patch);
        reqs.iter().any(|req| req.matches(&base))
      }
      None => true,
    })
    .max_by(|(a, _), (b, _)| a.cmp(b));

  Ok(best.map(|(_, release)| release.version.clone()))
}

/// Parses composer-style constraints: `||` separates alternatives and
/// whitespace separates comparators that must all match. Prereleases are
/// matched on their `major.minor.patch` part, stability filtering applies
/// separately.
fn parse_constraint(constraint: &str) -> Result<Vec<VersionReq>, semver::Error> {
  constraint
    .split("||")
    .map(|alternative| {
      let mut comparators: Vec<String> = Vec::new();
      for token in alternative.split([' ', ',']).filter(|t| !t.is_empty()) {
        match comparators.last_mut() {
          Some(last) if last.chars().all(|c| "<>=~^!".contains(c)) => last.push_str(token),
          _ => comparators.push(token.to_string()),
        }
      }
      let comparators: Vec<String> = comparators.iter().map(|c| composer_tilde(c)).collect();
      VersionReq::parse(&comparators.join(", "))
    })
    .collect()
}

/// Composer reads `~X.Y` as `>=X.Y, <X+1`, semver as `>=X.Y, <X.Y+1`.
fn composer_tilde(comparator: &str) -> String {
  let Some(version) = comparator.strip_prefix('~').filter(|v| !v.starts_with(['>', '='])) else {
    return comparator.to_string();
  };

  let parts: Vec<&str> = version.split('.').collect();
  match (parts.as_slice(), parts.first().and_then(|major| major.parse::<u64>().ok())) {
    ([_, minor], Some(major)) => format!(">={}.{}.0, <{}.0.0", major, minor, major + 1),
    _ => comparator.to_string(),
  }
}

/// Converts PECL versions (`5.1.1`, `2.9.0RC1`, `1.0`) to semver.
fn parse_pecl_version(version: &str) -> Option<Version> {
  let split_at = version.find(|c: char| c.is_ascii_alphabetic()).unwrap_or(version.len());
  let (core, pre) = version.split_at(split_at);

  let mut parts = core.trim_end_matches(['.', '-']).split('.');
  let major = parts.next()?.parse().ok()?;
  let minor = parts.next().map_or(Ok(0), |p| p.parse::<u64>()).ok()?;
  let patch = parts.next().map_or(Ok(0), |p| p.parse::<u64>()).ok()?;
  if parts.next().is_some() {
    return None;
  }

  let mut parsed = Version::new(major, minor, patch);
  if !pre.is_empty() {
    parsed.pre = Prerelease::new(pre).ok()?;
  }
  Some(parsed)
}

/// Extracts `(version, stability)` pairs from an `allreleases.xml` document.
fn parse_all_releases(xml: &str) -> Result<Vec<Release>, regex::Error> {
  let exp = Regex::new(r"<r>\s*<v>([^<]+)</v>\s*<s>([^<]+)</s>")?;

  Ok(
    exp
      .captures_iter(xml)
      .filter_map(|caps| {
        let stability = caps[2].trim().parse().ok()?;
        Some(Release::new(caps[1].trim(), stability))
      })
      .collect(),
  )
}

/// Queries the PECL REST API.
#[derive(Debug, Clone)]
pub struct PeclIndex {
  base_url: String,
}

impl Default for PeclIndex {
  fn default() -> Self {
    Self::new(DEFAULT_PECL_URL)
  }
}

impl PeclIndex {
  pub fn new(base_url: &str) -> Self {
    Self {
      base_url: base_url.trim_end_matches('/').to_string(),
    }
  }

  fn releases_url(&self, name: &str) -> String {
    format!("{}/{}/allreleases.xml", self.base_url, name.to_lowercase())
  }

  async fn fetch(&self, url: &str) -> Result<Vec<Release>, PhpError> {
    let pecl_err = |message: String| PhpError::Pecl {
      url: url.to_string(),
      message,
    };

    let response = reqwest::get(url).await.map_err(|e| pecl_err(e.to_string()))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(Vec::new());
    }
    if !response.status().is_success() {
      return Err(pecl_err(format!("HTTP {}", response.status())));
    }

    let body = response.text().await.map_err(|e| pecl_err(e.to_string()))?;
    parse_all_releases(&body).map_err(|e| pecl_err(e.to_string()))
  }
}

#[async_trait]
impl ExtensionIndex for PeclIndex {
  async fn releases(&self, ctx: &CancellationToken, name: &str) -> Result<Vec<Release>, PhpError> {
    let url = self.releases_url(name);
    debug!(url = %url, "querying PECL");

    tokio::select! {
      biased;
      _ = ctx.cancelled() => Err(PhpError::Cancelled),
      releases = self.fetch(&url) => releases,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn redis_releases() -> Vec<Release> {
    vec![
      Release::new("6.0.0RC1", Stability::Beta),
      Release::new("5.3.1", Stability::Stable),
      Release::new("5.1.1", Stability::Stable),
      Release::new("5.1.0", Stability::Stable),
      Release::new("5.1.0RC2", Stability::Beta),
      Release::new("4.3.0", Stability::Stable),
    ]
  }

  mod constraints {
    use super::*;

    #[test]
    fn tilde_range_picks_highest_patch() {
      let res = resolve_constraint("redis", &redis_releases(), "~5.1.0", Stability::Stable).unwrap();
      assert_eq!(res.as_deref(), Some("5.1.1"));
    }

    #[test]
    fn two_part_tilde_follows_composer() {
      let res = resolve_constraint("redis", &redis_releases(), "~5.1", Stability::Stable).unwrap();
      assert_eq!(res.as_deref(), Some("5.3.1"));

      let res = resolve_constraint("redis", &redis_releases(), "~6.0", Stability::Beta).unwrap();
      assert_eq!(res.as_deref(), Some("6.0.0RC1"));
    }

    #[test]
    fn caret_range_picks_highest_minor() {
      let res = resolve_constraint("redis", &redis_releases(), "^5.1", Stability::Stable).unwrap();
      assert_eq!(res.as_deref(), Some("5.3.1"));
    }

    #[test]
    fn composer_alternatives_and_comparators() {
      let releases = redis_releases();

      let res = resolve_constraint("redis", &releases, "^4.0 || ~5.1.0", Stability::Stable).unwrap();
      assert_eq!(res.as_deref(), Some("5.1.1"));

      let res = resolve_constraint("redis", &releases, ">= 4.0 <5.1", Stability::Stable).unwrap();
      assert_eq!(res.as_deref(), Some("4.3.0"));
    }

    #[test]
    fn wildcard_respects_stability() {
      let releases = redis_releases();

      let stable = resolve_constraint("redis", &releases, "*", Stability::Stable).unwrap();
      assert_eq!(stable.as_deref(), Some("5.3.1"));

      let beta = resolve_constraint("redis", &releases, "", Stability::Beta).unwrap();
      assert_eq!(beta.as_deref(), Some("6.0.0RC1"));
    }

    #[test]
    fn no_matching_release() {
      let res = resolve_constraint("redis", &redis_releases(), "^7.0", Stability::Stable).unwrap();
      assert_eq!(res, None);
    }

    #[test]
    fn invalid_constraint_is_an_error() {
      let err = resolve_constraint("redis", &redis_releases(), "~foo", Stability::Stable).unwrap_err();
      assert!(matches!(err, PhpError::InvalidConstraint { name, .. } if name == "redis"));
    }

    #[test]
    fn exact_versions() {
      assert!(is_exact_version("5.1.17"));
      assert!(is_exact_version("2.9.0RC1"));
      assert!(!is_exact_version("~5.1.0"));
      assert!(!is_exact_version("5.1.*"));
      assert!(!is_exact_version("5.1.x"));
      assert!(!is_exact_version(">=5.1"));
      assert!(!is_exact_version("*"));
    }
  }

  #[test]
  fn parses_pecl_versions() {
    assert_eq!(parse_pecl_version("5.1.1"), Some(Version::new(5, 1, 1)));
    assert_eq!(parse_pecl_version("1.0"), Some(Version::new(1, 0, 0)));
    assert_eq!(parse_pecl_version("2.9.0RC1"), Version::parse("2.9.0-RC1").ok());
    assert_eq!(parse_pecl_version("1.2.3.4"), None);
    assert_eq!(parse_pecl_version("latest"), None);
  }

  #[test]
  fn parses_all_releases_document() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8" ?>
<a xmlns="http://pear.php.net/dtd/rest.allreleases">
 <p>redis</p>
 <c>pecl.php.net</c>
 <r><v>5.3.1</v><s>stable</s></r>
 <r><v>5.3.0RC2</v><s>beta</s></r>
 <r><v>0.1</v><s>experimental</s></r>
</a>"#;

    let releases = parse_all_releases(xml).unwrap();

    assert_eq!(
      releases,
      vec![
        Release::new("5.3.1", Stability::Stable),
        Release::new("5.3.0RC2", Stability::Beta),
      ]
    );
  }

  #[test]
  fn releases_url_is_lowercased() {
    let index = PeclIndex::default();

    assert_eq!(
      index.releases_url("Redis"),
      "https://pecl.php.net/rest/r/redis/allreleases.xml"
    );
  }

  #[test]
  fn parses_stability() {
    assert_eq!("devel".parse::<Stability>().unwrap(), Stability::Devel);
    assert!(matches!(
      "nightly".parse::<Stability>(),
      Err(PhpError::InvalidStability(s)) if s == "nightly"
    ));
  }

  #[tokio::test]
  async fn cancelled_query_is_aborted() {
    let index = PeclIndex::new("http://127.0.0.1:9");
    let ctx = CancellationToken::new();
    ctx.cancel();

    let res = index.releases(&ctx, "redis").await;

    assert!(matches!(res, Err(PhpError::Cancelled)));
  }
}
