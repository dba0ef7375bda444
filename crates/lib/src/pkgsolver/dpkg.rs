//! Package resolution against Debian repository indexes.
//!
//! Instead of running `apt-cache` in the base image, this solver downloads
//! the `Packages.gz` index of each configured suite and looks packages up
//! locally. Indexes are cached on disk, keyed by their URL, and downloaded
//! again once older than the cache TTL.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PackageSolver, PkgSolverError, check_missing_packages, partition_pinned};
use crate::builddef::VersionMap;
use crate::util::hash::hash_bytes;

/// A Debian repository suite, e.g. `http://deb.debian.org/debian` + `buster`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpkgRepository {
  pub url: String,
  pub suite: String,
}

impl DpkgRepository {
  pub fn new(url: &str, suite: &str) -> Self {
    Self {
      url: url.trim_end_matches('/').to_string(),
      suite: suite.to_string(),
    }
  }

  fn index_url(&self, arch: &str) -> String {
    format!("{}/dists/{}/main/binary-{}/Packages.gz", self.url, self.suite, arch)
  }
}

/// How long a downloaded index is reused before being fetched again.
pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(6 * 60 * 60);

pub struct DpkgSolver {
  repos: Vec<DpkgRepository>,
  arch: String,
  cache_dir: PathBuf,
  ttl: Duration,
  index: OnceCell<HashMap<String, String>>,
}

impl DpkgSolver {
  /// Repositories are searched in order: a package found in an earlier suite
  /// shadows the same package in later ones.
  pub fn new(repos: Vec<DpkgRepository>, arch: &str, cache_dir: impl Into<PathBuf>) -> Self {
    Self {
      repos,
      arch: arch.to_string(),
      cache_dir: cache_dir.into(),
      ttl: DEFAULT_INDEX_TTL,
      index: OnceCell::new(),
    }
  }

  /// A zero TTL downloads every index on each run.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  fn cache_path(&self, url: &str) -> PathBuf {
    let key = hash_bytes(url.as_bytes());
    self.cache_dir.join("dpkg").join(format!("{}.gz", &key.0[..16]))
  }

  async fn load_index(&self, ctx: &CancellationToken) -> Result<HashMap<String, String>, PkgSolverError> {
    let mut index = HashMap::new();

    for repo in &self.repos {
      let url = repo.index_url(&self.arch);
      let compressed = self.fetch_cached(ctx, &url).await?;
      let content = decompress(&compressed).map_err(|source| PkgSolverError::Io {
        path: url.clone(),
        source,
      })?;

      for (name, version) in parse_packages_index(&content) {
        index.entry(name).or_insert(version);
      }
    }

    debug!(packages = index.len(), "dpkg index loaded");
    Ok(index)
  }

  async fn fetch_cached(&self, ctx: &CancellationToken, url: &str) -> Result<Vec<u8>, PkgSolverError> {
    let cache_path = self.cache_path(url);
    if self.is_fresh(&cache_path).await {
      if let Ok(raw) = tokio::fs::read(&cache_path).await {
        debug!(url = %url, path = ?cache_path, "using cached package index");
        return Ok(raw);
      }
    }

    info!(url = %url, "fetching package index");
    let raw = tokio::select! {
      biased;
      _ = ctx.cancelled() => return Err(PkgSolverError::Cancelled),
      raw = download(url) => raw?,
    };

    write_cache(&cache_path, &raw).await?;
    Ok(raw)
  }

  async fn is_fresh(&self, path: &Path) -> bool {
    let Ok(modified) = tokio::fs::metadata(path).await.and_then(|meta| meta.modified()) else {
      return false;
    };

    match SystemTime::now().duration_since(modified) {
      Ok(age) => age < self.ttl,
      Err(_) => {
        warn!(path = ?path, "cached package index is dated in the future, ignoring it");
        false
      }
    }
  }
}

#[async_trait]
impl PackageSolver for DpkgSolver {
  /// The image reference is ignored: versions come from the configured
  /// repositories.
  async fn resolve_versions(
    &self,
    ctx: &CancellationToken,
    _image_ref: &str,
    pkgs: &VersionMap,
  ) -> Result<VersionMap, PkgSolverError> {
    let (mut resolved, to_resolve) = partition_pinned(pkgs);
    if to_resolve.is_empty() {
      return Ok(resolved);
    }

    let index = self.index.get_or_try_init(|| self.load_index(ctx)).await?;
    for name in &to_resolve {
      if let Some(version) = index.get(name) {
        resolved.overwrite(name, version);
      }
    }

    check_missing_packages(pkgs, &resolved)?;
    Ok(resolved)
  }
}

async fn download(url: &str) -> Result<Vec<u8>, PkgSolverError> {
  let fetch_err = |message: String| PkgSolverError::Fetch {
    url: url.to_string(),
    message,
  };

  let response = reqwest::get(url).await.map_err(|e| fetch_err(e.to_string()))?;
  if !response.status().is_success() {
    return Err(fetch_err(format!("HTTP {}", response.status())));
  }

  let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
  Ok(bytes.to_vec())
}

async fn write_cache(path: &Path, raw: &[u8]) -> Result<(), PkgSolverError> {
  let io_err = |source| PkgSolverError::Io {
    path: path.to_string_lossy().into_owned(),
    source,
  };

  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
  }
  tokio::fs::write(path, raw).await.map_err(io_err)
}

fn decompress(raw: &[u8]) -> std::io::Result<String> {
  let mut content = String::new();
  GzDecoder::new(raw).read_to_string(&mut content)?;
  Ok(content)
}

/// Parses a Debian `Packages` index into package names and versions. When a
/// package appears several times, the first entry wins.
pub(crate) fn parse_packages_index(content: &str) -> HashMap<String, String> {
  let mut index = HashMap::new();

  for paragraph in content.split("\n\n") {
    let mut name = None;
    let mut version = None;

    for line in paragraph.lines() {
      if let Some(value) = line.strip_prefix("Package:") {
        name = Some(value.trim());
      } else if let Some(value) = line.strip_prefix("Version:") {
        version = Some(value.trim());
      }
    }

    if let (Some(name), Some(version)) = (name, version) {
      index.entry(name.to_string()).or_insert_with(|| version.to_string());
    }
  }

  index
}
