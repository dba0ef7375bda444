//! Generic operations on definition files.
//!
//! The [`Builder`] loads a definition, dispatches to the handler of its kind
//! and takes care of what's common to every kind: the embedded webserver
//! definition, the definition hash and writing the lock file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::{Mapping, Value};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::builddef::{BuildDef, BuildOpts, Context, DEFHASH_KEY, DefError, UpdateLocksOpts, WEBSERVER_KEY};
use crate::defkinds::{KindError, webserver};
use crate::defloader::{self, LoadError};
use crate::pkgsolver::PackageSolvers;
use crate::plan::BuildPlan;
use crate::registry::{KindHandler, KindRegistry, RegistryError};
use crate::statesolver::StateSolver;

/// Stages named `webserver-<stage>` build the embedded webserver with the
/// assets of `<stage>`.
pub const WEBSERVER_STAGE_PREFIX: &str = "webserver-";

#[derive(Debug, Error)]
pub enum BuilderError {
  #[error(transparent)]
  Load(#[from] LoadError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Kind(#[from] KindError),

  #[error(transparent)]
  Def(#[from] DefError),

  #[error("your lockfile is out-of-sync with your definition file, please run `zbuild update`")]
  OutOfSyncLockfile,

  #[error("you can't call a webserver stage from a {0} kind as it doesn't embed webserver definition")]
  NoEmbeddedWebserver(String),

  #[error("webserver cannot be built from dev stage {0:?}")]
  WebserverFromDevStage(String),

  #[error("can't write the lock file of remote context {0}")]
  RemoteContext(String),

  #[error("could not write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("could not encode {what}: {source}")]
  Encode {
    what: &'static str,
    #[source]
    source: serde_yaml::Error,
  },
}

pub type Result<T> = std::result::Result<T, BuilderError>;

/// Outcome of a lock file update.
#[derive(Debug)]
pub struct UpdateResult {
  pub lock_file: PathBuf,
  pub defhash: String,
  /// Top-level lock entries that changed, sorted.
  pub updated: Vec<String>,
  /// Top-level lock entries that were already up-to-date, sorted.
  pub unchanged: Vec<String>,
}

impl UpdateResult {
  pub fn changed(&self) -> bool {
    !self.updated.is_empty()
  }
}

pub struct Builder {
  registry: KindRegistry,
  pkg_solvers: PackageSolvers,
}

impl Builder {
  pub fn new(registry: KindRegistry, pkg_solvers: PackageSolvers) -> Self {
    Self { registry, pkg_solvers }
  }

  /// Locks the definition selected by `opts` and writes its lock file next
  /// to it.
  ///
  /// The hash of the definition is stored along with the locks, so that
  /// [`Builder::build`] can detect definitions changed since the last update.
  pub async fn update_lock_file(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    mut opts: UpdateLocksOpts,
  ) -> Result<UpdateResult> {
    let path = lock_file_path(solver.as_ref(), &opts.build_opts.build_context, &opts.build_opts.lock_file)?;
    opts.build_opts.def = defloader::load(ctx, solver.as_ref(), &opts.build_opts).await?;
    let def = &opts.build_opts.def;

    let mut raw_locks = self.update_locks(ctx, solver, &opts).await?;
    let defhash = def.hash()?;
    raw_locks.insert(Value::from(DEFHASH_KEY), Value::from(defhash.clone()));

    let (updated, unchanged) = diff_locks(&def.raw_locks, &raw_locks);
    write_lock_file(&path, &raw_locks)?;
    info!(file = %path.display(), updated = updated.len(), "lock file written");

    Ok(UpdateResult {
      lock_file: path,
      defhash,
      updated,
      unchanged,
    })
  }

  async fn update_locks(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    opts: &UpdateLocksOpts,
  ) -> Result<Mapping> {
    let def = &opts.build_opts.def;
    let handler = self.registry.find(&def.kind)?;
    let mut raw_locks = handler
      .update_locks(ctx, solver, &self.pkg_solvers, opts)
      .await?
      .raw_locks()?;

    if self.registry.embeds_webserver(&def.kind) && def.raw_config.contains_key(WEBSERVER_KEY) {
      let mut webserver_opts = opts.clone();
      webserver_opts.build_opts.def = def.webserver_def();

      let handler = self.registry.find(webserver::KIND)?;
      let webserver_locks = handler
        .update_locks(ctx, solver, &self.pkg_solvers, &webserver_opts)
        .await?
        .raw_locks()?;
      Self::embed_webserver_locks(&mut raw_locks, webserver_locks);
    }

    Ok(raw_locks)
  }

  /// Nests the locks of an embedded webserver under the locks of its parent
  /// definition.
  pub fn embed_webserver_locks(locks: &mut Mapping, webserver_locks: Mapping) {
    locks.insert(Value::from(WEBSERVER_KEY), Value::Mapping(webserver_locks));
  }

  /// Resolves the stage selected by `opts` into a build plan.
  ///
  /// Fails if the lock file wasn't generated from the current definition.
  pub async fn build(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    mut opts: BuildOpts,
  ) -> Result<BuildPlan> {
    opts.def = defloader::load(ctx, solver.as_ref(), &opts).await?;
    check_lock_sync(&opts.def)?;

    let Some(stage) = opts.stage.strip_prefix(WEBSERVER_STAGE_PREFIX).map(str::to_string) else {
      let handler = self.registry.find(&opts.def.kind)?;
      return Ok(handler.build(ctx, solver, &opts).await?);
    };

    let handler = self.find_embedding(&opts.def.kind)?;
    opts.stage = stage;
    let parent = handler.build(ctx, solver, &opts).await?;
    if parent.dev {
      return Err(BuilderError::WebserverFromDevStage(opts.stage));
    }

    let webserver_opts = BuildOpts {
      def: opts.def.webserver_def(),
      stage: webserver::KIND.to_string(),
      ..opts
    };
    let plan = self
      .registry
      .find(webserver::KIND)?
      .build(ctx, solver, &webserver_opts)
      .await?;
    debug!(stage = %parent.stage, "webserver plan built");

    Ok(plan.with_source(parent))
  }

  /// Dumps the resolved configuration of the stage selected by `opts` as YAML.
  pub async fn dump_config(
    &self,
    ctx: &CancellationToken,
    solver: &Arc<dyn StateSolver>,
    mut opts: BuildOpts,
  ) -> Result<String> {
    opts.def = defloader::load(ctx, solver.as_ref(), &opts).await?;

    let handler = if opts.stage.starts_with(WEBSERVER_STAGE_PREFIX) {
      self.find_embedding(&opts.def.kind)?;
      opts.def = opts.def.webserver_def();
      opts.stage = webserver::KIND.to_string();
      self.registry.find(webserver::KIND)?
    } else {
      self.registry.find(&opts.def.kind)?
    };

    let dumped = handler.debug_config(ctx, solver, &opts).await?;
    serde_yaml::to_string(&dumped).map_err(|source| BuilderError::Encode {
      what: "config",
      source,
    })
  }

  fn find_embedding(&self, kind: &str) -> Result<Arc<dyn KindHandler>> {
    let handler = self.registry.find(kind)?;
    if !self.registry.embeds_webserver(kind) {
      return Err(BuilderError::NoEmbeddedWebserver(kind.to_string()));
    }
    Ok(handler)
  }
}

/// Checks the lock file was generated from the current definition.
pub fn check_lock_sync(def: &BuildDef) -> Result<()> {
  if def.locked_hash() != Some(def.hash()?.as_str()) {
    return Err(BuilderError::OutOfSyncLockfile);
  }
  Ok(())
}

/// Lock files are written next to the definition, in the directory the
/// solver reads the local context from.
fn lock_file_path(solver: &dyn StateSolver, context: &Context, lock_file: &str) -> Result<PathBuf> {
  let dir = solver
    .local_dir(context)
    .ok_or_else(|| BuilderError::RemoteContext(context.to_string()))?;
  Ok(dir.join(lock_file))
}

fn diff_locks(previous: &Mapping, current: &Mapping) -> (Vec<String>, Vec<String>) {
  let mut updated = Vec::new();
  let mut unchanged = Vec::new();

  for (key, value) in current {
    let Some(name) = key.as_str() else { continue };
    if name == DEFHASH_KEY {
      continue;
    }
    if previous.get(key) == Some(value) {
      unchanged.push(name.to_string());
    } else {
      updated.push(name.to_string());
    }
  }

  updated.sort();
  unchanged.sort();
  (updated, unchanged)
}

/// Writes the lock file through a temporary file in the same directory, so
/// readers never see a partially written file.
fn write_lock_file(path: &Path, locks: &Mapping) -> Result<()> {
  let content = serde_yaml::to_string(locks).map_err(|source| BuilderError::Encode { what: "locks", source })?;
  let write_err = |source| BuilderError::Write {
    path: path.to_path_buf(),
    source,
  };

  let dir = match path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  };
  let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
  file.write_all(content.as_bytes()).map_err(write_err)?;

  #[cfg(unix)]
  {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    file
      .as_file()
      .set_permissions(fs::Permissions::from_mode(0o640))
      .map_err(write_err)?;
  }

  file.persist(path).map_err(|err| write_err(err.error))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use async_trait::async_trait;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  use crate::builddef::Locks;
  use crate::statesolver::{DockerSolver, Source};
  use crate::util::testutil::MockSolver;

  #[derive(Debug)]
  struct StaticLocks(Mapping);

  impl Locks for StaticLocks {
    fn raw_locks(&self) -> std::result::Result<Mapping, DefError> {
      Ok(self.0.clone())
    }
  }

  /// Handler returning canned locks. Only the `dev` stage is a dev stage.
  struct StaticHandler {
    kind: &'static str,
    locks: &'static str,
  }

  #[async_trait]
  impl KindHandler for StaticHandler {
    async fn build(
      &self,
      _ctx: &CancellationToken,
      _solver: &Arc<dyn StateSolver>,
      opts: &BuildOpts,
    ) -> std::result::Result<BuildPlan, KindError> {
      let image = opts.def.raw_locks.get("base_image").and_then(Value::as_str).unwrap_or_default();
      Ok(
        BuildPlan::new(
          self.kind,
          &opts.stage,
          image,
          &opts.build_context,
          opts.stage == "dev",
          &serde_json::json!({}),
          &serde_json::json!({}),
        )
        .unwrap(),
      )
    }

    async fn update_locks(
      &self,
      _ctx: &CancellationToken,
      _solver: &Arc<dyn StateSolver>,
      _pkg_solvers: &PackageSolvers,
      _opts: &UpdateLocksOpts,
    ) -> std::result::Result<Box<dyn Locks>, KindError> {
      Ok(Box::new(StaticLocks(serde_yaml::from_str(self.locks).unwrap())))
    }

    async fn debug_config(
      &self,
      _ctx: &CancellationToken,
      _solver: &Arc<dyn StateSolver>,
      opts: &BuildOpts,
    ) -> std::result::Result<serde_yaml::Value, KindError> {
      Ok(Value::Mapping(opts.def.raw_config.clone()))
    }
  }

  fn builder() -> Builder {
    let mut registry = KindRegistry::new();
    registry.register(
      "app",
      Arc::new(StaticHandler {
        kind: "app",
        locks: "base_image: app@sha256:1\n",
      }),
      true,
    );
    registry.register(
      "worker",
      Arc::new(StaticHandler {
        kind: "worker",
        locks: "base_image: worker@sha256:3\n",
      }),
      false,
    );
    registry.register(
      webserver::KIND,
      Arc::new(StaticHandler {
        kind: webserver::KIND,
        locks: "base_image: nginx@sha256:2\n",
      }),
      false,
    );
    Builder::new(registry, PackageSolvers::empty())
  }

  struct Workspace {
    dir: TempDir,
  }

  impl Workspace {
    fn new() -> Self {
      Self {
        dir: TempDir::new().unwrap(),
      }
    }

    fn context(&self) -> Context {
      Context::local(self.dir.path().to_str().unwrap())
    }

    fn build_opts(&self, stage: &str) -> BuildOpts {
      BuildOpts::new("zbuild.yml", self.dir.path().to_str().unwrap(), stage).unwrap()
    }

    /// A solver serving `def` and, when set, a lock file in sync with it.
    fn solver(&self, def: &str, locks: Option<&str>) -> Arc<dyn StateSolver> {
      let source = Source::BuildContext(self.context());
      let mut solver = MockSolver::default().with_file(source.clone(), "zbuild.yml", def);
      if let Some(locks) = locks {
        let defhash = BuildDef::parse("zbuild.yml", def.as_bytes()).unwrap().hash().unwrap();
        solver = solver.with_file(source, "zbuild.lock", &format!("defhash: {}\n{}", defhash, locks));
      }
      Arc::new(solver)
    }

    fn lock_file(&self) -> Mapping {
      let content = fs::read_to_string(self.dir.path().join("zbuild.lock")).unwrap();
      serde_yaml::from_str(&content).unwrap()
    }
  }

  mod update {
    use super::*;

    #[tokio::test]
    async fn writes_locks_with_defhash() {
      let ws = Workspace::new();
      let def = "kind: app\nversion: 1\n";
      let solver = ws.solver(def, None);

      let res = builder()
        .update_lock_file(&CancellationToken::new(), &solver, UpdateLocksOpts::all(ws.build_opts("dev")))
        .await
        .unwrap();

      let locks = ws.lock_file();
      let expected_hash = BuildDef::parse("zbuild.yml", def.as_bytes()).unwrap().hash().unwrap();
      assert_eq!(res.defhash, expected_hash);
      assert_eq!(locks.get(DEFHASH_KEY).and_then(Value::as_str), Some(expected_hash.as_str()));
      assert_eq!(locks.get("base_image").and_then(Value::as_str), Some("app@sha256:1"));
      assert!(locks.get(WEBSERVER_KEY).is_none());
      assert_eq!(res.updated, vec!["base_image"]);
      assert!(res.changed());
    }

    #[tokio::test]
    async fn embeds_webserver_locks() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: app\nwebserver:\n  type: nginx\n", None);

      builder()
        .update_lock_file(&CancellationToken::new(), &solver, UpdateLocksOpts::all(ws.build_opts("dev")))
        .await
        .unwrap();

      let locks = ws.lock_file();
      let webserver = locks.get(WEBSERVER_KEY).and_then(Value::as_mapping).unwrap();
      assert_eq!(webserver.get("base_image").and_then(Value::as_str), Some("nginx@sha256:2"));
    }

    #[tokio::test]
    async fn reports_unchanged_locks() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: app\n", Some("base_image: app@sha256:1\n"));

      let res = builder()
        .update_lock_file(&CancellationToken::new(), &solver, UpdateLocksOpts::all(ws.build_opts("dev")))
        .await
        .unwrap();

      assert!(!res.changed());
      assert_eq!(res.unchanged, vec!["base_image"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn logs_lock_file_write() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: app\n", None);

      builder()
        .update_lock_file(&CancellationToken::new(), &solver, UpdateLocksOpts::all(ws.build_opts("dev")))
        .await
        .unwrap();

      assert!(logs_contain("lock file written"));
    }

    #[tokio::test]
    async fn unknown_kind() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: python\n", None);

      let err = builder()
        .update_lock_file(&CancellationToken::new(), &solver, UpdateLocksOpts::all(ws.build_opts("dev")))
        .await
        .unwrap_err();

      assert_eq!(err.to_string(), "unknown kind \"python\"");
      assert!(!ws.dir.path().join("zbuild.lock").exists());
    }

    #[tokio::test]
    async fn remote_contexts_are_not_writable() {
      let solver: Arc<dyn StateSolver> = Arc::new(MockSolver::default());
      let opts = BuildOpts::new("zbuild.yml", "git://github.com/some/repo#main", "dev").unwrap();

      let err = builder()
        .update_lock_file(&CancellationToken::new(), &solver, UpdateLocksOpts::all(opts))
        .await
        .unwrap_err();

      assert!(matches!(err, BuilderError::RemoteContext(_)));
    }

    #[tokio::test]
    async fn lock_file_lands_in_solver_root() {
      let root = TempDir::new().unwrap();
      fs::create_dir(root.path().join("app")).unwrap();
      fs::write(root.path().join("app/zbuild.yml"), "kind: app\n").unwrap();
      let solver: Arc<dyn StateSolver> = Arc::new(DockerSolver::new(root.path()));

      let res = builder()
        .update_lock_file(
          &CancellationToken::new(),
          &solver,
          UpdateLocksOpts::all(BuildOpts::new("zbuild.yml", "app", "dev").unwrap()),
        )
        .await
        .unwrap();

      assert_eq!(res.lock_file, root.path().join("app/zbuild.lock"));
      assert!(root.path().join("app/zbuild.lock").exists());

      // The lock file written above is the one read back when building.
      let plan = builder()
        .build(&CancellationToken::new(), &solver, BuildOpts::new("zbuild.yml", "app", "prod").unwrap())
        .await
        .unwrap();
      assert_eq!(plan.base_image, "app@sha256:1");
    }

    #[test]
    fn embed_webserver_locks_nests_mapping() {
      let mut locks: Mapping = serde_yaml::from_str("base_image: php@sha256:1\n").unwrap();
      let webserver: Mapping = serde_yaml::from_str("base_image: nginx@sha256:2\n").unwrap();

      Builder::embed_webserver_locks(&mut locks, webserver.clone());

      assert_eq!(locks.get(WEBSERVER_KEY), Some(&Value::Mapping(webserver)));
      assert_eq!(locks.len(), 2);
    }
  }

  mod build {
    use super::*;

    #[tokio::test]
    async fn rejects_out_of_sync_lockfile() {
      let ws = Workspace::new();
      let source = Source::BuildContext(ws.context());
      let solver: Arc<dyn StateSolver> = Arc::new(
        MockSolver::default()
          .with_file(source.clone(), "zbuild.yml", "kind: app\nversion: 2\n")
          .with_file(source, "zbuild.lock", "defhash: stale\nbase_image: app@sha256:1\n"),
      );

      let err = builder()
        .build(&CancellationToken::new(), &solver, ws.build_opts("prod"))
        .await
        .unwrap_err();

      assert_eq!(
        err.to_string(),
        "your lockfile is out-of-sync with your definition file, please run `zbuild update`"
      );
    }

    #[tokio::test]
    async fn builds_requested_stage() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: app\n", Some("base_image: app@sha256:1\n"));

      let plan = builder()
        .build(&CancellationToken::new(), &solver, ws.build_opts("prod"))
        .await
        .unwrap();

      assert_eq!(plan.kind, "app");
      assert_eq!(plan.stage, "prod");
      assert_eq!(plan.base_image, "app@sha256:1");
      assert!(plan.source.is_none());
    }

    #[tokio::test]
    async fn webserver_stage_copies_from_parent() {
      let ws = Workspace::new();
      let solver = ws.solver(
        "kind: app\nwebserver:\n  type: nginx\n",
        Some("base_image: app@sha256:1\nwebserver:\n  base_image: nginx@sha256:2\n"),
      );

      let plan = builder()
        .build(&CancellationToken::new(), &solver, ws.build_opts("webserver-prod"))
        .await
        .unwrap();

      assert_eq!(plan.kind, "webserver");
      assert_eq!(plan.base_image, "nginx@sha256:2");
      let source = plan.source.unwrap();
      assert_eq!(source.stage, "prod");
      assert_eq!(source.base_image, "app@sha256:1");
    }

    #[tokio::test]
    async fn webserver_stage_rejects_dev_stages() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: app\n", Some("base_image: app@sha256:1\n"));

      let err = builder()
        .build(&CancellationToken::new(), &solver, ws.build_opts("webserver-dev"))
        .await
        .unwrap_err();

      assert!(matches!(err, BuilderError::WebserverFromDevStage(stage) if stage == "dev"));
    }

    #[tokio::test]
    async fn webserver_stage_requires_embedding_kind() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: worker\n", Some("base_image: worker@sha256:3\n"));

      let err = builder()
        .build(&CancellationToken::new(), &solver, ws.build_opts("webserver-prod"))
        .await
        .unwrap_err();

      assert!(matches!(err, BuilderError::NoEmbeddedWebserver(kind) if kind == "worker"));
    }
  }

  mod dump_config {
    use super::*;

    #[tokio::test]
    async fn dumps_stage_config() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: app\nversion: 1\n", None);

      let dumped = builder()
        .dump_config(&CancellationToken::new(), &solver, ws.build_opts("dev"))
        .await
        .unwrap();

      assert_eq!(dumped, "version: 1\n");
    }

    #[tokio::test]
    async fn dumps_embedded_webserver_config() {
      let ws = Workspace::new();
      let solver = ws.solver("kind: app\nwebserver:\n  type: nginx\n", None);

      let dumped = builder()
        .dump_config(&CancellationToken::new(), &solver, ws.build_opts("webserver-prod"))
        .await
        .unwrap();

      assert_eq!(dumped, "type: nginx\n");
    }
  }
}
