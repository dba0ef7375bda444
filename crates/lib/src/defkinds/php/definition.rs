use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PhpError;
use super::extensions::{extension_dir, is_preinstalled, system_deps};
use super::locks::DefinitionLocks;
use crate::builddef::{
  BuildDef, Context, ExternalFile, Healthcheck, HealthcheckConfig, HealthcheckType, VersionMap, WEBSERVER_KEY, decode,
  decode_locks, take_keys,
};
use crate::stage::{self, BASE_STAGE, DerivedStage, DerivedStageSet, StageConfig, append, override_opt};

const BLACKFIRE_PROBE_URL: &str = "https://blackfire.io/api/v1/releases/probe/php/linux/amd64";
const FCGI_CLIENT_URL: &str = "https://github.com/NiR-/fcgi-client/releases/download/v0.1.0/fcgi-client.phar";
/// FPM answers the ping path itself; no HTTP server runs in PHP images.
const HEALTHCHECK_TYPES: &[HealthcheckType] = &[HealthcheckType::Fcgi, HealthcheckType::Cmd];
const SYMFONY_CACHE_WARMUP: &str = "php -d display_errors=on bin/console cache:warmup --env=prod";

/// Definition-level keys, as opposed to the base stage keys inlined at the
/// top level of the definition.
const DEFINITION_KEYS: &[&str] = &["base", "version", "infer", "stages", "source_context"];

/// Properties declarable at any level of the stage hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Stage {
  pub external_files: Vec<ExternalFile>,
  pub system_packages: VersionMap,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fpm: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub command: Option<Vec<String>>,
  pub extensions: VersionMap,
  pub config_files: PhpConfigFiles,
  #[serde(rename = "composer_dump", skip_serializing_if = "Option::is_none")]
  pub composer_dump_flags: Option<ComposerDumpFlags>,
  pub sources: Vec<String>,
  pub integrations: Vec<String>,
  pub stateful_dirs: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub healthcheck: Option<Healthcheck>,
  pub post_install: Vec<String>,
}

impl StageConfig for Stage {
  fn merge(&self, overriding: &Self) -> Self {
    let mut system_packages = self.system_packages.clone();
    system_packages.merge(&overriding.system_packages);
    let mut extensions = self.extensions.clone();
    extensions.merge(&overriding.extensions);

    Self {
      external_files: append(&self.external_files, &overriding.external_files),
      system_packages,
      fpm: override_opt(&self.fpm, &overriding.fpm),
      command: override_opt(&self.command, &overriding.command),
      extensions,
      config_files: self.config_files.merge(&overriding.config_files),
      composer_dump_flags: override_opt(&self.composer_dump_flags, &overriding.composer_dump_flags),
      sources: append(&self.sources, &overriding.sources),
      integrations: append(&self.integrations, &overriding.integrations),
      stateful_dirs: append(&self.stateful_dirs, &overriding.stateful_dirs),
      healthcheck: override_opt(&self.healthcheck, &overriding.healthcheck),
      post_install: append(&self.post_install, &overriding.post_install),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PhpConfigFiles {
  #[serde(rename = "php.ini", skip_serializing_if = "Option::is_none")]
  pub ini_file: Option<String>,
  #[serde(rename = "fpm.conf", skip_serializing_if = "Option::is_none")]
  pub fpm_config_file: Option<String>,
}

impl PhpConfigFiles {
  pub fn merge(&self, overriding: &Self) -> Self {
    Self {
      ini_file: override_opt(&self.ini_file, &overriding.ini_file),
      fpm_config_file: override_opt(&self.fpm_config_file, &overriding.fpm_config_file),
    }
  }
}

/// Optimization flags of `composer dump-autoload`. `--optimize` is always
/// used outside of dev stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ComposerDumpFlags {
  pub apcu: bool,
  pub classmap_authoritative: bool,
}

impl ComposerDumpFlags {
  pub fn flags(&self) -> Result<String, PhpError> {
    if self.apcu && self.classmap_authoritative {
      return Err(PhpError::ConflictingComposerFlags);
    }

    let mut flags = "--no-dev --optimize".to_string();
    if self.apcu {
      flags.push_str(" --apcu");
    }
    if self.classmap_authoritative {
      flags.push_str(" --classmap-authoritative");
    }
    Ok(flags)
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct DefinitionParams {
  base: Option<String>,
  #[serde(deserialize_with = "crate::builddef::deserialize_opt_scalar")]
  version: Option<String>,
  infer: Option<bool>,
  stages: DerivedStageSet<Stage>,
  source_context: Option<Context>,
}

/// A PHP definition, merged with the default values.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
  pub base_stage: Stage,
  pub base_image: String,
  pub version: String,
  pub maj_min_version: String,
  pub infer: bool,
  pub stages: DerivedStageSet<Stage>,
  pub source_context: Option<Context>,
  pub locks: DefinitionLocks,
}

fn default_base_stage() -> Stage {
  Stage {
    fpm: Some(true),
    healthcheck: Some(Healthcheck::Toggle(true)),
    composer_dump_flags: Some(ComposerDumpFlags {
      apcu: false,
      classmap_authoritative: true,
    }),
    ..Default::default()
  }
}

fn default_healthcheck() -> HealthcheckConfig {
  HealthcheckConfig::fcgi("/ping", "pong")
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
  /// Decodes and validates the PHP definition and its locks.
  pub fn from_build_def(def: &BuildDef) -> Result<Self, PhpError> {
    let mut raw = def.raw_config.clone();
    raw.remove(WEBSERVER_KEY);

    let params: DefinitionParams = decode("php definition", take_keys(&mut raw, DEFINITION_KEYS))?;
    let base_stage: Stage = decode("php base stage", raw)?;

    let (base, version) = match (params.base, params.version) {
      (Some(_), Some(_)) => return Err(PhpError::VersionAndBase),
      (None, None) => return Err(PhpError::MissingVersionOrBase),
      (base, version) => (base.unwrap_or_default(), version.unwrap_or_default()),
    };

    if let Some(context) = &params.source_context {
      context.validate()?;
    }

    let stages = params.stages.0.iter().map(|(name, stage)| (name.as_str(), &stage.stage));
    for (name, stage) in std::iter::once((BASE_STAGE, &base_stage)).chain(stages) {
      if let Some(healthcheck) = &stage.healthcheck {
        healthcheck
          .validate(HEALTHCHECK_TYPES)
          .map_err(|source| PhpError::InvalidHealthcheck {
            stage: name.to_string(),
            source,
          })?;
      }
    }

    let base_stage = default_base_stage().merge(&base_stage);
    let base_image = if base.is_empty() {
      let flavor = if base_stage.fpm.unwrap_or(true) { "fpm" } else { "cli" };
      format!("docker.io/library/php:{}-{}-buster", version, flavor)
    } else {
      base
    };

    Ok(Self {
      base_stage,
      base_image,
      maj_min_version: maj_min_version(&version),
      version,
      infer: params.infer.unwrap_or(true),
      stages: default_stages().merge(&params.stages),
      source_context: params.source_context,
      locks: decode_locks(&def.raw_locks)?,
    })
  }

  /// Resolves a stage and infers what it needs.
  ///
  /// `platform_reqs` are the extensions required by `composer.lock` and
  /// `os_family` selects the system packages matching each extension.
  pub fn resolve_stage(&self, name: &str, platform_reqs: &VersionMap, os_family: &str) -> Result<StageDefinition, PhpError> {
    let merged = stage::resolve(&self.base_stage, &self.stages, name)?;

    let mut stage_def = StageDefinition {
      name: name.to_string(),
      base_image: self.base_image.clone(),
      version: self.version.clone(),
      maj_min_version: self.maj_min_version.clone(),
      infer: self.infer,
      dev: merged.dev,
      stage: merged.stage,
      extra_scripts: Vec::new(),
    };

    let fpm = stage_def.fpm();
    if !fpm {
      stage_def.stage.config_files.fpm_config_file = None;
    }
    let healthcheck = match &stage_def.stage.healthcheck {
      Some(healthcheck) if !stage_def.dev && fpm => healthcheck.resolve(&default_healthcheck()),
      _ => None,
    };
    stage_def.stage.healthcheck = Some(healthcheck.map_or(Healthcheck::Toggle(false), Healthcheck::Config));
    if !fpm && stage_def.stage.command.is_none() {
      return Err(PhpError::FpmWithoutCommand);
    }

    if self.infer && !stage_def.dev && fpm {
      stage_def.stage.extensions.add("apcu", "*");
      stage_def.stage.extensions.add("opcache", "*");
    }

    stage_def.add_integrations()?;

    if self.infer {
      for (name, constraint) in platform_reqs.iter() {
        stage_def.stage.extensions.add(name, constraint);
      }
      stage_def.infer_extensions();
      stage_def.infer_system_packages(os_family);
    }

    debug!(stage = %name, dev = stage_def.dev, extensions = ?stage_def.stage.extensions, "php stage resolved");
    Ok(stage_def)
  }
}

/// Probe builds are published per PHP minor version (`7.3` is `73`).
fn blackfire_probe_url(maj_min_version: &str) -> String {
  format!("{}/{}", BLACKFIRE_PROBE_URL, maj_min_version.replace('.', ""))
}

fn maj_min_version(version: &str) -> String {
  let mut segments = version.splitn(3, '.');
  match (segments.next(), segments.next()) {
    (Some(major), Some(minor)) => format!("{}.{}", major, minor),
    (Some(major), None) => major.to_string(),
    _ => String::new(),
  }
}

/// A stage merged with its ancestors, after inference. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDefinition {
  pub name: String,
  pub base_image: String,
  pub version: String,
  pub maj_min_version: String,
  pub infer: bool,
  pub dev: bool,
  #[serde(flatten)]
  pub stage: Stage,
  /// Files copied along with the sources, added by framework integrations.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub extra_scripts: Vec<String>,
}

impl StageDefinition {
  pub fn fpm(&self) -> bool {
    self.stage.fpm.unwrap_or(true)
  }

  pub fn healthcheck(&self) -> bool {
    self.healthcheck_config().is_some()
  }

  /// The healthcheck of the stage once resolved, `None` when disabled.
  pub fn healthcheck_config(&self) -> Option<&HealthcheckConfig> {
    match &self.stage.healthcheck {
      Some(Healthcheck::Config(config)) if config.is_enabled() => Some(config),
      _ => None,
    }
  }

  /// Flags used to dump the autoloader of non-dev stages.
  pub fn composer_dump_flags(&self) -> Result<String, PhpError> {
    self.stage.composer_dump_flags.unwrap_or_default().flags()
  }

  fn add_integrations(&mut self) -> Result<(), PhpError> {
    for integration in self.stage.integrations.clone() {
      match integration.as_str() {
        "blackfire" => {
          let ext_dir = extension_dir(&self.maj_min_version)
            .ok_or_else(|| PhpError::UnsupportedBlackfireVersion(self.maj_min_version.clone()))?;

          self.stage.external_files.push(ExternalFile {
            compressed: true,
            pattern: Some("blackfire-*.so".to_string()),
            mode: Some(0o644),
            ..ExternalFile::new(&blackfire_probe_url(&self.maj_min_version), &format!("{}/blackfire.so", ext_dir))
          });
        }
        "symfony" => {
          self.stage.post_install.insert(0, SYMFONY_CACHE_WARMUP.to_string());
          self.stage.sources.extend(["app/".to_string(), "src/".to_string()]);
          self.extra_scripts.extend(["bin/console".to_string(), "web/app.php".to_string()]);
        }
        other => return Err(PhpError::UnknownIntegration(other.to_string())),
      }
    }

    let fcgi = self.healthcheck_config().is_some_and(|hc| hc.kind == HealthcheckType::Fcgi);
    if fcgi {
      self.stage.external_files.push(ExternalFile {
        mode: Some(0o750),
        owner: Some("1000:1000".to_string()),
        ..ExternalFile::new(FCGI_CLIENT_URL, "/usr/local/bin/fcgi-client")
      });
    }

    Ok(())
  }

  fn infer_extensions(&mut self) {
    let extensions = &mut self.stage.extensions;

    // soap needs sockets to work properly.
    if extensions.has("soap") {
      extensions.add("sockets", "*");
    }
    // Used by composer to install packages.
    extensions.add("zip", "*");

    for name in extensions.names() {
      if is_preinstalled(&name) {
        extensions.remove(&name);
      }
    }
  }

  fn infer_system_packages(&mut self, os_family: &str) {
    let packages = &mut self.stage.system_packages;
    packages.add("libpcre3-dev", "*");

    for extension in self.stage.extensions.names() {
      for dep in system_deps(&extension, os_family) {
        packages.add(dep, "*");
      }
    }

    // Used by composer.
    packages.add("unzip", "*");
    packages.add("git", "*");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn build_def(config: &str, locks: &str) -> BuildDef {
    let def = BuildDef::parse("zbuild.yml", format!("kind: php\n{}", config).as_bytes()).unwrap();
    def.with_locks("zbuild.lock", locks.as_bytes()).unwrap()
  }

  fn definition(config: &str) -> Definition {
    Definition::from_build_def(&build_def(config, "")).unwrap()
  }

  mod decoding {
    use super::*;

    #[test]
    fn applies_defaults() {
      let def = definition("version: 7.4.1\n");

      assert_eq!(def.base_image, "docker.io/library/php:7.4.1-fpm-buster");
      assert_eq!(def.maj_min_version, "7.4");
      assert!(def.infer);
      assert_eq!(def.base_stage.fpm, Some(true));
      assert_eq!(def.base_stage.healthcheck, Some(Healthcheck::Toggle(true)));
      assert_eq!(
        def.base_stage.composer_dump_flags,
        Some(ComposerDumpFlags {
          apcu: false,
          classmap_authoritative: true
        })
      );
      assert_eq!(def.stages.names().collect::<Vec<_>>(), vec!["dev", "prod"]);
    }

    #[test]
    fn cli_image_when_fpm_is_disabled() {
      let def = definition("version: '7.3'\nfpm: false\ncommand: [bin/worker]\n");
      assert_eq!(def.base_image, "docker.io/library/php:7.3-cli-buster");
    }

    #[test]
    fn version_and_base_are_exclusive() {
      let err = Definition::from_build_def(&build_def("version: 7.4\nbase: php:7.4\n", "")).unwrap_err();
      assert!(matches!(err, PhpError::VersionAndBase));
    }

    #[test]
    fn version_or_base_is_required() {
      let err = Definition::from_build_def(&build_def("fpm: true\n", "")).unwrap_err();
      assert!(matches!(err, PhpError::MissingVersionOrBase));
    }

    #[test]
    fn rejects_unknown_keys() {
      let err = Definition::from_build_def(&build_def("version: 7.4\nfoo: bar\n", "")).unwrap_err();
      assert!(err.to_string().contains("unknown field `foo`"), "{}", err);
    }

    #[test]
    fn ignores_embedded_webserver() {
      let def = definition("version: 7.4\nwebserver:\n  type: nginx\n");
      assert_eq!(def.version, "7.4");
    }

    #[test]
    fn user_stages_are_merged_with_defaults() {
      let def = definition("version: 7.4\nstages:\n  dev:\n    derive_from: base\n    sources: [bin/]\n  worker:\n    derive_from: prod\n");

      let dev = def.stages.get("dev").unwrap();
      assert_eq!(dev.dev, Some(true));
      assert_eq!(dev.stage.sources, vec!["bin/"]);
      assert!(def.stages.get("worker").is_some());
    }

    #[test]
    fn decodes_locks() {
      let locks = "base_image: php@sha256:abc\nosrelease:\n  name: debian\n  version_name: buster\n  version_id: '10'\nstages:\n  dev:\n    system_packages:\n      git: 1:2.20.1\n";
      let def = Definition::from_build_def(&build_def("version: 7.4\n", locks)).unwrap();

      assert_eq!(def.locks.base_image, "php@sha256:abc");
      assert_eq!(def.locks.osrelease.family(), "debian");
      assert_eq!(def.locks.stages["dev"].system_packages.get("git"), Some("1:2.20.1"));
    }
  }

  mod resolution {
    use super::*;

    fn resolve(config: &str, stage: &str) -> Result<StageDefinition, PhpError> {
      definition(config).resolve_stage(stage, &VersionMap::new(), "debian")
    }

    #[test]
    fn soap_infers_sockets_and_zip() {
      let stage = resolve("version: 7.4\nextensions:\n  soap: '*'\n", "dev").unwrap();

      let extensions: VersionMap = [("soap", "*"), ("sockets", "*"), ("zip", "*")].into_iter().collect();
      assert_eq!(stage.stage.extensions, extensions);

      for pkg in ["libxml2-dev", "libpcre3-dev", "unzip", "git", "libssl-dev", "libzip-dev"] {
        assert_eq!(stage.stage.system_packages.get(pkg), Some("*"), "{}", pkg);
      }
    }

    #[test]
    fn explicit_constraints_are_kept() {
      let stage = resolve("version: 7.4\nextensions:\n  soap: '*'\n  sockets: 1.2.3\n", "dev").unwrap();
      assert_eq!(stage.stage.extensions.get("sockets"), Some("1.2.3"));
    }

    #[test]
    fn prod_fpm_stages_get_opcache_and_apcu() {
      let stage = resolve("version: 7.4\nextensions:\n  apcu: 5.1.18\n", "prod").unwrap();

      assert_eq!(stage.stage.extensions.get("apcu"), Some("5.1.18"));
      assert_eq!(stage.stage.extensions.get("opcache"), Some("*"));
      assert!(!resolve("version: 7.4\n", "dev").unwrap().stage.extensions.has("opcache"));
    }

    #[test]
    fn preinstalled_extensions_are_removed() {
      let stage = resolve("version: 7.4\nextensions:\n  json: '*'\n  intl: '*'\n", "dev").unwrap();

      assert!(!stage.stage.extensions.has("json"));
      assert!(stage.stage.extensions.has("intl"));
    }

    #[test]
    fn platform_reqs_do_not_override_definition() {
      let def = definition("version: 7.4\nextensions:\n  redis: 5.1.0\n");
      let reqs: VersionMap = [("redis", "*"), ("intl", "*")].into_iter().collect();

      let stage = def.resolve_stage("dev", &reqs, "debian").unwrap();

      assert_eq!(stage.stage.extensions.get("redis"), Some("5.1.0"));
      assert_eq!(stage.stage.extensions.get("intl"), Some("*"));
    }

    #[test]
    fn alpine_packages_follow_os_family() {
      let def = definition("version: 7.4\nextensions:\n  intl: '*'\n");
      let stage = def.resolve_stage("dev", &VersionMap::new(), "alpine").unwrap();

      assert!(stage.stage.system_packages.has("icu-dev"));
      assert!(!stage.stage.system_packages.has("libicu-dev"));
    }

    #[test]
    fn no_inference_when_disabled() {
      let stage = resolve("version: 7.4\ninfer: false\nextensions:\n  soap: '*'\n", "prod").unwrap();

      assert_eq!(stage.stage.extensions, [("soap", "*")].into_iter().collect());
      assert!(stage.stage.system_packages.is_empty());
    }

    #[test]
    fn fpm_disabled_requires_command() {
      let err = resolve("version: 7.4\nfpm: false\n", "prod").unwrap_err();
      assert_eq!(err.to_string(), "FPM mode is disabled but no command was provided");
    }

    #[test]
    fn fpm_disabled_drops_fpm_config_and_healthcheck() {
      let stage = resolve(
        "version: 7.4\nfpm: false\ncommand: [bin/worker]\nconfig_files:\n  php.ini: php.ini\n  fpm.conf: fpm.conf\n",
        "prod",
      )
      .unwrap();

      assert_eq!(stage.stage.config_files.fpm_config_file, None);
      assert_eq!(stage.stage.config_files.ini_file.as_deref(), Some("php.ini"));
      assert!(!stage.healthcheck());
      assert!(stage.stage.external_files.is_empty());
    }

    #[test]
    fn healthcheck_adds_fcgi_client_outside_dev() {
      let prod = resolve("version: 7.4\n", "prod").unwrap();
      let dev = resolve("version: 7.4\n", "dev").unwrap();

      assert!(prod.healthcheck());
      assert_eq!(prod.stage.external_files.len(), 1);
      assert_eq!(prod.stage.external_files[0].destination, "/usr/local/bin/fcgi-client");
      assert!(!dev.healthcheck());
      assert!(dev.stage.external_files.is_empty());
    }

    #[test]
    fn healthcheck_toggle_resolves_to_fcgi_ping() {
      let prod = resolve("version: 7.4\n", "prod").unwrap();

      assert_eq!(prod.healthcheck_config(), Some(&HealthcheckConfig::fcgi("/ping", "pong")));
    }

    #[test]
    fn cmd_healthcheck_skips_fcgi_client() {
      let prod = resolve(
        "version: 7.4\nhealthcheck:\n  type: cmd\n  cmd:\n    command: [php, bin/health.php]\n  retries: 5\n",
        "prod",
      )
      .unwrap();

      let config = prod.healthcheck_config().unwrap();
      assert_eq!(config.retries, 5);
      assert_eq!(config.test(), vec!["CMD", "php", "bin/health.php"]);
      assert!(prod.stage.external_files.is_empty());
    }

    #[test]
    fn stage_can_disable_healthcheck() {
      let prod = resolve("version: 7.4\nstages:\n  prod:\n    healthcheck: false\n", "prod").unwrap();

      assert!(!prod.healthcheck());
      assert_eq!(prod.stage.healthcheck, Some(Healthcheck::Toggle(false)));
      assert!(prod.stage.external_files.is_empty());
    }

    #[test]
    fn rejects_http_healthcheck() {
      let err = Definition::from_build_def(&build_def(
        "version: 7.4\nhealthcheck:\n  type: http\n  http: { path: /, expected: ok }\n",
        "",
      ))
      .unwrap_err();

      assert_eq!(
        err.to_string(),
        "stage \"base\" has an invalid healthcheck: healthcheck type http is not supported here"
      );
    }

    #[test]
    fn rejects_incomplete_stage_healthcheck() {
      let err = Definition::from_build_def(&build_def(
        "version: 7.4\nstages:\n  worker:\n    derive_from: prod\n    healthcheck: { type: fcgi }\n",
        "",
      ))
      .unwrap_err();

      assert!(matches!(err, PhpError::InvalidHealthcheck { ref stage, .. } if stage == "worker"));
    }

    #[test]
    fn blackfire_integration_adds_probe() {
      let stage = resolve("version: 7.3.9\nintegrations: [blackfire]\n", "dev").unwrap();

      let probe = &stage.stage.external_files[0];
      assert_eq!(
        probe.destination,
        "/usr/local/lib/php/extensions/no-debug-non-zts-20180731/blackfire.so"
      );
      assert_eq!(probe.url, "https://blackfire.io/api/v1/releases/probe/php/linux/amd64/73");
      assert!(probe.compressed);
    }

    #[test]
    fn blackfire_probe_follows_php_version() {
      let stage = resolve("version: 7.4.1
integrations: [blackfire]
", "dev").unwrap();

      assert_eq!(
        stage.stage.external_files[0].url,
        "https://blackfire.io/api/v1/releases/probe/php/linux/amd64/74"
      );
    }

    #[test]
    fn symfony_integration_warms_cache_up() {
      let stage = resolve("version: 7.4\npost_install: [echo done]\nintegrations: [symfony]\n", "dev").unwrap();

      assert_eq!(stage.stage.post_install, vec![SYMFONY_CACHE_WARMUP, "echo done"]);
      assert_eq!(stage.stage.sources, vec!["app/", "src/"]);
      assert_eq!(stage.extra_scripts, vec!["bin/console", "web/app.php"]);
    }

    #[test]
    fn unknown_integration_is_an_error() {
      let err = resolve("version: 7.4\nintegrations: [laravel]\n", "dev").unwrap_err();
      assert_eq!(err.to_string(), "unknown integration \"laravel\"");
    }

    #[test]
    fn unknown_stage_is_an_error() {
      let err = resolve("version: 7.4\n", "staging").unwrap_err();
      assert_eq!(err.to_string(), "stage \"staging\" not found");
    }
  }

  mod composer_flags {
    use super::*;

    #[test]
    fn formats_flags() {
      let flags = ComposerDumpFlags {
        apcu: true,
        classmap_authoritative: false,
      };
      assert_eq!(flags.flags().unwrap(), "--no-dev --optimize --apcu");
    }

    #[test]
    fn apcu_and_classmap_are_exclusive() {
      let flags = ComposerDumpFlags {
        apcu: true,
        classmap_authoritative: true,
      };
      assert!(matches!(flags.flags(), Err(PhpError::ConflictingComposerFlags)));
    }
  }

  #[test]
  fn maj_min_version_extraction() {
    assert_eq!(maj_min_version("7.4.1"), "7.4");
    assert_eq!(maj_min_version("7.3"), "7.3");
    assert_eq!(maj_min_version("8"), "8");
    assert_eq!(maj_min_version(""), "");
  }
}
