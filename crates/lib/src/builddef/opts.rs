use std::path::Path;

use super::{BuildDef, Context, DefError};

/// Parameters passed to kind handlers.
#[derive(Debug, Clone)]
pub struct BuildOpts {
  /// The loaded definition. Left empty until the loader fills it.
  pub def: BuildDef,
  /// Path of the definition file, relative to the build context.
  pub file: String,
  pub lock_file: String,
  pub stage: String,
  pub build_context: Context,
}

impl BuildOpts {
  pub fn new(file: &str, context: &str, stage: &str) -> Result<Self, DefError> {
    let context = if context.is_empty() { "." } else { context };

    Ok(Self {
      def: BuildDef::default(),
      file: file.to_string(),
      lock_file: lock_filepath(file),
      stage: stage.to_string(),
      build_context: Context::parse(context, None)?,
    })
  }
}

/// Selects which parts of the lock file get refreshed.
///
/// Parts that are not refreshed keep the value found in the current lock
/// file.
#[derive(Debug, Clone)]
pub struct UpdateLocksOpts {
  pub build_opts: BuildOpts,
  pub update_image_ref: bool,
  pub update_system_packages: bool,
  pub update_extensions: bool,
}

impl UpdateLocksOpts {
  /// Refreshes every locked property.
  pub fn all(build_opts: BuildOpts) -> Self {
    Self {
      build_opts,
      update_image_ref: true,
      update_system_packages: true,
      update_extensions: true,
    }
  }
}

/// Returns the path of the lock file matching a definition file: the file
/// extension is replaced with `.lock`.
pub fn lock_filepath(file: &str) -> String {
  Path::new(file).with_extension("lock").to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lock_filepath_replaces_extension() {
    assert_eq!(lock_filepath("zbuild.yml"), "zbuild.lock");
    assert_eq!(lock_filepath("api/zbuild.yaml"), "api/zbuild.lock");
    assert_eq!(lock_filepath("zbuild"), "zbuild.lock");
  }

  #[test]
  fn new_defaults_to_current_dir_context() {
    let opts = BuildOpts::new("zbuild.yml", "", "dev").unwrap();

    assert_eq!(opts.lock_file, "zbuild.lock");
    assert_eq!(opts.build_context, Context::local("."));
    assert_eq!(opts.stage, "dev");
  }

  #[test]
  fn new_parses_git_context() {
    let opts = BuildOpts::new("zbuild.yml", "git://github.com/some/repo#main", "prod").unwrap();
    assert!(opts.build_context.is_git());
    assert_eq!(opts.build_context.reference, "main");
  }
}
