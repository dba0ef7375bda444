//! Implementation of the `zbuild update` command.
//!
//! Resolves the base image, system packages and extensions of every stage
//! and writes the lock file.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use zbuild_lib::builddef::UpdateLocksOpts;
use zbuild_lib::platform::arch::Arch;

use super::{GlobalOpts, builder, package_solvers};
use crate::output::{Status, elapsed, field, short_hash, status_line};

/// Which parts of the lock file get refreshed.
#[derive(Debug, Clone)]
pub struct UpdateFlags {
  pub update_image_ref: bool,
  pub update_system_packages: bool,
  pub update_extensions: bool,
  /// `SUITE=URL` specs of the Debian repositories used instead of the image.
  pub dpkg_repos: Vec<String>,
  pub index_ttl: Duration,
  pub arch: Arch,
}

pub async fn cmd_update(ctx: &CancellationToken, global: &GlobalOpts, flags: UpdateFlags) -> Result<()> {
  let start = Instant::now();

  let opts = UpdateLocksOpts {
    build_opts: global.build_opts("dev")?,
    update_image_ref: flags.update_image_ref,
    update_system_packages: flags.update_system_packages,
    update_extensions: flags.update_extensions,
  };
  let builder = builder(package_solvers(&flags.dpkg_repos, flags.arch, flags.index_ttl)?);

  let result = builder
    .update_lock_file(ctx, &global.state_solver(), opts)
    .await
    .with_context(|| format!("Failed to update the locks of {}", global.file))?;

  for name in &result.updated {
    status_line(Status::Changed, &format!("Updated: {}", name.cyan()));
  }
  if !result.unchanged.is_empty() {
    status_line(Status::Kept, &format!("Unchanged: {}", result.unchanged.join(", ")));
  }

  if result.changed() {
    status_line(Status::Done, &format!("Lock file updated: {}", result.lock_file.display()));
  } else {
    status_line(Status::Done, "All locks are up to date.");
  }
  field("Definition", short_hash(&result.defhash));
  field("Duration", &elapsed(start.elapsed()));

  Ok(())
}
