use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use zbuild_lib::builder::WEBSERVER_STAGE_PREFIX;
use zbuild_lib::pkgsolver::PackageSolvers;

use super::{GlobalOpts, builder};

/// Prints the resolved configuration of a stage as YAML.
pub async fn cmd_debug_config(ctx: &CancellationToken, global: &GlobalOpts, stage: &str) -> Result<()> {
  let opts = global.build_opts(stage)?;

  let dumped = builder(PackageSolvers::default())
    .dump_config(ctx, &global.state_solver(), opts)
    .await
    .with_context(|| {
      if stage.starts_with(WEBSERVER_STAGE_PREFIX) {
        "Failed to resolve the webserver config".to_string()
      } else {
        format!("Failed to resolve stage {:?}", stage)
      }
    })?;

  print!("{}", dumped);
  Ok(())
}
