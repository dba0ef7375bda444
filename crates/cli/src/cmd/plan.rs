//! Implementation of the `zbuild plan` command.
//!
//! Prints the build plan of a stage: the resolved stage configuration along
//! with its locks. The lock file has to be in sync with the definition.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use zbuild_lib::pkgsolver::PackageSolvers;
use zbuild_lib::plan::BuildPlan;

use super::{GlobalOpts, builder};
use crate::output::{OutputFormat, Status, field, json, status_line};

pub async fn cmd_plan(ctx: &CancellationToken, global: &GlobalOpts, stage: &str, output: OutputFormat) -> Result<()> {
  let opts = global.build_opts(stage)?;

  let plan = builder(PackageSolvers::default())
    .build(ctx, &global.state_solver(), opts)
    .await
    .with_context(|| format!("Failed to plan stage {:?}", stage))?;

  if output.is_json() {
    return json(&plan);
  }

  print_summary(&plan);
  if let Some(source) = &plan.source {
    println!();
    println!("Copies from:");
    print_summary(source);
  }

  Ok(())
}

fn print_summary(plan: &BuildPlan) {
  status_line(Status::Done, &format!("{} stage {}", plan.kind, plan.stage));
  field("Base image", &plan.base_image);
  field("Context", &plan.build_context.to_string());
  field("Dev", &plan.dev.to_string());
  for (name, value) in &plan.args {
    field(name, value);
  }
}
